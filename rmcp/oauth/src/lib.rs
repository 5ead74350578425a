//! # rmcp-oauth
//!
//! OAuth 2.1 resource server support for MCP servers built with
//! [rmcp](https://docs.rs/rmcp) and [axum](https://docs.rs/axum).
//!
//! ## Request Gate
//!
//! [`auth::AuthLayer`] verifies bearer tokens against the authorization
//! server's published key set, enforces per-tool scope requirements and
//! answers failures with RFC 6750 challenges. Protocol handshakes and
//! discovery documents stay reachable without a token.
//!
//! ```rust,ignore
//! use rmcp_oauth::auth::{AuthLayer, ResourceServerConfig};
//! use rmcp_oauth::auth::jwks::{HttpKeySource, KeySetCache};
//! use rmcp_oauth::auth::jwt::TokenVerifier;
//!
//! let keys = KeySetCache::new(HttpKeySource::new("https://auth.example.com/keys")?);
//! let verifier = TokenVerifier::new(keys, "https://auth.example.com", "http://localhost:3002");
//!
//! let app = axum::Router::new()
//!     .merge(metadata_router(metadata))
//!     .fallback_service(mcp_service)
//!     .layer(AuthLayer::new(verifier, rs_config).with_operations(operations));
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3002").await?;
//! axum::serve(listener, app).await?;
//! ```

pub use axum;

pub mod auth;
