//! Discovery documents.
//!
//! MCP servers MUST implement RFC 9728 to indicate the locations of their
//! authorization servers. This module serves that document and, for clients
//! that predate RFC 9728, proxies the authorization server's own RFC 8414
//! metadata.
//!
//! ```rust,ignore
//! use rmcp_oauth::auth::oauth::{ProtectedResourceMetadata, metadata_router};
//!
//! let metadata = ProtectedResourceMetadata::new("http://localhost:3002")
//!     .authorization_server("https://auth.example.com/resources/res_123")
//!     .scopes(["usr:read"])
//!     .documentation("http://localhost:3002/docs");
//!
//! let app = axum::Router::new()
//!     .fallback_service(mcp_service)
//!     .merge(metadata_router(metadata));
//! ```

use crate::auth::oauth::challenge::{AUTHORIZATION_SERVER_PATH, PROTECTED_RESOURCE_PATH};
use axum::response::{IntoResponse, Response};
use axum::{Json, extract::State, routing::get};
use http::{HeaderValue, StatusCode, header};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Timeout for fetching upstream authorization server metadata.
pub const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(10);

/// OAuth 2.0 Protected Resource Metadata ([RFC 9728](https://datatracker.ietf.org/doc/html/rfc9728)).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProtectedResourceMetadata {
    /// The resource identifier, i.e. the audience tokens must carry.
    pub resource: String,

    /// Authorization server(s) that can issue tokens for this resource.
    pub authorization_servers: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub scopes_supported: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub bearer_methods_supported: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_documentation: Option<String>,
}

impl ProtectedResourceMetadata {
    /// Metadata for `resource` accepting bearer tokens in the header only.
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            authorization_servers: Vec::new(),
            scopes_supported: None,
            bearer_methods_supported: Some(vec!["header".into()]),
            resource_documentation: None,
        }
    }

    pub fn authorization_server(mut self, url: impl Into<String>) -> Self {
        self.authorization_servers.push(url.into());
        self
    }

    pub fn scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes_supported = Some(scopes.into_iter().map(Into::into).collect());
        self
    }

    pub fn documentation(mut self, url: impl Into<String>) -> Self {
        self.resource_documentation = Some(url.into());
        self
    }
}

/// Serve the Protected Resource Metadata at
/// `/.well-known/oauth-protected-resource`.
///
/// The document is static, so it is marked publicly cacheable.
pub fn metadata_router(metadata: ProtectedResourceMetadata) -> axum::Router {
    let metadata = Arc::new(metadata);
    axum::Router::new().route(
        PROTECTED_RESOURCE_PATH,
        get(move || {
            let metadata = metadata.clone();
            async move {
                (
                    [(
                        header::CACHE_CONTROL,
                        HeaderValue::from_static("public, max-age=3600"),
                    )],
                    Json(metadata.as_ref().clone()),
                )
                    .into_response()
            }
        }),
    )
}

#[derive(Clone)]
struct Upstream {
    client: reqwest::Client,
    url: String,
}

/// Proxy the authorization server's metadata document at
/// `/.well-known/oauth-authorization-server`.
///
/// Upstream failures become a generic 500; upstream error bodies are never
/// passed through.
pub fn authorization_server_router(
    client: reqwest::Client,
    upstream_url: impl Into<String>,
) -> axum::Router {
    axum::Router::new()
        .route(AUTHORIZATION_SERVER_PATH, get(proxy_authorization_server))
        .with_state(Upstream {
            client,
            url: upstream_url.into(),
        })
}

async fn proxy_authorization_server(State(upstream): State<Upstream>) -> Response {
    match fetch_upstream(&upstream).await {
        Ok(metadata) => Json(metadata).into_response(),
        Err(e) => {
            tracing::error!(
                upstream = %upstream.url,
                error = %e,
                "authorization server metadata unavailable"
            );
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "error": "Failed to fetch authorization server metadata"
                })),
            )
                .into_response()
        }
    }
}

async fn fetch_upstream(upstream: &Upstream) -> Result<serde_json::Value, reqwest::Error> {
    upstream
        .client
        .get(&upstream.url)
        .timeout(UPSTREAM_TIMEOUT)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await
}

#[cfg(test)]
mod tests {
    use crate::auth::oauth::metadata::{
        ProtectedResourceMetadata, authorization_server_router, metadata_router,
    };
    use axum::body::Body;
    use http::{Request, StatusCode};
    use tower::ServiceExt;

    fn metadata() -> ProtectedResourceMetadata {
        ProtectedResourceMetadata::new("http://localhost:3002")
            .authorization_server("https://auth.example.com/resources/res_1")
            .scopes(["usr:read"])
            .documentation("http://localhost:3002/docs")
    }

    #[tokio::test]
    async fn serves_protected_resource_metadata() {
        let response = metadata_router(metadata())
            .oneshot(
                Request::get("/.well-known/oauth-protected-resource")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(http::header::CACHE_CONTROL));

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "resource": "http://localhost:3002",
                "authorization_servers": ["https://auth.example.com/resources/res_1"],
                "scopes_supported": ["usr:read"],
                "bearer_methods_supported": ["header"],
                "resource_documentation": "http://localhost:3002/docs",
            })
        );
    }

    #[tokio::test]
    async fn unreachable_upstream_is_a_generic_500() {
        let router = authorization_server_router(
            reqwest::Client::new(),
            "http://127.0.0.1:1/.well-known/oauth-authorization-server",
        );
        let response = router
            .oneshot(
                Request::get("/.well-known/oauth-authorization-server")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "Failed to fetch authorization server metadata");
    }
}
