//! HTTP application: discovery documents plus the gated MCP endpoint.

use crate::GreetingServer;
use crate::config::Config;
use axum::Router;
use rmcp::transport::streamable_http_server::{
    StreamableHttpServerConfig, StreamableHttpService, session::local::LocalSessionManager,
};
use rmcp_oauth::auth::jwks::{HttpKeySource, KeySetCache};
use rmcp_oauth::auth::jwt::TokenVerifier;
use rmcp_oauth::auth::oauth::{
    ProtectedResourceMetadata, authorization_server_router, metadata_router,
};
use rmcp_oauth::auth::{AuthLayer, ResourceServerConfig};

/// Key set cache for the configured JWKS endpoint.
pub fn key_cache(config: &Config) -> anyhow::Result<KeySetCache> {
    let source = HttpKeySource::new(config.jwks_url())?;
    Ok(KeySetCache::new(source).ttl(config.jwks_ttl()))
}

/// The metadata document advertised at `/.well-known/oauth-protected-resource`.
pub fn resource_metadata(config: &Config) -> ProtectedResourceMetadata {
    ProtectedResourceMetadata::new(config.resource_url())
        .authorization_server(config.authorization_server_url())
        .scopes(GreetingServer::operations().scopes())
        .documentation(config.documentation_url())
}

/// Build the application with a fresh key set cache.
pub fn router(config: &Config) -> anyhow::Result<Router> {
    Ok(router_with_keys(config, key_cache(config)?))
}

/// Build the application around an existing key set cache.
///
/// Discovery routes are exempt from the gate; every other request is an MCP
/// message served by [`GreetingServer`] at `/`.
pub fn router_with_keys(config: &Config, keys: KeySetCache) -> Router {
    let verifier = TokenVerifier::new(keys, config.issuer(), config.resource_url())
        .leeway(config.leeway());

    let server = GreetingServer::new(&config.server_name, &config.server_version);
    let mcp = StreamableHttpService::new(
        move || Ok(server.clone()),
        LocalSessionManager::default().into(),
        StreamableHttpServerConfig::default(),
    );

    let gate = AuthLayer::new(
        verifier,
        ResourceServerConfig::new(config.resource_metadata_url()),
    )
    .with_operations(GreetingServer::operations());

    Router::new()
        .merge(metadata_router(resource_metadata(config)))
        .merge(authorization_server_router(
            reqwest::Client::new(),
            config.upstream_metadata_url(),
        ))
        .route_service("/", mcp)
        .layer(gate)
}
