//! Binary entry point for the wmcp-greeting MCP server.

use clap::Parser;
use std::net::SocketAddr;
use wmcp_greeting::app;
use wmcp_greeting::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let keys = app::key_cache(&config)?;
    tokio::spawn({
        let keys = keys.clone();
        async move { keys.warm().await }
    });
    let router = app::router_with_keys(&config, keys);

    let addr = SocketAddr::new(config.host, config.port);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(
        %addr,
        resource = %config.resource_url(),
        issuer = %config.issuer(),
        jwks = %config.jwks_url(),
        "MCP server running"
    );
    axum::serve(listener, router).await?;
    Ok(())
}
