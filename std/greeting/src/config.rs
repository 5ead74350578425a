//! Command line and environment configuration.

use clap::Parser;
use rmcp_oauth::auth::oauth::{AUTHORIZATION_SERVER_PATH, PROTECTED_RESOURCE_PATH};
use std::net::IpAddr;
use std::time::Duration;

/// Greeting MCP server protected by OAuth bearer tokens.
#[derive(Debug, Clone, Parser)]
#[command(name = "wmcp-greeting", version, about)]
pub struct Config {
    /// Base URL of the authorization server.
    #[arg(long, env = "AUTH_SERVER_URL")]
    pub auth_server_url: String,

    /// Identifier of this resource server at the authorization server.
    #[arg(long, env = "MCP_SERVER_ID")]
    pub server_id: String,

    /// Address to listen on.
    #[arg(long, env = "BIND_ADDR", default_value = "127.0.0.1")]
    pub host: IpAddr,

    #[arg(long, env = "PORT", default_value_t = 3002)]
    pub port: u16,

    /// Name reported to MCP clients.
    #[arg(long, env = "SERVER_NAME", default_value = "greeting-mcp")]
    pub server_name: String,

    /// Version reported to MCP clients.
    #[arg(long, env = "SERVER_VERSION", default_value = env!("CARGO_PKG_VERSION"))]
    pub server_version: String,

    /// Expected `iss` claim. Defaults to the authorization server URL.
    #[arg(long, env = "TOKEN_ISSUER")]
    pub issuer: Option<String>,

    /// Signing key set. Defaults to `<auth-server-url>/keys`.
    #[arg(long, env = "JWKS_URL")]
    pub jwks_url: Option<String>,

    /// Seconds a fetched key set stays fresh.
    #[arg(long, env = "JWKS_TTL_SECS", default_value_t = 300)]
    pub jwks_ttl_secs: u64,

    /// Clock skew tolerated on `exp`, in seconds.
    #[arg(long, env = "TOKEN_LEEWAY_SECS", default_value_t = 0)]
    pub leeway_secs: u64,
}

impl Config {
    fn auth_base(&self) -> &str {
        self.auth_server_url.trim_end_matches('/')
    }

    /// The URI clients use for this server; also the expected `aud` claim.
    pub fn resource_url(&self) -> String {
        format!("http://localhost:{}", self.port)
    }

    pub fn resource_metadata_url(&self) -> String {
        format!("{}{PROTECTED_RESOURCE_PATH}", self.resource_url())
    }

    pub fn documentation_url(&self) -> String {
        format!("{}/docs", self.resource_url())
    }

    /// The authorization server advertised in the metadata document.
    pub fn authorization_server_url(&self) -> String {
        format!("{}/resources/{}", self.auth_base(), self.server_id)
    }

    /// Where the authorization server publishes its own metadata.
    pub fn upstream_metadata_url(&self) -> String {
        format!(
            "{}/{}{AUTHORIZATION_SERVER_PATH}",
            self.auth_base(),
            self.server_id
        )
    }

    pub fn issuer(&self) -> String {
        self.issuer
            .clone()
            .unwrap_or_else(|| self.auth_server_url.clone())
    }

    pub fn jwks_url(&self) -> String {
        self.jwks_url
            .clone()
            .unwrap_or_else(|| format!("{}/keys", self.auth_base()))
    }

    pub fn jwks_ttl(&self) -> Duration {
        Duration::from_secs(self.jwks_ttl_secs)
    }

    pub fn leeway(&self) -> Duration {
        Duration::from_secs(self.leeway_secs)
    }
}
