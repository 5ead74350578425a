//! MCP server greeting authenticated users.
//!
//! Every tool declares the OAuth scopes it needs in [`GreetingServer::operations`];
//! the gate in [`app`] enforces them before a `tools/call` reaches the tool,
//! and tools read the caller's verified identity from the request.

use rmcp::{
    ServerHandler,
    handler::server::router::tool::ToolRouter,
    model::{Implementation, ServerCapabilities, ServerInfo},
    tool_handler,
};
use rmcp_oauth::auth::scope::{OperationDescriptor, OperationRegistry};
use std::sync::Arc;
use tokio::sync::RwLock;

pub mod app;
pub mod config;
pub mod tools;

/// Scope needed to read greetings and identity.
pub const READ_SCOPE: &str = "usr:read";

/// Scope needed to change the greeting.
pub const WRITE_SCOPE: &str = "usr:write";

/// Template used until `set_greeting` replaces it.
pub const DEFAULT_TEMPLATE: &str = "Hello, {name}!";

/// MCP greeting server.
#[derive(Debug, Clone)]
pub struct GreetingServer {
    pub(crate) name: String,
    pub(crate) version: String,
    pub(crate) template: Arc<RwLock<String>>,
    pub(crate) tool_router: ToolRouter<Self>,
}

impl GreetingServer {
    /// Scope requirements of every tool this server exposes.
    pub fn operations() -> OperationRegistry {
        OperationRegistry::new([
            OperationDescriptor::new("greet_user", [READ_SCOPE]),
            OperationDescriptor::new("whoami", [READ_SCOPE]),
            OperationDescriptor::new("set_greeting", [WRITE_SCOPE]),
        ])
    }
}

#[tool_handler]
impl ServerHandler for GreetingServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: Default::default(),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: self.name.clone(),
                version: self.version.clone(),
                ..Default::default()
            },
            instructions: Some(
                "Greeting server. Tools require an OAuth access token with the usr:read \
                 scope; changing the greeting requires usr:write."
                    .into(),
            ),
        }
    }
}
