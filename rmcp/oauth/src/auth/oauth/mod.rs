//! OAuth 2.1 resource server support for MCP servers.
//!
//! Implements the server-side (resource server) requirements of the
//! [MCP Authorization specification](https://modelcontextprotocol.io/specification/draft/basic/authorization):
//!
//! - **Protected Resource Metadata** ([RFC 9728](https://datatracker.ietf.org/doc/html/rfc9728)):
//!   serve `/.well-known/oauth-protected-resource` so MCP clients can discover
//!   authorization servers.
//!
//! - **Authorization server metadata proxy**: serve
//!   `/.well-known/oauth-authorization-server` for clients that look for it on
//!   the resource server.
//!
//! - **Challenges**: 401 and 403 responses with `WWW-Authenticate` headers per
//!   [RFC 6750](https://datatracker.ietf.org/doc/html/rfc6750).

mod challenge;
mod metadata;

pub use challenge::{
    AUTHORIZATION_SERVER_PATH, Challenge, PROTECTED_RESOURCE_PATH, ResourceServerConfig,
    rejection_response,
};
pub use metadata::{ProtectedResourceMetadata, authorization_server_router, metadata_router};
