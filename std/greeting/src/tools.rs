//! Tool implementations for the greeting MCP server.

use crate::{DEFAULT_TEMPLATE, GreetingServer};
use chrono::{DateTime, Utc};
use http::request::Parts;
use rmcp::{
    RoleServer,
    handler::server::wrapper::Parameters,
    schemars::{self, JsonSchema},
    service::RequestContext,
    tool, tool_router,
};
use rmcp_oauth::auth::VerifiedIdentity;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Parameters for the `greet_user` tool.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct GreetUserParams {
    /// Name of the person to greet.
    pub name: String,
}

/// Parameters for the `set_greeting` tool.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct SetGreetingParams {
    /// New greeting template; `{name}` is replaced with the greeted name.
    pub template: String,
}

/// The caller as seen by `whoami`.
#[derive(Debug, Serialize)]
pub struct CallerInfo {
    pub client_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub scopes: BTreeSet<String>,
    pub expires_at: DateTime<Utc>,
}

impl From<&VerifiedIdentity> for CallerInfo {
    fn from(identity: &VerifiedIdentity) -> Self {
        Self {
            client_id: identity.client_id.clone(),
            subject: identity.subject.clone(),
            scopes: identity.scopes.clone(),
            expires_at: identity.expires_at,
        }
    }
}

/// The identity the gate attached to the HTTP request carrying this call.
fn caller(context: &RequestContext<RoleServer>) -> Option<&VerifiedIdentity> {
    context
        .extensions
        .get::<Parts>()
        .and_then(VerifiedIdentity::from_parts)
}

pub(crate) fn render(template: &str, name: &str) -> String {
    template.replace("{name}", name)
}

pub(crate) fn greeting(
    template: &str,
    name: &str,
    caller: Option<&VerifiedIdentity>,
) -> Result<String, String> {
    let name = name.trim();
    if name.is_empty() {
        return Err("Name must not be empty".into());
    }
    let greeting = render(template, name);
    Ok(match caller {
        Some(identity) if !identity.client_id.is_empty() => {
            format!("{greeting} (via {})", identity.client_id)
        }
        _ => greeting,
    })
}

pub(crate) fn whoami(caller: Option<&VerifiedIdentity>) -> Result<String, String> {
    let identity = caller.ok_or("No verified identity on this request")?;
    serde_json::to_string_pretty(&CallerInfo::from(identity)).map_err(|e| e.to_string())
}

pub(crate) fn validate_template(template: &str) -> Result<(), String> {
    if !template.contains("{name}") {
        return Err("Template must contain {name}".into());
    }
    Ok(())
}

#[tool_router]
impl GreetingServer {
    /// Create a greeting server reporting `name` and `version` to clients.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            template: Arc::new(RwLock::new(DEFAULT_TEMPLATE.to_string())),
            tool_router: Self::tool_router(),
        }
    }

    /// Greet a user by name.
    #[tool(description = "Greet a user by name")]
    async fn greet_user(
        &self,
        Parameters(params): Parameters<GreetUserParams>,
        context: RequestContext<RoleServer>,
    ) -> Result<String, String> {
        let template = self.template.read().await;
        greeting(&template, &params.name, caller(&context))
    }

    /// Describe the authenticated caller.
    #[tool(description = "Show the client, subject and scopes of the current access token")]
    async fn whoami(&self, context: RequestContext<RoleServer>) -> Result<String, String> {
        whoami(caller(&context))
    }

    /// Replace the greeting template.
    #[tool(description = "Change the greeting template; use {name} where the name goes")]
    async fn set_greeting(
        &self,
        Parameters(params): Parameters<SetGreetingParams>,
        context: RequestContext<RoleServer>,
    ) -> Result<String, String> {
        validate_template(&params.template)?;
        *self.template.write().await = params.template.clone();
        tracing::info!(
            client_id = caller(&context).map(|c| c.client_id.as_str()),
            template = %params.template,
            "greeting template updated"
        );
        Ok(format!("Greeting updated: {}", render(&params.template, "world")))
    }
}

#[cfg(test)]
mod tests {
    use crate::tools::{greeting, validate_template, whoami};
    use crate::{GreetingServer, READ_SCOPE};
    use rmcp_oauth::auth::VerifiedIdentity;

    fn identity() -> VerifiedIdentity {
        VerifiedIdentity {
            token: "t".into(),
            client_id: "client-1".into(),
            subject: Some("user-1".into()),
            scopes: [READ_SCOPE.to_string()].into(),
            expires_at: chrono::Utc::now(),
            audience: vec!["http://localhost:3002".into()],
            extra_claims: Default::default(),
        }
    }

    #[test]
    fn greets_with_template() {
        assert_eq!(
            greeting("Hello, {name}!", " Ada ", None).unwrap(),
            "Hello, Ada!"
        );
        assert_eq!(
            greeting("Hi {name}", "Ada", Some(&identity())).unwrap(),
            "Hi Ada (via client-1)"
        );
        assert!(greeting("Hi {name}", "  ", None).is_err());
    }

    #[test]
    fn whoami_reports_identity() {
        let text = whoami(Some(&identity())).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["client_id"], "client-1");
        assert_eq!(value["subject"], "user-1");
        assert_eq!(value["scopes"], serde_json::json!([READ_SCOPE]));
        assert!(!text.contains("\"t\""));

        assert!(whoami(None).is_err());
    }

    #[test]
    fn template_needs_placeholder() {
        assert!(validate_template("Welcome, {name}.").is_ok());
        assert!(validate_template("Welcome.").is_err());
    }

    #[tokio::test]
    async fn template_starts_with_default() {
        let server = GreetingServer::new("greeting", "0.0.1");
        assert_eq!(*server.template.read().await, crate::DEFAULT_TEMPLATE);
    }

    #[test]
    fn every_tool_has_scope_requirements() {
        let server = GreetingServer::new("greeting", "0.0.1");
        let operations = GreetingServer::operations();

        let tools = server.tool_router.list_all();
        assert_eq!(tools.len(), operations.len());
        for tool in tools {
            let op = operations
                .get(&tool.name)
                .unwrap_or_else(|| panic!("{} has no scope requirements", tool.name));
            assert!(!op.required_scopes().is_empty());
        }
    }
}
