//! RFC 6750 challenges for MCP resource servers.
//!
//! Builds the `WWW-Authenticate` header and JSON body of 401/403 responses
//! per [RFC 6750 §3](https://datatracker.ietf.org/doc/html/rfc6750#section-3)
//! and [RFC 9728 §5.1](https://datatracker.ietf.org/doc/html/rfc9728#name-www-authenticate-response).

use crate::auth::error::GateError;
use axum::Json;
use axum::response::{IntoResponse, Response};
use http::HeaderValue;
use serde::Serialize;

/// Well-known path of the Protected Resource Metadata document.
pub const PROTECTED_RESOURCE_PATH: &str = "/.well-known/oauth-protected-resource";

/// Well-known path of the authorization server metadata proxy.
pub const AUTHORIZATION_SERVER_PATH: &str = "/.well-known/oauth-authorization-server";

/// This server's identity as an OAuth 2.1 resource server.
#[derive(Clone, Debug)]
pub struct ResourceServerConfig {
    /// URL of the Protected Resource Metadata document (RFC 9728), sent as
    /// `resource_metadata="..."` so clients can discover how to authenticate.
    pub resource_metadata_url: String,
    /// Scopes advertised in challenges for requests without a token.
    pub default_scope: Option<String>,
}

impl ResourceServerConfig {
    pub fn new(resource_metadata_url: impl Into<String>) -> Self {
        Self {
            resource_metadata_url: resource_metadata_url.into(),
            default_scope: None,
        }
    }

    pub fn default_scope(mut self, scope: impl Into<String>) -> Self {
        self.default_scope = Some(scope.into());
        self
    }
}

/// One rejection, ready to be rendered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Challenge {
    pub error_code: &'static str,
    pub description: String,
    /// Space-delimited scopes the client should request.
    pub scope: Option<String>,
    pub resource_metadata_url: String,
}

#[derive(Serialize)]
struct ChallengeBody<'a> {
    error: &'a str,
    error_description: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    scope: Option<&'a str>,
}

impl Challenge {
    /// The externally visible form of a gate rejection. Verification
    /// sub-causes are collapsed here.
    pub fn from_error(err: &GateError, config: &ResourceServerConfig) -> Self {
        let (description, scope) = match err {
            GateError::MissingToken => (
                "Missing or invalid Bearer token".to_string(),
                config.default_scope.clone(),
            ),
            GateError::Verification(_) => (
                "The access token is invalid or expired".to_string(),
                None,
            ),
            GateError::InsufficientScope { required, .. } => (
                format!("Required scopes: {}", required.join(", ")),
                Some(required.join(" ")),
            ),
            GateError::PayloadTooLarge { limit } => {
                (format!("Request body exceeds {limit} bytes"), None)
            }
        };
        Self {
            error_code: err.error_code(),
            description,
            scope,
            resource_metadata_url: config.resource_metadata_url.clone(),
        }
    }

    /// Render the `WWW-Authenticate` value.
    ///
    /// A request that carried no credentials gets no `error` attribute
    /// (RFC 6750 §3.1).
    pub fn www_authenticate(
        &self,
        include_error: bool,
    ) -> Result<HeaderValue, http::header::InvalidHeaderValue> {
        let mut params = Vec::new();
        if include_error {
            params.push(format!("error=\"{}\"", quote(self.error_code)));
            params.push(format!("error_description=\"{}\"", quote(&self.description)));
        }
        if let Some(scope) = &self.scope {
            params.push(format!("scope=\"{}\"", quote(scope)));
        }
        params.push(format!(
            "resource_metadata=\"{}\"",
            quote(&self.resource_metadata_url)
        ));
        HeaderValue::from_str(&format!("Bearer {}", params.join(", ")))
    }
}

fn quote(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Build the HTTP response for a gate rejection.
pub fn rejection_response(err: &GateError, config: &ResourceServerConfig) -> Response {
    let challenge = Challenge::from_error(err, config);
    let body = ChallengeBody {
        error: challenge.error_code,
        error_description: &challenge.description,
        scope: match err {
            GateError::InsufficientScope { .. } => challenge.scope.as_deref(),
            _ => None,
        },
    };
    let mut response = (err.status(), Json(body)).into_response();

    if matches!(err, GateError::PayloadTooLarge { .. }) {
        return response;
    }
    match challenge.www_authenticate(!matches!(err, GateError::MissingToken)) {
        Ok(value) => {
            response
                .headers_mut()
                .insert(http::header::WWW_AUTHENTICATE, value);
        }
        Err(e) => tracing::error!(error = %e, "unrepresentable WWW-Authenticate challenge"),
    }
    response
}

#[cfg(test)]
mod tests {
    use crate::auth::error::{GateError, VerificationError};
    use crate::auth::oauth::challenge::{ResourceServerConfig, rejection_response};
    use http::StatusCode;

    const METADATA: &str = "http://localhost:3002/.well-known/oauth-protected-resource";

    fn config() -> ResourceServerConfig {
        ResourceServerConfig::new(METADATA)
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn challenge_header(response: &axum::response::Response) -> String {
        response.headers()[http::header::WWW_AUTHENTICATE]
            .to_str()
            .unwrap()
            .to_string()
    }

    #[tokio::test]
    async fn missing_token_challenge_has_no_error_code() {
        let response = rejection_response(&GateError::MissingToken, &config());
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            challenge_header(&response),
            format!("Bearer resource_metadata=\"{METADATA}\"")
        );
        let body = body_json(response).await;
        assert_eq!(body["error"], "unauthorized");
    }

    #[tokio::test]
    async fn missing_token_challenge_advertises_default_scope() {
        let config = config().default_scope("usr:read");
        let response = rejection_response(&GateError::MissingToken, &config);
        assert_eq!(
            challenge_header(&response),
            format!("Bearer scope=\"usr:read\", resource_metadata=\"{METADATA}\"")
        );
    }

    #[tokio::test]
    async fn invalid_token_hides_the_cause() {
        let err = GateError::Verification(VerificationError::IssuerMismatch);
        let response = rejection_response(&err, &config());
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let header = challenge_header(&response);
        assert!(header.starts_with("Bearer error=\"invalid_token\""));
        assert!(header.contains(&format!("resource_metadata=\"{METADATA}\"")));
        assert!(!header.to_lowercase().contains("issuer"));

        let body = body_json(response).await;
        assert_eq!(body["error"], "invalid_token");
        assert_eq!(body["error_description"], "The access token is invalid or expired");
        assert!(body.get("scope").is_none());
    }

    #[tokio::test]
    async fn insufficient_scope_lists_required_scopes() {
        let err = GateError::InsufficientScope {
            operation: "set_greeting".into(),
            required: vec!["usr:read".into(), "usr:write".into()],
            missing: vec!["usr:write".into()],
        };
        let response = rejection_response(&err, &config());
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(challenge_header(&response).contains("scope=\"usr:read usr:write\""));

        let body = body_json(response).await;
        assert_eq!(body["error"], "insufficient_scope");
        assert_eq!(body["error_description"], "Required scopes: usr:read, usr:write");
        assert_eq!(body["scope"], "usr:read usr:write");
    }

    #[tokio::test]
    async fn oversized_body_is_not_an_auth_challenge() {
        let response = rejection_response(&GateError::PayloadTooLarge { limit: 10 }, &config());
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(
            !response
                .headers()
                .contains_key(http::header::WWW_AUTHENTICATE)
        );
    }
}
