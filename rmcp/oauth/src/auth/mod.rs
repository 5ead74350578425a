//! Bearer token gate for MCP servers.
//!
//! [`AuthLayer`] wraps the MCP service (and the discovery routes) and, for
//! every request:
//!
//! 1. forwards requests for exempt paths (the discovery documents) untouched;
//! 2. forwards a lone `initialize` request on the RPC path without a token,
//!    so clients can complete the handshake before they authenticate;
//! 3. requires `Authorization: Bearer <token>` and verifies it with a
//!    [`Validator`];
//! 4. checks each `tools/call` against the [`OperationRegistry`];
//! 5. inserts the [`VerifiedIdentity`] into the request extensions, where MCP
//!    tool handlers read it from `http::request::Parts`.
//!
//! Failures become RFC 6750 challenges (see [`oauth`]) carrying the
//! `resource_metadata` URL. Clients only ever see `invalid_token` or
//! `insufficient_scope`; the underlying cause goes to the log.
//!
//! # Example
//!
//! ```rust,ignore
//! use rmcp_oauth::auth::{AuthLayer, ResourceServerConfig};
//! use rmcp_oauth::auth::scope::{OperationDescriptor, OperationRegistry};
//!
//! let operations = OperationRegistry::new([
//!     OperationDescriptor::new("greet_user", ["usr:read"]),
//! ]);
//! let rs_config = ResourceServerConfig::new(
//!     "http://localhost:3002/.well-known/oauth-protected-resource",
//! );
//!
//! let app = axum::Router::new()
//!     .merge(metadata_router(metadata))
//!     .route_service("/", mcp_service)
//!     .layer(AuthLayer::new(verifier, rs_config).with_operations(operations));
//! ```

mod bearer;

pub mod error;
pub mod identity;
pub mod jwks;
pub mod jwt;
pub mod oauth;
pub mod rpc;
pub mod scope;

pub use bearer::bearer_token;
pub use error::{GateError, VerificationError};
pub use identity::VerifiedIdentity;
pub use oauth::ResourceServerConfig;

use axum::body::Body;
use futures::future::BoxFuture;
use http::{Method, Request, Response};
use oauth::{AUTHORIZATION_SERVER_PATH, PROTECTED_RESOURCE_PATH, rejection_response};
use rpc::RpcSummary;
use scope::{OperationAccess, OperationRegistry};
use std::sync::Arc;
use std::task::{Context, Poll};

/// Largest request body the gate buffers to inspect.
pub const DEFAULT_BODY_LIMIT: usize = 4 * 1024 * 1024;

/// Verifies a bearer token.
///
/// [`TokenVerifier`](jwt::TokenVerifier) is the JWT implementation; tests
/// and alternative token formats implement this directly.
pub trait Validator: Clone + Send + Sync + 'static {
    fn validate(
        &self,
        token: &str,
    ) -> impl Future<Output = Result<VerifiedIdentity, VerificationError>> + Send;
}

#[derive(Clone, Debug)]
struct GateSettings {
    resource_server: ResourceServerConfig,
    operations: OperationRegistry,
    exempt_paths: Vec<String>,
    rpc_path: String,
    body_limit: usize,
}

/// Tower [`Layer`](tower::Layer) that applies [`AuthService`].
#[derive(Clone)]
pub struct AuthLayer<V> {
    validator: V,
    settings: GateSettings,
}

impl<V> AuthLayer<V> {
    pub fn new(validator: V, resource_server: ResourceServerConfig) -> Self {
        Self {
            validator,
            settings: GateSettings {
                resource_server,
                operations: OperationRegistry::default(),
                exempt_paths: vec![
                    PROTECTED_RESOURCE_PATH.to_string(),
                    AUTHORIZATION_SERVER_PATH.to_string(),
                ],
                rpc_path: "/".to_string(),
                body_limit: DEFAULT_BODY_LIMIT,
            },
        }
    }

    /// Scope requirements for `tools/call`. Without one, any verified token
    /// may call any tool.
    pub fn with_operations(mut self, operations: OperationRegistry) -> Self {
        self.settings.operations = operations;
        self
    }

    /// Serve an additional path without authentication.
    pub fn exempt_path(mut self, path: impl Into<String>) -> Self {
        self.settings.exempt_paths.push(path.into());
        self
    }

    /// Path of the MCP endpoint, where the handshake is exempt. Defaults to `/`.
    pub fn rpc_path(mut self, path: impl Into<String>) -> Self {
        self.settings.rpc_path = path.into();
        self
    }

    pub fn body_limit(mut self, limit: usize) -> Self {
        self.settings.body_limit = limit;
        self
    }
}

impl<V, S> tower::Layer<S> for AuthLayer<V>
where
    V: Clone,
{
    type Service = AuthService<V, S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthService {
            validator: self.validator.clone(),
            settings: Arc::new(self.settings.clone()),
            inner,
        }
    }
}

/// Tower service that authenticates and authorizes requests before
/// forwarding them.
#[derive(Clone)]
pub struct AuthService<V, S> {
    validator: V,
    settings: Arc<GateSettings>,
    inner: S,
}

impl<V, S> tower::Service<Request<Body>> for AuthService<V, S>
where
    V: Validator,
    S: tower::Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send,
    S::Error: Send,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let validator = self.validator.clone();
        let settings = self.settings.clone();
        let mut inner = self.inner.clone();
        // swap to ensure poll_ready state is preserved
        std::mem::swap(&mut self.inner, &mut inner);

        Box::pin(async move {
            match admit(&settings, &validator, req).await {
                Ok(req) => inner.call(req).await,
                Err(err) => {
                    log_rejection(&err);
                    Ok(rejection_response(&err, &settings.resource_server))
                }
            }
        })
    }
}

async fn admit<V: Validator>(
    settings: &GateSettings,
    validator: &V,
    req: Request<Body>,
) -> Result<Request<Body>, GateError> {
    let path = req.uri().path();
    if settings.exempt_paths.iter().any(|exempt| exempt == path) {
        return Ok(req);
    }

    let (mut parts, body) = req.into_parts();
    let (body, rpc) = if parts.method == Method::POST {
        let bytes = axum::body::to_bytes(body, settings.body_limit)
            .await
            .map_err(|e| {
                tracing::debug!(error = %e, "failed to buffer request body");
                GateError::PayloadTooLarge {
                    limit: settings.body_limit,
                }
            })?;
        let rpc = RpcSummary::parse(&bytes);
        (Body::from(bytes), rpc)
    } else {
        (body, RpcSummary::default())
    };

    if parts.method == Method::POST
        && parts.uri.path() == settings.rpc_path
        && rpc.is_handshake()
    {
        tracing::debug!("forwarding handshake without authentication");
        return Ok(Request::from_parts(parts, body));
    }

    let token = bearer_token(&parts.headers).ok_or(GateError::MissingToken)?;
    let identity = validator.validate(token).await?;

    for tool in &rpc.tool_calls {
        match settings.operations.authorize(&identity, tool) {
            OperationAccess::Allowed => {}
            OperationAccess::Denied { operation, missing } => {
                tracing::warn!(
                    tool,
                    client_id = %identity.client_id,
                    required = ?operation.required_scopes(),
                    granted = ?identity.scopes,
                    "insufficient scope"
                );
                return Err(GateError::InsufficientScope {
                    operation: tool.clone(),
                    required: operation.required_scopes().to_vec(),
                    missing,
                });
            }
            OperationAccess::Unregistered => {
                tracing::debug!(tool, "tool has no registered scopes, leaving it to the server");
            }
        }
    }

    tracing::debug!(client_id = %identity.client_id, subject = ?identity.subject, "authenticated");
    parts.extensions.insert(identity);
    Ok(Request::from_parts(parts, body))
}

fn log_rejection(err: &GateError) {
    match err {
        GateError::MissingToken => tracing::info!("rejected request without bearer token"),
        GateError::Verification(VerificationError::KeyFetchFailed(e)) => {
            tracing::error!(error = %e, "rejected token: key set unavailable");
        }
        GateError::Verification(e) => tracing::warn!(reason = %e, "rejected invalid token"),
        // Logged with scope context where it is detected.
        GateError::InsufficientScope { .. } => {}
        GateError::PayloadTooLarge { limit } => {
            tracing::warn!(limit, "rejected oversized request body");
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::auth::error::{KeyFetchError, VerificationError};
    use crate::auth::identity::VerifiedIdentity;
    use crate::auth::scope::{OperationDescriptor, OperationRegistry};
    use crate::auth::{AuthLayer, ResourceServerConfig, Validator};
    use axum::body::Body;
    use axum::response::IntoResponse;
    use http::{Request, Response, StatusCode};
    use std::convert::Infallible;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::{Layer, ServiceExt};

    const METADATA: &str = "http://localhost:3002/.well-known/oauth-protected-resource";

    /// Accepts `good-<scopes>` tokens, fails `down` with a key fetch error,
    /// rejects everything else.
    #[derive(Clone, Default)]
    struct FakeValidator {
        calls: Arc<AtomicUsize>,
    }

    impl Validator for FakeValidator {
        async fn validate(&self, token: &str) -> Result<VerifiedIdentity, VerificationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if token == "down" {
                return Err(VerificationError::KeyFetchFailed(KeyFetchError::Timeout));
            }
            let scopes = token
                .strip_prefix("good-")
                .ok_or(VerificationError::InvalidSignature)?;
            Ok(VerifiedIdentity {
                token: token.into(),
                client_id: "client-1".into(),
                subject: None,
                scopes: scopes
                    .split(',')
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect(),
                expires_at: chrono::Utc::now(),
                audience: vec![],
                extra_claims: Default::default(),
            })
        }
    }

    /// Echoes the request body and reports the attached identity.
    async fn echo(req: Request<Body>) -> Result<Response<Body>, Infallible> {
        let (parts, body) = req.into_parts();
        let identity = VerifiedIdentity::from_parts(&parts)
            .map(|i| i.scopes.iter().cloned().collect::<Vec<_>>().join(" "))
            .unwrap_or_else(|| "anonymous".into());
        let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
        Ok(([("x-identity", identity)], bytes).into_response())
    }

    fn layer(validator: FakeValidator) -> AuthLayer<FakeValidator> {
        AuthLayer::new(validator, ResourceServerConfig::new(METADATA)).with_operations(
            OperationRegistry::new([OperationDescriptor::new("greet_user", ["usr:read"])]),
        )
    }

    async fn send(layer: &AuthLayer<FakeValidator>, req: Request<Body>) -> Response<Body> {
        layer
            .layer(tower::service_fn(echo))
            .oneshot(req)
            .await
            .unwrap()
    }

    fn tool_call(name: &str) -> String {
        format!(
            r#"{{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{{"name":"{name}","arguments":{{}}}}}}"#
        )
    }

    fn post(path: &str, token: Option<&str>, body: String) -> Request<Body> {
        let mut builder = Request::post(path).header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        builder.body(Body::from(body)).unwrap()
    }

    #[tokio::test]
    async fn discovery_paths_skip_authentication() {
        let validator = FakeValidator::default();
        let layer = layer(validator.clone());
        for path in [
            "/.well-known/oauth-protected-resource",
            "/.well-known/oauth-authorization-server",
        ] {
            let req = Request::get(path)
                .header("authorization", "Bearer garbage")
                .body(Body::empty())
                .unwrap();
            assert_eq!(send(&layer, req).await.status(), StatusCode::OK);
        }
        assert_eq!(validator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn handshake_skips_authentication() {
        let body = r#"{"jsonrpc":"2.0","id":0,"method":"initialize","params":{}}"#.to_string();
        let response = send(&layer(FakeValidator::default()), post("/", None, body.clone())).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-identity"], "anonymous");

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(bytes, body.as_bytes());
    }

    #[tokio::test]
    async fn handshake_elsewhere_needs_a_token() {
        let body = r#"{"jsonrpc":"2.0","id":0,"method":"initialize"}"#.to_string();
        let response = send(&layer(FakeValidator::default()), post("/other", None, body)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn missing_token_is_challenged() {
        let response = send(
            &layer(FakeValidator::default()),
            post("/", None, tool_call("greet_user")),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let challenge = response.headers()[http::header::WWW_AUTHENTICATE]
            .to_str()
            .unwrap();
        assert!(challenge.contains(METADATA));
    }

    #[tokio::test]
    async fn invalid_and_unverifiable_tokens_look_the_same() {
        let layer = layer(FakeValidator::default());
        for token in ["forged", "down"] {
            let response = send(&layer, post("/", Some(token), tool_call("greet_user"))).await;
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
            let challenge = response.headers()[http::header::WWW_AUTHENTICATE]
                .to_str()
                .unwrap()
                .to_string();
            assert!(challenge.contains("error=\"invalid_token\""));

            let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .unwrap();
            let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
            assert_eq!(body["error"], "invalid_token");
        }
    }

    #[tokio::test]
    async fn sufficient_scope_is_forwarded_with_identity() {
        let body = tool_call("greet_user");
        let response = send(
            &layer(FakeValidator::default()),
            post("/", Some("good-usr:read,usr:write"), body.clone()),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-identity"], "usr:read usr:write");

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(bytes, body.as_bytes());
    }

    #[tokio::test]
    async fn empty_scope_is_forbidden() {
        let response = send(
            &layer(FakeValidator::default()),
            post("/", Some("good-"), tool_call("greet_user")),
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "insufficient_scope");
        assert_eq!(body["scope"], "usr:read");
    }

    #[tokio::test]
    async fn unregistered_tools_pass_through() {
        let response = send(
            &layer(FakeValidator::default()),
            post("/", Some("good-"), tool_call("no_such_tool")),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn other_methods_need_only_a_valid_token() {
        let body = r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#.to_string();
        let response = send(&layer(FakeValidator::default()), post("/", Some("good-"), body)).await;
        assert_eq!(response.status(), StatusCode::OK);

        let req = Request::get("/")
            .header("authorization", "Bearer good-")
            .body(Body::empty())
            .unwrap();
        let response = send(&layer(FakeValidator::default()), req).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let layer = layer(FakeValidator::default()).body_limit(16);
        let response = send(
            &layer,
            post("/", Some("good-usr:read"), tool_call("greet_user")),
        )
        .await;
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
