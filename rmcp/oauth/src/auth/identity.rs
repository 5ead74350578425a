//! The verified caller identity attached to authorized requests.

use axum::extract::{FromRequestParts, OptionalFromRequestParts};
use chrono::{DateTime, Utc};
use http::StatusCode;
use http::request::Parts;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::convert::Infallible;

/// Claims of a bearer token that passed verification.
///
/// Inserted into the request extensions by [`AuthService`](super::AuthService)
/// and dropped with the request. Downstream code reads it from
/// [`Parts`] (rmcp tool handlers) or extracts it directly (axum handlers).
#[derive(Clone, PartialEq)]
pub struct VerifiedIdentity {
    /// The raw bearer token, for forwarding to upstream APIs.
    pub token: String,
    /// OAuth client the token was issued to (`client_id` claim).
    pub client_id: String,
    /// The resource owner (`sub` claim), absent for client-credential tokens.
    pub subject: Option<String>,
    /// Granted scopes, split from the space-delimited `scope` claim.
    pub scopes: BTreeSet<String>,
    pub expires_at: DateTime<Utc>,
    /// Audiences the token was issued for.
    pub audience: Vec<String>,
    /// Claims not mapped to a field above.
    pub extra_claims: Map<String, Value>,
}

impl VerifiedIdentity {
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.contains(scope)
    }

    /// Look up the identity attached to a request by the gate.
    pub fn from_parts(parts: &Parts) -> Option<&Self> {
        parts.extensions.get::<Self>()
    }
}

impl std::fmt::Debug for VerifiedIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerifiedIdentity")
            .field("token", &"[redacted]")
            .field("client_id", &self.client_id)
            .field("subject", &self.subject)
            .field("scopes", &self.scopes)
            .field("expires_at", &self.expires_at)
            .field("audience", &self.audience)
            .field("extra_claims", &self.extra_claims)
            .finish()
    }
}

impl<S> FromRequestParts<S> for VerifiedIdentity
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // Reaching a handler without an identity means the route is not
        // behind the gate.
        VerifiedIdentity::from_parts(parts)
            .cloned()
            .ok_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl<S> OptionalFromRequestParts<S> for VerifiedIdentity
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        Ok(VerifiedIdentity::from_parts(parts).cloned())
    }
}
