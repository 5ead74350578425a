//! JWT bearer token verification.
//!
//! Validates signed access tokens against the authorization server's key
//! set and turns their claims into a [`VerifiedIdentity`].
//!
//! ```rust,ignore
//! use rmcp_oauth::auth::{AuthLayer, jwt::TokenVerifier};
//!
//! let verifier = TokenVerifier::new(keys, "https://auth.example.com", "http://localhost:3002");
//! let identity = verifier.verify(token).await?;
//! ```

use crate::auth::Validator;
use crate::auth::error::VerificationError;
use crate::auth::identity::VerifiedIdentity;
use crate::auth::jwks::KeySetCache;
use chrono::{DateTime, Utc};
use jsonwebtoken::{Validation, decode, decode_header};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::time::Duration;

/// Claims read from the token payload.
#[derive(Debug, Deserialize)]
struct RawClaims {
    sub: Option<String>,
    aud: Option<Audience>,
    scope: Option<String>,
    client_id: Option<String>,
    exp: i64,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Audience {
    Single(String),
    Multiple(Vec<String>),
}

impl Audience {
    fn into_vec(self) -> Vec<String> {
        match self {
            Audience::Single(s) => vec![s],
            Audience::Multiple(v) => v,
        }
    }
}

/// Verifies bearer tokens issued by one authorization server for one
/// resource.
///
/// Issuer and audience are compared as exact strings.
#[derive(Clone)]
pub struct TokenVerifier {
    keys: KeySetCache,
    issuer: String,
    audience: String,
    leeway: Duration,
}

impl TokenVerifier {
    pub fn new(keys: KeySetCache, issuer: impl Into<String>, audience: impl Into<String>) -> Self {
        Self {
            keys,
            issuer: issuer.into(),
            audience: audience.into(),
            leeway: Duration::ZERO,
        }
    }

    /// Clock skew tolerated when checking `exp`. Zero unless set.
    pub fn leeway(mut self, leeway: Duration) -> Self {
        self.leeway = leeway;
        self
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn audience(&self) -> &str {
        &self.audience
    }

    pub async fn verify(&self, token: &str) -> Result<VerifiedIdentity, VerificationError> {
        if token.is_empty() {
            return Err(VerificationError::MalformedToken("empty token".into()));
        }
        if token.split('.').count() != 3 {
            return Err(VerificationError::MalformedToken(
                "expected three dot-separated segments".into(),
            ));
        }

        let header = decode_header(token)?;
        let kid = header
            .kid
            .ok_or_else(|| VerificationError::MalformedToken("missing kid header".into()))?;
        let key = self.keys.get_key(&kid).await?;

        // The key decides the algorithm; the header only has to agree.
        if header.alg != key.algorithm {
            return Err(VerificationError::InvalidSignature);
        }

        let mut validation = Validation::new(key.algorithm);
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        validation.set_required_spec_claims(&["exp", "iss", "aud"]);
        validation.leeway = self.leeway.as_secs();

        let claims = decode::<RawClaims>(token, &key.key, &validation)?.claims;
        // `decode` accepts `exp == now`; a token is only valid strictly before it.
        let leeway = i64::try_from(self.leeway.as_secs()).unwrap_or(i64::MAX);
        if claims.exp <= Utc::now().timestamp().saturating_sub(leeway) {
            return Err(VerificationError::Expired);
        }
        let expires_at = DateTime::<Utc>::from_timestamp(claims.exp, 0)
            .ok_or_else(|| VerificationError::MalformedToken("exp out of range".into()))?;

        Ok(VerifiedIdentity {
            token: token.to_string(),
            client_id: claims.client_id.unwrap_or_default(),
            subject: claims.sub,
            scopes: claims
                .scope
                .map(|s| s.split_whitespace().map(String::from).collect())
                .unwrap_or_default(),
            expires_at,
            audience: claims.aud.map(Audience::into_vec).unwrap_or_default(),
            extra_claims: claims.extra,
        })
    }
}

impl Validator for TokenVerifier {
    async fn validate(&self, token: &str) -> Result<VerifiedIdentity, VerificationError> {
        self.verify(token).await
    }
}
