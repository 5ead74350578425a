//! Failure taxonomy for key lookup, token verification and the request gate.

use thiserror::Error;

/// A key set could not be obtained from the authorization server.
///
/// `Clone` so that a single coalesced fetch can hand the same failure to
/// every waiter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyFetchError {
    #[error("key set request failed: {0}")]
    Request(String),

    #[error("key set endpoint returned status {0}")]
    Status(u16),

    #[error("invalid key set document: {0}")]
    Decode(String),

    #[error("key set request timed out")]
    Timeout,
}

/// Outcome of a failed [`KeySetCache::get_key`](super::jwks::KeySetCache::get_key).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyLookupError {
    #[error("no signing key for kid: {kid}")]
    NotFound { kid: String },

    #[error(transparent)]
    FetchFailed(#[from] KeyFetchError),
}

/// Why a bearer token was not accepted.
///
/// Every variant is reported to clients as the same `invalid_token`
/// error; the variant only reaches the logs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerificationError {
    #[error("malformed token: {0}")]
    MalformedToken(String),

    #[error("no signing key for kid: {0}")]
    UnknownKey(String),

    #[error("signature verification failed")]
    InvalidSignature,

    #[error("issuer mismatch")]
    IssuerMismatch,

    #[error("audience mismatch")]
    AudienceMismatch,

    #[error("token expired")]
    Expired,

    #[error("key set unavailable: {0}")]
    KeyFetchFailed(KeyFetchError),
}

impl From<KeyLookupError> for VerificationError {
    fn from(err: KeyLookupError) -> Self {
        match err {
            KeyLookupError::NotFound { kid } => VerificationError::UnknownKey(kid),
            KeyLookupError::FetchFailed(e) => VerificationError::KeyFetchFailed(e),
        }
    }
}

impl From<jsonwebtoken::errors::Error> for VerificationError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                VerificationError::InvalidSignature
            }
            ErrorKind::InvalidIssuer => VerificationError::IssuerMismatch,
            ErrorKind::InvalidAudience => VerificationError::AudienceMismatch,
            ErrorKind::ExpiredSignature => VerificationError::Expired,
            ErrorKind::MissingRequiredClaim(claim) => match claim.as_str() {
                "iss" => VerificationError::IssuerMismatch,
                "aud" => VerificationError::AudienceMismatch,
                _ => VerificationError::MalformedToken(format!("missing {claim} claim")),
            },
            _ => VerificationError::MalformedToken(err.to_string()),
        }
    }
}

/// Rejection produced by the request gate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GateError {
    #[error("missing or malformed Authorization header")]
    MissingToken,

    #[error(transparent)]
    Verification(#[from] VerificationError),

    #[error("insufficient scope for {operation}: missing {}", .missing.join(" "))]
    InsufficientScope {
        operation: String,
        required: Vec<String>,
        missing: Vec<String>,
    },

    #[error("request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },
}

impl GateError {
    /// The OAuth 2.0 error code exposed to the client.
    pub fn error_code(&self) -> &'static str {
        match self {
            GateError::MissingToken => "unauthorized",
            GateError::Verification(_) => "invalid_token",
            GateError::InsufficientScope { .. } => "insufficient_scope",
            GateError::PayloadTooLarge { .. } => "invalid_request",
        }
    }

    pub fn status(&self) -> http::StatusCode {
        match self {
            GateError::MissingToken | GateError::Verification(_) => http::StatusCode::UNAUTHORIZED,
            GateError::InsufficientScope { .. } => http::StatusCode::FORBIDDEN,
            GateError::PayloadTooLarge { .. } => http::StatusCode::PAYLOAD_TOO_LARGE,
        }
    }
}
