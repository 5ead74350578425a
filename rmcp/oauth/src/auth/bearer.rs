//! Bearer credential extraction.

use http::HeaderMap;

/// Extract the token from `Authorization: Bearer <token>`.
///
/// The scheme is matched case-insensitively. Returns `None` when the header
/// is absent, not ASCII, uses another scheme, or carries an empty token.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(http::header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}
