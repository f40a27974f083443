//! Bearer token authentication

use axum::http::{HeaderMap, header};
use subtle::ConstantTimeEq;

/// Extract the token from an `Authorization: Bearer <token>` header
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// Check the request's bearer token against the configured proxy token
///
/// An empty configured token never authenticates anyone.
pub fn authenticate(headers: &HeaderMap, token: &str) -> bool {
    if token.is_empty() {
        return false;
    }

    match bearer_token(headers) {
        Some(presented) => presented.as_bytes().ct_eq(token.as_bytes()).into(),
        None => false,
    }
}
