//! Signed OAuth state tokens
//!
//! The caller's original authorization request rides through the identity
//! provider inside the `state` parameter, so no server-side session is needed.
//! Wire form: `base64url(json) "." base64url(hmac_sha256(secret, base64url(json)))`.

use super::hmac_sha256;
use crate::constants::{OAUTH_STATE_MAX_AGE_SECS, SIGNATURE_MAX_SKEW_SECS};
use crate::{GatewayError, Result};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

/// Authorization request as received on `/authorize`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    /// The caller's own opaque state, returned to it unchanged
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatePayload {
    issued_at: i64,
    auth_request: AuthorizationRequest,
}

/// A verified state token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedOAuthState {
    pub issued_at_secs: i64,
    pub original_auth_request: AuthorizationRequest,
    pub signature: String,
}

/// Issue a state token for `request` at `now_secs`
pub fn sign_state(secret: &str, request: &AuthorizationRequest, now_secs: i64) -> Result<String> {
    if secret.is_empty() {
        return Err(GatewayError::config("OAuth state secret is not configured"));
    }

    let payload = StatePayload {
        issued_at: now_secs,
        auth_request: request.clone(),
    };
    let encoded = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&payload)?);
    let signature = URL_SAFE_NO_PAD.encode(hmac_sha256(secret.as_bytes(), encoded.as_bytes()));

    Ok(format!("{}.{}", encoded, signature))
}

/// Verify a state token's signature and age
pub fn verify_state(secret: &str, token: &str, now_secs: i64) -> Result<SignedOAuthState> {
    if secret.is_empty() {
        return Err(GatewayError::oauth("OAuth state secret is not configured"));
    }

    let (encoded, signature) = token
        .split_once('.')
        .ok_or_else(|| GatewayError::oauth("Malformed state"))?;

    let expected = URL_SAFE_NO_PAD.encode(hmac_sha256(secret.as_bytes(), encoded.as_bytes()));
    if !bool::from(expected.as_bytes().ct_eq(signature.as_bytes())) {
        return Err(GatewayError::oauth("Invalid state signature"));
    }

    let raw = URL_SAFE_NO_PAD
        .decode(encoded)
        .map_err(|_| GatewayError::oauth("Malformed state"))?;
    let payload: StatePayload =
        serde_json::from_slice(&raw).map_err(|_| GatewayError::oauth("Malformed state"))?;

    let age = now_secs - payload.issued_at;
    if age > OAUTH_STATE_MAX_AGE_SECS {
        return Err(GatewayError::oauth("State expired"));
    }
    if age < -SIGNATURE_MAX_SKEW_SECS {
        return Err(GatewayError::oauth("State issued in the future"));
    }

    Ok(SignedOAuthState {
        issued_at_secs: payload.issued_at,
        original_auth_request: payload.auth_request,
        signature: signature.to_string(),
    })
}
