//! Request authentication
//!
//! - **Bearer**: static proxy token check, the first gate on every proxied request
//! - **Signature**: HMAC-signed request envelopes with freshness and replay protection
//! - **Nonce**: bounded replay cache backing the signature verifier
//! - **OAuth state**: HMAC-signed state token carried through the identity provider
//! - **Login**: `/authorize` and `/callback` routes for the OAuth login flow

pub mod bearer;
pub mod login;
pub mod nonce;
pub mod oauth_state;
pub mod signature;

pub use bearer::{authenticate, bearer_token};
pub use login::{OAuthLoginState, create_oauth_login_routes};
pub use nonce::{LruReplayCache, NonceRecord, ReplayCache};
pub use oauth_state::{AuthorizationRequest, SignedOAuthState, sign_state, verify_state};
pub use signature::{
    RequestSigner, SignatureRejection, SignatureVerifier, SignedRequestEnvelope, canonical_payload,
    legacy_payload, sign_payload,
};

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA256 of `message` under `secret`
pub(crate) fn hmac_sha256(secret: &[u8], message: &[u8]) -> Vec<u8> {
    let mut mac = match HmacSha256::new_from_slice(secret) {
        Ok(mac) => mac,
        Err(_) => unreachable!("HMAC-SHA256 accepts keys of any length"),
    };
    mac.update(message);
    mac.finalize().into_bytes().to_vec()
}
