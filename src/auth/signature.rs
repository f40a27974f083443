//! Signed request verification
//!
//! A signed request carries four headers:
//!
//! | Header              | Value                                   |
//! |---------------------|-----------------------------------------|
//! | `X-Proxy-Timestamp` | Unix seconds                            |
//! | `X-Proxy-Nonce`     | Random single-use string                |
//! | `X-Proxy-Signature` | Unpadded base64url HMAC-SHA256          |
//! | `X-Proxy-Client-Id` | Optional client identity (`default`)    |
//!
//! The signature covers `ts.nonce.client.METHOD.path_and_query`. The older
//! `ts.METHOD.path_and_query` form carries no nonce and so gets no replay
//! protection; it is only accepted when explicitly enabled.

use super::hmac_sha256;
use super::nonce::{NonceRecord, ReplayCache};
use crate::clock::SharedClock;
use crate::constants::{
    DEFAULT_CLIENT_ID, HEADER_PROXY_CLIENT_ID, HEADER_PROXY_NONCE, HEADER_PROXY_SIGNATURE,
    HEADER_PROXY_TIMESTAMP, NONCE_TTL_SECS, SIGNATURE_MAX_SKEW_SECS,
};
use axum::http::HeaderMap;
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use std::sync::Arc;
use subtle::ConstantTimeEq;

/// Canonical payload for nonce-carrying signatures
pub fn canonical_payload(
    timestamp_secs: i64,
    nonce: &str,
    client_id: &str,
    method: &str,
    path_and_query: &str,
) -> String {
    format!(
        "{}.{}.{}.{}.{}",
        timestamp_secs,
        nonce,
        client_id,
        method.to_ascii_uppercase(),
        path_and_query
    )
}

/// Canonical payload for legacy signatures without a nonce
pub fn legacy_payload(timestamp_secs: i64, method: &str, path_and_query: &str) -> String {
    format!(
        "{}.{}.{}",
        timestamp_secs,
        method.to_ascii_uppercase(),
        path_and_query
    )
}

/// Unpadded base64url HMAC-SHA256 of `payload`
pub fn sign_payload(secret: &str, payload: &str) -> String {
    URL_SAFE_NO_PAD.encode(hmac_sha256(secret.as_bytes(), payload.as_bytes()))
}

/// Signature headers of one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedRequestEnvelope {
    pub timestamp_secs: i64,
    /// Absent only for legacy signatures
    pub nonce: Option<String>,
    pub client_id: String,
    pub signature: String,
}

impl SignedRequestEnvelope {
    /// Header name/value pairs to attach to the outgoing request
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = vec![
            (HEADER_PROXY_TIMESTAMP, self.timestamp_secs.to_string()),
            (HEADER_PROXY_SIGNATURE, self.signature.clone()),
            (HEADER_PROXY_CLIENT_ID, self.client_id.clone()),
        ];
        if let Some(ref nonce) = self.nonce {
            headers.push((HEADER_PROXY_NONCE, nonce.clone()));
        }
        headers
    }

    /// Parse the envelope from request headers
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, SignatureRejection> {
        let timestamp = header_str(headers, HEADER_PROXY_TIMESTAMP)
            .ok_or(SignatureRejection::MissingHeader(HEADER_PROXY_TIMESTAMP))?;
        let signature = header_str(headers, HEADER_PROXY_SIGNATURE)
            .ok_or(SignatureRejection::MissingHeader(HEADER_PROXY_SIGNATURE))?;
        let timestamp_secs = timestamp
            .trim()
            .parse::<i64>()
            .map_err(|_| SignatureRejection::BadTimestamp)?;
        let nonce = header_str(headers, HEADER_PROXY_NONCE).map(str::to_string);
        let client_id = header_str(headers, HEADER_PROXY_CLIENT_ID)
            .unwrap_or(DEFAULT_CLIENT_ID)
            .to_string();

        Ok(Self {
            timestamp_secs,
            nonce,
            client_id,
            signature: signature.to_string(),
        })
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
}

/// Why a signed request was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureRejection {
    MissingSecret,
    MissingHeader(&'static str),
    BadTimestamp,
    Stale,
    Replayed,
    ClientNotAllowed,
    LegacyDisabled,
    Mismatch,
}

impl SignatureRejection {
    /// Short reason for logs and metrics
    pub fn reason(&self) -> &'static str {
        match self {
            SignatureRejection::MissingSecret => "missing_secret",
            SignatureRejection::MissingHeader(_) => "missing_header",
            SignatureRejection::BadTimestamp => "bad_timestamp",
            SignatureRejection::Stale => "stale",
            SignatureRejection::Replayed => "replayed",
            SignatureRejection::ClientNotAllowed => "client_not_allowed",
            SignatureRejection::LegacyDisabled => "legacy_disabled",
            SignatureRejection::Mismatch => "mismatch",
        }
    }
}

/// Verifies signed request envelopes
pub struct SignatureVerifier {
    secret: Option<String>,
    allowed_client_id: Option<String>,
    allow_legacy: bool,
    replay: Arc<dyn ReplayCache>,
    clock: SharedClock,
}

impl SignatureVerifier {
    pub fn new(
        secret: Option<String>,
        allowed_client_id: Option<String>,
        replay: Arc<dyn ReplayCache>,
        clock: SharedClock,
    ) -> Self {
        Self {
            secret: secret.filter(|s| !s.is_empty()),
            allowed_client_id: allowed_client_id.filter(|c| !c.is_empty()),
            allow_legacy: false,
            replay,
            clock,
        }
    }

    /// Accept nonce-less `ts.METHOD.path` signatures
    pub fn with_legacy_signatures(mut self, allow: bool) -> Self {
        self.allow_legacy = allow;
        self
    }

    pub fn has_secret(&self) -> bool {
        self.secret.is_some()
    }

    /// True if the request carries a valid, fresh, unreplayed signature
    pub fn verify(&self, headers: &HeaderMap, method: &str, path_and_query: &str) -> bool {
        match self.check(headers, method, path_and_query) {
            Ok(envelope) => {
                tracing::debug!(client_id = %envelope.client_id, "Signature verified");
                true
            }
            Err(rejection) => {
                tracing::debug!(reason = rejection.reason(), "Signature rejected");
                crate::telemetry::record_signature_rejection(rejection.reason());
                false
            }
        }
    }

    /// Verify and return the accepted envelope, or why it was rejected
    pub fn check(
        &self,
        headers: &HeaderMap,
        method: &str,
        path_and_query: &str,
    ) -> Result<SignedRequestEnvelope, SignatureRejection> {
        let now = self.clock.now_secs();
        self.replay.sweep_expired(now);

        let secret = self
            .secret
            .as_deref()
            .ok_or(SignatureRejection::MissingSecret)?;
        let envelope = SignedRequestEnvelope::from_headers(headers)?;

        if now.saturating_sub(envelope.timestamp_secs).unsigned_abs()
            > SIGNATURE_MAX_SKEW_SECS.unsigned_abs()
        {
            return Err(SignatureRejection::Stale);
        }

        let composite = envelope
            .nonce
            .as_deref()
            .map(|nonce| NonceRecord::composite_key(&envelope.client_id, nonce));
        if let Some(ref key) = composite
            && self.replay.get(key, now).is_some()
        {
            return Err(SignatureRejection::Replayed);
        }

        if let Some(ref allowed) = self.allowed_client_id
            && allowed != &envelope.client_id
        {
            return Err(SignatureRejection::ClientNotAllowed);
        }

        let payload = match envelope.nonce.as_deref() {
            Some(nonce) => canonical_payload(
                envelope.timestamp_secs,
                nonce,
                &envelope.client_id,
                method,
                path_and_query,
            ),
            None if self.allow_legacy => {
                legacy_payload(envelope.timestamp_secs, method, path_and_query)
            }
            None => return Err(SignatureRejection::LegacyDisabled),
        };

        let expected = sign_payload(secret, &payload);
        if !bool::from(expected.as_bytes().ct_eq(envelope.signature.as_bytes())) {
            return Err(SignatureRejection::Mismatch);
        }

        if let Some(key) = composite {
            let record = NonceRecord {
                key,
                expires_at_secs: now + NONCE_TTL_SECS,
            };
            // A concurrent request may have claimed the nonce since the lookup
            if !self.replay.put(record, now) {
                return Err(SignatureRejection::Replayed);
            }
        }

        Ok(envelope)
    }
}

/// Client-side producer of signed request envelopes
pub struct RequestSigner {
    secret: String,
    client_id: String,
    clock: SharedClock,
}

impl RequestSigner {
    pub fn new(secret: impl Into<String>, client_id: Option<String>) -> Self {
        Self::with_clock(secret, client_id, crate::clock::system_clock())
    }

    pub fn with_clock(
        secret: impl Into<String>,
        client_id: Option<String>,
        clock: SharedClock,
    ) -> Self {
        Self {
            secret: secret.into(),
            client_id: client_id.unwrap_or_else(|| DEFAULT_CLIENT_ID.to_string()),
            clock,
        }
    }

    /// Sign a request with a fresh random nonce
    pub fn sign(&self, method: &str, path_and_query: &str) -> SignedRequestEnvelope {
        let nonce = uuid::Uuid::new_v4().simple().to_string();
        self.sign_with_nonce(method, path_and_query, &nonce)
    }

    pub fn sign_with_nonce(
        &self,
        method: &str,
        path_and_query: &str,
        nonce: &str,
    ) -> SignedRequestEnvelope {
        let timestamp_secs = self.clock.now_secs();
        let payload = canonical_payload(
            timestamp_secs,
            nonce,
            &self.client_id,
            method,
            path_and_query,
        );

        SignedRequestEnvelope {
            timestamp_secs,
            nonce: Some(nonce.to_string()),
            client_id: self.client_id.clone(),
            signature: sign_payload(&self.secret, &payload),
        }
    }
}
