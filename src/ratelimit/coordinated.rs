//! Coordinated rate limiting over HTTP
//!
//! Each limiter key maps to one named counter on the counter service. The
//! name is the hex SHA-256 of the key so raw IPs and client ids never appear
//! in counter-service URLs or logs.

use super::RateLimiter;
use crate::utils::redact_url;
use crate::{GatewayError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;

/// Body of `POST /{instance}/check`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckRequest {
    pub limit_per_minute: u32,
}

/// Response of `POST /{instance}/check`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResponse {
    pub allowed: bool,
}

/// Counter instance name for a limiter key
pub fn instance_name(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

/// [`RateLimiter`] delegating to the counter service
///
/// Fails closed: any transport error, timeout, non-2xx status or malformed
/// body counts as a denial.
pub struct CoordinatedRateLimiter {
    client: reqwest::Client,
    base_url: String,
}

impl CoordinatedRateLimiter {
    pub fn new(base_url: impl Into<String>, timeout_ms: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| GatewayError::config(format!("Failed to build counter client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn check_url(&self, key: &str) -> String {
        format!("{}/{}/check", self.base_url, instance_name(key))
    }

    async fn try_check(&self, key: &str, limit_per_minute: u32) -> Result<bool> {
        let response = self
            .client
            .post(self.check_url(key))
            .json(&CheckRequest { limit_per_minute })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Upstream {
                status: status.as_u16(),
            });
        }

        let body: CheckResponse = response
            .json()
            .await
            .map_err(|e| {
                GatewayError::network(format!(
                    "Malformed counter response: {}",
                    e.without_url()
                ))
            })?;
        Ok(body.allowed)
    }
}

#[async_trait]
impl RateLimiter for CoordinatedRateLimiter {
    async fn check_and_consume(&self, key: &str, limit_per_minute: u32) -> bool {
        match self.try_check(key, limit_per_minute).await {
            Ok(allowed) => allowed,
            Err(e) => {
                tracing::warn!(
                    url = %redact_url(&self.check_url(key)),
                    error = %e,
                    "Counter service check failed, denying request"
                );
                crate::telemetry::record_counter_failure();
                false
            }
        }
    }

    fn backend(&self) -> &'static str {
        "coordinated"
    }
}
