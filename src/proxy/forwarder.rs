//! Upstream forwarder
//!
//! Builds the outbound request from the caller's query, injects the upstream
//! credential and streams the response back. The assembled URL carries the
//! secret, so it only ever reaches logs through [`redact_url`].

use crate::config::UpstreamConfig;
use crate::constants::{CACHE_CONTROL_NO_STORE, CONTENT_TYPE_JSON, UPSTREAM_KEY_PARAM};
use crate::error::NetworkError;
use crate::policy::Endpoint;
use crate::utils::redact_url;
use crate::{GatewayError, Result};
use axum::body::Body;
use axum::http::{HeaderValue, header};
use axum::response::Response;
use std::time::{Duration, Instant};
use url::Url;

/// Forwards allow-listed requests to the weather provider
pub struct UpstreamForwarder {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl UpstreamForwarder {
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| GatewayError::config(format!("Failed to build upstream client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    /// Outbound URL: caller parameters verbatim, caller `key` replaced by the secret
    pub fn build_url(&self, endpoint: Endpoint, params: &[(String, String)]) -> Result<Url> {
        let mut url = Url::parse(&format!("{}/{}", self.base_url, endpoint.as_str()))
            .map_err(|e| GatewayError::Network(NetworkError::InvalidUrl(e.to_string())))?;

        {
            let mut query = url.query_pairs_mut();
            for (name, value) in params {
                if !name.eq_ignore_ascii_case(UPSTREAM_KEY_PARAM) {
                    query.append_pair(name, value);
                }
            }
            query.append_pair(UPSTREAM_KEY_PARAM, &self.api_key);
        }

        Ok(url)
    }

    /// Forward one GET and stream the upstream response back
    ///
    /// The upstream status is passed through. Dropping the returned future
    /// cancels the outbound call.
    pub async fn forward(
        &self,
        endpoint: Endpoint,
        params: &[(String, String)],
    ) -> Result<Response> {
        let url = self.build_url(endpoint, params)?;
        let started = Instant::now();

        let upstream = self
            .client
            .get(url.clone())
            .header(header::ACCEPT, CONTENT_TYPE_JSON)
            .send()
            .await
            .map_err(|e| {
                let err = NetworkError::from(e);
                tracing::warn!(
                    url = %redact_url(url.as_str()),
                    error = %err,
                    "Upstream request failed"
                );
                GatewayError::Network(err)
            })?;

        let status = upstream.status();
        crate::telemetry::record_upstream(
            endpoint.as_str(),
            status.as_u16(),
            started.elapsed().as_secs_f64(),
        );
        tracing::debug!(endpoint = %endpoint, status = status.as_u16(), "Upstream responded");

        let content_type = upstream
            .headers()
            .get(header::CONTENT_TYPE)
            .cloned()
            .unwrap_or_else(|| HeaderValue::from_static(CONTENT_TYPE_JSON));

        let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
        *response.status_mut() = status;
        let headers = response.headers_mut();
        headers.insert(header::CONTENT_TYPE, content_type);
        headers.insert(
            header::CACHE_CONTROL,
            HeaderValue::from_static(CACHE_CONTROL_NO_STORE),
        );

        Ok(response)
    }
}
