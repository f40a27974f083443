//! Typed client for the gateway's weather endpoints

use super::model::*;
use crate::auth::RequestSigner;
use crate::policy::Endpoint;
use crate::utils::redact_url;
use crate::{GatewayError, Result};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;

/// Calls the gateway with the proxy token and, when configured, signed headers
pub struct WeatherClient {
    http: reqwest::Client,
    base_url: String,
    proxy_token: String,
    signer: Option<RequestSigner>,
}

impl WeatherClient {
    /// # Arguments
    /// * `base_url` - Gateway URL including the proxy prefix,
    ///   e.g. `http://127.0.0.1:8787/weatherapi`
    pub fn new(
        base_url: impl Into<String>,
        proxy_token: impl Into<String>,
        timeout_ms: u64,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|e| GatewayError::config(format!("Failed to build weather client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            proxy_token: proxy_token.into(),
            signer: None,
        })
    }

    /// Sign every request with `signer`
    pub fn with_signer(mut self, signer: RequestSigner) -> Self {
        self.signer = Some(signer);
        self
    }

    pub async fn current(&self, q: &str) -> Result<CurrentResponse> {
        self.get(Endpoint::Current, &[("q", q), ("aqi", "yes")]).await
    }

    pub async fn forecast(&self, q: &str, days: u8) -> Result<ForecastResponse> {
        let days = days.to_string();
        self.get(Endpoint::Forecast, &[("q", q), ("days", &days)])
            .await
    }

    pub async fn astronomy(&self, q: &str, date: &str) -> Result<AstronomyResponse> {
        self.get(Endpoint::Astronomy, &[("q", q), ("dt", date)])
            .await
    }

    pub async fn history(&self, q: &str, date: &str) -> Result<ForecastResponse> {
        self.get(Endpoint::History, &[("q", q), ("dt", date)]).await
    }

    pub async fn future(&self, q: &str, date: &str) -> Result<ForecastResponse> {
        self.get(Endpoint::Future, &[("q", q), ("dt", date)]).await
    }

    pub async fn current_summary(&self, q: &str) -> Result<CurrentSummary> {
        Ok(CurrentSummary::from(&self.current(q).await?))
    }

    pub async fn forecast_summary(&self, q: &str, days: u8) -> Result<ForecastSummary> {
        Ok(ForecastSummary::from(&self.forecast(q, days).await?))
    }

    /// Gateway URL for `endpoint` with `params` encoded as the query
    pub fn endpoint_url(&self, endpoint: Endpoint, params: &[(&str, &str)]) -> Result<Url> {
        let mut url = Url::parse(&format!("{}/{}", self.base_url, endpoint.as_str()))
            .map_err(|e| GatewayError::config(format!("Invalid gateway URL: {}", e)))?;
        if !params.is_empty() {
            url.query_pairs_mut().extend_pairs(params);
        }
        Ok(url)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        endpoint: Endpoint,
        params: &[(&str, &str)],
    ) -> Result<T> {
        let url = self.endpoint_url(endpoint, params)?;

        let mut request = self
            .http
            .get(url.clone())
            .bearer_auth(&self.proxy_token)
            .header(reqwest::header::ACCEPT, "application/json");

        if let Some(ref signer) = self.signer {
            let path_and_query = match url.query() {
                Some(query) => format!("{}?{}", url.path(), query),
                None => url.path().to_string(),
            };
            for (name, value) in signer.sign("GET", &path_and_query).headers() {
                request = request.header(name, value);
            }
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<T>().await?);
        }

        let body = response.text().await.unwrap_or_default();
        tracing::debug!(
            url = %redact_url(url.as_str()),
            status = status.as_u16(),
            "Weather request failed"
        );

        Err(match status {
            StatusCode::UNAUTHORIZED => GatewayError::unauthorized(body),
            StatusCode::TOO_MANY_REQUESTS => GatewayError::RateLimited(endpoint.to_string()),
            StatusCode::BAD_REQUEST => {
                let message = serde_json::from_str::<ErrorResponse>(&body)
                    .map(|e| e.error.message)
                    .unwrap_or(body);
                GatewayError::validation(message)
            }
            other => GatewayError::Upstream {
                status: other.as_u16(),
            },
        })
    }
}
