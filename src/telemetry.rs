//! Telemetry module for the weather gateway
//!
//! Prometheus metrics, registered lazily and served on `/metrics`.

use crate::{GatewayError, Result};
use once_cell::sync::Lazy;
use prometheus::{
    CounterVec, Encoder, HistogramOpts, HistogramVec, IntCounter, TextEncoder,
    register_counter_vec, register_histogram_vec, register_int_counter,
};

/// Proxied requests by endpoint and pipeline outcome
static GATEWAY_REQUESTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "gateway_requests_total",
        "Total number of proxied requests by outcome",
        &["endpoint", "outcome"]
    )
    .unwrap()
});

/// End-to-end proxy request duration histogram
static GATEWAY_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        HistogramOpts::new(
            "gateway_request_duration_seconds",
            "Duration of proxied requests in seconds"
        ),
        &["endpoint"]
    )
    .unwrap()
});

/// Upstream responses by status code
static UPSTREAM_REQUESTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "gateway_upstream_requests_total",
        "Total number of upstream responses",
        &["endpoint", "code"]
    )
    .unwrap()
});

/// Upstream latency histogram
static UPSTREAM_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        HistogramOpts::new(
            "gateway_upstream_duration_seconds",
            "Duration of upstream requests in seconds"
        ),
        &["endpoint"]
    )
    .unwrap()
});

/// Rejected signatures by reason
static SIGNATURE_REJECTIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "gateway_signature_rejections_total",
        "Total number of rejected request signatures",
        &["reason"]
    )
    .unwrap()
});

/// Rate limit denials by key scope and backend
static RATE_LIMITED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "gateway_rate_limited_total",
        "Total number of rate limited requests",
        &["scope", "backend"]
    )
    .unwrap()
});

/// Failed calls to the coordinated counter service
static COUNTER_FAILURES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "gateway_counter_failures_total",
        "Total number of failed counter service checks"
    )
    .unwrap()
});

/// Completed OAuth logins
static OAUTH_LOGINS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "gateway_oauth_logins_total",
        "Total number of completed OAuth logins"
    )
    .unwrap()
});

/// Record a proxied request outcome
pub fn record_request(endpoint: &str, outcome: &str) {
    GATEWAY_REQUESTS_TOTAL
        .with_label_values(&[endpoint, outcome])
        .inc();
}

/// Record proxied request duration
pub fn record_request_duration(endpoint: &str, duration_secs: f64) {
    GATEWAY_REQUEST_DURATION
        .with_label_values(&[endpoint])
        .observe(duration_secs);
}

/// Record an upstream response
pub fn record_upstream(endpoint: &str, status_code: u16, duration_secs: f64) {
    UPSTREAM_REQUESTS_TOTAL
        .with_label_values(&[endpoint, &status_code.to_string()])
        .inc();
    UPSTREAM_DURATION
        .with_label_values(&[endpoint])
        .observe(duration_secs);
}

pub fn record_signature_rejection(reason: &str) {
    SIGNATURE_REJECTIONS_TOTAL
        .with_label_values(&[reason])
        .inc();
}

pub fn record_rate_limited(scope: &str, backend: &str) {
    RATE_LIMITED_TOTAL.with_label_values(&[scope, backend]).inc();
}

pub fn record_counter_failure() {
    COUNTER_FAILURES_TOTAL.inc();
}

pub fn record_oauth_login() {
    OAUTH_LOGINS_TOTAL.inc();
}

/// Get Prometheus metrics in text format
pub fn get_metrics() -> Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| GatewayError::config(format!("Failed to encode metrics: {}", e)))?;

    String::from_utf8(buffer)
        .map_err(|e| GatewayError::config(format!("Failed to convert metrics to UTF-8: {}", e)))
}

/// Times one proxied request and records its outcome
pub struct RequestTimer {
    endpoint: String,
    started: std::time::Instant,
}

impl RequestTimer {
    pub fn start(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            started: std::time::Instant::now(),
        }
    }

    /// Endpoint label once the path has been resolved
    pub fn set_endpoint(&mut self, endpoint: impl Into<String>) {
        self.endpoint = endpoint.into();
    }

    /// Record completion with the given outcome
    pub fn finish(self, outcome: &str) {
        record_request(&self.endpoint, outcome);
        record_request_duration(&self.endpoint, self.started.elapsed().as_secs_f64());
    }
}
