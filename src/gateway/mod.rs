//! Gateway orchestrator
//!
//! Runs every proxied request through a fixed pipeline and stops at the first
//! failure:
//!
//! 1. Bearer token (401)
//! 2. Path allow-list (400)
//! 3. Query policy (400)
//! 4. Request signature, when required or presented (401)
//! 5. Rate limits, per IP then per client (429)
//! 6. Forward upstream (upstream status, 502, 504)

use crate::auth::{self, LruReplayCache, SignatureVerifier};
use crate::clock::SharedClock;
use crate::config::Config;
use crate::constants::{DEFAULT_CLIENT_ID, HEADER_PROXY_CLIENT_ID, HEADER_PROXY_SIGNATURE};
use crate::http::AppError;
use crate::policy::{self, Endpoint};
use crate::proxy::UpstreamForwarder;
use crate::ratelimit::{CoordinatedRateLimiter, MemoryRateLimiter, RateLimiter};
use crate::telemetry::RequestTimer;
use crate::{GatewayError, Result};
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, Method, Uri};
use axum::response::Response;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

const HEADER_CF_CONNECTING_IP: &str = "cf-connecting-ip";
const HEADER_X_FORWARDED_FOR: &str = "x-forwarded-for";

/// The proxy pipeline and its collaborators
pub struct Gateway {
    proxy_token: String,
    proxy_prefix: String,
    require_signing: bool,
    trust_proxy: bool,
    ip_limit: u32,
    client_limit: u32,
    verifier: SignatureVerifier,
    limiter: Arc<dyn RateLimiter>,
    forwarder: UpstreamForwarder,
}

impl Gateway {
    /// Build the gateway from configuration, choosing the rate limit backend
    pub fn from_config(config: &Config, clock: SharedClock) -> Result<Self> {
        let limiter: Arc<dyn RateLimiter> = match config.counter_service_url {
            Some(ref url) => Arc::new(CoordinatedRateLimiter::new(
                url.clone(),
                config.counter_timeout_ms,
            )?),
            None => Arc::new(MemoryRateLimiter::new(config.cache_capacity, clock.clone())),
        };
        Self::with_limiter(config, clock, limiter)
    }

    /// Build the gateway around an explicit rate limiter
    pub fn with_limiter(
        config: &Config,
        clock: SharedClock,
        limiter: Arc<dyn RateLimiter>,
    ) -> Result<Self> {
        let replay = Arc::new(LruReplayCache::new(config.cache_capacity));
        let verifier = SignatureVerifier::new(
            config.signing_secret.clone(),
            config.allowed_client_id.clone(),
            replay,
            clock,
        )
        .with_legacy_signatures(config.allow_legacy_signatures);

        tracing::info!(
            backend = limiter.backend(),
            ip_limit = config.ip_rate_limit(),
            client_limit = config.client_rate_limit(),
            require_signing = config.require_signing,
            "Gateway configured"
        );

        Ok(Self {
            proxy_token: config.proxy_token.clone(),
            proxy_prefix: config.proxy_prefix.clone(),
            require_signing: config.require_signing,
            trust_proxy: config.trust_proxy,
            ip_limit: config.ip_rate_limit(),
            client_limit: config.client_rate_limit(),
            verifier,
            limiter,
            forwarder: UpstreamForwarder::new(&config.upstream)?,
        })
    }

    pub fn proxy_prefix(&self) -> &str {
        &self.proxy_prefix
    }

    /// Run one request through the pipeline
    pub async fn handle(
        &self,
        method: &Method,
        uri: &Uri,
        headers: &HeaderMap,
        peer: Option<IpAddr>,
    ) -> Result<Response> {
        let mut timer = RequestTimer::start("unknown");
        let result = self.run_pipeline(method, uri, headers, peer, &mut timer).await;

        let outcome = match &result {
            Ok(_) => "forwarded",
            Err(GatewayError::Unauthorized(_)) => "unauthorized",
            Err(GatewayError::Validation(_)) => "bad_request",
            Err(GatewayError::RateLimited(_)) => "rate_limited",
            Err(_) => "upstream_error",
        };
        timer.finish(outcome);
        result
    }

    async fn run_pipeline(
        &self,
        method: &Method,
        uri: &Uri,
        headers: &HeaderMap,
        peer: Option<IpAddr>,
        timer: &mut RequestTimer,
    ) -> Result<Response> {
        if !auth::authenticate(headers, &self.proxy_token) {
            return Err(GatewayError::unauthorized("Unauthorized"));
        }

        let endpoint: Endpoint = policy::authorize_path(uri.path(), &self.proxy_prefix)?;
        timer.set_endpoint(endpoint.as_str());

        let params: Vec<(String, String)> =
            url::form_urlencoded::parse(uri.query().unwrap_or("").as_bytes())
                .into_owned()
                .collect();
        policy::validate_query(endpoint, &params)?;

        if self.signature_required(headers) {
            let path_and_query = uri
                .path_and_query()
                .map(|pq| pq.as_str())
                .unwrap_or_else(|| uri.path());
            if !self.verifier.verify(headers, method.as_str(), path_and_query) {
                return Err(GatewayError::unauthorized("Invalid signature"));
            }
        }

        let ip_key = format!(
            "ip:{}",
            client_ip(headers, peer, self.trust_proxy)
                .map(|ip| ip.to_string())
                .unwrap_or_else(|| "unknown".to_string())
        );
        if !self.limiter.check_and_consume(&ip_key, self.ip_limit).await {
            crate::telemetry::record_rate_limited("ip", self.limiter.backend());
            return Err(GatewayError::RateLimited("ip".to_string()));
        }

        let client_key = format!("client:{}", client_id(headers));
        if !self
            .limiter
            .check_and_consume(&client_key, self.client_limit)
            .await
        {
            crate::telemetry::record_rate_limited("client", self.limiter.backend());
            return Err(GatewayError::RateLimited("client".to_string()));
        }

        self.forwarder.forward(endpoint, &params).await
    }

    /// Signatures are checked when required, or whenever one is presented and a secret is set
    fn signature_required(&self, headers: &HeaderMap) -> bool {
        self.require_signing
            || (self.verifier.has_secret() && headers.contains_key(HEADER_PROXY_SIGNATURE))
    }
}

/// Caller identity used for the per-client limit
pub fn client_id(headers: &HeaderMap) -> &str {
    headers
        .get(HEADER_PROXY_CLIENT_ID)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .unwrap_or(DEFAULT_CLIENT_ID)
}

/// Caller address: the socket peer, or the edge-supplied header when behind a trusted proxy
pub fn client_ip(headers: &HeaderMap, peer: Option<IpAddr>, trust_proxy: bool) -> Option<IpAddr> {
    if trust_proxy {
        let forwarded = headers
            .get(HEADER_CF_CONNECTING_IP)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<IpAddr>().ok())
            .or_else(|| {
                headers
                    .get(HEADER_X_FORWARDED_FOR)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.split(',').next())
                    .and_then(|v| v.trim().parse::<IpAddr>().ok())
            });
        if forwarded.is_some() {
            return forwarded;
        }
    }
    peer
}

/// Axum handler for `GET <prefix>/{*endpoint}`
pub async fn proxy_handler(
    State(gateway): State<Arc<Gateway>>,
    request: Request,
) -> std::result::Result<Response, AppError> {
    // The body is never forwarded
    let (parts, _body) = request.into_parts();
    let peer = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());

    let response = gateway
        .handle(&parts.method, &parts.uri, &parts.headers, peer)
        .await?;
    Ok(response)
}
