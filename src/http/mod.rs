//! HTTP server for the weather gateway
//!
//! Mounts the proxy under the configured prefix, the optional OAuth login
//! routes, and the system endpoints (`/healthz`, `/metrics`).

use crate::auth::{OAuthLoginState, create_oauth_login_routes};
use crate::clock::SharedClock;
use crate::config::Config;
use crate::constants::CACHE_CONTROL_NO_STORE;
use crate::error::NetworkError;
use crate::gateway::{Gateway, proxy_handler};
use crate::{GatewayError, Result};
use axum::{
    Router,
    extract::Json,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    LatencyUnit,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};

/// Error type for HTTP handlers
///
/// Bodies are short plain text and never carry URLs or secrets.
#[derive(Debug)]
pub struct AppError(GatewayError);

impl AppError {
    /// Status code this error maps to
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            GatewayError::Unauthorized(_) | GatewayError::OAuth(_) => StatusCode::UNAUTHORIZED,
            GatewayError::Validation(_) => StatusCode::BAD_REQUEST,
            GatewayError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::Upstream { status } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            GatewayError::Network(NetworkError::Timeout) => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::Network(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self.0 {
            GatewayError::Unauthorized(msg)
            | GatewayError::Validation(msg)
            | GatewayError::OAuth(msg) => msg.clone(),
            GatewayError::RateLimited(_) => "Too Many Requests".to_string(),
            GatewayError::Network(NetworkError::Timeout) => "Gateway Timeout".to_string(),
            GatewayError::Network(_) | GatewayError::Upstream { .. } => "Bad Gateway".to_string(),
            other => {
                // Log full error details internally
                tracing::error!("Internal error: {:?}", other);
                "Internal Server Error".to_string()
            }
        };

        tracing::debug!(
            status = %status,
            message = %message,
            "HTTP request error response"
        );

        (
            status,
            [
                (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
                (header::CACHE_CONTROL, CACHE_CONTROL_NO_STORE),
            ],
            message,
        )
            .into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<GatewayError>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

/// Start the gateway HTTP server
pub async fn start_server(config: Config, clock: SharedClock) -> Result<()> {
    let http_config = config.http_config();

    let gateway = Arc::new(Gateway::from_config(&config, clock.clone())?);
    let oauth = match config.oauth {
        Some(ref oauth) => Some(Arc::new(OAuthLoginState::new(oauth.clone(), clock)?)),
        None => None,
    };

    let app = build_router(gateway, oauth);

    let addr = format!("{}:{}", http_config.host, http_config.port);
    let socket_addr: SocketAddr = addr
        .parse()
        .map_err(|e| GatewayError::config(format!("Invalid address {}: {}", addr, e)))?;

    tracing::info!("Starting gateway on {}", socket_addr);

    let listener = tokio::net::TcpListener::bind(socket_addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .map_err(|e| GatewayError::config(format!("Server error: {}", e)))?;

    Ok(())
}

/// Build the router with all endpoints
pub fn build_router(gateway: Arc<Gateway>, oauth: Option<Arc<OAuthLoginState>>) -> Router {
    let prefix = gateway.proxy_prefix().to_string();

    // The wildcard never matches an empty remainder, so the prefix root is
    // mounted separately and still runs the pipeline
    let mut router = Router::new()
        .route(&format!("{}/{{*endpoint}}", prefix), get(proxy_handler))
        .route(&format!("{}/", prefix), get(proxy_handler))
        .route(&prefix, get(proxy_handler))
        .with_state(gateway)
        .route("/healthz", get(health_handler))
        .route("/metrics", get(metrics_handler));

    if let Some(oauth) = oauth {
        router = router.merge(create_oauth_login_routes(oauth));
    }

    router.layer(
        ServiceBuilder::new().layer(
            TraceLayer::new_for_http()
                // Request headers carry the proxy token
                .make_span_with(DefaultMakeSpan::new().include_headers(false))
                .on_response(
                    DefaultOnResponse::new()
                        .level(tracing::Level::INFO)
                        .latency_unit(LatencyUnit::Micros),
                ),
        ),
    )
}

async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn metrics_handler() -> std::result::Result<(StatusCode, String), AppError> {
    let metrics = crate::telemetry::get_metrics()?;
    Ok((StatusCode::OK, metrics))
}
