//! Weather Gateway - edge proxy for a weather API
//!
//! This library provides an HTTP gateway that can be:
//! - Run as a CLI tool (`gateway` binary)
//! - Embedded as an axum [`Router`](axum::Router) in other services
//!
//! # Architecture
//!
//! Every proxied request passes a fixed pipeline before it reaches the
//! upstream provider:
//! - Bearer token authentication
//! - Path allow-list and query policy
//! - HMAC request signatures with timestamp, nonce and replay protection
//! - Per-IP and per-client rate limits (in-memory or coordinated counters)
//! - Forwarding with the upstream credential injected server-side
//!
//! An optional OAuth login flow (`/authorize`, `/callback`) mediates sign-in
//! against an upstream identity provider.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use weather_gateway::config::Config;
//! use weather_gateway::gateway::Gateway;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load()?;
//!     let clock = weather_gateway::clock::system_clock();
//!     let gateway = Arc::new(Gateway::from_config(&config, clock)?);
//!
//!     let app = weather_gateway::http::build_router(gateway, None);
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:8787").await?;
//!     axum::serve(
//!         listener,
//!         app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
//!     )
//!     .await?;
//!     Ok(())
//! }
//! ```

// Core modules
pub mod clock;
pub mod constants;
pub mod error;

// Request pipeline
pub mod auth;
pub mod gateway;
pub mod policy;
pub mod proxy;
pub mod ratelimit;

// Infrastructure
pub mod config;
pub mod telemetry;

// Interface layers
pub mod cli;
pub mod http;

// Typed upstream client
pub mod weather;

// Utilities
pub mod utils;

// Re-exports for convenience
pub use error::{GatewayError, Result};
pub use gateway::Gateway;

/// Initialize logging for the application
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_logging(log: Option<&config::LogConfig>) {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let level = log.and_then(|l| l.level.as_deref()).unwrap_or("info");
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("weather_gateway={},tower_http={}", level, level).into());

    let json = log.map(|l| l.json).unwrap_or(false);
    let registry = tracing_subscriber::registry().with(filter);

    // Ignore the error when a subscriber is already installed (tests, embedding)
    let _ = if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };
}
