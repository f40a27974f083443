//! Error types for the weather gateway
//!
//! This module provides the error hierarchy using thiserror.
//! All errors can be converted to GatewayError for unified error handling.

use thiserror::Error;

/// Main error type for gateway operations
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Rate limit exceeded for {0}")]
    RateLimited(String),

    #[error("Upstream returned status {status}")]
    Upstream { status: u16 },

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("OAuth error: {0}")]
    OAuth(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Storage-specific errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Connection error: {0}")]
    Connection(String),
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        StorageError::Database(err.to_string())
    }
}

impl From<sqlx::Error> for GatewayError {
    fn from(err: sqlx::Error) -> Self {
        GatewayError::Storage(StorageError::from(err))
    }
}

/// Network-specific errors
///
/// Messages never carry a full outbound URL; callers redact before wrapping.
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Connection timeout")]
    Timeout,

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl From<reqwest::Error> for NetworkError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return NetworkError::Timeout;
        }
        // reqwest embeds the request URL in its Display output
        NetworkError::Http(err.without_url().to_string())
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        GatewayError::Network(NetworkError::from(err))
    }
}

/// Convenient result type for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;

impl GatewayError {
    /// Create an unauthorized error
    #[inline]
    pub fn unauthorized<S: Into<String>>(msg: S) -> Self {
        GatewayError::Unauthorized(msg.into())
    }

    /// Create a validation error
    #[inline]
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        GatewayError::Validation(msg.into())
    }

    /// Create a config error
    #[inline]
    pub fn config<S: Into<String>>(msg: S) -> Self {
        GatewayError::Config(msg.into())
    }

    /// Create a storage error
    #[inline]
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        GatewayError::Storage(StorageError::Database(msg.into()))
    }

    /// Create an OAuth error
    #[inline]
    pub fn oauth<S: Into<String>>(msg: S) -> Self {
        GatewayError::OAuth(msg.into())
    }

    /// Create a network error
    #[inline]
    pub fn network<S: Into<String>>(msg: S) -> Self {
        GatewayError::Network(NetworkError::Http(msg.into()))
    }
}
