//! Configuration management for the weather gateway
//!
//! Loads configuration from `gateway.config.json` (or YAML), then applies
//! `GATEWAY_*` environment overrides and `$env:` references.

use crate::constants::*;
use crate::utils::expand_env_value;
use crate::{GatewayError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;

/// Complete gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Bearer token every proxied request must present (required)
    #[serde(default)]
    pub proxy_token: String,

    /// HMAC secret for signed requests; enables signature mode
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signing_secret: Option<String>,

    /// Reject requests that are not signed
    #[serde(default)]
    pub require_signing: bool,

    /// Only accept signed requests from this client identity
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_client_id: Option<String>,

    /// Accept the nonce-less `ts.METHOD.path` signature format
    #[serde(default)]
    pub allow_legacy_signatures: bool,

    /// Requests per minute per IP (client identities get half)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_requests_per_minute: Option<u32>,

    /// Base URL of the coordinated counter service; absent means in-memory limits
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counter_service_url: Option<String>,

    /// Timeout for coordinated counter calls
    #[serde(default = "default_counter_timeout_ms")]
    pub counter_timeout_ms: u64,

    /// Path prefix the proxy is mounted under
    #[serde(default = "default_proxy_prefix")]
    pub proxy_prefix: String,

    /// Trust `CF-Connecting-IP` / `X-Forwarded-For` for the caller address
    #[serde(default)]
    pub trust_proxy: bool,

    /// Capacity of the in-memory counter map and replay cache
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// Downstream weather provider
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// HTTP server configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http: Option<HttpConfig>,

    /// Coordinated counter service configuration (`serve-counters`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counters: Option<CounterServiceConfig>,

    /// OAuth login against the upstream identity provider
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oauth: Option<OAuthConfig>,

    /// Logging configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log: Option<LogConfig>,
}

/// Downstream weather provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamConfig {
    /// Base URL, endpoint names are appended (e.g. `https://api.weatherapi.com/v1`)
    #[serde(default = "default_upstream_base_url")]
    pub base_url: String,

    /// Secret credential injected as the `key` query parameter
    #[serde(default)]
    pub api_key: String,

    /// Hard timeout for upstream calls
    #[serde(default = "default_upstream_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_upstream_base_url(),
            api_key: String::new(),
            timeout_ms: default_upstream_timeout_ms(),
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind to
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Coordinated counter service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterServiceConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_counter_port")]
    pub port: u16,

    /// SQLite DSN for durable counters
    #[serde(default = "default_counter_dsn")]
    pub dsn: String,

    /// Interval of the background eviction sweep; 0 disables it
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for CounterServiceConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_counter_port(),
            dsn: default_counter_dsn(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

/// OAuth login configuration (upstream identity provider)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthConfig {
    pub client_id: String,

    pub client_secret: String,

    /// Identity provider authorization endpoint
    pub authorize_url: String,

    /// Identity provider token endpoint
    pub token_url: String,

    /// Callback URL registered with the identity provider
    pub redirect_uri: String,

    /// HMAC secret for the signed state token
    pub state_secret: String,

    #[serde(default)]
    pub scopes: Vec<String>,

    /// Timeout for the code exchange
    #[serde(default = "default_upstream_timeout_ms")]
    pub timeout_ms: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (debug, info, warn, error)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,

    /// Emit JSON log lines
    #[serde(default)]
    pub json: bool,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    DEFAULT_HTTP_PORT
}

fn default_counter_port() -> u16 {
    DEFAULT_COUNTER_PORT
}

fn default_counter_dsn() -> String {
    DEFAULT_COUNTER_DSN.to_string()
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_counter_timeout_ms() -> u64 {
    DEFAULT_COUNTER_TIMEOUT_MS
}

fn default_proxy_prefix() -> String {
    DEFAULT_PROXY_PREFIX.to_string()
}

fn default_cache_capacity() -> usize {
    DEFAULT_CACHE_CAPACITY
}

fn default_upstream_base_url() -> String {
    DEFAULT_UPSTREAM_BASE_URL.to_string()
}

fn default_upstream_timeout_ms() -> u64 {
    DEFAULT_UPSTREAM_TIMEOUT_MS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            proxy_token: String::new(),
            signing_secret: None,
            require_signing: false,
            allowed_client_id: None,
            allow_legacy_signatures: false,
            max_requests_per_minute: None,
            counter_service_url: None,
            counter_timeout_ms: default_counter_timeout_ms(),
            proxy_prefix: default_proxy_prefix(),
            trust_proxy: false,
            cache_capacity: default_cache_capacity(),
            upstream: UpstreamConfig::default(),
            http: Some(HttpConfig::default()),
            counters: None,
            oauth: None,
            log: Some(LogConfig {
                level: Some("info".to_string()),
                json: false,
            }),
        }
    }
}

impl Config {
    /// Load configuration from the default file, env overrides applied
    pub fn load() -> Result<Self> {
        Self::load_and_resolve(CONFIG_FILE_NAME)
    }

    /// Load configuration from specific path
    ///
    /// Supports both JSON and YAML formats based on file extension:
    /// - `.json` files are parsed as JSON
    /// - `.yaml` or `.yml` files are parsed as YAML
    /// - Files without extension default to JSON parsing
    ///
    /// A missing file yields the default configuration. The result is not
    /// validated; see [`Config::load_and_resolve`].
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;

        let config: Config = match path.extension().and_then(|s| s.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content).map_err(|e| {
                GatewayError::config(format!("Failed to parse YAML config: {}", e))
            })?,
            _ => serde_json::from_str(&content).map_err(|e| {
                GatewayError::config(format!("Failed to parse JSON config: {}", e))
            })?,
        };

        Ok(config)
    }

    /// Load from file, apply `GATEWAY_*` overrides and `$env:` references, then validate
    pub fn load_and_resolve<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load_from_path(path)?;
        config.apply_env_overrides();
        config.expand_env_references();
        config.validate()?;
        Ok(config)
    }

    /// Override fields from `GATEWAY_*` environment variables
    pub fn apply_env_overrides(&mut self) {
        if let Some(token) = non_empty_env(ENV_PROXY_TOKEN) {
            self.proxy_token = token;
        }
        if let Some(secret) = non_empty_env(ENV_SIGNING_SECRET) {
            self.signing_secret = Some(secret);
        }
        if let Some(flag) = non_empty_env(ENV_REQUIRE_SIGNING) {
            self.require_signing = matches!(flag.to_ascii_lowercase().as_str(), "1" | "true");
        }
        if let Some(client) = non_empty_env(ENV_ALLOWED_CLIENT_ID) {
            self.allowed_client_id = Some(client);
        }
        if let Some(limit) = non_empty_env(ENV_MAX_REQUESTS_PER_MINUTE) {
            match limit.parse::<u32>() {
                Ok(n) => self.max_requests_per_minute = Some(n),
                Err(_) => tracing::warn!(
                    value = %limit,
                    "Ignoring non-numeric {}",
                    ENV_MAX_REQUESTS_PER_MINUTE
                ),
            }
        }
        if let Some(url) = non_empty_env(ENV_COUNTER_SERVICE_URL) {
            self.counter_service_url = Some(url);
        }
        if let Some(key) = non_empty_env(ENV_UPSTREAM_API_KEY) {
            self.upstream.api_key = key;
        }
        if let Some(base) = non_empty_env(ENV_UPSTREAM_BASE_URL) {
            self.upstream.base_url = base;
        }
        if let Some(oauth) = self.oauth.as_mut() {
            if let Some(id) = non_empty_env(ENV_OAUTH_CLIENT_ID) {
                oauth.client_id = id;
            }
            if let Some(secret) = non_empty_env(ENV_OAUTH_CLIENT_SECRET) {
                oauth.client_secret = secret;
            }
            if let Some(secret) = non_empty_env(ENV_OAUTH_STATE_SECRET) {
                oauth.state_secret = secret;
            }
        }
    }

    /// Resolve `$env:VAR` references in secret-bearing fields
    pub fn expand_env_references(&mut self) {
        self.proxy_token = expand_env_value(&self.proxy_token);
        self.upstream.api_key = expand_env_value(&self.upstream.api_key);
        self.signing_secret = self
            .signing_secret
            .as_deref()
            .map(expand_env_value)
            .filter(|s| !s.is_empty());
        if let Some(oauth) = self.oauth.as_mut() {
            oauth.client_secret = expand_env_value(&oauth.client_secret);
            oauth.state_secret = expand_env_value(&oauth.state_secret);
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.proxy_token.is_empty() {
            return Err(GatewayError::config("proxyToken is required"));
        }

        if self.upstream.api_key.is_empty() {
            return Err(GatewayError::config("upstream.apiKey is required"));
        }

        if !self.upstream.base_url.starts_with("http://")
            && !self.upstream.base_url.starts_with("https://")
        {
            return Err(GatewayError::config(format!(
                "Invalid upstream.baseUrl '{}': must start with http:// or https://",
                self.upstream.base_url
            )));
        }

        if self.upstream.timeout_ms == 0 || self.counter_timeout_ms == 0 {
            return Err(GatewayError::config("timeouts must be greater than 0"));
        }

        if !self.proxy_prefix.starts_with('/') || self.proxy_prefix.ends_with('/') {
            return Err(GatewayError::config(format!(
                "Invalid proxyPrefix '{}': must start with '/' and not end with '/'",
                self.proxy_prefix
            )));
        }

        if self.cache_capacity == 0 {
            return Err(GatewayError::config("cacheCapacity must be greater than 0"));
        }

        if self.require_signing && self.signing_secret.is_none() {
            // Allowed to start, but every request will be rejected
            tracing::warn!(
                "requireSigning is enabled without a signingSecret; all requests will be rejected"
            );
        }

        if let Some(ref url) = self.counter_service_url
            && !url.starts_with("http://")
            && !url.starts_with("https://")
        {
            return Err(GatewayError::config(format!(
                "Invalid counterServiceUrl '{}': must start with http:// or https://",
                url
            )));
        }

        if let Some(ref http) = self.http {
            if http.port == 0 {
                return Err(GatewayError::config("http.port must be nonzero (1-65535)"));
            }
            if http.host.is_empty() {
                return Err(GatewayError::config("http.host cannot be empty"));
            }
        }

        if let Some(ref oauth) = self.oauth {
            if oauth.client_id.is_empty() || oauth.client_secret.is_empty() {
                return Err(GatewayError::config(
                    "oauth.clientId and oauth.clientSecret are required",
                ));
            }
            if oauth.state_secret.is_empty() {
                return Err(GatewayError::config("oauth.stateSecret is required"));
            }
        }

        Ok(())
    }

    /// Effective per-IP limit
    pub fn ip_rate_limit(&self) -> u32 {
        crate::ratelimit::effective_limit(self.max_requests_per_minute)
    }

    /// Effective per-client limit
    pub fn client_rate_limit(&self) -> u32 {
        crate::ratelimit::client_limit(self.ip_rate_limit())
    }

    /// HTTP config with defaults
    pub fn http_config(&self) -> HttpConfig {
        self.http.clone().unwrap_or_default()
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

#[cfg(test)]
mod config_test;
