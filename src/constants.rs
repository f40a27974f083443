//! Constants used throughout the weather gateway
//!
//! Header names, protocol windows, defaults and environment variable names.

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Configuration file name
pub const CONFIG_FILE_NAME: &str = "gateway.config.json";

/// Default HTTP port
pub const DEFAULT_HTTP_PORT: u16 = 8787;

/// Default HTTP port for the coordinated counter service
pub const DEFAULT_COUNTER_PORT: u16 = 8788;

/// Default proxy path prefix
pub const DEFAULT_PROXY_PREFIX: &str = "/weatherapi";

/// Default upstream weather provider base URL
pub const DEFAULT_UPSTREAM_BASE_URL: &str = "https://api.weatherapi.com/v1";

/// Default upstream request timeout (milliseconds)
pub const DEFAULT_UPSTREAM_TIMEOUT_MS: u64 = 10_000;

/// Default coordinated counter request timeout (milliseconds)
pub const DEFAULT_COUNTER_TIMEOUT_MS: u64 = 2_000;

/// Default capacity of the in-memory counter map and replay cache
pub const DEFAULT_CACHE_CAPACITY: usize = 10_000;

/// Default SQLite DSN for the counter service
pub const DEFAULT_COUNTER_DSN: &str = "sqlite::memory:";

// ============================================================================
// RATE LIMITING
// ============================================================================

/// Rate limit window size (milliseconds)
pub const RATE_WINDOW_MS: i64 = 60_000;

/// Default requests per minute when unset or below the floor
pub const DEFAULT_RATE_LIMIT_PER_MINUTE: u32 = 120;

/// Smallest limit any key is ever checked against
pub const MIN_RATE_LIMIT_PER_MINUTE: u32 = 10;

/// Counter rows are evicted after this many idle windows
pub const COUNTER_EVICTION_WINDOWS: i64 = 2;

// ============================================================================
// REQUEST SIGNING
// ============================================================================

/// Maximum accepted clock skew for signed requests (seconds)
pub const SIGNATURE_MAX_SKEW_SECS: i64 = 90;

/// Lifetime of a nonce record in the replay cache (seconds)
pub const NONCE_TTL_SECS: i64 = 120;

/// Client identity used when the request carries none
pub const DEFAULT_CLIENT_ID: &str = "default";

/// Signed request timestamp header
pub const HEADER_PROXY_TIMESTAMP: &str = "x-proxy-timestamp";

/// Signed request nonce header
pub const HEADER_PROXY_NONCE: &str = "x-proxy-nonce";

/// Signed request signature header
pub const HEADER_PROXY_SIGNATURE: &str = "x-proxy-signature";

/// Signed request client identity header
pub const HEADER_PROXY_CLIENT_ID: &str = "x-proxy-client-id";

// ============================================================================
// OAUTH
// ============================================================================

/// Maximum age of a signed OAuth state token (seconds)
pub const OAUTH_STATE_MAX_AGE_SECS: i64 = 600;

// ============================================================================
// QUERY POLICY
// ============================================================================

/// Maximum length of the free-text search parameter
pub const MAX_QUERY_LEN: usize = 120;

/// Inclusive bounds of the forecast `days` parameter
pub const MIN_FORECAST_DAYS: i64 = 1;
pub const MAX_FORECAST_DAYS: i64 = 10;

/// Query parameter carrying the upstream credential
pub const UPSTREAM_KEY_PARAM: &str = "key";

/// Query parameters whose values are never logged
pub const SECRET_QUERY_PARAMS: [&str; 6] = [
    "key",
    "api_key",
    "apikey",
    "token",
    "access_token",
    "client_secret",
];

/// Replacement for redacted values
pub const REDACTED: &str = "[REDACTED]";

// ============================================================================
// HTTP
// ============================================================================

pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CACHE_CONTROL_NO_STORE: &str = "no-store";

// ============================================================================
// ENVIRONMENT
// ============================================================================

pub const ENV_PROXY_TOKEN: &str = "GATEWAY_PROXY_TOKEN";
pub const ENV_SIGNING_SECRET: &str = "GATEWAY_SIGNING_SECRET";
pub const ENV_REQUIRE_SIGNING: &str = "GATEWAY_REQUIRE_SIGNING";
pub const ENV_ALLOWED_CLIENT_ID: &str = "GATEWAY_ALLOWED_CLIENT_ID";
pub const ENV_MAX_REQUESTS_PER_MINUTE: &str = "GATEWAY_MAX_REQUESTS_PER_MINUTE";
pub const ENV_COUNTER_SERVICE_URL: &str = "GATEWAY_COUNTER_SERVICE_URL";
pub const ENV_UPSTREAM_API_KEY: &str = "GATEWAY_UPSTREAM_API_KEY";
pub const ENV_UPSTREAM_BASE_URL: &str = "GATEWAY_UPSTREAM_BASE_URL";
pub const ENV_OAUTH_CLIENT_ID: &str = "GATEWAY_OAUTH_CLIENT_ID";
pub const ENV_OAUTH_CLIENT_SECRET: &str = "GATEWAY_OAUTH_CLIENT_SECRET";
pub const ENV_OAUTH_STATE_SECRET: &str = "GATEWAY_OAUTH_STATE_SECRET";
