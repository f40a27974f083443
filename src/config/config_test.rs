use super::*;
use std::fs;
use tempfile::TempDir;

fn valid_config() -> Config {
    Config {
        proxy_token: "proxy-token".to_string(),
        upstream: UpstreamConfig {
            api_key: "upstream-key".to_string(),
            ..Default::default()
        },
        ..Default::default()
    }
}

#[test]
fn test_default_config() {
    let config = Config::default();
    assert_eq!(config.proxy_prefix, "/weatherapi");
    assert_eq!(config.http_config().port, 8787);
    assert_eq!(config.upstream.base_url, "https://api.weatherapi.com/v1");
    assert!(!config.require_signing);
    assert!(config.counter_service_url.is_none());
}

#[test]
fn test_default_config_requires_secrets() {
    let config = Config::default();
    assert!(config.validate().is_err());

    let mut config = valid_config();
    assert!(config.validate().is_ok());

    config.upstream.api_key = String::new();
    assert!(config.validate().is_err());
}

#[test]
fn test_config_validation_rejects_bad_values() {
    let mut config = valid_config();
    config.proxy_prefix = "weatherapi".to_string();
    assert!(config.validate().is_err());

    let mut config = valid_config();
    config.proxy_prefix = "/weatherapi/".to_string();
    assert!(config.validate().is_err());

    let mut config = valid_config();
    config.counter_service_url = Some("counters.internal".to_string());
    assert!(config.validate().is_err());

    let mut config = valid_config();
    config.cache_capacity = 0;
    assert!(config.validate().is_err());

    let mut config = valid_config();
    config.oauth = Some(OAuthConfig {
        client_id: "id".to_string(),
        client_secret: "secret".to_string(),
        authorize_url: "https://idp.example/authorize".to_string(),
        token_url: "https://idp.example/token".to_string(),
        redirect_uri: "https://gw.example/callback".to_string(),
        state_secret: String::new(),
        scopes: vec![],
        timeout_ms: 1000,
    });
    assert!(config.validate().is_err());
}

#[test]
fn test_require_signing_without_secret_still_loads() {
    let mut config = valid_config();
    config.require_signing = true;
    assert!(config.validate().is_ok());
}

#[test]
fn test_rate_limit_defaults_and_floor() {
    let mut config = valid_config();
    assert_eq!(config.ip_rate_limit(), 120);
    assert_eq!(config.client_rate_limit(), 60);

    config.max_requests_per_minute = Some(5);
    assert_eq!(config.ip_rate_limit(), 120);

    config.max_requests_per_minute = Some(12);
    assert_eq!(config.ip_rate_limit(), 12);
    assert_eq!(config.client_rate_limit(), 10);
}

#[test]
fn test_config_load_from_json_file() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("gateway.config.json");

    let config_content = r#"
{
    "proxyToken": "tok",
    "signingSecret": "sign",
    "requireSigning": true,
    "maxRequestsPerMinute": 30,
    "upstream": {
        "apiKey": "k",
        "baseUrl": "http://localhost:9999/v1"
    },
    "http": {
        "host": "0.0.0.0",
        "port": 3001
    }
}
"#;

    fs::write(&config_path, config_content).unwrap();
    let config = Config::load_from_path(&config_path).unwrap();

    assert_eq!(config.proxy_token, "tok");
    assert_eq!(config.signing_secret.as_deref(), Some("sign"));
    assert!(config.require_signing);
    assert_eq!(config.max_requests_per_minute, Some(30));
    assert_eq!(config.upstream.base_url, "http://localhost:9999/v1");
    assert_eq!(config.upstream.timeout_ms, 10_000);
    assert_eq!(config.http_config().port, 3001);
    assert!(config.validate().is_ok());
}

#[test]
fn test_config_load_from_yaml_file() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("gateway.yaml");

    let config_content = r#"
proxyToken: tok
counterServiceUrl: http://127.0.0.1:8788
upstream:
  apiKey: k
counters:
  dsn: "sqlite::memory:"
"#;

    fs::write(&config_path, config_content).unwrap();
    let config = Config::load_from_path(&config_path).unwrap();

    assert_eq!(
        config.counter_service_url.as_deref(),
        Some("http://127.0.0.1:8788")
    );
    let counters = config.counters.unwrap();
    assert_eq!(counters.port, 8788);
    assert_eq!(counters.sweep_interval_secs, 60);
}

#[test]
fn test_missing_file_yields_default() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::load_from_path(temp_dir.path().join("absent.json")).unwrap();
    assert!(config.proxy_token.is_empty());
}

#[test]
fn test_invalid_json_is_config_error() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("broken.json");
    fs::write(&config_path, "{ not json").unwrap();

    let err = Config::load_from_path(&config_path).unwrap_err();
    assert!(matches!(err, GatewayError::Config(_)));
}

#[test]
fn test_env_references_are_expanded() {
    unsafe {
        std::env::set_var("GATEWAY_CONFIG_TEST_UPSTREAM", "from-env");
    }

    let mut config = valid_config();
    config.upstream.api_key = "$env:GATEWAY_CONFIG_TEST_UPSTREAM".to_string();
    config.signing_secret = Some("$env:GATEWAY_CONFIG_TEST_MISSING".to_string());
    config.expand_env_references();

    assert_eq!(config.upstream.api_key, "from-env");
    assert!(config.signing_secret.is_none());

    unsafe {
        std::env::remove_var("GATEWAY_CONFIG_TEST_UPSTREAM");
    }
}
