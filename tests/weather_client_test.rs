//! Typed client against a running gateway

use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use weather_gateway::GatewayError;
use weather_gateway::auth::RequestSigner;
use weather_gateway::clock::system_clock;
use weather_gateway::config::{Config, UpstreamConfig};
use weather_gateway::gateway::Gateway;
use weather_gateway::http::build_router;
use weather_gateway::weather::WeatherClient;
use wiremock::matchers::{path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn spawn_gateway(config: Config) -> String {
    let gateway = Arc::new(Gateway::from_config(&config, system_clock()).unwrap());
    let app = build_router(gateway, None);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    format!("http://{}{}", addr, config.proxy_prefix)
}

fn config_for(upstream: &MockServer) -> Config {
    Config {
        proxy_token: "proxy-token".to_string(),
        signing_secret: Some("signing-secret".to_string()),
        require_signing: true,
        allowed_client_id: Some("cli".to_string()),
        upstream: UpstreamConfig {
            base_url: upstream.uri(),
            api_key: "upstream-key".to_string(),
            timeout_ms: 1_000,
        },
        ..Default::default()
    }
}

#[tokio::test]
async fn test_signed_forecast_through_gateway() {
    let upstream = MockServer::start().await;
    Mock::given(path("/forecast.json"))
        .and(query_param("q", "Denver"))
        .and(query_param("days", "2"))
        .and(query_param("key", "upstream-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "location": {"name": "Denver", "country": "USA"},
            "forecast": {"forecastday": [
                {
                    "date": "2024-05-01",
                    "day": {"maxtemp_c": 20.0, "mintemp_c": 5.0, "condition": {"text": "Sunny"}}
                },
                {
                    "date": "2024-05-02",
                    "day": {"maxtemp_c": 18.0, "mintemp_c": 4.0, "condition": {"text": "Rain"}}
                }
            ]}
        })))
        .expect(1)
        .mount(&upstream)
        .await;

    let base = spawn_gateway(config_for(&upstream)).await;
    let client = WeatherClient::new(base, "proxy-token", 2_000)
        .unwrap()
        .with_signer(RequestSigner::new("signing-secret", Some("cli".to_string())));

    let summary = client.forecast_summary("Denver", 2).await.unwrap();
    assert_eq!(summary.location, "Denver, USA");
    assert_eq!(summary.days.len(), 2);
    assert_eq!(summary.days[1].condition, "Rain");
}

#[tokio::test]
async fn test_client_errors_through_gateway() {
    let upstream = MockServer::start().await;
    let base = spawn_gateway(config_for(&upstream)).await;

    // Unsigned while signing is required
    let unsigned = WeatherClient::new(base.clone(), "proxy-token", 2_000).unwrap();
    assert!(matches!(
        unsigned.current("Denver").await,
        Err(GatewayError::Unauthorized(_))
    ));

    // Signed by a client the gateway does not allow
    let other = WeatherClient::new(base.clone(), "proxy-token", 2_000)
        .unwrap()
        .with_signer(RequestSigner::new("signing-secret", Some("web".to_string())));
    assert!(matches!(
        other.current("Denver").await,
        Err(GatewayError::Unauthorized(_))
    ));

    // Policy rejection surfaces as a validation error
    let signed = WeatherClient::new(base, "proxy-token", 2_000)
        .unwrap()
        .with_signer(RequestSigner::new("signing-secret", Some("cli".to_string())));
    assert!(matches!(
        signed.forecast("Denver", 11).await,
        Err(GatewayError::Validation(_))
    ));

    assert!(upstream.received_requests().await.unwrap().is_empty());
}
