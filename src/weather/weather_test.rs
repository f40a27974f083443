use super::model::*;
use super::*;
use crate::GatewayError;
use crate::auth::RequestSigner;
use crate::policy::Endpoint;
use serde_json::json;
use wiremock::matchers::{header, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn current_body() -> serde_json::Value {
    json!({
        "location": {
            "name": "Denver",
            "region": "Colorado",
            "country": "United States of America",
            "lat": 39.74,
            "lon": -104.98,
            "tz_id": "America/Denver",
            "localtime_epoch": 1700000000,
            "localtime": "2023-11-14 15:13"
        },
        "current": {
            "temp_c": 12.5,
            "feelslike_c": 10.1,
            "humidity": 30,
            "wind_kph": 14.4,
            "wind_dir": "NW",
            "condition": {"text": "Sunny", "icon": "//cdn/113.png", "code": 1000},
            "air_quality": {"pm2_5": 4.1, "us-epa-index": 1, "gb-defra-index": 1}
        }
    })
}

#[test]
fn test_missing_air_quality_decodes_as_default() {
    let body = json!({
        "location": {"name": "Oslo"},
        "current": {"temp_c": -3.0, "condition": {"text": "Snow"}}
    });
    let parsed: CurrentResponse = serde_json::from_value(body).unwrap();

    assert_eq!(parsed.current.air_quality, AirQuality::default());
    let summary = CurrentSummary::from(&parsed);
    assert_eq!(summary.location, "Oslo");
    assert_eq!(summary.condition, "Snow");
    assert!(summary.air_quality_index.is_none());
}

#[test]
fn test_forecast_without_astro_decodes() {
    let body = json!({
        "location": {"name": "Lima", "country": "Peru"},
        "forecast": {"forecastday": [
            {
                "date": "2024-05-01",
                "day": {
                    "maxtemp_c": 22.0,
                    "mintemp_c": 16.0,
                    "daily_chance_of_rain": 10,
                    "condition": {"text": "Cloudy"}
                }
            },
            {
                "date": "2024-05-02",
                "day": {},
                "astro": {"sunrise": "06:12 AM", "sunset": "05:58 PM"}
            }
        ]}
    });
    let parsed: ForecastResponse = serde_json::from_value(body).unwrap();
    let summary = ForecastSummary::from(&parsed);

    assert_eq!(summary.location, "Lima, Peru");
    assert_eq!(summary.days.len(), 2);
    assert_eq!(summary.days[0].max_c, 22.0);
    assert_eq!(summary.days[0].sunrise, "");
    assert_eq!(summary.days[1].sunset, "05:58 PM");
    assert!(parsed.current.is_none());
}

#[test]
fn test_current_summary_from_full_response() {
    let parsed: CurrentResponse = serde_json::from_value(current_body()).unwrap();
    let summary = CurrentSummary::from(&parsed);

    assert_eq!(
        summary.location,
        "Denver, Colorado, United States of America"
    );
    assert_eq!(summary.temp_c, 12.5);
    assert_eq!(summary.air_quality_index, Some(1));
}

#[test]
fn test_endpoint_url_encodes_query() {
    let client = WeatherClient::new("http://gw.example/weatherapi/", "tok", 1_000).unwrap();
    let url = client
        .endpoint_url(Endpoint::Current, &[("q", "San Francisco")])
        .unwrap();
    assert_eq!(
        url.as_str(),
        "http://gw.example/weatherapi/current.json?q=San+Francisco"
    );
}

#[tokio::test]
async fn test_client_sends_bearer_and_signature() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/weatherapi/current.json"))
        .and(query_param("q", "Denver"))
        .and(header("authorization", "Bearer proxy-token"))
        .and(header_exists("x-proxy-signature"))
        .and(header_exists("x-proxy-nonce"))
        .and(header_exists("x-proxy-timestamp"))
        .and(header("x-proxy-client-id", "cli"))
        .respond_with(ResponseTemplate::new(200).set_body_json(current_body()))
        .expect(1)
        .mount(&server)
        .await;

    let client = WeatherClient::new(format!("{}/weatherapi", server.uri()), "proxy-token", 1_000)
        .unwrap()
        .with_signer(RequestSigner::new("secret", Some("cli".to_string())));

    let summary = client.current_summary("Denver").await.unwrap();
    assert_eq!(summary.condition, "Sunny");
}

#[tokio::test]
async fn test_client_maps_error_statuses() {
    let server = MockServer::start().await;
    Mock::given(path("/weatherapi/forecast.json"))
        .respond_with(ResponseTemplate::new(400).set_body_string("Invalid days parameter"))
        .mount(&server)
        .await;
    Mock::given(path("/weatherapi/current.json"))
        .respond_with(ResponseTemplate::new(429).set_body_string("Too Many Requests"))
        .mount(&server)
        .await;
    Mock::given(path("/weatherapi/astronomy.json"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
        .mount(&server)
        .await;
    Mock::given(path("/weatherapi/history.json"))
        .respond_with(ResponseTemplate::new(504).set_body_string("Gateway Timeout"))
        .mount(&server)
        .await;

    let client = WeatherClient::new(format!("{}/weatherapi", server.uri()), "tok", 1_000).unwrap();

    match client.forecast("Denver", 15).await {
        Err(GatewayError::Validation(msg)) => assert_eq!(msg, "Invalid days parameter"),
        other => panic!("unexpected result: {:?}", other),
    }
    assert!(matches!(
        client.current("Denver").await,
        Err(GatewayError::RateLimited(_))
    ));
    assert!(matches!(
        client.astronomy("Denver", "2024-05-01").await,
        Err(GatewayError::Unauthorized(_))
    ));
    assert!(matches!(
        client.history("Denver", "2024-05-01").await,
        Err(GatewayError::Upstream { status: 504 })
    ));
}

#[tokio::test]
async fn test_provider_error_message_extracted() {
    let server = MockServer::start().await;
    Mock::given(path("/weatherapi/current.json"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {"code": 1006, "message": "No matching location found."}
        })))
        .mount(&server)
        .await;

    let client = WeatherClient::new(format!("{}/weatherapi", server.uri()), "tok", 1_000).unwrap();
    match client.current("Atlantis").await {
        Err(GatewayError::Validation(msg)) => assert_eq!(msg, "No matching location found."),
        other => panic!("unexpected result: {:?}", other),
    }
}
