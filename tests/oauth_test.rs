//! OAuth login flow through the router
//!
//! The identity provider's token endpoint is a mock server.

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use axum::response::Response;
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;
use weather_gateway::auth::OAuthLoginState;
use weather_gateway::clock::{ManualClock, SharedClock};
use weather_gateway::config::{Config, OAuthConfig, UpstreamConfig};
use weather_gateway::gateway::Gateway;
use weather_gateway::http::build_router;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn oauth_config(idp_uri: &str) -> OAuthConfig {
    OAuthConfig {
        client_id: "gateway-client".to_string(),
        client_secret: "gateway-client-secret".to_string(),
        authorize_url: format!("{}/authorize", idp_uri),
        token_url: format!("{}/token", idp_uri),
        redirect_uri: "https://gateway.example/callback".to_string(),
        state_secret: "state-secret".to_string(),
        scopes: vec!["weather.read".to_string()],
        timeout_ms: 1_000,
    }
}

fn app(idp_uri: &str, clock: ManualClock) -> Router {
    let clock: SharedClock = Arc::new(clock);
    let config = Config {
        proxy_token: "proxy-token".to_string(),
        upstream: UpstreamConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            api_key: "k".to_string(),
            timeout_ms: 1_000,
        },
        oauth: Some(oauth_config(idp_uri)),
        ..Default::default()
    };

    let gateway = Arc::new(Gateway::from_config(&config, clock.clone()).unwrap());
    let login = Arc::new(OAuthLoginState::new(oauth_config(idp_uri), clock).unwrap());
    build_router(gateway, Some(login))
}

async fn call(app: &Router, uri: &str) -> Response {
    app.clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn body_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Run `/authorize` and return the signed state from the redirect
async fn authorize(app: &Router, idp_uri: &str) -> String {
    let response = call(
        app,
        concat!(
            "/authorize?response_type=code&client_id=ios-app",
            "&redirect_uri=app%3A%2F%2Fdone&scope=weather.read&state=caller-state"
        ),
    )
    .await;
    assert!(response.status().is_redirection());

    let location = response.headers()[header::LOCATION].to_str().unwrap();
    assert!(location.starts_with(&format!("{}/authorize", idp_uri)));

    let url = url::Url::parse(location).unwrap();
    let params: Vec<(String, String)> = url.query_pairs().into_owned().collect();
    let find = |name: &str| {
        params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.clone())
    };
    assert_eq!(find("client_id").as_deref(), Some("gateway-client"));
    assert_eq!(find("scope").as_deref(), Some("weather.read"));
    assert_eq!(
        find("redirect_uri").as_deref(),
        Some("https://gateway.example/callback")
    );

    let state = find("state").unwrap();
    assert_ne!(state, "caller-state");
    state
}

async fn mock_token_endpoint(idp: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("code=auth-code"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "idp-access-token",
            "token_type": "bearer",
            "expires_in": 3600
        })))
        .mount(idp)
        .await;
}

#[tokio::test]
async fn test_login_round_trip() {
    let idp = MockServer::start().await;
    mock_token_endpoint(&idp).await;
    let app = app(&idp.uri(), ManualClock::starting_now());

    let state = authorize(&app, &idp.uri()).await;
    let callback = format!(
        "/callback?code=auth-code&state={}",
        urlencoding::encode(&state)
    );
    let response = call(&app, &callback).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CACHE_CONTROL], "no-store");

    let body = body_json(response).await;
    assert_eq!(body["status"], "authorized");
    assert_eq!(body["clientId"], "ios-app");
    assert_eq!(body["redirectUri"], "app://done");
    assert_eq!(body["state"], "caller-state");
    assert_eq!(body["accessToken"], "idp-access-token");
    assert_eq!(body["expiresIn"], 3600);
}

#[tokio::test]
async fn test_expired_state_rejected() {
    let idp = MockServer::start().await;
    mock_token_endpoint(&idp).await;
    let clock = ManualClock::starting_now();
    let app = app(&idp.uri(), clock.clone());

    let state = authorize(&app, &idp.uri()).await;
    clock.advance_secs(601);

    let callback = format!(
        "/callback?code=auth-code&state={}",
        urlencoding::encode(&state)
    );
    let response = call(&app, &callback).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(idp.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_tampered_state_rejected() {
    let idp = MockServer::start().await;
    mock_token_endpoint(&idp).await;
    let app = app(&idp.uri(), ManualClock::starting_now());

    let state = authorize(&app, &idp.uri()).await;
    let (payload, signature) = state.split_once('.').unwrap();
    let flipped = if signature.starts_with('A') { "B" } else { "A" };
    let tampered = format!("{}.{}{}", payload, flipped, &signature[1..]);

    let callback = format!(
        "/callback?code=auth-code&state={}",
        urlencoding::encode(&tampered)
    );
    let response = call(&app, &callback).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_identity_provider_error_rejected() {
    let idp = MockServer::start().await;
    let app = app(&idp.uri(), ManualClock::starting_now());

    let response = call(&app, "/callback?error=access_denied&state=x").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let missing_code = call(&app, "/callback?state=x").await;
    assert_eq!(missing_code.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_token_exchange_failure_rejected() {
    let idp = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "invalid_grant"})))
        .mount(&idp)
        .await;
    let app = app(&idp.uri(), ManualClock::starting_now());

    let state = authorize(&app, &idp.uri()).await;
    let callback = format!(
        "/callback?code=auth-code&state={}",
        urlencoding::encode(&state)
    );
    let response = call(&app, &callback).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
