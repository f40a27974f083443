//! OAuth login against the upstream identity provider
//!
//! `/authorize` captures the caller's authorization request in a signed state
//! token and redirects to the identity provider. `/callback` verifies the
//! state and exchanges the authorization code for a token.

use super::oauth_state::{AuthorizationRequest, sign_state, verify_state};
use crate::clock::SharedClock;
use crate::config::OAuthConfig;
use crate::constants::CACHE_CONTROL_NO_STORE;
use crate::http::AppError;
use crate::{GatewayError, Result};
use axum::{
    Json, Router,
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Redirect, Response},
    routing::get,
};
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, RedirectUrl, Scope,
    TokenResponse, TokenUrl, basic::BasicClient,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Shared state of the login routes
pub struct OAuthLoginState {
    config: OAuthConfig,
    http_client: reqwest::Client,
    clock: SharedClock,
}

impl OAuthLoginState {
    pub fn new(config: OAuthConfig, clock: SharedClock) -> Result<Self> {
        // Redirects are disabled to prevent authorization code interception
        let http_client = reqwest::ClientBuilder::new()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| {
                GatewayError::config(format!("Failed to build OAuth HTTP client: {}", e))
            })?;

        Ok(Self {
            config,
            http_client,
            clock,
        })
    }

    /// Identity provider URL the caller is sent to
    pub fn authorization_url(&self, request: &AuthorizationRequest) -> Result<String> {
        let state = sign_state(&self.config.state_secret, request, self.clock.now_secs())?;

        // Can't extract the client builder to a helper due to oauth2's typestate pattern
        let client = BasicClient::new(ClientId::new(self.config.client_id.clone()))
            .set_client_secret(ClientSecret::new(self.config.client_secret.clone()))
            .set_auth_uri(
                AuthUrl::new(self.config.authorize_url.clone())
                    .map_err(|e| GatewayError::config(format!("Invalid authorize URL: {}", e)))?,
            )
            .set_redirect_uri(
                RedirectUrl::new(self.config.redirect_uri.clone())
                    .map_err(|e| GatewayError::config(format!("Invalid redirect URI: {}", e)))?,
            );

        let (auth_url, _) = client
            .authorize_url(|| CsrfToken::new(state))
            .add_scopes(self.config.scopes.iter().map(|s| Scope::new(s.clone())))
            .url();

        Ok(auth_url.to_string())
    }

    /// Verify `state` and exchange `code` with the identity provider
    pub async fn complete(&self, code: &str, state: &str) -> Result<LoginOutcome> {
        let verified = verify_state(&self.config.state_secret, state, self.clock.now_secs())?;

        let client = BasicClient::new(ClientId::new(self.config.client_id.clone()))
            .set_client_secret(ClientSecret::new(self.config.client_secret.clone()))
            .set_token_uri(
                TokenUrl::new(self.config.token_url.clone())
                    .map_err(|e| GatewayError::config(format!("Invalid token URL: {}", e)))?,
            )
            .set_redirect_uri(
                RedirectUrl::new(self.config.redirect_uri.clone())
                    .map_err(|e| GatewayError::config(format!("Invalid redirect URI: {}", e)))?,
            );

        let token = client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .request_async(&self.http_client)
            .await
            .map_err(|e| {
                tracing::warn!("Token exchange failed: {}", e);
                GatewayError::oauth("Token exchange failed")
            })?;

        let original = verified.original_auth_request;
        let scope = token
            .scopes()
            .map(|scopes| {
                scopes
                    .iter()
                    .map(|s| s.to_string())
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .or(original.scope);

        tracing::info!(
            client_id = original.client_id.as_deref().unwrap_or("-"),
            "OAuth login completed"
        );

        Ok(LoginOutcome {
            status: "authorized".to_string(),
            client_id: original.client_id,
            redirect_uri: original.redirect_uri,
            state: original.state,
            scope,
            access_token: token.access_token().secret().clone(),
            token_type: token.token_type().as_ref().to_string(),
            expires_in: token.expires_in().map(|d| d.as_secs()),
        })
    }
}

/// Result of a completed login, returned as JSON from `/callback`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginOutcome {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    pub access_token: String,
    pub token_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
}

/// Query of the identity provider's redirect back to `/callback`
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Login routes: `GET /authorize`, `GET /callback`
pub fn create_oauth_login_routes(state: Arc<OAuthLoginState>) -> Router {
    Router::new()
        .route("/authorize", get(authorize_handler))
        .route("/callback", get(callback_handler))
        .with_state(state)
}

async fn authorize_handler(
    State(state): State<Arc<OAuthLoginState>>,
    Query(request): Query<AuthorizationRequest>,
) -> std::result::Result<Redirect, AppError> {
    let url = state.authorization_url(&request)?;
    Ok(Redirect::to(&url))
}

async fn callback_handler(
    State(state): State<Arc<OAuthLoginState>>,
    Query(query): Query<CallbackQuery>,
) -> std::result::Result<Response, AppError> {
    if let Some(error) = query.error {
        tracing::info!(
            error = %error,
            description = query.error_description.as_deref().unwrap_or(""),
            "Identity provider returned an error"
        );
        return Err(GatewayError::oauth("Authorization denied").into());
    }

    let code = query
        .code
        .ok_or_else(|| GatewayError::oauth("Missing authorization code"))?;
    let signed_state = query
        .state
        .ok_or_else(|| GatewayError::oauth("Missing state"))?;

    let outcome = state.complete(&code, &signed_state).await?;
    crate::telemetry::record_oauth_login();

    Ok((
        [(header::CACHE_CONTROL, CACHE_CONTROL_NO_STORE)],
        Json(outcome),
    )
        .into_response())
}
