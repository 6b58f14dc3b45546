//! Token exchange and refresh against the Dropbox token endpoint

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{OAuthError, Result};

/// Fields returned by a completed authorization-code exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeResult {
    pub access_token: String,
    pub refresh_token: String,
    /// Application state echoed back through the redirect, if any
    pub url_state: Option<String>,
    pub account_id: String,
    pub user_id: String,
    pub scope: String,
    pub expires_at: Option<DateTime<Utc>>,
}

/// A freshly refreshed access token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshedToken {
    pub access_token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Response from Dropbox's token endpoint
#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    account_id: Option<String>,
    #[serde(default)]
    uid: Option<String>,
    token_type: String,
}

/// Error response from Dropbox's token endpoint
#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    error_description: Option<String>,
}

fn expiry_from(expires_in: Option<i64>) -> Option<DateTime<Utc>> {
    expires_in.map(|secs| Utc::now() + chrono::Duration::seconds(secs))
}

async fn token_error(response: reqwest::Response) -> OAuthError {
    let status = response.status();
    let error_text = match response.text().await {
        Ok(text) => text,
        Err(e) => return OAuthError::Network(e),
    };

    if let Ok(error_resp) = serde_json::from_str::<TokenErrorResponse>(&error_text) {
        return OAuthError::TokenExchange(format!(
            "{} - {}",
            error_resp.error,
            error_resp.error_description.unwrap_or_default()
        ));
    }

    OAuthError::TokenExchange(format!("{}: {}", status, error_text))
}

/// Exchanges an authorization code for access and refresh tokens
pub async fn exchange_code(
    token_url: &str,
    app_key: &str,
    app_secret: &str,
    code: &str,
    redirect_uri: &str,
) -> Result<ExchangeResult> {
    info!("Exchanging authorization code for tokens");

    let client = reqwest::Client::new();
    let response = client
        .post(token_url)
        .form(&[
            ("client_id", app_key),
            ("client_secret", app_secret),
            ("code", code),
            ("grant_type", "authorization_code"),
            ("redirect_uri", redirect_uri),
        ])
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(token_error(response).await);
    }

    let token_response: TokenResponse = response.json().await?;
    let account_id = token_response.account_id.unwrap_or_default();
    info!("Successfully authorized Dropbox account {}", account_id);

    Ok(ExchangeResult {
        access_token: token_response.access_token,
        refresh_token: token_response.refresh_token.unwrap_or_default(),
        url_state: None,
        account_id,
        user_id: token_response.uid.unwrap_or_default(),
        scope: token_response.scope.unwrap_or_default(),
        expires_at: expiry_from(token_response.expires_in),
    })
}

/// Obtains a new short-lived access token from a refresh token
pub async fn refresh_access_token(
    token_url: &str,
    app_key: &str,
    app_secret: &str,
    refresh_token: &str,
) -> Result<RefreshedToken> {
    debug!("Refreshing Dropbox access token");

    let client = reqwest::Client::new();
    let response = client
        .post(token_url)
        .form(&[
            ("client_id", app_key),
            ("client_secret", app_secret),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ])
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(token_error(response).await);
    }

    let token_response: TokenResponse = response.json().await?;

    Ok(RefreshedToken {
        access_token: token_response.access_token,
        expires_at: expiry_from(token_response.expires_in),
    })
}
