//! Authenticated Dropbox session built from a stored credential

use oauth::constants::DROPBOX_TOKEN_URL;
use oauth::{refresh_access_token, Credential};
use tracing::info;

/// Authenticated handle to the Dropbox API for one process lifetime
#[derive(Debug, Clone)]
pub struct Session {
    app_key: String,
    app_secret: String,
    credential: Credential,
}

impl Session {
    pub fn new(app_key: &str, app_secret: &str, credential: Credential) -> Self {
        Self {
            app_key: app_key.to_string(),
            app_secret: app_secret.to_string(),
            credential,
        }
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    /// Token endpoint used for refreshes
    fn token_url(&self) -> &str {
        if self.credential.token_uri.starts_with("http") {
            &self.credential.token_uri
        } else {
            DROPBOX_TOKEN_URL
        }
    }

    /// Returns a usable access token, refreshing it first when it is stale
    pub async fn access_token(&mut self) -> oauth::Result<String> {
        if self.credential.needs_refresh() && !self.credential.refresh_token.is_empty() {
            let refreshed = refresh_access_token(
                self.token_url(),
                &self.app_key,
                &self.app_secret,
                &self.credential.refresh_token,
            )
            .await?;

            info!("Dropbox access token refreshed");
            self.credential.token = refreshed.access_token;
            self.credential.expires_at = refreshed.expires_at;
        }

        Ok(self.credential.token.clone())
    }
}
