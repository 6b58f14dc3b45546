//! Dropbox credentials and their JSON file persistence
//!
//! The token file holds one JSON object:
//!
//! ```json
//! {
//!   "token": "sl.B...",
//!   "refresh_token": "...",
//!   "token_uri": "https://api.dropboxapi.com/oauth2/token",
//!   "account_id": "dbid:...",
//!   "client_id": "12345",
//!   "scopes": ["account_info.read", "files.content.write"],
//!   "expires_at": "2026-10-19T12:00:00Z"
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;
use tracing::debug;

use crate::constants::{DROPBOX_TOKEN_URL, TOKEN_EXPIRY_BUFFER_SECS};
use crate::error::{OAuthError, Result};
use crate::tokens::ExchangeResult;

/// OAuth token set needed to call the Dropbox API without re-prompting the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    /// Short-lived access token
    pub token: String,

    /// Long-lived refresh token (offline access)
    pub refresh_token: String,

    /// Token endpoint, or the url state echoed by the exchange
    pub token_uri: String,

    /// Dropbox account identifier
    pub account_id: String,

    /// User id returned by the exchange
    pub client_id: String,

    /// Granted scopes, space separated
    pub scopes: String,

    /// When the access token expires, if known
    pub expires_at: Option<DateTime<Utc>>,
}

/// On-disk layout, scopes stored as a list
#[derive(Debug, Serialize, Deserialize)]
struct StoredCredential {
    token: String,
    refresh_token: String,
    token_uri: String,
    account_id: String,
    client_id: String,
    scopes: Vec<String>,
    #[serde(deserialize_with = "nullable")]
    expires_at: Option<DateTime<Utc>>,
}

/// Accepts `null` but, unlike the derived `Option` handling, not a missing key
fn nullable<'de, D>(deserializer: D) -> std::result::Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<DateTime<Utc>>::deserialize(deserializer)
}

impl Credential {
    pub fn new<S: AsRef<str>>(
        token: impl Into<String>,
        refresh_token: impl Into<String>,
        token_uri: impl Into<String>,
        account_id: impl Into<String>,
        client_id: impl Into<String>,
        scopes: &[S],
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            token: token.into(),
            refresh_token: refresh_token.into(),
            token_uri: token_uri.into(),
            account_id: account_id.into(),
            client_id: client_id.into(),
            scopes: scopes.iter().map(|s| s.as_ref()).collect::<Vec<&str>>().join(" "),
            expires_at,
        }
    }

    /// Builds a credential from a completed code exchange
    pub fn from_exchange_result(result: &ExchangeResult) -> Self {
        Self {
            token: result.access_token.clone(),
            refresh_token: result.refresh_token.clone(),
            token_uri: result
                .url_state
                .clone()
                .unwrap_or_else(|| DROPBOX_TOKEN_URL.to_string()),
            account_id: result.account_id.clone(),
            client_id: result.user_id.clone(),
            scopes: result.scope.clone(),
            expires_at: result.expires_at,
        }
    }

    /// Loads a credential previously written by [`Credential::save`]
    ///
    /// An absent, empty or malformed file is a decode error. Other read
    /// failures, such as missing permissions, are reported as `Io`.
    pub fn from_authorized_user_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| match source.kind() {
            std::io::ErrorKind::NotFound => OAuthError::MissingFile {
                path: path.to_path_buf(),
            },
            _ => OAuthError::Io {
                path: path.to_path_buf(),
                source,
            },
        })?;

        let stored: StoredCredential = serde_json::from_str(&content)?;
        debug!("Loaded Dropbox credentials from {:?}", path);

        Ok(Self {
            token: stored.token,
            refresh_token: stored.refresh_token,
            token_uri: stored.token_uri,
            account_id: stored.account_id,
            client_id: stored.client_id,
            scopes: stored.scopes.join(" "),
            expires_at: stored.expires_at,
        })
    }

    /// Serializes the credential, leaving out the members named in `strip`
    pub fn to_json(&self, strip: &[&str]) -> Result<String> {
        let stored = StoredCredential {
            token: self.token.clone(),
            refresh_token: self.refresh_token.clone(),
            token_uri: self.token_uri.clone(),
            account_id: self.account_id.clone(),
            client_id: self.client_id.clone(),
            scopes: self.scope_list().into_iter().map(String::from).collect(),
            expires_at: self.expires_at,
        };

        let mut value = serde_json::to_value(stored)?;
        if let Some(fields) = value.as_object_mut() {
            for key in strip {
                fields.remove(*key);
            }
        }

        Ok(serde_json::to_string(&value)?)
    }

    /// Writes the full credential to `path`
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = self.to_json(&[])?;
        std::fs::write(path, content).map_err(|source| OAuthError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Saved Dropbox credentials to {:?}", path);
        Ok(())
    }

    /// Granted scopes as individual strings
    pub fn scope_list(&self) -> Vec<&str> {
        self.scopes.split_whitespace().collect()
    }

    /// Checks if the access token is missing or about to expire (5 minute buffer)
    pub fn needs_refresh(&self) -> bool {
        if self.token.is_empty() {
            return true;
        }
        match self.expires_at {
            Some(expires_at) => {
                Utc::now() + chrono::Duration::seconds(TOKEN_EXPIRY_BUFFER_SECS) >= expires_at
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> Credential {
        Credential::new(
            "access",
            "refresh",
            DROPBOX_TOKEN_URL,
            "dbid:AAH4f99T0taONIb-OurWxbNQ6ywGRopQngc",
            "12345",
            &["account_info.read", "files.content.write"],
            Some(Utc::now() + chrono::Duration::hours(4)),
        )
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("token.json");
        let credential = sample();

        credential.save(&path).unwrap();
        let loaded = Credential::from_authorized_user_file(&path).unwrap();

        assert_eq!(loaded, credential);
    }

    #[test]
    fn test_round_trip_without_expiry() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("token.json");
        let credential = Credential {
            expires_at: None,
            ..sample()
        };

        credential.save(&path).unwrap();
        assert_eq!(Credential::from_authorized_user_file(&path).unwrap(), credential);
    }

    #[test]
    fn test_scopes_are_written_as_list() {
        let json = sample().to_json(&[]).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(
            value["scopes"],
            serde_json::json!(["account_info.read", "files.content.write"])
        );
    }

    #[test]
    fn test_strip_removes_fields() {
        let json = sample().to_json(&["token", "account_id"]).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let fields = value.as_object().unwrap();

        assert!(!fields.contains_key("token"));
        assert!(!fields.contains_key("account_id"));
        assert_eq!(fields["refresh_token"], "refresh");
        assert_eq!(fields["client_id"], "12345");
    }

    #[test]
    fn test_load_rejects_missing_field() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("token.json");
        std::fs::write(&path, sample().to_json(&["account_id"]).unwrap()).unwrap();

        let err = Credential::from_authorized_user_file(&path).unwrap_err();
        assert!(matches!(err, OAuthError::Decode(_)));
        assert!(err.to_string().contains("missing field `account_id`"));
    }

    #[test]
    fn test_load_rejects_missing_expiry() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("token.json");
        std::fs::write(&path, sample().to_json(&["expires_at"]).unwrap()).unwrap();

        let err = Credential::from_authorized_user_file(&path).unwrap_err();
        assert!(err.to_string().contains("missing field `expires_at`"));
    }

    #[test]
    fn test_load_empty_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("token.json");
        std::fs::write(&path, "").unwrap();

        let err = Credential::from_authorized_user_file(&path).unwrap_err();
        assert!(matches!(err, OAuthError::Decode(_)));
        assert!(err.is_decode_error());
    }

    #[test]
    fn test_load_absent_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("absent.json");

        let err = Credential::from_authorized_user_file(&path).unwrap_err();
        assert!(err.is_decode_error());
        assert!(matches!(err, OAuthError::MissingFile { path: ref p } if *p == path));
    }

    #[test]
    fn test_load_directory_is_io_error() {
        let temp = TempDir::new().unwrap();

        let err = Credential::from_authorized_user_file(temp.path()).unwrap_err();
        assert!(matches!(err, OAuthError::Io { .. }));
        assert!(!err.is_decode_error());
    }

    #[test]
    fn test_from_exchange_result() {
        let result = ExchangeResult {
            access_token: "access".into(),
            refresh_token: "refresh".into(),
            url_state: None,
            account_id: "dbid:1".into(),
            user_id: "42".into(),
            scope: "files.content.read files.content.write".into(),
            expires_at: None,
        };

        let credential = Credential::from_exchange_result(&result);
        assert_eq!(credential.token, "access");
        assert_eq!(credential.token_uri, DROPBOX_TOKEN_URL);
        assert_eq!(credential.client_id, "42");
        assert_eq!(
            credential.scope_list(),
            vec!["files.content.read", "files.content.write"]
        );
    }

    #[test]
    fn test_needs_refresh() {
        let mut credential = sample();
        assert!(!credential.needs_refresh());

        credential.expires_at = Some(Utc::now() + chrono::Duration::minutes(1));
        assert!(credential.needs_refresh());

        credential.expires_at = None;
        assert!(!credential.needs_refresh());

        credential.token.clear();
        assert!(credential.needs_refresh());
    }
}
