//! Error types for the authorization flow and credential storage.

use std::path::PathBuf;

/// Result type alias for this crate.
pub type Result<T> = std::result::Result<T, OAuthError>;

/// Errors that can occur while authorizing or persisting credentials.
#[derive(Debug, thiserror::Error)]
pub enum OAuthError {
    /// The redirect listener could not bind because the address is taken.
    #[error("Address {addr} is already in use")]
    AddressInUse { addr: String },

    /// The redirect listener could not be started.
    #[error("Failed to start redirect listener on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The `state` returned by the provider does not match the issued one.
    #[error("State are not matching")]
    StateMismatch,

    /// The user (or the provider) refused the authorization request.
    #[error("Authorization denied: {error}")]
    AccessDenied {
        error: String,
        description: Option<String>,
    },

    /// The redirect did not carry what the flow needs.
    #[error("Malformed authorization response: {0}")]
    MalformedResponse(String),

    /// No redirect was received before the caller-supplied deadline.
    #[error("No authorization response received within {0} seconds")]
    Timeout(u64),

    /// The token endpoint rejected the exchange or refresh.
    #[error("Token exchange failed: {0}")]
    TokenExchange(String),

    /// Network/HTTP error.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The credential file does not exist, so there is nothing to decode.
    #[error("Failed to decode credentials: {path:?} does not exist")]
    MissingFile { path: PathBuf },

    /// The credential file could not be read or written.
    #[error("Credential file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The credential file is empty or not a valid credential document.
    #[error("Failed to decode credentials: {0}")]
    Decode(#[from] serde_json::Error),
}

impl OAuthError {
    /// True when a credential file is absent, empty or not a credential document
    pub fn is_decode_error(&self) -> bool {
        matches!(self, Self::MissingFile { .. } | Self::Decode(_))
    }
}
