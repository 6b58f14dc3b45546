//! Error types for Dropbox API calls.

use oauth::OAuthError;

/// Errors reported by the Dropbox API or on the way to it.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Dropbox answered with an endpoint-specific error.
    #[error("Dropbox API error ({status}): {summary}")]
    Api { status: u16, summary: String },

    /// Network/HTTP error.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The session could not produce a valid access token.
    #[error("Authorization error: {0}")]
    Auth(#[from] OAuthError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
