//! OAuth constants for the Dropbox API
//!
//! Endpoints are documented at https://www.dropbox.com/developers/documentation/http/documentation

/// Scopes requested by the photobooth uploader
pub const DROPBOX_SCOPES: &[&str] = &[
    "account_info.read",
    "files.content.read",
    "files.content.write",
    "files.metadata.read",
];

/// Dropbox OAuth authorization page
pub const DROPBOX_AUTH_URL: &str = "https://www.dropbox.com/oauth2/authorize";

/// Dropbox OAuth token exchange endpoint
pub const DROPBOX_TOKEN_URL: &str = "https://api.dropboxapi.com/oauth2/token";

/// Page where the redirect URI has to be registered for the application
pub const DROPBOX_APP_CONSOLE_URL: &str = "https://www.dropbox.com/developers/apps/info";

/// Token access type requesting a long-lived refresh token
pub const OFFLINE_ACCESS: &str = "offline";

/// Default host for the local redirect listener
pub const DEFAULT_REDIRECT_HOST: &str = "localhost";

/// Local callback port for the OAuth redirect (must be registered on the app console)
pub const DEFAULT_REDIRECT_PORT: u16 = 35880;

/// Message printed to tell the user where to authorize the application
pub const DEFAULT_AUTH_PROMPT_MESSAGE: &str =
    "Please visit this URL to authorize this application: {url}";

/// Body returned to the browser once the redirect has been captured
pub const DEFAULT_WEB_SUCCESS_MESSAGE: &str =
    "The authentication flow has completed. You may close this window.";

/// Seconds before expiry at which an access token is considered stale
pub const TOKEN_EXPIRY_BUFFER_SECS: i64 = 300;
