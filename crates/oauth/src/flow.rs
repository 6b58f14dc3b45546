//! OAuth 2.0 Authorization Code flow for installed applications
//!
//! Implements the "installed application" flow against Dropbox:
//! 1. Bind a local listener that serves as the redirect target
//! 2. Open the browser on the authorization page
//! 3. Capture the single redirect request carrying the authorization response
//! 4. Exchange the authorization code for tokens

use async_trait::async_trait;
use axum::{extract::OriginalUri, http::header, Router};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpSocket};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::constants::*;
use crate::credentials::Credential;
use crate::error::{OAuthError, Result};
use crate::tokens::exchange_code;

/// How long a served redirect may take to flush before the listener is torn down
const CLOSE_GRACE: Duration = Duration::from_secs(5);

/// Generates a cryptographically secure state parameter
fn generate_state() -> String {
    let bytes: [u8; 32] = rand::thread_rng().gen();
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Settings for [`InstalledAppFlow::run_local_server`]
#[derive(Debug, Clone)]
pub struct FlowOptions {
    /// Hostname of the redirect listener, served over plain http
    pub host: String,
    /// Port of the redirect listener, 0 lets the OS pick one
    pub port: u16,
    /// Prompt printed to the console, `{url}` is replaced by the authorization URL
    pub authorization_prompt_message: String,
    /// Body returned to the browser once the redirect is captured
    pub success_message: String,
    /// Whether to try opening the authorization URL in the default browser
    pub open_browser: bool,
    /// Optional watchdog on the wait for the redirect
    pub timeout: Option<Duration>,
}

impl Default for FlowOptions {
    fn default() -> Self {
        Self {
            host: DEFAULT_REDIRECT_HOST.to_string(),
            port: DEFAULT_REDIRECT_PORT,
            authorization_prompt_message: DEFAULT_AUTH_PROMPT_MESSAGE.to_string(),
            success_message: DEFAULT_WEB_SUCCESS_MESSAGE.to_string(),
            open_browser: true,
            timeout: None,
        }
    }
}

/// Authorization response parsed from the redirect URI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationResponse {
    pub code: String,
    pub state: Option<String>,
}

/// Manages the Dropbox installed-application authorization flow
pub struct InstalledAppFlow {
    app_key: String,
    app_secret: String,
    scopes: Vec<String>,
    token_access_type: String,
    auth_url: String,
    token_url: String,
    state: String,
    redirect_uri: Option<String>,
}

impl InstalledAppFlow {
    /// Creates a flow requesting offline access for the given scopes
    pub fn new<S: AsRef<str>>(app_key: &str, app_secret: &str, scopes: &[S]) -> Self {
        Self {
            app_key: app_key.to_string(),
            app_secret: app_secret.to_string(),
            scopes: scopes.iter().map(|s| s.as_ref().to_string()).collect(),
            token_access_type: OFFLINE_ACCESS.to_string(),
            auth_url: DROPBOX_AUTH_URL.to_string(),
            token_url: DROPBOX_TOKEN_URL.to_string(),
            state: generate_state(),
            redirect_uri: None,
        }
    }

    /// Points the flow at different authorization and token endpoints
    pub fn with_endpoints(mut self, auth_url: &str, token_url: &str) -> Self {
        self.auth_url = auth_url.to_string();
        self.token_url = token_url.to_string();
        self
    }

    /// Anti-CSRF state sent with the authorization request
    pub fn state(&self) -> &str {
        &self.state
    }

    /// Redirect URI used by the last call to `run_local_server`
    pub fn redirect_uri(&self) -> Option<&str> {
        self.redirect_uri.as_deref()
    }

    /// Returns the authorization URL to open in the browser
    pub fn authorization_url(&self, redirect_uri: &str) -> String {
        let scopes = self.scopes.join(" ");
        format!(
            "{}?client_id={}&response_type=code&redirect_uri={}&state={}&token_access_type={}&scope={}",
            self.auth_url,
            urlencoding::encode(&self.app_key),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(&self.state),
            self.token_access_type,
            urlencoding::encode(&scopes),
        )
    }

    /// Parses the authorization response carried by a redirect URI
    ///
    /// When `state` is given the response must echo it back, otherwise the
    /// response is rejected before anything else is looked at.
    pub fn fetch_token(uri: &str, state: Option<&str>) -> Result<AuthorizationResponse> {
        let url = url::Url::parse(uri)
            .map_err(|e| OAuthError::MalformedResponse(format!("invalid redirect URI: {}", e)))?;
        let mut params: HashMap<String, String> = url.query_pairs().into_owned().collect();

        if let Some(expected) = state.filter(|s| !s.is_empty()) {
            if params.get("state").map(String::as_str) != Some(expected) {
                warn!("OAuth redirect received with invalid state");
                return Err(OAuthError::StateMismatch);
            }
        }

        if let Some(error) = params.remove("error") {
            error!("OAuth error: {}", error);
            return Err(OAuthError::AccessDenied {
                error,
                description: params.remove("error_description"),
            });
        }

        let code = params.remove("code").ok_or_else(|| {
            OAuthError::MalformedResponse("Missing code parameter in response".into())
        })?;

        Ok(AuthorizationResponse {
            code,
            state: params.remove("state"),
        })
    }

    /// Validates the captured redirect and exchanges its code for a credential
    pub async fn finish(&self, uri: &str, redirect_uri: &str) -> Result<Credential> {
        let response = Self::fetch_token(uri, Some(self.state.as_str()))?;
        let result = exchange_code(
            &self.token_url,
            &self.app_key,
            &self.app_secret,
            &response.code,
            redirect_uri,
        )
        .await?;

        Ok(Credential::from_exchange_result(&result))
    }

    /// Runs the flow using a local redirect listener
    ///
    /// Blocks until the browser is redirected back (or `options.timeout`
    /// elapses). The listener is closed on every path out of this call.
    pub async fn run_local_server(&mut self, options: &FlowOptions) -> Result<Credential> {
        let listener = RedirectListener::bind(&options.host, options.port).await?;
        let redirect_uri = listener.redirect_uri();
        self.redirect_uri = Some(redirect_uri.clone());

        println!(
            "Go on {} and set Redirect URI to {}",
            DROPBOX_APP_CONSOLE_URL, redirect_uri
        );

        let auth_url = self.authorization_url(&redirect_uri);

        if options.open_browser {
            if let Err(e) = open::that(&auth_url) {
                warn!("Could not open a browser: {}", e);
            }
        }

        println!(
            "{}",
            options.authorization_prompt_message.replace("{url}", &auth_url)
        );

        let uri = listener
            .wait_for_redirect(&options.success_message, options.timeout)
            .await?;

        self.finish(&uri, &redirect_uri).await
    }
}

/// Single-use HTTP listener that captures the OAuth redirect
pub struct RedirectListener {
    listener: TcpListener,
    host: String,
    port: u16,
}

impl RedirectListener {
    /// Binds the listener without address reuse, so an occupied port fails fast
    pub async fn bind(host: &str, port: u16) -> Result<Self> {
        let addr = format!("{}:{}", host, port);
        let bind_err = |source: std::io::Error| {
            if source.kind() == std::io::ErrorKind::AddrInUse {
                OAuthError::AddressInUse { addr: addr.clone() }
            } else {
                OAuthError::Bind {
                    addr: addr.clone(),
                    source,
                }
            }
        };

        let socket_addr = tokio::net::lookup_host((host, port))
            .await
            .map_err(bind_err)?
            .next()
            .ok_or_else(|| {
                bind_err(std::io::Error::new(
                    std::io::ErrorKind::AddrNotAvailable,
                    "host did not resolve",
                ))
            })?;

        let socket = if socket_addr.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        }
        .map_err(bind_err)?;
        socket.set_reuseaddr(false).map_err(bind_err)?;
        socket.bind(socket_addr).map_err(bind_err)?;
        let listener = socket.listen(128).map_err(bind_err)?;

        let port = listener.local_addr().map_err(bind_err)?.port();
        info!("OAuth redirect listener bound on {}:{}", host, port);

        Ok(Self {
            listener,
            host: host.to_string(),
            port,
        })
    }

    /// Port actually bound, which differs from the requested one when 0 was asked
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Redirect URI to register with the provider
    pub fn redirect_uri(&self) -> String {
        format!("http://{}:{}/", self.host, self.port)
    }

    /// Waits for one request, answers it with `success_message` and returns its full URI
    pub async fn wait_for_redirect(
        self,
        success_message: &str,
        timeout: Option<Duration>,
    ) -> Result<String> {
        let base = format!("http://{}:{}", self.host, self.port);
        let body = success_message.to_string();
        let (tx, rx) = oneshot::channel::<String>();
        let tx = Arc::new(Mutex::new(Some(tx)));

        let app = Router::new().fallback(move |OriginalUri(uri): OriginalUri| {
            let tx = tx.clone();
            let base = base.clone();
            let body = body.clone();
            async move {
                if let Some(tx) = tx.lock().await.take() {
                    debug!("OAuth redirect received: {}", uri.path());
                    let _ = tx.send(format!("{}{}", base, uri));
                }
                ([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body)
            }
        });

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let listener = self.listener;
        let handle = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(e) = result {
                error!("OAuth redirect listener error: {}", e);
            }
        });
        let server = ListenerTask {
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        };

        let received = match timeout {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(received) => received.map_err(|_| listener_stopped()),
                Err(_) => Err(OAuthError::Timeout(limit.as_secs())),
            },
            None => rx.await.map_err(|_| listener_stopped()),
        };

        server.close().await;
        info!("OAuth redirect listener closed");

        received
    }
}

fn listener_stopped() -> OAuthError {
    OAuthError::MalformedResponse("redirect listener stopped before a request arrived".into())
}

/// Background task serving the redirect listener
struct ListenerTask {
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl ListenerTask {
    /// Stops accepting, lets the served response flush, then drops the socket
    async fn close(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(mut handle) = self.handle.take() {
            if tokio::time::timeout(CLOSE_GRACE, &mut handle).await.is_err() {
                handle.abort();
                let _ = handle.await;
            }
        }
    }
}

impl Drop for ListenerTask {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// Source of fresh credentials when no cached one is usable
#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn authorize(&self) -> Result<Credential>;
}

/// Authorizer running [`InstalledAppFlow::run_local_server`] with a fresh state each time
pub struct LocalServerAuthorizer {
    app_key: String,
    app_secret: String,
    scopes: Vec<String>,
    options: FlowOptions,
}

impl LocalServerAuthorizer {
    pub fn new<S: AsRef<str>>(
        app_key: &str,
        app_secret: &str,
        scopes: &[S],
        options: FlowOptions,
    ) -> Self {
        Self {
            app_key: app_key.to_string(),
            app_secret: app_secret.to_string(),
            scopes: scopes.iter().map(|s| s.as_ref().to_string()).collect(),
            options,
        }
    }
}

#[async_trait]
impl Authorizer for LocalServerAuthorizer {
    async fn authorize(&self) -> Result<Credential> {
        let mut flow =
            InstalledAppFlow::new(&self.app_key, &self.app_secret, self.scopes.as_slice());
        flow.run_local_server(&self.options).await
    }
}
