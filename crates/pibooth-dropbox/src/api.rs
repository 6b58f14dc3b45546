//! Dropbox HTTP API client
//!
//! Only the three calls the uploader needs are implemented: the reachability
//! probe, `files/upload` and `files/get_temporary_link`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode, header};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::error::ApiError;

/// Host probed to tell "no network" apart from API failures
pub const DROPBOX_PROBE_URL: &str = "https://www.dropbox.com";

/// RPC endpoints host
pub const DROPBOX_API_URL: &str = "https://api.dropboxapi.com";

/// Content upload/download endpoints host
pub const DROPBOX_CONTENT_URL: &str = "https://content.dropboxapi.com";

/// What to do when a file already exists at the upload path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    /// Never overwrite, Dropbox reports a conflict instead
    Add,
    /// Replace the existing file
    Overwrite,
}

/// Metadata of an uploaded file
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FileMetadata {
    pub name: String,
    /// Lowercased full path, used to request links
    #[serde(default)]
    pub path_lower: String,
    #[serde(default)]
    pub path_display: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub rev: String,
    #[serde(default)]
    pub client_modified: String,
    #[serde(default)]
    pub server_modified: String,
}

/// Arguments of `files/upload`, sent in the `Dropbox-API-Arg` header
#[derive(Debug, Serialize)]
struct UploadArg<'a> {
    path: &'a str,
    mode: WriteMode,
    autorename: bool,
    client_modified: String,
    mute: bool,
}

#[derive(Debug, Deserialize)]
struct TemporaryLinkResponse {
    link: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error_summary: String,
}

/// The Dropbox operations used by the uploader
#[async_trait]
pub trait DropboxApi: Send + Sync {
    /// Checks that Dropbox answers at all
    async fn is_reachable(&self) -> bool;

    /// Uploads `data` to `path`
    async fn files_upload(
        &self,
        access_token: &str,
        data: Vec<u8>,
        path: &str,
        mode: WriteMode,
        client_modified: DateTime<Utc>,
        mute: bool,
    ) -> Result<FileMetadata, ApiError>;

    /// Returns a direct link to `path`, valid for four hours
    async fn files_get_temporary_link(
        &self,
        access_token: &str,
        path: &str,
    ) -> Result<String, ApiError>;
}

/// Dropbox API over HTTPS
pub struct DropboxClient {
    http: Client,
    probe_url: String,
    api_url: String,
    content_url: String,
}

impl DropboxClient {
    pub fn new() -> Result<Self, ApiError> {
        Self::with_base_urls(DROPBOX_PROBE_URL, DROPBOX_API_URL, DROPBOX_CONTENT_URL)
    }

    /// Builds a client talking to other hosts than the public Dropbox ones
    pub fn with_base_urls(
        probe_url: &str,
        api_url: &str,
        content_url: &str,
    ) -> Result<Self, ApiError> {
        let http = Client::builder().timeout(Duration::from_secs(120)).build()?;
        Ok(Self {
            http,
            probe_url: probe_url.to_string(),
            api_url: api_url.trim_end_matches('/').to_string(),
            content_url: content_url.trim_end_matches('/').to_string(),
        })
    }

    async fn api_error(response: reqwest::Response) -> ApiError {
        let status = response.status().as_u16();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => return ApiError::Network(e),
        };

        let summary = serde_json::from_str::<ErrorResponse>(&body)
            .map(|e| e.error_summary)
            .unwrap_or(body);

        ApiError::Api { status, summary }
    }
}

#[async_trait]
impl DropboxApi for DropboxClient {
    async fn is_reachable(&self) -> bool {
        match self.http.head(&self.probe_url).send().await {
            Ok(response) => {
                debug!("Dropbox probe answered {}", response.status());
                response.status() == StatusCode::OK
            }
            Err(e) => {
                debug!("Dropbox probe failed: {}", e);
                false
            }
        }
    }

    async fn files_upload(
        &self,
        access_token: &str,
        data: Vec<u8>,
        path: &str,
        mode: WriteMode,
        client_modified: DateTime<Utc>,
        mute: bool,
    ) -> Result<FileMetadata, ApiError> {
        let arg = UploadArg {
            path,
            mode,
            autorename: false,
            client_modified: client_modified.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            mute,
        };

        let response = self
            .http
            .post(format!("{}/2/files/upload", self.content_url))
            .bearer_auth(access_token)
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .header("Dropbox-API-Arg", header_safe_json(&arg)?)
            .body(data)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }

        Ok(response.json::<FileMetadata>().await?)
    }

    async fn files_get_temporary_link(
        &self,
        access_token: &str,
        path: &str,
    ) -> Result<String, ApiError> {
        let response = self
            .http
            .post(format!("{}/2/files/get_temporary_link", self.api_url))
            .bearer_auth(access_token)
            .json(&serde_json::json!({ "path": path }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }

        Ok(response.json::<TemporaryLinkResponse>().await?.link)
    }
}

/// Serializes to JSON with every non-ASCII character escaped, as HTTP headers require
fn header_safe_json<T: Serialize>(value: &T) -> Result<String, ApiError> {
    let json = serde_json::to_string(value)?;
    let mut out = String::with_capacity(json.len());
    for c in json.chars() {
        if c.is_ascii() && c != '\x7f' {
            out.push(c);
        } else {
            let mut units = [0u16; 2];
            for unit in c.encode_utf16(&mut units) {
                out.push_str(&format!("\\u{:04x}", unit));
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        Json, Router,
        body::Bytes,
        http::{HeaderMap, StatusCode},
        routing::{get, post},
    };
    use chrono::TimeZone;

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn client(base: &str) -> DropboxClient {
        DropboxClient::with_base_urls(base, base, base).unwrap()
    }

    #[test]
    fn test_header_safe_json_escapes_non_ascii() {
        let json =
            header_safe_json(&serde_json::json!({ "path": "/Pibooth/café 📷.jpg" })).unwrap();
        assert_eq!(json, r#"{"path":"/Pibooth/caf\u00e9 \ud83d\udcf7.jpg"}"#);
        assert!(json.is_ascii());
    }

    #[test]
    fn test_write_mode_tags() {
        assert_eq!(serde_json::to_string(&WriteMode::Add).unwrap(), r#""add""#);
        assert_eq!(serde_json::to_string(&WriteMode::Overwrite).unwrap(), r#""overwrite""#);
    }

    #[tokio::test]
    async fn test_upload_sends_arg_header() {
        let app = Router::new().route(
            "/2/files/upload",
            post(|headers: HeaderMap, body: Bytes| async move {
                assert_eq!(headers["authorization"], "Bearer sl.token");
                assert_eq!(headers["content-type"], "application/octet-stream");
                let arg: serde_json::Value =
                    serde_json::from_str(headers["dropbox-api-arg"].to_str().unwrap()).unwrap();
                assert_eq!(arg["path"], "/Pibooth/pic.jpg");
                assert_eq!(arg["mode"], "add");
                assert_eq!(arg["mute"], true);
                assert_eq!(arg["client_modified"], "2026-10-19T08:30:00Z");
                Json(serde_json::json!({
                    "name": "pic.jpg",
                    "path_lower": "/pibooth/pic.jpg",
                    "path_display": "/Pibooth/pic.jpg",
                    "id": "id:a4ayc_80_OEAAAAAAAAAXw",
                    "size": body.len(),
                    "rev": "a1c10ce0dd78",
                    "client_modified": "2026-10-19T08:30:00Z",
                    "server_modified": "2026-10-19T08:30:01Z"
                }))
            }),
        );
        let base = serve(app).await;
        let modified = Utc.with_ymd_and_hms(2026, 10, 19, 8, 30, 0).unwrap();

        let meta = client(&base)
            .files_upload(
                "sl.token",
                vec![1, 2, 3],
                "/Pibooth/pic.jpg",
                WriteMode::Add,
                modified,
                true,
            )
            .await
            .unwrap();

        assert_eq!(meta.path_lower, "/pibooth/pic.jpg");
        assert_eq!(meta.size, 3);
    }

    #[tokio::test]
    async fn test_upload_conflict_is_api_error() {
        let app = Router::new().route(
            "/2/files/upload",
            post(|| async {
                (
                    StatusCode::CONFLICT,
                    Json(serde_json::json!({
                        "error_summary": "path/conflict/file/..",
                        "error": { ".tag": "path" }
                    })),
                )
            }),
        );
        let base = serve(app).await;

        let err = client(&base)
            .files_upload("t", vec![], "/a.jpg", WriteMode::Add, Utc::now(), true)
            .await
            .unwrap_err();
        match err {
            ApiError::Api { status, summary } => {
                assert_eq!(status, 409);
                assert_eq!(summary, "path/conflict/file/..");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_get_temporary_link() {
        let app = Router::new().route(
            "/2/files/get_temporary_link",
            post(|Json(body): Json<serde_json::Value>| async move {
                assert_eq!(body["path"], "/pibooth/pic.jpg");
                Json(serde_json::json!({
                    "metadata": { "name": "pic.jpg" },
                    "link": "https://ucdf1234.dl.dropboxusercontent.com/cd/0/get/pic.jpg"
                }))
            }),
        );
        let base = serve(app).await;

        let link = client(&base)
            .files_get_temporary_link("t", "/pibooth/pic.jpg")
            .await
            .unwrap();
        assert_eq!(link, "https://ucdf1234.dl.dropboxusercontent.com/cd/0/get/pic.jpg");
    }

    #[tokio::test]
    async fn test_is_reachable() {
        let up = serve(Router::new().route("/", get(|| async { "ok" }))).await;
        assert!(client(&up).is_reachable().await);

        let down = serve(Router::new().route(
            "/",
            get(|| async { StatusCode::SERVICE_UNAVAILABLE }),
        ))
        .await;
        assert!(!client(&down).is_reachable().await);
    }

    #[tokio::test]
    async fn test_unreachable_when_nothing_listens() {
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let base = format!("http://127.0.0.1:{}", port);
        assert!(!client(&base).is_reachable().await);
    }
}
