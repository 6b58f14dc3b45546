//! In-memory stand-ins for Dropbox and the browser consent, shared by the unit tests

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use oauth::{Authorizer, Credential, OAuthError};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::io::Write;
use std::sync::{Arc, Mutex};
use tracing_subscriber::fmt::MakeWriter;

use crate::api::{DropboxApi, FileMetadata, WriteMode};
use crate::error::ApiError;

#[derive(Debug, Clone)]
pub struct RecordedUpload {
    pub access_token: String,
    pub path: String,
    pub mode: WriteMode,
    pub bytes: usize,
    pub client_modified: DateTime<Utc>,
}

#[derive(Default)]
pub struct FakeApi {
    pub reachable: AtomicBool,
    pub fail_upload: AtomicBool,
    pub fail_link: AtomicBool,
    pub probes: AtomicUsize,
    pub uploads: Mutex<Vec<RecordedUpload>>,
    pub link_requests: Mutex<Vec<String>>,
}

impl FakeApi {
    pub fn new(reachable: bool) -> Arc<Self> {
        let api = Self::default();
        api.reachable.store(reachable, Ordering::SeqCst);
        Arc::new(api)
    }

    pub fn upload_count(&self) -> usize {
        self.uploads.lock().unwrap().len()
    }
}

#[async_trait]
impl DropboxApi for FakeApi {
    async fn is_reachable(&self) -> bool {
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.reachable.load(Ordering::SeqCst)
    }

    async fn files_upload(
        &self,
        access_token: &str,
        data: Vec<u8>,
        path: &str,
        mode: WriteMode,
        client_modified: DateTime<Utc>,
        _mute: bool,
    ) -> Result<FileMetadata, ApiError> {
        self.uploads.lock().unwrap().push(RecordedUpload {
            access_token: access_token.to_string(),
            path: path.to_string(),
            mode,
            bytes: data.len(),
            client_modified,
        });

        if self.fail_upload.load(Ordering::SeqCst) {
            return Err(ApiError::Api {
                status: 409,
                summary: "path/conflict/file/..".into(),
            });
        }

        Ok(FileMetadata {
            name: path.rsplit('/').next().unwrap_or_default().to_string(),
            path_lower: path.to_lowercase(),
            path_display: path.to_string(),
            id: "id:fake".into(),
            size: data.len() as u64,
            rev: "1".into(),
            client_modified: client_modified.to_rfc3339(),
            server_modified: Utc::now().to_rfc3339(),
        })
    }

    async fn files_get_temporary_link(
        &self,
        _access_token: &str,
        path: &str,
    ) -> Result<String, ApiError> {
        self.link_requests.lock().unwrap().push(path.to_string());
        if self.fail_link.load(Ordering::SeqCst) {
            return Err(ApiError::Api {
                status: 409,
                summary: "path/not_found/..".into(),
            });
        }
        Ok(format!("https://dl.dropboxusercontent.com/fake{}", path))
    }
}

pub struct FakeAuthorizer {
    pub calls: AtomicUsize,
    fail: bool,
}

impl FakeAuthorizer {
    pub fn granting() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail: false,
        })
    }

    pub fn denying() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail: true,
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Authorizer for FakeAuthorizer {
    async fn authorize(&self) -> oauth::Result<Credential> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(OAuthError::AccessDenied {
                error: "access_denied".into(),
                description: None,
            });
        }
        Ok(credential("sl.fresh"))
    }
}

/// A credential that never needs refreshing
pub fn credential(token: &str) -> Credential {
    Credential::new(
        token,
        "refresh",
        oauth::constants::DROPBOX_TOKEN_URL,
        "dbid:abc",
        "12345",
        oauth::constants::DROPBOX_SCOPES,
        None,
    )
}

/// Collects formatted log lines so tests can assert on emitted events
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    pub fn subscriber(&self) -> impl tracing::Subscriber + Send + Sync + 'static {
        tracing_subscriber::fmt()
            .with_writer(self.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish()
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = LogCapture;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
