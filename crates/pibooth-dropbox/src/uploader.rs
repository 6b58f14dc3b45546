//! Picture upload with lazy Dropbox authorization
//!
//! A [`DropboxUploader`] is either `Disabled` (no session: Dropbox was not
//! reachable or authorization failed) or `Authorized`. Every upload checks
//! reachability first, and a disabled uploader retries authorization before
//! uploading, so the plugin recovers when the network comes back.

use chrono::{DateTime, SubsecRound, Utc};
use oauth::{Authorizer, Credential};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::api::{DropboxApi, FileMetadata, WriteMode};
use crate::session::Session;
use crate::stopwatch::Stopwatch;

/// Session lifecycle of the uploader
#[derive(Debug)]
pub enum SessionState {
    Disabled,
    Authorized(Session),
}

/// Builds the Dropbox path of an uploaded picture, collapsing repeated separators
pub fn upload_path(folder: &str, name: &str) -> String {
    let raw = format!("/{}/{}", folder, name);
    let mut path = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c == '/' && path.ends_with('/') {
            continue;
        }
        path.push(c);
    }
    path
}

/// Uploads pictures to Dropbox
///
/// `token_cache_file` is created on the first successful authorization and
/// reused afterwards, so the browser consent only happens once.
pub struct DropboxUploader {
    app_key: String,
    app_secret: String,
    token_cache_file: PathBuf,
    api: Arc<dyn DropboxApi>,
    authorizer: Arc<dyn Authorizer>,
    state: SessionState,
    debug: bool,
}

impl DropboxUploader {
    /// Creates the uploader and authorizes it when Dropbox is reachable
    pub async fn new(
        app_key: &str,
        app_secret: &str,
        token_cache_file: PathBuf,
        api: Arc<dyn DropboxApi>,
        authorizer: Arc<dyn Authorizer>,
    ) -> Self {
        let mut uploader = Self {
            app_key: app_key.to_string(),
            app_secret: app_secret.to_string(),
            token_cache_file,
            api,
            authorizer,
            state: SessionState::Disabled,
            debug: false,
        };

        if uploader.is_reachable().await {
            if let Err(e) = uploader.establish_session().await {
                error!(
                    "Dropbox authorization failed, upload deactivated for now: {}",
                    e
                );
            }
        } else {
            warn!("Dropbox is not reachable, authorization postponed");
        }

        uploader
    }

    /// Promotes the per-step traces to info level
    pub fn set_debug(&mut self, debug: bool) {
        self.debug = debug;
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_authorized(&self) -> bool {
        matches!(self.state, SessionState::Authorized(_))
    }

    pub fn token_cache_file(&self) -> &Path {
        &self.token_cache_file
    }

    /// Checks if Dropbox is reachable
    pub async fn is_reachable(&self) -> bool {
        self.api.is_reachable().await
    }

    fn trace(&self, message: &str) {
        if self.debug {
            info!("{}", message);
        } else {
            debug!("{}", message);
        }
    }

    /// Moves to `Authorized`, from the token cache or through a fresh authorization
    async fn establish_session(&mut self) -> oauth::Result<()> {
        let credential = self.load_or_authorize().await?;
        self.state = SessionState::Authorized(Session::new(
            &self.app_key,
            &self.app_secret,
            credential,
        ));
        info!("Dropbox session authorized");
        Ok(())
    }

    async fn load_or_authorize(&self) -> oauth::Result<Credential> {
        let path = &self.token_cache_file;
        let cached = std::fs::metadata(path)
            .map(|meta| meta.len() > 0)
            .unwrap_or(false);

        if cached {
            match Credential::from_authorized_user_file(path) {
                Ok(credential) => return Ok(credential),
                Err(e) => warn!(
                    "Can not load Dropbox token from file {:?}, authorizing again: {}",
                    path, e
                ),
            }
        }

        let credential = self.authorizer.authorize().await?;
        debug!("First use of pibooth-dropbox: store token in file {:?}", path);
        if let Err(e) = credential.save(path) {
            warn!("Can not save Dropbox token in file {:?}: {}", path, e);
        }

        Ok(credential)
    }

    /// Uploads a picture into `folder` under `name`
    ///
    /// Returns `None` when Dropbox is unreachable, no session can be
    /// established, the picture can not be read or Dropbox rejects it.
    pub async fn upload(
        &mut self,
        fullname: &Path,
        folder: &str,
        name: &str,
        overwrite: bool,
    ) -> Option<FileMetadata> {
        if !self.is_reachable().await {
            error!("Dropbox upload failure: no internet connection!");
            return None;
        }

        if !self.is_authorized() {
            // Plugin was disabled at startup but activated after
            if let Err(e) = self.establish_session().await {
                error!("Dropbox upload failure: {}", e);
                return None;
            }
        }

        self.trace(&format!("fullname -> {}", fullname.display()));
        self.trace(&format!("folder -> {}", folder));
        self.trace(&format!("name -> {}", name));

        let path = upload_path(folder, name);
        self.trace(&format!("path -> {}", path));

        let mode = if overwrite {
            WriteMode::Overwrite
        } else {
            WriteMode::Add
        };

        let (client_modified, data) = match read_picture(fullname).await {
            Ok(picture) => picture,
            Err(e) => {
                error!("Can not read picture {:?}: {}", fullname, e);
                return None;
            }
        };

        let access_token = match &mut self.state {
            SessionState::Authorized(session) => match session.access_token().await {
                Ok(token) => token,
                Err(e) => {
                    error!("Dropbox upload failure: {}", e);
                    return None;
                }
            },
            SessionState::Disabled => return None,
        };

        let result = {
            let _timer = Stopwatch::start(format!("Upload {} bytes", data.len()), data.len());
            self.api
                .files_upload(&access_token, data, &path, mode, client_modified, true)
                .await
        };

        match result {
            Ok(meta) => {
                self.trace(&format!("Uploaded as {}", meta.name));
                Some(meta)
            }
            Err(e) => {
                error!("*** Dropbox API error: {}", e);
                None
            }
        }
    }

    /// Gets a temporary URL for an uploaded picture (valid 4 hours only)
    pub async fn get_temp_url(&mut self, path: &str) -> Option<String> {
        let access_token = match &mut self.state {
            SessionState::Authorized(session) => match session.access_token().await {
                Ok(token) => token,
                Err(e) => {
                    error!("Can not get temporary URL for Dropbox: {}", e);
                    return None;
                }
            },
            SessionState::Disabled => {
                error!("Can not get temporary URL for Dropbox: no authorized session");
                return None;
            }
        };

        match self.api.files_get_temporary_link(&access_token, path).await {
            Ok(link) => {
                self.trace(&format!("Temporary picture URL -> {}", link));
                Some(link)
            }
            Err(e) => {
                error!("Can not get temporary URL for Dropbox: {}", e);
                None
            }
        }
    }
}

/// Reads the modification time (whole seconds, UTC) and the full content of a picture
async fn read_picture(path: &Path) -> std::io::Result<(DateTime<Utc>, Vec<u8>)> {
    let modified = tokio::fs::metadata(path).await?.modified()?;
    let client_modified = DateTime::<Utc>::from(modified).trunc_subsecs(0);
    let data = tokio::fs::read(path).await?;
    Ok((client_modified, data))
}
