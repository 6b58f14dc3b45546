//! Photobooth lifecycle hooks
//!
//! The host owns a [`PluginState`] and passes it to each hook together with
//! its current [`Config`]. Options are re-read at every hook since they can
//! be edited while the photobooth runs.

use anyhow::Context;
use common::config::{DEFAULT_ALBUM_NAME, OptionSpec, SECTION};
use common::Config;
use oauth::constants::DROPBOX_SCOPES;
use oauth::{Authorizer, FlowOptions, LocalServerAuthorizer};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::api::{DropboxApi, DropboxClient};
use crate::uploader::DropboxUploader;

/// File, next to the host configuration, where the Dropbox credential is cached
pub const CACHE_FILE: &str = ".dropbox_token.json";

/// Plugin state owned by the host application
#[derive(Default)]
pub struct PluginState {
    /// Uploader, absent while the plugin is deactivated
    pub dropbox: Option<DropboxUploader>,

    /// Last picture produced by the photobooth
    pub previous_picture_file: Option<PathBuf>,

    /// Temporary Dropbox URL of the last picture, for the host to display
    pub previous_picture_url: Option<String>,
}

impl PluginState {
    pub fn is_enabled(&self) -> bool {
        self.dropbox.is_some()
    }
}

/// Declares the plugin configuration options
pub fn configure() -> Vec<OptionSpec> {
    vec![
        OptionSpec {
            section: SECTION,
            name: "album_name",
            default: DEFAULT_ALBUM_NAME.to_string(),
            description: "Dropbox folder where pictures are uploaded. Subfolders can be separated by /",
            menu_name: Some("Folder name"),
            menu_choices: vec![DEFAULT_ALBUM_NAME.to_string()],
        },
        OptionSpec {
            section: SECTION,
            name: "app_key",
            default: String::new(),
            description: "Dropbox Application Key",
            menu_name: None,
            menu_choices: vec![],
        },
        OptionSpec {
            section: SECTION,
            name: "app_secret",
            default: String::new(),
            description: "Dropbox Application Password",
            menu_name: None,
            menu_choices: vec![],
        },
        OptionSpec {
            section: SECTION,
            name: "debug",
            default: "false".to_string(),
            description: "Log every Dropbox upload step at info level",
            menu_name: Some("Debug mode"),
            menu_choices: vec!["true".to_string(), "false".to_string()],
        },
    ]
}

/// Removes the cached credential on a hard reset
pub fn reset(cfg: &Config, hard: bool) {
    if !hard {
        return;
    }

    let path = cfg.join_path(CACHE_FILE);
    if path.is_file() {
        info!("Remove Dropbox authorizations {:?}", path);
        if let Err(e) = remove_cache_file(&path) {
            error!("{:#}", e);
        }
    }
}

fn remove_cache_file(path: &Path) -> anyhow::Result<()> {
    std::fs::remove_file(path)
        .with_context(|| format!("Can not remove Dropbox token file {:?}", path))
}

/// Creates the Dropbox uploader
pub async fn startup(state: &mut PluginState, cfg: &Config) {
    let api = match DropboxClient::new() {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!("Dropbox API initialization error, upload deactivated: {}", e);
            state.previous_picture_url = None;
            state.dropbox = None;
            return;
        }
    };
    let authorizer = Arc::new(LocalServerAuthorizer::new(
        &cfg.dropbox.app_key,
        &cfg.dropbox.app_secret,
        DROPBOX_SCOPES,
        FlowOptions::default(),
    ));

    startup_with(state, cfg, api, authorizer).await;
}

/// Creates the Dropbox uploader on top of the given API and authorizer
pub async fn startup_with(
    state: &mut PluginState,
    cfg: &Config,
    api: Arc<dyn DropboxApi>,
    authorizer: Arc<dyn Authorizer>,
) {
    state.previous_picture_url = None;

    if !cfg.dropbox.has_credentials() {
        debug!(
            "No credentials defined in [{}][app_key/app_secret], upload deactivated",
            SECTION
        );
        state.dropbox = None;
        return;
    }

    info!("Initialize Dropbox connection");
    let mut uploader = DropboxUploader::new(
        &cfg.dropbox.app_key,
        &cfg.dropbox.app_secret,
        cfg.join_path(CACHE_FILE),
        api,
        authorizer,
    )
    .await;
    uploader.set_debug(cfg.dropbox.debug);

    state.dropbox = Some(uploader);
}

/// Uploads the last picture and keeps its temporary URL
pub async fn state_processing_exit(state: &mut PluginState, cfg: &Config) {
    let Some(dropbox) = state.dropbox.as_mut() else {
        return;
    };

    let Some(picture) = state.previous_picture_file.as_deref() else {
        warn!("No picture to upload to Dropbox");
        state.previous_picture_url = None;
        return;
    };

    let name = picture
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    dropbox.set_debug(cfg.dropbox.debug);
    let url = match dropbox
        .upload(picture, &cfg.dropbox.album_name, &name, false)
        .await
    {
        Some(meta) => dropbox.get_temp_url(&meta.path_lower).await,
        None => None,
    };

    state.previous_picture_url = url;
}
