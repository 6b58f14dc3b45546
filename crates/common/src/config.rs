use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::platform;

/// Configuration section owned by the Dropbox plugin
pub const SECTION: &str = "DROPBOX";

/// Folder used when none is configured
pub const DEFAULT_ALBUM_NAME: &str = "Pibooth";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Host configuration as seen by the plugin
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "DROPBOX", alias = "dropbox", default)]
    pub dropbox: DropboxConfig,

    /// Directory that relative plugin files (token cache) live in
    #[serde(skip, default = "default_base_dir")]
    pub base_dir: PathBuf,
}

/// The `[DROPBOX]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DropboxConfig {
    /// Dropbox folder where pictures are uploaded, subfolders separated by `/`
    pub album_name: String,

    /// Dropbox application key
    pub app_key: String,

    /// Dropbox application secret
    pub app_secret: String,

    /// Promotes per-step upload traces to info level
    pub debug: bool,
}

impl Default for DropboxConfig {
    fn default() -> Self {
        Self {
            album_name: DEFAULT_ALBUM_NAME.to_string(),
            app_key: String::new(),
            app_secret: String::new(),
            debug: false,
        }
    }
}

impl DropboxConfig {
    /// Both the application key and secret are required to talk to Dropbox
    pub fn has_credentials(&self) -> bool {
        !self.app_key.is_empty() && !self.app_secret.is_empty()
    }
}

/// Declaration of a configuration option, as registered with the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionSpec {
    pub section: &'static str,
    pub name: &'static str,
    pub default: String,
    pub description: &'static str,
    /// Label shown in the host settings menu, if the option is editable there
    pub menu_name: Option<&'static str>,
    /// Values offered in the host settings menu
    pub menu_choices: Vec<String>,
}

fn default_base_dir() -> PathBuf {
    platform::default_config_dir().unwrap_or_else(|| PathBuf::from("."))
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dropbox: DropboxConfig::default(),
            base_dir: default_base_dir(),
        }
    }
}

impl Config {
    /// Loads the configuration from a TOML file.
    ///
    /// Relative plugin files are resolved against the file's directory.
    /// Called by the host application, typically with
    /// [`crate::platform::get_config_path`]; the plugin hooks only receive the result.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(default_base_dir);

        let config = Self::from_toml_str(&content, base_dir)?;
        debug!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Parses a TOML document, resolving plugin files against `base_dir`
    pub fn from_toml_str(content: &str, base_dir: PathBuf) -> Result<Self, ConfigError> {
        let mut config: Config = toml::from_str(content)?;
        config.base_dir = base_dir;
        Ok(config)
    }

    /// Returns the absolute path of a file stored next to the host configuration
    pub fn join_path(&self, name: &str) -> PathBuf {
        self.base_dir.join(name)
    }
}
