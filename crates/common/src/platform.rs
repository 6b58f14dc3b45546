use std::path::PathBuf;
use tracing::debug;

/// Directory name used under the per-user configuration directory
const APP_DIR: &str = "pibooth";

/// Name of the host configuration file
const CONFIG_FILE: &str = "pibooth.toml";

/// Gets the default configuration directory for the photobooth.
/// - Linux: ~/.config/pibooth
/// - macOS: ~/Library/Application Support/pibooth
/// - Windows: %APPDATA%/pibooth
pub fn default_config_dir() -> Option<PathBuf> {
    let config_dir = dirs::config_dir()?;
    let dir = config_dir.join(APP_DIR);
    debug!("Default configuration directory: {:?}", dir);
    Some(dir)
}

/// Gets the default configuration file path.
///
/// Entry point for the host application, which owns the configuration file
/// and hands the loaded [`crate::Config`] to the plugin hooks.
pub fn get_config_path() -> Option<PathBuf> {
    Some(default_config_dir()?.join(CONFIG_FILE))
}
