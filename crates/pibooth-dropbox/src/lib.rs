//! Photobooth plugin uploading pictures to Dropbox
//!
//! Each picture is uploaded into the configured Dropbox folder and a
//! temporary share link is handed back to the host. The first run goes
//! through the Dropbox consent page in a browser; the resulting credential
//! is cached next to the host configuration.

pub mod api;
pub mod error;
pub mod plugin;
pub mod session;
pub mod stopwatch;
pub mod uploader;

#[cfg(test)]
mod testing;

pub use api::{DropboxApi, DropboxClient, FileMetadata, WriteMode};
pub use error::ApiError;
pub use plugin::{PluginState, configure, reset, startup, startup_with, state_processing_exit};
pub use session::Session;
pub use uploader::{DropboxUploader, SessionState, upload_path};
