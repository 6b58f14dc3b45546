//! Shared configuration and platform helpers for the Dropbox photobooth plugin.

pub mod config;
pub mod platform;

pub use config::{Config, ConfigError, DropboxConfig, OptionSpec};
