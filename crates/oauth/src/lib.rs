//! Dropbox OAuth 2.0 for installed applications
//!
//! This crate runs the one-time interactive authorization of the photobooth
//! against Dropbox and persists the resulting credential as JSON.

pub mod constants;
pub mod credentials;
pub mod error;
pub mod flow;
pub mod tokens;

pub use credentials::Credential;
pub use error::{OAuthError, Result};
pub use flow::{
    Authorizer, FlowOptions, InstalledAppFlow, LocalServerAuthorizer, RedirectListener,
};
pub use tokens::{exchange_code, refresh_access_token, ExchangeResult, RefreshedToken};
