//! Local web server that walks an operator through the accounting API's
//! three-legged OAuth handshake and exports supplier contacts and the chart of
//! accounts to JSON files.

use std::path::PathBuf;

use crate::oauth::TokenStore;
use crate::upstream::UpstreamClient;

pub mod api;
pub mod config;
pub mod error;
pub mod export;
pub mod oauth;
pub mod resources;
pub mod upstream;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: TokenStore,
    pub upstream: UpstreamClient,
    /// Configuration file re-read on every request.
    pub config_path: PathBuf,
}

impl AppState {
    pub fn new(config_path: impl Into<PathBuf>) -> Result<Self, error::UpstreamError> {
        Ok(Self {
            store: TokenStore::new(),
            upstream: UpstreamClient::new()?,
            config_path: config_path.into(),
        })
    }
}
