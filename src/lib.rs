//! Directory-serving HTTP engine with browser uploads.
//!
//! Serves a directory tree as static files and themed HTML listings, and
//! accepts multipart uploads into any served directory. It can run as the
//! bundled binary or be mounted into another axum application.

pub mod config;
pub mod error;
pub mod handlers;
pub mod listing;
pub mod paths;
pub mod request;
pub mod routes;
pub mod sort;
pub mod theme;
pub mod upload;

use std::path::PathBuf;
use std::sync::Arc;

pub use config::Config;
pub use error::FileServerError;
pub use theme::{DynamicTheme, EmbeddedTheme, Theme};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Root directory to serve files from
    pub root_dir: PathBuf,
    pub config: Arc<Config>,
    /// Theme rendering listings and error pages
    pub theme: Arc<dyn Theme>,
}

impl AppState {
    /// State with the default config and the embedded theme.
    pub fn new(root_dir: PathBuf) -> Result<Self, FileServerError> {
        Ok(Self::with_config(
            root_dir,
            Config::default(),
            Arc::new(EmbeddedTheme::new()?),
        ))
    }

    pub fn with_config(root_dir: PathBuf, config: Config, theme: Arc<dyn Theme>) -> Self {
        Self {
            root_dir,
            config: Arc::new(config),
            theme,
        }
    }
}
