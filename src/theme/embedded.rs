use std::time::{Duration, UNIX_EPOCH};

use rust_embed::RustEmbed;
use tracing::error;

use crate::error::FileServerError;
use crate::listing::Listing;
use crate::request::RequestInfo;
use crate::theme::{asset_path, ErrorPage, RenderedError, Templates, Theme, ThemeAsset};

#[derive(RustEmbed)]
#[folder = "assets/theme/"]
struct DefaultAssets;

/// The default theme compiled into the binary. Templates are parsed once at
/// construction.
pub struct EmbeddedTheme {
    templates: Templates,
}

impl EmbeddedTheme {
    pub fn new() -> Result<Self, FileServerError> {
        let templates = Templates::load(|name| {
            let file = DefaultAssets::get(name)
                .ok_or_else(|| FileServerError::NotFound(name.to_string()))?;
            String::from_utf8(file.data.into_owned())
                .map_err(|_| FileServerError::InvalidPath(format!("{name} is not UTF-8")))
        })?;

        Ok(Self { templates })
    }
}

impl Theme for EmbeddedTheme {
    fn name(&self) -> String {
        "default (embedded)".to_string()
    }

    fn render(&self, listing: &Listing) -> Result<String, FileServerError> {
        self.templates.render_listing(listing)
    }

    fn render_error(&self, request: &RequestInfo, err: &FileServerError) -> RenderedError {
        let page = ErrorPage::new(request, err);
        let html = self.templates.render_error(&page).unwrap_or_else(|render_err| {
            error!("{}: rendering error page: {}", self.name(), render_err);
            page.fallback_html()
        });

        RenderedError {
            status: page.status(),
            html,
        }
    }

    fn open_asset(&self, name: &str) -> Result<ThemeAsset, FileServerError> {
        let relative = asset_path(name)?;
        let file =
            DefaultAssets::get(relative).ok_or_else(|| FileServerError::NotFound(name.to_string()))?;

        Ok(ThemeAsset {
            name: relative.to_string(),
            modified: file
                .metadata
                .last_modified()
                .map(|secs| UNIX_EPOCH + Duration::from_secs(secs)),
            contents: file.data,
        })
    }
}
