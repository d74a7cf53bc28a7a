//! Pluggable renderers for listings and error pages.
//!
//! A theme also owns a small static filesystem (stylesheets, icons) that the
//! dispatcher falls back to when a request path does not exist under the
//! served root.

mod dynamic;
mod embedded;
mod templates;

use std::borrow::Cow;
use std::path::{Component, Path};
use std::time::SystemTime;

use axum::http::StatusCode;
use serde::Serialize;

use crate::error::{ErrorClass, FileServerError};
use crate::listing::Listing;
use crate::request::RequestInfo;

pub use dynamic::DynamicTheme;
pub use embedded::EmbeddedTheme;
pub use templates::Templates;

/// URL prefix under which theme assets are served.
pub const ASSET_PREFIX: &str = "/_theme/";

/// Renders listings and error pages and serves the theme's own assets.
pub trait Theme: Send + Sync {
    /// Stable display name for logs.
    fn name(&self) -> String;

    /// Render a complete listing page. Entries arrive already sorted.
    fn render(&self, listing: &Listing) -> Result<String, FileServerError>;

    /// Render an error page. Never fails; broken templates degrade to a plain
    /// page.
    fn render_error(&self, request: &RequestInfo, err: &FileServerError) -> RenderedError;

    /// Open a static asset addressed by its cleaned request path.
    fn open_asset(&self, name: &str) -> Result<ThemeAsset, FileServerError>;
}

/// A static file provided by a theme.
#[derive(Debug, Clone)]
pub struct ThemeAsset {
    pub name: String,
    pub contents: Cow<'static, [u8]>,
    pub modified: Option<SystemTime>,
}

/// A rendered error page and its status code.
#[derive(Debug, Clone)]
pub struct RenderedError {
    pub status: StatusCode,
    pub html: String,
}

/// Template context for error pages.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorPage {
    pub title: String,
    pub message: String,
    pub favicon: &'static str,
    pub status_code: u16,
    pub path: String,
}

impl ErrorPage {
    /// Classify `err` and pick wording for it. Only the internal page exposes
    /// the error text.
    pub fn new(request: &RequestInfo, err: &FileServerError) -> Self {
        let (status, message, favicon) = match err.class() {
            ErrorClass::NotFound => (
                StatusCode::NOT_FOUND,
                "Requested resource isn't found.".to_string(),
                "🌚",
            ),
            ErrorClass::Forbidden => (
                StatusCode::FORBIDDEN,
                "You do not have permission to access the requested resource.".to_string(),
                "🔒",
            ),
            ErrorClass::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Something went wrong: {err}."),
                "❌",
            ),
        };

        Self {
            title: status.canonical_reason().unwrap_or("Error").to_string(),
            message,
            favicon,
            status_code: status.as_u16(),
            path: request.path.clone(),
        }
    }

    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Minimal page used when the theme's own template cannot be rendered.
    pub fn fallback_html(&self) -> String {
        format!(
            "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>{title}</title></head>\
             <body><h1>{code} {title}</h1><p>{message}</p></body></html>",
            title = escape_html(&self.title),
            code = self.status_code,
            message = escape_html(&self.message),
        )
    }
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Strip [`ASSET_PREFIX`] from a request path and check the remainder is a
/// plain relative path inside the asset root.
pub(crate) fn asset_path(name: &str) -> Result<&str, FileServerError> {
    let relative = name
        .strip_prefix(ASSET_PREFIX)
        .ok_or_else(|| FileServerError::NotFound(name.to_string()))?;

    let plain = !relative.is_empty()
        && Path::new(relative)
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if !plain {
        return Err(FileServerError::PathTraversal);
    }

    Ok(relative)
}
