use std::borrow::Cow;
use std::fs;
use std::path::PathBuf;

use tracing::error;

use crate::error::FileServerError;
use crate::listing::Listing;
use crate::paths::resolve_and_verify_path;
use crate::request::RequestInfo;
use crate::theme::{asset_path, ErrorPage, RenderedError, Templates, Theme, ThemeAsset};

/// A theme read from a directory on disk.
///
/// Templates are parsed again for every page so edits show up without a
/// restart. The directory uses the same layout as the embedded theme:
/// `html/dir.html`, `html/err.html` and any static assets.
pub struct DynamicTheme {
    root: PathBuf,
}

impl DynamicTheme {
    /// Check that `root` holds a loadable theme.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, FileServerError> {
        let root = root.into();
        if !root.is_dir() {
            return Err(FileServerError::NotFound(root.display().to_string()));
        }

        let theme = Self { root };
        theme.templates()?;
        Ok(theme)
    }

    fn templates(&self) -> Result<Templates, FileServerError> {
        Templates::load(|name| {
            let path = resolve_and_verify_path(&self.root, name)?;
            fs::read_to_string(&path).map_err(|err| FileServerError::from_io(err, name))
        })
    }
}

impl Theme for DynamicTheme {
    fn name(&self) -> String {
        format!("default (dynamic: {})", self.root.display())
    }

    fn render(&self, listing: &Listing) -> Result<String, FileServerError> {
        self.templates()?.render_listing(listing)
    }

    fn render_error(&self, request: &RequestInfo, err: &FileServerError) -> RenderedError {
        let page = ErrorPage::new(request, err);
        let html = self
            .templates()
            .and_then(|templates| templates.render_error(&page))
            .unwrap_or_else(|render_err| {
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
        let path = resolve_and_verify_path(&self.root, relative)?;

        let metadata = fs::metadata(&path).map_err(|err| FileServerError::from_io(err, name))?;
        if !metadata.is_file() {
            return Err(FileServerError::NotFound(name.to_string()));
        }
        let contents = fs::read(&path).map_err(|err| FileServerError::from_io(err, name))?;

        Ok(ThemeAsset {
            name: relative.to_string(),
            contents: Cow::Owned(contents),
            modified: metadata.modified().ok(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{Method, StatusCode, Uri};
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn write_theme(dir: &std::path::Path, listing: &str, error: &str) {
        fs::create_dir_all(dir.join("html")).unwrap();
        fs::create_dir_all(dir.join("css")).unwrap();
        fs::write(dir.join("html/dir.html"), listing).unwrap();
        fs::write(dir.join("html/err.html"), error).unwrap();
        fs::write(dir.join("css/dir.css"), "body {}").unwrap();
    }

    fn empty_listing() -> Listing {
        Listing {
            path: "/".to_string(),
            current_dir: String::new(),
            path_parts: Vec::new(),
            params: BTreeMap::new(),
            sort: "name",
            entries: Vec::new(),
        }
    }

    #[test]
    fn test_new_requires_templates() {
        let temp_dir = TempDir::new().unwrap();
        assert!(DynamicTheme::new(temp_dir.path()).is_err());
        assert!(DynamicTheme::new(temp_dir.path().join("missing")).is_err());

        write_theme(temp_dir.path(), "list", "err");
        assert!(DynamicTheme::new(temp_dir.path()).is_ok());
    }

    #[test]
    fn test_render_picks_up_template_edits() {
        let temp_dir = TempDir::new().unwrap();
        write_theme(temp_dir.path(), "first {{ sort }}", "err");
        let theme = DynamicTheme::new(temp_dir.path()).unwrap();

        assert_eq!(theme.render(&empty_listing()).unwrap(), "first name");

        fs::write(temp_dir.path().join("html/dir.html"), "second {{ sort }}").unwrap();
        assert_eq!(theme.render(&empty_listing()).unwrap(), "second name");
    }

    #[test]
    fn test_broken_error_template_falls_back() {
        let temp_dir = TempDir::new().unwrap();
        write_theme(temp_dir.path(), "list", "{{ status_code }}");
        let theme = DynamicTheme::new(temp_dir.path()).unwrap();

        let uri: Uri = "/x".parse().unwrap();
        let request = RequestInfo::new(&Method::GET, &uri);

        let page = theme.render_error(&request, &FileServerError::PathTraversal);
        assert_eq!(page.status, StatusCode::FORBIDDEN);
        assert_eq!(page.html, "403");

        fs::write(temp_dir.path().join("html/err.html"), "{% if %}").unwrap();
        let page = theme.render_error(&request, &FileServerError::PathTraversal);
        assert_eq!(page.status, StatusCode::FORBIDDEN);
        assert!(page.html.contains("403 Forbidden"));
    }

    #[test]
    fn test_open_asset_stays_inside_root() {
        let temp_dir = TempDir::new().unwrap();
        let theme_dir = temp_dir.path().join("theme");
        write_theme(&theme_dir, "list", "err");
        fs::write(temp_dir.path().join("secret.txt"), "secret").unwrap();
        let theme = DynamicTheme::new(&theme_dir).unwrap();

        let asset = theme.open_asset("/_theme/css/dir.css").unwrap();
        assert_eq!(asset.contents.as_ref(), b"body {}");
        assert!(asset.modified.is_some());

        assert!(matches!(
            theme.open_asset("/_theme/../secret.txt"),
            Err(FileServerError::PathTraversal)
        ));
        assert!(matches!(
            theme.open_asset("/_theme/css"),
            Err(FileServerError::NotFound(_))
        ));
    }
}
