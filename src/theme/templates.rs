use std::time::{Duration, UNIX_EPOCH};

use minijinja::Environment;

use crate::error::FileServerError;
use crate::listing::Listing;
use crate::theme::ErrorPage;

/// Template rendering a directory listing.
pub const LISTING_TEMPLATE: &str = "html/dir.html";

/// Template rendering an error page.
pub const ERROR_TEMPLATE: &str = "html/err.html";

/// A parsed set of theme templates with the helper filters registered.
pub struct Templates {
    env: Environment<'static>,
}

impl Templates {
    /// Parse both templates, fetching each source through `source`.
    pub fn load<F>(mut source: F) -> Result<Self, FileServerError>
    where
        F: FnMut(&str) -> Result<String, FileServerError>,
    {
        let mut env = Environment::new();
        env.add_filter("format_time", format_time);
        env.add_filter("format_size", format_size);
        env.add_filter("format_mode", format_mode);

        for name in [LISTING_TEMPLATE, ERROR_TEMPLATE] {
            env.add_template_owned(name, source(name)?)?;
        }

        Ok(Self { env })
    }

    pub fn render_listing(&self, listing: &Listing) -> Result<String, FileServerError> {
        Ok(self.env.get_template(LISTING_TEMPLATE)?.render(listing)?)
    }

    pub fn render_error(&self, page: &ErrorPage) -> Result<String, FileServerError> {
        Ok(self.env.get_template(ERROR_TEMPLATE)?.render(page)?)
    }
}

/// HTTP date for a Unix timestamp.
fn format_time(secs: u64) -> String {
    httpdate::fmt_http_date(UNIX_EPOCH + Duration::from_secs(secs))
}

/// Human readable size in binary units.
pub(crate) fn format_size(size: u64) -> String {
    const UNITS: [&str; 7] = ["B", "KB", "MB", "GB", "TB", "PB", "EB"];

    if size < 1024 {
        return format!("{size} B");
    }

    let mut value = size as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let formatted = format!("{value:.1}");
    let formatted = formatted.strip_suffix(".0").unwrap_or(&formatted);
    format!("{formatted} {}", UNITS[unit])
}

/// `rwxr-xr-x` style rendering of permission bits.
pub(crate) fn format_mode(mode: u32) -> String {
    "rwxrwxrwx"
        .chars()
        .enumerate()
        .map(|(i, c)| if mode & (1 << (8 - i)) != 0 { c } else { '-' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(1023), "1023 B");
        assert_eq!(format_size(1024), "1 KB");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5 MB");
        assert_eq!(format_size(4 * 1024 * 1024 * 1024), "4 GB");
    }

    #[test]
    fn test_format_mode() {
        assert_eq!(format_mode(0o755), "rwxr-xr-x");
        assert_eq!(format_mode(0o644), "rw-r--r--");
        assert_eq!(format_mode(0), "---------");
    }

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(0), "Thu, 01 Jan 1970 00:00:00 GMT");
        assert_eq!(format_time(784111777), "Sun, 06 Nov 1994 08:49:37 GMT");
    }

    #[test]
    fn test_load_reports_missing_source() {
        let result = Templates::load(|name| Err(FileServerError::NotFound(name.to_string())));
        assert!(matches!(result, Err(FileServerError::NotFound(name)) if name == LISTING_TEMPLATE));
    }

    #[test]
    fn test_load_rejects_broken_syntax() {
        let result = Templates::load(|_| Ok("{% for x in %}".to_string()));
        assert!(matches!(result, Err(FileServerError::Template(_))));
    }
}
