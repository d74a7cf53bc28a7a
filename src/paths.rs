//! Lexical URL path cleaning and mapping of request paths onto a root
//! directory.

use std::path::{Component, Path, PathBuf};

use tracing::{error, warn};

use crate::error::FileServerError;

/// Clean a request path lexically.
///
/// The result always begins with `/`, never ends with `/` (except for the
/// root itself), has no empty, `.` or `..` segments, and `..` never climbs
/// above the root. The filesystem is not consulted.
pub fn clean_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            name => segments.push(name),
        }
    }

    let mut cleaned = String::with_capacity(path.len() + 1);
    for segment in &segments {
        cleaned.push('/');
        cleaned.push_str(segment);
    }
    if cleaned.is_empty() {
        cleaned.push('/');
    }
    cleaned
}

/// Parent of a cleaned path, or `None` for the root.
pub fn parent_path(cleaned: &str) -> Option<&str> {
    if cleaned == "/" {
        return None;
    }
    match cleaned.rfind('/') {
        Some(0) => Some("/"),
        Some(idx) => Some(&cleaned[..idx]),
        None => Some("/"),
    }
}

/// Join a cleaned path and a member name.
pub fn join_path(cleaned: &str, name: &str) -> String {
    if cleaned.ends_with('/') {
        format!("{cleaned}{name}")
    } else {
        format!("{cleaned}/{name}")
    }
}

/// Map a request path onto `root` without touching the filesystem.
///
/// `relative` is either a path already run through [`clean_path`] (the
/// served root) or a theme-relative name such as `html/dir.html` (a theme
/// directory). Its leading `/` is dropped, so `/` itself maps to `root`.
/// Cleaned input has no `..` left, but template and asset names do not pass
/// through the cleaner, so `..`, absolute components and NUL bytes are still
/// rejected here as traversal.
pub fn resolve_path(root: &Path, relative: &str) -> Result<PathBuf, FileServerError> {
    let mut resolved = root.to_path_buf();

    for component in Path::new(relative.trim_start_matches('/')).components() {
        let name = match component {
            Component::Normal(name) if !name.as_encoded_bytes().contains(&0) => name,
            Component::CurDir => continue,
            other => {
                warn!("Rejected {:?}: {:?} is not a plain name", relative, other);
                return Err(FileServerError::PathTraversal);
            }
        };
        resolved.push(name);
    }

    if !resolved.starts_with(root) {
        error!("{:?} resolved outside {:?}", relative, root);
        return Err(FileServerError::PathTraversal);
    }

    Ok(resolved)
}

/// [`resolve_path`] plus a symlink check for entries that exist.
///
/// A served file or theme asset may be a symlink; following it must land
/// inside `root`, otherwise the request is refused with
/// [`FileServerError::PathTraversal`] and shows up as a 403 page. Existing
/// paths come back canonical. Missing ones come back as built, so the
/// dispatcher's stat reports the 404 and can still try the theme assets.
pub fn resolve_and_verify_path(root: &Path, relative: &str) -> Result<PathBuf, FileServerError> {
    let resolved = resolve_path(root, relative)?;
    if !resolved.exists() {
        return Ok(resolved);
    }

    let canonical = resolved.canonicalize().map_err(FileServerError::Io)?;
    let canonical_root = root.canonicalize().map_err(FileServerError::Io)?;
    if canonical.starts_with(&canonical_root) {
        return Ok(canonical);
    }

    warn!(
        "{:?} follows a symlink to {:?}, outside {:?}",
        relative, canonical, canonical_root
    );
    Err(FileServerError::PathTraversal)
}
