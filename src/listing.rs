//! Directory listings: entry snapshots, the synthetic parent link and
//! breadcrumbs.

use std::collections::BTreeMap;
use std::fs::{self, Metadata};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Serialize, Serializer};
use tracing::debug;

use crate::error::FileServerError;
use crate::paths::{parent_path, resolve_and_verify_path};
use crate::request::RequestInfo;
use crate::sort::{sort_entries, SortKey};

/// Name of the synthetic entry linking to the parent directory.
pub const PARENT_NAME: &str = "..";

/// One entry of a directory listing.
#[derive(Debug, Clone, Serialize)]
pub struct DirectoryEntry {
    pub name: String,
    pub size: u64,
    /// Permission bits.
    pub mode: u32,
    #[serde(serialize_with = "unix_seconds")]
    pub modified: SystemTime,
    pub is_dir: bool,
}

impl DirectoryEntry {
    pub fn from_metadata(name: String, metadata: &Metadata) -> Self {
        Self {
            name,
            size: metadata.len(),
            mode: permission_bits(metadata),
            modified: metadata.modified().unwrap_or(UNIX_EPOCH),
            is_dir: metadata.is_dir(),
        }
    }
}

#[cfg(unix)]
fn permission_bits(metadata: &Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o777
}

#[cfg(not(unix))]
fn permission_bits(metadata: &Metadata) -> u32 {
    if metadata.permissions().readonly() {
        0o444
    } else {
        0o644
    }
}

fn unix_seconds<S: Serializer>(time: &SystemTime, serializer: S) -> Result<S::Ok, S::Error> {
    let secs = time
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    serializer.serialize_u64(secs)
}

/// One breadcrumb segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathPart {
    /// Directory name without slashes; empty for the root.
    pub label: String,
    /// Full path with slashes on both ends; `/` for the root.
    pub path: String,
}

/// Everything a theme needs to render a directory page.
#[derive(Debug, Serialize)]
pub struct Listing {
    /// Request path as decoded from the URL.
    pub path: String,
    pub current_dir: String,
    pub path_parts: Vec<PathPart>,
    pub params: BTreeMap<String, String>,
    pub sort: &'static str,
    pub entries: Vec<DirectoryEntry>,
}

/// Breadcrumbs for a cleaned directory path, root first.
///
/// Returns the label of the innermost directory (empty at the root) and the
/// parts.
pub fn path_parts(path: &str) -> (String, Vec<PathPart>) {
    let mut parts = vec![PathPart {
        label: String::new(),
        path: "/".to_string(),
    }];

    let mut prefix = String::from("/");
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        prefix.push_str(segment);
        prefix.push('/');
        parts.push(PathPart {
            label: segment.to_string(),
            path: prefix.clone(),
        });
    }

    let current = parts.last().map(|p| p.label.clone()).unwrap_or_default();
    (current, parts)
}

/// Read the entries of `dir`.
///
/// Symlinks report their target's metadata, or their own when the target is
/// gone.
pub fn read_entries(dir: &Path) -> Result<Vec<DirectoryEntry>, FileServerError> {
    let mut entries = Vec::new();

    for entry in fs::read_dir(dir).map_err(FileServerError::Io)? {
        let entry = entry.map_err(FileServerError::Io)?;
        let name = entry.file_name().to_string_lossy().to_string();
        if name == "." || name == PARENT_NAME {
            continue;
        }

        let metadata = match fs::metadata(entry.path()) {
            Ok(metadata) => metadata,
            Err(_) => entry.metadata().map_err(FileServerError::Io)?,
        };
        entries.push(DirectoryEntry::from_metadata(name, &metadata));
    }

    Ok(entries)
}

/// The `..` entry for a cleaned, non-root path, built from the parent's own
/// metadata.
pub fn parent_entry(root: &Path, cleaned: &str) -> Result<Option<DirectoryEntry>, FileServerError> {
    let Some(parent) = parent_path(cleaned) else {
        return Ok(None);
    };

    let parent_dir = resolve_and_verify_path(root, parent)?;
    let metadata = fs::metadata(&parent_dir).map_err(|err| FileServerError::from_io(err, parent))?;
    Ok(Some(DirectoryEntry::from_metadata(
        PARENT_NAME.to_string(),
        &metadata,
    )))
}

/// Read, sort and decorate the directory `dir` requested by `request`.
///
/// This is the single sort pass for a listing; the parent link is prepended
/// afterwards so it always stays on top.
pub fn build_listing(
    root: &Path,
    request: &RequestInfo,
    dir: &Path,
) -> Result<Listing, FileServerError> {
    let mut entries = read_entries(dir)?;
    let key: SortKey = request.sort_key();
    sort_entries(&mut entries, key);

    if let Some(parent) = parent_entry(root, &request.cleaned)? {
        entries.insert(0, parent);
    }

    debug!(
        "Listing {} ({} entries, sort {})",
        request.cleaned,
        entries.len(),
        key.as_param()
    );

    let (current_dir, path_parts) = path_parts(&request.cleaned);

    Ok(Listing {
        path: request.path.clone(),
        current_dir,
        path_parts,
        params: request.params.clone(),
        sort: key.as_param(),
        entries,
    })
}
