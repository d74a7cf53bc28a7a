//! Multipart uploads into a served directory.
//!
//! Each uploaded file is staged in a uniquely named temporary file inside the
//! destination directory and only renamed to its final name once every byte
//! has been written. Files of one request are saved concurrently and their
//! failures are collected rather than stopping at the first one.

use std::fs;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use axum::extract::{FromRequest, Multipart, Request};
use axum::http::header;
use futures::future::join_all;
use tempfile::{Builder, NamedTempFile, SpooledTempFile, TempPath};
use tracing::{debug, info, warn};

use crate::error::{FileServerError, UploadStage};
use crate::request::{RequestInfo, UPLOAD_PARAM};
use crate::AppState;

/// Multipart field carrying uploaded files, once or repeated.
pub const FILES_FIELD: &str = "files";

/// Number of random characters in a temporary file name.
const TEMP_RAND_LEN: usize = 8;

/// Longest file name, in bytes, most filesystems accept.
const MAX_NAME_LEN: usize = 255;

/// One file to be saved.
#[derive(Debug)]
pub struct UploadJob<R> {
    pub source: R,
    pub declared_name: String,
    pub declared_size: u64,
    pub destination_dir: PathBuf,
}

/// A file that was promoted to its final name.
#[derive(Debug, Clone)]
pub struct SavedFile {
    pub name: String,
    pub size: u64,
    pub path: PathBuf,
}

/// Save every file of a multipart upload into `destination_dir`.
///
/// The request must carry the `upload` query marker. All files are attempted
/// even when some of them fail; the returned error then holds one cause per
/// failure, in form order.
pub async fn handle_upload(
    state: &AppState,
    info: &RequestInfo,
    request: Request,
    destination_dir: PathBuf,
) -> Result<Vec<SavedFile>, FileServerError> {
    if !info.has_param(UPLOAD_PARAM) {
        return Err(FileServerError::Unhandled("missing upload marker"));
    }

    let mut multipart = Multipart::from_request(request, state).await?;
    let jobs = collect_jobs(state, &mut multipart, &destination_dir).await?;

    debug!(
        "Saving {} uploaded file(s) into {}",
        jobs.len(),
        destination_dir.display()
    );

    let saves = jobs.into_iter().map(|job| async move {
        let job = job?;
        tokio::task::spawn_blocking(move || save_file(job))
            .await
            .map_err(|err| FileServerError::Io(io::Error::other(err)))?
    });

    let mut saved = Vec::new();
    let mut errors = Vec::new();
    for result in join_all(saves).await {
        match result {
            Ok(file) => {
                info!("Uploaded file: {} ({} bytes)", file.path.display(), file.size);
                saved.push(file);
            }
            Err(err) => {
                warn!("Upload into {} failed: {}", destination_dir.display(), err);
                errors.push(err);
            }
        }
    }

    match FileServerError::join(errors) {
        Some(err) => Err(err),
        None => Ok(saved),
    }
}

/// Read every file part into a spool, enforcing the configured total size
/// over all fields of the form.
///
/// A part whose name cannot be used is recorded as a failed job so the other
/// parts are still saved.
async fn collect_jobs(
    state: &AppState,
    multipart: &mut Multipart,
    destination_dir: &Path,
) -> Result<Vec<Result<UploadJob<SpooledTempFile>, FileServerError>>, FileServerError> {
    let limit = state.config.max_upload_size;
    let mut total: u64 = 0;
    let mut jobs = Vec::new();

    while let Some(mut field) = multipart.next_field().await? {
        if field.name() != Some(FILES_FIELD) {
            // Other fields are dropped but still count toward the limit.
            while let Some(chunk) = field.chunk().await? {
                total = total.saturating_add(chunk.len() as u64);
                if total > limit {
                    return Err(FileServerError::SizeLimitExceeded { limit });
                }
            }
            continue;
        }

        let raw_name = field.file_name().unwrap_or_default().to_string();
        let header_size = field
            .headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok());

        let mut spool = SpooledTempFile::new(state.config.upload_memory_limit);
        let mut received: u64 = 0;
        while let Some(chunk) = field.chunk().await? {
            received = received.saturating_add(chunk.len() as u64);
            total = total.saturating_add(chunk.len() as u64);
            if total > limit {
                return Err(FileServerError::SizeLimitExceeded { limit });
            }
            spool.write_all(&chunk).map_err(FileServerError::Io)?;
        }
        spool.seek(SeekFrom::Start(0)).map_err(FileServerError::Io)?;

        let job = match sanitize_filename(&raw_name) {
            Some(declared_name) => Ok(UploadJob {
                source: spool,
                declared_name,
                declared_size: header_size.unwrap_or(received),
                destination_dir: destination_dir.to_path_buf(),
            }),
            None => {
                warn!("Rejected invalid filename: {:?}", raw_name);
                Err(FileServerError::InvalidPath(format!(
                    "Invalid filename: {raw_name}"
                )))
            }
        };
        jobs.push(job);
    }

    if jobs.is_empty() {
        return Err(FileServerError::Unhandled("no files to upload"));
    }

    Ok(jobs)
}

/// Copy one upload into a temporary file in its destination and promote it.
pub fn save_file<R: Read>(mut job: UploadJob<R>) -> Result<SavedFile, FileServerError> {
    let final_path = job.destination_dir.join(&job.declared_name);

    let mut temp = create_temp_file(&job.destination_dir, &job.declared_name)
        .map_err(FileServerError::upload(UploadStage::CreateTemp))?;
    debug!("Staging {} as {}", job.declared_name, temp.path().display());

    let expected = job.declared_size;
    let copied = io::copy(&mut job.source, temp.as_file_mut())
        .map_err(FileServerError::upload(UploadStage::Write))
        .and_then(|written| {
            if written == expected {
                Ok(())
            } else {
                Err(FileServerError::SizeMismatch { written, expected })
            }
        });

    close_and_promote(temp, copied, &final_path)?;

    Ok(SavedFile {
        name: job.declared_name,
        size: expected,
        path: final_path,
    })
}

/// Create the staging file for `name` in `dir`.
///
/// The random part goes before the extension, so `notes.txt` is staged as
/// `notes_XXXXXXXX.txt`. Long names lose the end of their stem so the staged
/// name still fits in [`MAX_NAME_LEN`].
pub fn create_temp_file(dir: &Path, name: &str) -> io::Result<NamedTempFile> {
    let (prefix, suffix) = temp_name_parts(name);
    Builder::new()
        .prefix(&prefix)
        .suffix(&suffix)
        .rand_bytes(TEMP_RAND_LEN)
        .tempfile_in(dir)
}

fn temp_name_parts(name: &str) -> (String, String) {
    let (stem, suffix) = match Path::new(name).extension().and_then(|ext| ext.to_str()) {
        Some(ext) => (&name[..name.len() - ext.len() - 1], &name[name.len() - ext.len() - 1..]),
        None => (name, ""),
    };

    // Room left once the random part and the `_` separator are in.
    let budget = MAX_NAME_LEN - TEMP_RAND_LEN - 1;
    let suffix = truncate_at_char(suffix, budget);
    let stem = truncate_at_char(stem, budget - suffix.len());

    (format!("{stem}_"), suffix.to_string())
}

/// Longest prefix of `text` that fits in `max` bytes without splitting a char.
fn truncate_at_char(text: &str, max: usize) -> &str {
    let mut end = text.len().min(max);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Close the staging file, then either delete it (the copy failed) or move
/// it to `final_path` unless something already lives there.
fn close_and_promote(
    temp: NamedTempFile,
    copied: Result<(), FileServerError>,
    final_path: &Path,
) -> Result<(), FileServerError> {
    let mut errors: Vec<FileServerError> = copied.err().into_iter().collect();

    if let Err(err) = temp.as_file().sync_all() {
        errors.push(FileServerError::upload(UploadStage::Sync)(err));
    }
    // Releases the handle; the file itself stays owned by the path.
    let temp_path = temp.into_temp_path();

    if !errors.is_empty() {
        if let Err(err) = temp_path.close() {
            errors.push(FileServerError::upload(UploadStage::RemoveTemp)(err));
        }
        return FileServerError::join(errors).map_or(Ok(()), Err);
    }

    match fs::symlink_metadata(final_path) {
        Ok(_) => Err(collision(temp_path, final_path)),
        Err(err) if err.kind() != io::ErrorKind::NotFound => {
            errors.push(FileServerError::upload(UploadStage::CheckExisting)(err));
            if let Err(err) = keep_temp(temp_path) {
                errors.push(err);
            }
            FileServerError::join(errors).map_or(Ok(()), Err)
        }
        Err(_) => match temp_path.persist_noclobber(final_path) {
            Ok(()) => Ok(()),
            Err(err) if err.error.kind() == io::ErrorKind::AlreadyExists => {
                Err(collision(err.path, final_path))
            }
            Err(err) => {
                errors.push(FileServerError::upload(UploadStage::Rename)(err.error));
                if let Err(err) = keep_temp(err.path) {
                    errors.push(err);
                }
                FileServerError::join(errors).map_or(Ok(()), Err)
            }
        },
    }
}

/// Leave the staging file under its temporary name.
fn keep_temp(temp_path: TempPath) -> Result<PathBuf, FileServerError> {
    temp_path
        .keep()
        .map_err(|err| FileServerError::upload(UploadStage::KeepTemp)(err.error))
}

fn collision(temp_path: TempPath, final_path: &Path) -> FileServerError {
    let name = file_name(final_path);
    match keep_temp(temp_path) {
        Ok(kept) => FileServerError::AlreadyExists {
            name,
            kept_as: file_name(&kept),
        },
        Err(err) => FileServerError::Multiple(vec![
            FileServerError::AlreadyExists {
                name,
                kept_as: String::new(),
            },
            err,
        ]),
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Sanitize a filename by removing dangerous characters and path components.
/// Returns None if the filename is invalid or empty after sanitization.
fn sanitize_filename(filename: &str) -> Option<String> {
    let sanitized: String = filename
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            _ => c,
        })
        .collect();

    // Leading dots would hide the file or climb directories.
    let sanitized = sanitized.trim_matches(' ').trim_start_matches('.');
    if sanitized.is_empty() {
        return None;
    }

    let upper = sanitized.to_uppercase();
    let reserved = [
        "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
        "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
    ];
    if reserved
        .iter()
        .any(|r| upper == *r || upper.starts_with(&format!("{}.", r)))
    {
        return None;
    }

    Some(truncate_at_char(sanitized, MAX_NAME_LEN).to_string())
}
