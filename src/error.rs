use std::fmt;
use std::io;

use axum::extract::multipart::{MultipartError, MultipartRejection};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FileServerError {
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Path is outside root directory")]
    PathTraversal,

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Upload too large: exceeds limit of {limit} bytes")]
    SizeLimitExceeded { limit: u64 },

    #[error("Wrote {written} bytes, expected {expected}")]
    SizeMismatch { written: u64, expected: u64 },

    #[error("Directory operation not allowed on file")]
    NotADirectory,

    #[error("Unhandled request: {0}")]
    Unhandled(&'static str),

    #[error("{name} already exists, upload kept as {kept_as}")]
    AlreadyExists { name: String, kept_as: String },

    #[error("{stage}: {source}")]
    Upload {
        stage: UploadStage,
        #[source]
        source: io::Error,
    },

    #[error("Parsing multipart form: {0}")]
    Multipart(#[from] MultipartError),

    #[error("Reading multipart form: {0}")]
    MultipartRejection(#[from] MultipartRejection),

    #[error("Template error: {0}")]
    Template(#[from] minijinja::Error),

    #[error("{}", join_messages(.0))]
    Multiple(Vec<FileServerError>),
}

/// The step of saving an upload that produced an I/O failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStage {
    CreateTemp,
    Write,
    Sync,
    RemoveTemp,
    CheckExisting,
    Rename,
    KeepTemp,
}

impl fmt::Display for UploadStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let action = match self {
            UploadStage::CreateTemp => "creating temporary file",
            UploadStage::Write => "writing file",
            UploadStage::Sync => "syncing temporary file",
            UploadStage::RemoveTemp => "removing temporary file",
            UploadStage::CheckExisting => "checking file existence",
            UploadStage::Rename => "renaming temporary file",
            UploadStage::KeepTemp => "keeping temporary file",
        };
        f.write_str(action)
    }
}

/// How an error is presented to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    NotFound,
    Forbidden,
    Internal,
}

impl ErrorClass {
    fn from_io(kind: io::ErrorKind) -> Self {
        match kind {
            io::ErrorKind::NotFound => ErrorClass::NotFound,
            io::ErrorKind::PermissionDenied => ErrorClass::Forbidden,
            _ => ErrorClass::Internal,
        }
    }
}

impl FileServerError {
    /// Map an I/O failure on `path` to the matching variant.
    pub fn from_io(err: io::Error, path: &str) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => FileServerError::NotFound(path.to_string()),
            io::ErrorKind::PermissionDenied => FileServerError::PermissionDenied(path.to_string()),
            _ => FileServerError::Io(err),
        }
    }

    pub fn upload(stage: UploadStage) -> impl FnOnce(io::Error) -> Self {
        move |source| FileServerError::Upload { stage, source }
    }

    /// Combine errors into one value, flattening nested aggregates.
    ///
    /// A single cause is returned as is. Returns `None` for an empty input.
    pub fn join(errors: impl IntoIterator<Item = FileServerError>) -> Option<Self> {
        let mut causes = Vec::new();
        for err in errors {
            match err {
                FileServerError::Multiple(inner) => causes.extend(inner),
                other => causes.push(other),
            }
        }

        match causes.len() {
            0 => None,
            1 => causes.pop(),
            _ => Some(FileServerError::Multiple(causes)),
        }
    }

    /// Individual causes of this error; a non-aggregate error is its own cause.
    pub fn causes(&self) -> &[FileServerError] {
        match self {
            FileServerError::Multiple(causes) => causes,
            other => std::slice::from_ref(other),
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            FileServerError::NotFound(_) => ErrorClass::NotFound,
            FileServerError::PermissionDenied(_) | FileServerError::PathTraversal => {
                ErrorClass::Forbidden
            }
            FileServerError::Io(err) => ErrorClass::from_io(err.kind()),
            FileServerError::Upload { source, .. } => ErrorClass::from_io(source.kind()),
            FileServerError::Multiple(causes) => {
                let classes: Vec<ErrorClass> = causes.iter().map(Self::class).collect();
                if classes.contains(&ErrorClass::NotFound) {
                    ErrorClass::NotFound
                } else if classes.contains(&ErrorClass::Forbidden) {
                    ErrorClass::Forbidden
                } else {
                    ErrorClass::Internal
                }
            }
            _ => ErrorClass::Internal,
        }
    }
}

fn join_messages(errors: &[FileServerError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_flattens_and_unwraps() {
        assert!(FileServerError::join(Vec::new()).is_none());

        let single = FileServerError::join([FileServerError::NotADirectory]).unwrap();
        assert!(matches!(single, FileServerError::NotADirectory));

        let nested = FileServerError::Multiple(vec![
            FileServerError::PathTraversal,
            FileServerError::NotADirectory,
        ]);
        let joined = FileServerError::join([
            nested,
            FileServerError::SizeMismatch {
                written: 80,
                expected: 100,
            },
        ])
        .unwrap();
        assert_eq!(joined.causes().len(), 3);
        assert!(matches!(
            joined.causes()[2],
            FileServerError::SizeMismatch {
                written: 80,
                expected: 100
            }
        ));
    }

    #[test]
    fn test_multiple_display_keeps_every_cause() {
        let err = FileServerError::join([
            FileServerError::SizeMismatch {
                written: 1,
                expected: 2,
            },
            FileServerError::Upload {
                stage: UploadStage::RemoveTemp,
                source: io::Error::other("disk gone"),
            },
        ])
        .unwrap();

        let message = err.to_string();
        assert!(message.contains("Wrote 1 bytes, expected 2"));
        assert!(message.contains("removing temporary file: disk gone"));
    }

    #[test]
    fn test_class_of_io_errors() {
        let not_found = FileServerError::Io(io::Error::from(io::ErrorKind::NotFound));
        assert_eq!(not_found.class(), ErrorClass::NotFound);

        let denied = FileServerError::from_io(io::Error::from(io::ErrorKind::PermissionDenied), "/x");
        assert!(matches!(denied, FileServerError::PermissionDenied(_)));
        assert_eq!(denied.class(), ErrorClass::Forbidden);

        let other = FileServerError::Io(io::Error::other("boom"));
        assert_eq!(other.class(), ErrorClass::Internal);
    }

    #[test]
    fn test_class_of_aggregate_prefers_not_found() {
        let err = FileServerError::Multiple(vec![
            FileServerError::NotADirectory,
            FileServerError::PathTraversal,
            FileServerError::NotFound("/a".to_string()),
        ]);
        assert_eq!(err.class(), ErrorClass::NotFound);

        let err = FileServerError::Multiple(vec![
            FileServerError::NotADirectory,
            FileServerError::PathTraversal,
        ]);
        assert_eq!(err.class(), ErrorClass::Forbidden);

        assert_eq!(
            FileServerError::Unhandled("missing upload marker").class(),
            ErrorClass::Internal
        );
    }
}
