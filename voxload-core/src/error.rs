use std::{io, path::PathBuf};
use thiserror::Error;

pub type Result<T, E = UploadError> = std::result::Result<T, E>;

/// Errors surfaced by the upload, resolution and model loading services.
///
/// Every operation either succeeds completely or leaves the upload directory as it was before
/// the call, so none of these are retried internally.
#[derive(Error, Debug)]
pub enum UploadError {
    /// The filesystem rejected a read, write, rename or delete.
    #[error("storage error on {}: {source}", .path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A fragment in the expected range has not been uploaded yet. Fragments that are present
    /// are left untouched so the client only has to resend the missing one.
    #[error("upload of {filename} is incomplete, chunk {index} is missing")]
    IncompleteUpload { filename: String, index: u32 },

    /// Rejected before any I/O took place.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Failure reported by the inference engine.
    #[error("engine error: {0:#}")]
    Engine(#[source] anyhow::Error),
}

impl UploadError {
    pub fn storage(path: impl Into<PathBuf>, source: io::Error) -> UploadError {
        UploadError::Storage {
            path: path.into(),
            source,
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> UploadError {
        UploadError::InvalidRequest(message.into())
    }

    /// Short machine readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            UploadError::Storage { .. } => "storage",
            UploadError::IncompleteUpload { .. } => "incomplete_upload",
            UploadError::InvalidRequest(_) => "invalid_request",
            UploadError::Engine(_) => "engine",
        }
    }
}
