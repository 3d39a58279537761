//! Error types for workspace packaging.

use camino::Utf8PathBuf;
use thiserror::Error;

/// Errors raised while sizing, archiving, or gating a workspace.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    /// Raised when the workspace reference is unusable before any I/O runs.
    #[error("invalid workspace: {0}")]
    Invalid(String),
    /// Raised when the workspace path does not exist.
    #[error("workspace {path} does not exist")]
    Missing {
        /// Path supplied by the caller.
        path: Utf8PathBuf,
    },
    /// Raised when a filesystem entry cannot be read.
    #[error("failed to read {path}: {message}")]
    Io {
        /// Path that could not be accessed.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
    /// Raised when writing or finalising the archive fails.
    #[error("failed to write archive {path}: {message}")]
    Archive {
        /// Archive path being written.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
    /// Raised when an artifact is larger than the upload ceiling.
    #[error("{path} is {actual_bytes} bytes, which exceeds the {ceiling_bytes} byte upload limit")]
    SizeExceeded {
        /// Artifact that was rejected.
        path: Utf8PathBuf,
        /// Size found on disk.
        actual_bytes: u64,
        /// Largest size accepted for upload.
        ceiling_bytes: u64,
    },
}

impl WorkspaceError {
    pub(crate) fn io(path: impl Into<Utf8PathBuf>, err: &impl std::fmt::Display) -> Self {
        Self::Io {
            path: path.into(),
            message: err.to_string(),
        }
    }

    pub(crate) fn archive(path: impl Into<Utf8PathBuf>, err: &impl std::fmt::Display) -> Self {
        Self::Archive {
            path: path.into(),
            message: err.to_string(),
        }
    }
}
