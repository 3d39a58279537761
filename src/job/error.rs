//! Error types for the job submission workflow.

use thiserror::Error;

use crate::project_store::ProjectStoreError;
use crate::tail::TailError;
use crate::workspace::WorkspaceError;

/// Errors raised while assembling a job request.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum JobRequestError {
    /// Raised when a required parameter is absent after applying project
    /// defaults.
    #[error("missing required parameter: {0}")]
    MissingField(&'static str),
    /// Raised when a command argument contains control characters.
    #[error(
        "command arguments must not contain control characters (ASCII 0x00-0x1F or 0x7F, e.g. newline, carriage return, tab, NUL)"
    )]
    ControlCharacter,
}

/// Errors raised while submitting a job.
#[derive(Debug, Error)]
pub enum JobError<ApiError>
where
    ApiError: std::error::Error + 'static,
{
    /// Raised when required parameters are missing or malformed.
    #[error("invalid job request: {0}")]
    Request(#[from] JobRequestError),
    /// Raised when project settings cannot be read or written.
    #[error("project configuration error: {0}")]
    Config(#[from] ProjectStoreError),
    /// Raised when the workspace cannot be prepared.
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),
    /// Raised when the service rejects or fails the submission.
    #[error("failed to create job: {0}")]
    Create(#[source] ApiError),
    /// Raised when following the job's output fails.
    #[error("failed to follow job: {0}")]
    Tail(#[source] TailError<ApiError>),
}
