//! Upload size gate applied before any artifact leaves the machine.

use std::fs;

use camino::Utf8Path;

use super::error::WorkspaceError;

/// Largest artifact accepted for upload (100 MiB).
pub const MAX_UPLOAD_BYTES: u64 = 100 * 1024 * 1024;

/// Checks that the file at `path` is no larger than `ceiling_bytes`.
///
/// Returns the measured size so callers can record it.
///
/// # Errors
///
/// Returns [`WorkspaceError::SizeExceeded`] when the file is strictly larger
/// than the ceiling, and [`WorkspaceError::Io`] when it cannot be inspected.
pub fn check_size(path: &Utf8Path, ceiling_bytes: u64) -> Result<u64, WorkspaceError> {
    let actual_bytes = fs::metadata(path)
        .map_err(|err| WorkspaceError::io(path, &err))?
        .len();
    if actual_bytes > ceiling_bytes {
        return Err(WorkspaceError::SizeExceeded {
            path: path.to_path_buf(),
            actual_bytes,
            ceiling_bytes,
        });
    }
    Ok(actual_bytes)
}
