//! Workspace size estimation used to scale progress reporting.

use camino::Utf8Path;

use super::error::WorkspaceError;
use super::walk::{error_path, is_skipped_link, lossy_path, walk};

/// Sums the byte length of every regular file beneath `root`.
///
/// Excluded names contribute nothing and are not descended. Symbolic links
/// below the root contribute nothing, whether or not their target exists. A
/// single file root yields its own length.
///
/// # Errors
///
/// Returns [`WorkspaceError::Io`] for any unreadable entry, including one that
/// disappears between listing and inspection. There is no partial result.
pub fn compute_size(root: &Utf8Path) -> Result<u64, WorkspaceError> {
    walk(root).try_fold(0_u64, |total, next| {
        let entry = next.map_err(|err| WorkspaceError::io(error_path(&err, root), &err))?;
        if is_skipped_link(&entry) || !entry.file_type().is_file() {
            return Ok(total);
        }
        let metadata = entry
            .metadata()
            .map_err(|err| WorkspaceError::io(lossy_path(entry.path()), &err))?;
        Ok(total.saturating_add(metadata.len()))
    })
}
