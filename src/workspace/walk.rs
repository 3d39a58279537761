//! Directory traversal shared by size computation and archiving.
//!
//! Both consumers build their walker here so the version-control exclusion
//! applies identically to the progress estimate and the archive contents.
//! Symbolic links below the root are reported as links and never followed;
//! neither consumer includes them.

use std::path::Path;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

/// Base names skipped while sizing and archiving a workspace.
pub const EXCLUDED_NAMES: &[&str] = &[".git", ".gitignore"];

/// Returns `true` when `name` is version-control metadata.
#[must_use]
pub fn is_excluded(name: &str) -> bool {
    EXCLUDED_NAMES.contains(&name)
}

fn is_excluded_entry(entry: &DirEntry) -> bool {
    // The root is never excluded; a workspace named `.git` is still walked.
    entry.depth() > 0 && entry.file_name().to_str().is_some_and(is_excluded)
}

/// Walks `root`, pruning excluded entries and everything beneath them.
///
/// A root that is itself a link is resolved; links below it are not.
pub(crate) fn walk(root: &Utf8Path) -> impl Iterator<Item = walkdir::Result<DirEntry>> {
    WalkDir::new(root)
        .follow_links(false)
        .follow_root_links(true)
        .into_iter()
        .filter_entry(|entry| !is_excluded_entry(entry))
}

/// Returns `true` for symbolic links, which are left out of the workspace.
pub(crate) fn is_skipped_link(entry: &DirEntry) -> bool {
    if entry.path_is_symlink() && entry.depth() > 0 {
        debug!(path = %entry.path().display(), "skipping symbolic link");
        return true;
    }
    false
}

/// Converts a walker path to UTF-8 for error reporting.
pub(crate) fn lossy_path(path: &Path) -> Utf8PathBuf {
    Utf8PathBuf::from(path.to_string_lossy().into_owned())
}

/// Best path to blame for a traversal error.
pub(crate) fn error_path(err: &walkdir::Error, root: &Utf8Path) -> Utf8PathBuf {
    err.path()
        .map_or_else(|| root.to_path_buf(), lossy_path)
}
