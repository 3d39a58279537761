//! Workspace classification, sizing, archiving, and upload gating.
//!
//! A job's workspace is a local directory or file, a remote link the service
//! fetches itself, or nothing. Local content is measured, zipped with
//! progress reporting, and checked against the upload ceiling before the job
//! is submitted.

use std::fs;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::info;

use crate::context::ProgressSink;

mod archive;
mod error;
mod gate;
mod size;
mod walk;

pub use archive::{ArchiveBuilder, ArchiveProgress};
pub use error::WorkspaceError;
pub use gate::{MAX_UPLOAD_BYTES, check_size};
pub use size::compute_size;
pub use walk::{EXCLUDED_NAMES, is_excluded};

/// Keyword that explicitly disables the workspace.
pub const NO_WORKSPACE: &str = "none";

const REMOTE_PREFIXES: &[&str] = &["http://", "https://", "git@", "git+", "s3://"];
const PREBUILT_EXTENSIONS: &[&str] = &["zip", "gz"];

/// What a workspace reference points at.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WorkspaceKind {
    /// A local directory to archive.
    Directory,
    /// A local file, archived unless it is already a zip or gzip.
    File,
    /// A URL or repository reference the service resolves.
    RemoteLink,
    /// No workspace.
    None,
}

/// Describes a workspace as it moves through packaging.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WorkspaceDescriptor {
    /// Reference as resolved: an absolute path for local content, otherwise
    /// the link text.
    pub source_path: String,
    /// Classification of the reference.
    pub kind: WorkspaceKind,
    /// Byte size of the local content, zero for links and `none`.
    pub size_bytes: u64,
    /// Artifact to upload; set once packaging succeeds.
    pub archive_path: Option<Utf8PathBuf>,
}

impl WorkspaceDescriptor {
    /// Descriptor for a job without a workspace.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            source_path: String::new(),
            kind: WorkspaceKind::None,
            size_bytes: 0,
            archive_path: None,
        }
    }

    /// Classifies `reference`, resolving relative paths against `cwd`.
    ///
    /// # Errors
    ///
    /// Returns [`WorkspaceError::Invalid`] for the filesystem root,
    /// [`WorkspaceError::Missing`] when a local path does not exist, and
    /// [`WorkspaceError::Io`] when it cannot be inspected.
    pub fn describe(reference: &str, cwd: &Utf8Path) -> Result<Self, WorkspaceError> {
        let trimmed = reference.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case(NO_WORKSPACE) {
            return Ok(Self::none());
        }
        if REMOTE_PREFIXES
            .iter()
            .any(|prefix| trimmed.starts_with(prefix))
        {
            return Ok(Self {
                source_path: trimmed.to_owned(),
                kind: WorkspaceKind::RemoteLink,
                size_bytes: 0,
                archive_path: None,
            });
        }

        let path = resolve_local(trimmed, cwd)?;
        let metadata = fs::metadata(&path).map_err(|err| {
            if err.kind() == io::ErrorKind::NotFound {
                WorkspaceError::Missing { path: path.clone() }
            } else {
                WorkspaceError::io(&path, &err)
            }
        })?;
        let kind = if metadata.is_dir() {
            WorkspaceKind::Directory
        } else {
            WorkspaceKind::File
        };
        Ok(Self {
            source_path: path.into_string(),
            kind,
            size_bytes: 0,
            archive_path: None,
        })
    }

    /// Returns `true` when packaging produced an artifact to upload.
    #[must_use]
    pub const fn has_upload(&self) -> bool {
        self.archive_path.is_some()
    }

    /// File name sent alongside the uploaded artifact.
    #[must_use]
    pub fn upload_file_name(&self) -> Option<&str> {
        self.archive_path.as_deref().and_then(Utf8Path::file_name)
    }

    /// Returns the link text for remote workspaces.
    #[must_use]
    pub fn remote_link(&self) -> Option<&str> {
        (self.kind == WorkspaceKind::RemoteLink).then_some(self.source_path.as_str())
    }
}

fn resolve_local(reference: &str, cwd: &Utf8Path) -> Result<Utf8PathBuf, WorkspaceError> {
    let expanded = expand_tilde(reference);
    let joined = cwd.join(expanded);
    let path = match joined.canonicalize_utf8() {
        Ok(path) => path,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return Err(WorkspaceError::Missing { path: joined });
        }
        Err(err) => return Err(WorkspaceError::io(&joined, &err)),
    };
    if path.parent().is_none() {
        return Err(WorkspaceError::Invalid(String::from(
            "the filesystem root cannot be used as a workspace",
        )));
    }
    Ok(path)
}

fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/")
        && let Some(home) = std::env::var_os("HOME")
    {
        return format!("{}/{rest}", home.to_string_lossy());
    }
    path.to_owned()
}

fn is_prebuilt_archive(path: &Utf8Path) -> bool {
    path.extension().is_some_and(|ext| {
        PREBUILT_EXTENSIONS
            .iter()
            .any(|known| ext.eq_ignore_ascii_case(known))
    })
}

/// Packages local workspaces into upload-ready artifacts.
#[derive(Clone, Debug)]
pub struct WorkspacePackager {
    builder: ArchiveBuilder,
    ceiling_bytes: u64,
}

impl WorkspacePackager {
    /// Creates a packager writing archives through `builder`, enforcing
    /// [`MAX_UPLOAD_BYTES`].
    #[must_use]
    pub const fn new(builder: ArchiveBuilder) -> Self {
        Self {
            builder,
            ceiling_bytes: MAX_UPLOAD_BYTES,
        }
    }

    /// Sizes, archives, and gates `descriptor`, updating it in place.
    ///
    /// Directories and plain files are archived; zip and gzip files are
    /// gated as-is. Remote links and `none` pass through untouched. The
    /// archive is left on disk after packaging.
    ///
    /// # Errors
    ///
    /// Returns [`WorkspaceError`] when sizing, archiving, or the size gate
    /// fails. On error `archive_path` stays unset.
    pub fn package(
        &self,
        descriptor: &mut WorkspaceDescriptor,
        progress: &mut dyn ProgressSink,
    ) -> Result<(), WorkspaceError> {
        let source = Utf8PathBuf::from(descriptor.source_path.as_str());
        match descriptor.kind {
            WorkspaceKind::RemoteLink | WorkspaceKind::None => return Ok(()),
            WorkspaceKind::File if is_prebuilt_archive(&source) => {
                descriptor.size_bytes = check_size(&source, self.ceiling_bytes)?;
                descriptor.archive_path = Some(source);
                return Ok(());
            }
            WorkspaceKind::Directory | WorkspaceKind::File => {}
        }

        let is_directory = descriptor.kind == WorkspaceKind::Directory;
        let total = compute_size(&source)?;
        descriptor.size_bytes = total;
        info!(workspace = %source, total, "archiving workspace");

        progress.start(total);
        let mut reported = 0_u64;
        let archive = self
            .builder
            .build(&source, is_directory, total, &mut |update| {
                progress.advance(update.processed_bytes.saturating_sub(reported));
                reported = update.processed_bytes;
            })?;
        progress.finish();

        let archive_bytes = check_size(&archive, self.ceiling_bytes)?;
        info!(archive = %archive, archive_bytes, "workspace archive ready");
        descriptor.archive_path = Some(archive);
        Ok(())
    }
}
