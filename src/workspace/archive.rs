//! Streams a workspace into a compressed zip archive with progress callbacks.

use std::fs::{self, File};
use std::io::{self, Read, Write};

use camino::{Utf8Path, Utf8PathBuf};
use tracing::{debug, warn};
use walkdir::DirEntry;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::error::WorkspaceError;
use super::walk::{error_path, is_skipped_link, lossy_path, walk};

const MAX_COMPRESSION_LEVEL: i64 = 9;
const COPY_BUFFER_BYTES: usize = 64 * 1024;
const ARCHIVE_EXTENSION: &str = "zip";
const ZIP64_THRESHOLD_BYTES: u64 = 0xFFFF_FFFF;

/// Cumulative progress reported while an archive is written.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ArchiveProgress {
    /// Bytes of source content consumed so far.
    pub processed_bytes: u64,
    /// Expected total supplied by the caller, usually from
    /// [`compute_size`](super::compute_size).
    pub total_bytes: u64,
}

/// Builds workspace archives inside an output directory.
#[derive(Clone, Debug)]
pub struct ArchiveBuilder {
    output_dir: Utf8PathBuf,
}

impl ArchiveBuilder {
    /// Creates a builder writing archives to `output_dir`.
    #[must_use]
    pub fn new(output_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Creates a builder targeting the system temporary directory.
    ///
    /// # Errors
    ///
    /// Returns [`WorkspaceError::Invalid`] when the temporary directory path is
    /// not valid UTF-8.
    pub fn in_temp_dir() -> Result<Self, WorkspaceError> {
        let dir = Utf8PathBuf::from_path_buf(std::env::temp_dir()).map_err(|path| {
            WorkspaceError::Invalid(format!(
                "temporary directory {} is not valid UTF-8",
                path.display()
            ))
        })?;
        Ok(Self::new(dir))
    }

    /// Returns the archive path that [`ArchiveBuilder::build`] writes for
    /// `source`.
    ///
    /// # Errors
    ///
    /// Returns [`WorkspaceError::Invalid`] when `source` has no base name.
    pub fn archive_path_for(&self, source: &Utf8Path) -> Result<Utf8PathBuf, WorkspaceError> {
        let name = source.file_name().ok_or_else(|| {
            WorkspaceError::Invalid(format!("{source} has no file name to archive under"))
        })?;
        Ok(self
            .output_dir
            .join(format!("{name}.{ARCHIVE_EXTENSION}")))
    }

    /// Writes `source` into a fresh archive and returns its path.
    ///
    /// A directory source contributes every non-excluded entry, hidden ones
    /// included, named relative to the source root. A file source yields a
    /// single entry named after its base name. Any archive left at the same
    /// path by an earlier run is removed first. The path is returned only
    /// once the archive has been finalised and synced to disk.
    ///
    /// # Errors
    ///
    /// Returns [`WorkspaceError::Archive`] when the archive cannot be written
    /// or finalised, and [`WorkspaceError::Io`] when a source entry cannot be
    /// read. Entries that vanish mid-walk are skipped with a warning.
    pub fn build(
        &self,
        source: &Utf8Path,
        is_directory: bool,
        expected_total: u64,
        on_progress: &mut dyn FnMut(ArchiveProgress),
    ) -> Result<Utf8PathBuf, WorkspaceError> {
        let archive_path = self.archive_path_for(source)?;
        remove_stale(&archive_path)?;

        let mut writer = ArchiveWriter::create(&archive_path, expected_total, on_progress)?;
        if is_directory {
            writer.add_tree(source)?;
        } else {
            let name = source.file_name().unwrap_or(source.as_str());
            writer.add_file(source, name)?;
        }

        let processed = writer.finish()?;
        debug!(archive = %archive_path, processed, "archive finalised");
        Ok(archive_path)
    }
}

fn remove_stale(path: &Utf8Path) -> Result<(), WorkspaceError> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!(archive = %path, "removed archive left by a previous run");
            Ok(())
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(WorkspaceError::archive(path, &err)),
    }
}

struct ArchiveWriter<'a> {
    zip: ZipWriter<File>,
    options: SimpleFileOptions,
    archive_path: &'a Utf8Path,
    progress: ArchiveProgress,
    on_progress: &'a mut dyn FnMut(ArchiveProgress),
}

impl<'a> ArchiveWriter<'a> {
    fn create(
        archive_path: &'a Utf8Path,
        expected_total: u64,
        on_progress: &'a mut dyn FnMut(ArchiveProgress),
    ) -> Result<Self, WorkspaceError> {
        let file =
            File::create(archive_path).map_err(|err| WorkspaceError::archive(archive_path, &err))?;
        Ok(Self {
            zip: ZipWriter::new(file),
            options: SimpleFileOptions::default()
                .compression_method(CompressionMethod::Deflated)
                .compression_level(Some(MAX_COMPRESSION_LEVEL)),
            archive_path,
            progress: ArchiveProgress {
                processed_bytes: 0,
                total_bytes: expected_total,
            },
            on_progress,
        })
    }

    /// Writes the central directory and syncs the archive, returning the
    /// number of source bytes consumed.
    fn finish(self) -> Result<u64, WorkspaceError> {
        let file = self
            .zip
            .finish()
            .map_err(|err| WorkspaceError::archive(self.archive_path, &err))?;
        file.sync_all()
            .map_err(|err| WorkspaceError::archive(self.archive_path, &err))?;
        Ok(self.progress.processed_bytes)
    }

    fn add_tree(&mut self, root: &Utf8Path) -> Result<(), WorkspaceError> {
        for next in walk(root) {
            let entry = match next {
                Ok(entry) => entry,
                Err(err) if is_vanished(&err) => {
                    warn!(path = %error_path(&err, root), "skipping entry removed during archiving");
                    continue;
                }
                Err(err) => return Err(WorkspaceError::io(error_path(&err, root), &err)),
            };
            if entry.depth() == 0
                || is_skipped_link(&entry)
                || entry.path() == self.archive_path.as_std_path()
            {
                continue;
            }
            let name = relative_name(&entry, root);
            if entry.file_type().is_dir() {
                self.zip
                    .add_directory(name, self.options)
                    .map_err(|err| WorkspaceError::archive(self.archive_path, &err))?;
            } else if entry.file_type().is_file() {
                self.add_file(&lossy_path(entry.path()), &name)?;
            }
        }
        Ok(())
    }

    fn add_file(&mut self, path: &Utf8Path, name: &str) -> Result<(), WorkspaceError> {
        let mut source = match File::open(path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                warn!(path = %path, "skipping file removed during archiving");
                return Ok(());
            }
            Err(err) => return Err(WorkspaceError::io(path, &err)),
        };
        let len = source
            .metadata()
            .map_err(|err| WorkspaceError::io(path, &err))?
            .len();

        self.zip
            .start_file(name, self.options.large_file(needs_zip64(len)))
            .map_err(|err| WorkspaceError::archive(self.archive_path, &err))?;

        let mut buffer = vec![0_u8; COPY_BUFFER_BYTES];
        loop {
            let read = source
                .read(&mut buffer)
                .map_err(|err| WorkspaceError::io(path, &err))?;
            let Some(chunk) = buffer.get(..read).filter(|chunk| !chunk.is_empty()) else {
                break;
            };
            self.zip
                .write_all(chunk)
                .map_err(|err| WorkspaceError::archive(self.archive_path, &err))?;
            self.advance(read);
        }
        Ok(())
    }

    fn advance(&mut self, bytes: usize) {
        let delta = u64::try_from(bytes).unwrap_or(u64::MAX);
        self.progress.processed_bytes = self.progress.processed_bytes.saturating_add(delta);
        (self.on_progress)(self.progress);
    }
}

/// Entries at or beyond the classic zip size limit need zip64 headers.
const fn needs_zip64(len: u64) -> bool {
    len >= ZIP64_THRESHOLD_BYTES
}

fn is_vanished(err: &walkdir::Error) -> bool {
    err.io_error()
        .is_some_and(|io_err| io_err.kind() == io::ErrorKind::NotFound)
}

fn relative_name(entry: &DirEntry, root: &Utf8Path) -> String {
    let relative = entry
        .path()
        .strip_prefix(root.as_std_path())
        .unwrap_or_else(|_| entry.path());
    relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use tempfile::TempDir;
    use zip::ZipArchive;

    fn utf8_root(tmp: &TempDir) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(tmp.path().to_path_buf())
            .unwrap_or_else(|path| panic!("temp path should be utf8: {}", path.display()))
    }

    fn write(path: &Utf8Path, len: usize) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap_or_else(|err| panic!("mkdir {parent}: {err}"));
        }
        fs::write(path, vec![b'x'; len]).unwrap_or_else(|err| panic!("write {path}: {err}"));
    }

    fn entry_names(archive: &Utf8Path) -> BTreeSet<String> {
        let file = File::open(archive).unwrap_or_else(|err| panic!("open archive: {err}"));
        let zip = ZipArchive::new(file).unwrap_or_else(|err| panic!("read archive: {err}"));
        zip.file_names().map(str::to_owned).collect()
    }

    struct Fixture {
        _source: TempDir,
        _output: TempDir,
        root: Utf8PathBuf,
        builder: ArchiveBuilder,
    }

    fn fixture() -> Fixture {
        let source = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
        let output = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
        let root = utf8_root(&source).join("project");
        fs::create_dir_all(&root).unwrap_or_else(|err| panic!("mkdir root: {err}"));
        let builder = ArchiveBuilder::new(utf8_root(&output));
        Fixture {
            _source: source,
            _output: output,
            root,
            builder,
        }
    }

    #[test]
    fn directory_archive_skips_git_metadata_and_keeps_hidden_entries() {
        let fx = fixture();
        write(&fx.root.join("train.py"), 10);
        write(&fx.root.join(".env"), 3);
        write(&fx.root.join("data/set.csv"), 7);
        write(&fx.root.join(".git/HEAD"), 100);
        write(&fx.root.join(".gitignore"), 4);

        let archive = fx
            .builder
            .build(&fx.root, true, 20, &mut |_| {})
            .unwrap_or_else(|err| panic!("build archive: {err}"));

        let names = entry_names(&archive);
        let expected: BTreeSet<String> = [".env", "data/", "data/set.csv", "train.py"]
            .into_iter()
            .map(str::to_owned)
            .collect();
        assert_eq!(names, expected);
        assert_eq!(archive, fx.builder.archive_path_for(&fx.root).ok().unwrap_or_default());
    }

    #[test]
    fn single_file_archive_uses_base_name_only() {
        let fx = fixture();
        let file = fx.root.join("nested/deeper/weights.bin");
        write(&file, 64);

        let archive = fx
            .builder
            .build(&file, false, 64, &mut |_| {})
            .unwrap_or_else(|err| panic!("build archive: {err}"));

        let names: Vec<String> = entry_names(&archive).into_iter().collect();
        assert_eq!(names, vec![String::from("weights.bin")]);
        assert_eq!(archive.file_name(), Some("weights.bin.zip"));
    }

    #[test]
    fn progress_is_cumulative_and_reaches_total() {
        let fx = fixture();
        write(&fx.root.join("a.bin"), COPY_BUFFER_BYTES + 17);
        write(&fx.root.join("b.bin"), 5);
        let total = u64::try_from(COPY_BUFFER_BYTES + 22).unwrap_or_default();

        let mut seen = Vec::new();
        fx.builder
            .build(&fx.root, true, total, &mut |progress| seen.push(progress))
            .unwrap_or_else(|err| panic!("build archive: {err}"));

        assert!(seen.windows(2).all(|pair| match pair {
            [first, second] => first.processed_bytes <= second.processed_bytes,
            _ => true,
        }));
        assert_eq!(seen.last().map(|p| p.processed_bytes), Some(total));
        assert!(seen.iter().all(|p| p.total_bytes == total));
    }

    #[test]
    fn stale_archive_is_replaced() {
        let fx = fixture();
        write(&fx.root.join("fresh.txt"), 1);
        let stale = fx
            .builder
            .archive_path_for(&fx.root)
            .unwrap_or_else(|err| panic!("archive path: {err}"));
        fs::write(&stale, b"not a zip").unwrap_or_else(|err| panic!("seed stale: {err}"));

        let archive = fx
            .builder
            .build(&fx.root, true, 1, &mut |_| {})
            .unwrap_or_else(|err| panic!("build archive: {err}"));

        let names: Vec<String> = entry_names(&archive).into_iter().collect();
        assert_eq!(names, vec![String::from("fresh.txt")]);
    }

    #[cfg(unix)]
    #[test]
    fn symbolic_links_are_left_out_of_the_archive() {
        use std::os::unix::fs::symlink;

        let fx = fixture();
        write(&fx.root.join("a.txt"), 10);
        symlink(fx.root.join("gone"), fx.root.join("dangling"))
            .unwrap_or_else(|err| panic!("symlink: {err}"));
        symlink(fx.root.join("a.txt"), fx.root.join("alias.txt"))
            .unwrap_or_else(|err| panic!("symlink: {err}"));

        let archive = fx
            .builder
            .build(&fx.root, true, 10, &mut |_| {})
            .unwrap_or_else(|err| panic!("build archive: {err}"));

        let names: Vec<String> = entry_names(&archive).into_iter().collect();
        assert_eq!(names, vec![String::from("a.txt")]);
    }

    #[test]
    fn file_removed_before_it_is_read_is_skipped() {
        let fx = fixture();
        write(&fx.root.join("kept.txt"), 4);
        let archive_path = fx
            .builder
            .archive_path_for(&fx.root)
            .unwrap_or_else(|err| panic!("archive path: {err}"));
        let mut updates = 0_usize;
        let mut on_progress = |_: ArchiveProgress| updates += 1;
        let mut writer = ArchiveWriter::create(&archive_path, 4, &mut on_progress)
            .unwrap_or_else(|err| panic!("create writer: {err}"));

        writer
            .add_file(&fx.root.join("vanished.txt"), "vanished.txt")
            .unwrap_or_else(|err| panic!("vanished file should be skipped: {err}"));
        assert_eq!(writer.progress.processed_bytes, 0);
        writer
            .add_file(&fx.root.join("kept.txt"), "kept.txt")
            .unwrap_or_else(|err| panic!("add kept file: {err}"));
        let processed = writer
            .finish()
            .unwrap_or_else(|err| panic!("finish archive: {err}"));

        assert_eq!(processed, 4);
        assert_eq!(updates, 1);
        let names: Vec<String> = entry_names(&archive_path).into_iter().collect();
        assert_eq!(names, vec![String::from("kept.txt")]);
    }

    #[test]
    fn unreadable_file_other_than_missing_is_fatal() {
        let fx = fixture();
        let blocker = fx.root.join("plain.txt");
        write(&blocker, 1);
        let archive_path = fx
            .builder
            .archive_path_for(&fx.root)
            .unwrap_or_else(|err| panic!("archive path: {err}"));
        let mut on_progress = |_: ArchiveProgress| {};
        let mut writer = ArchiveWriter::create(&archive_path, 1, &mut on_progress)
            .unwrap_or_else(|err| panic!("create writer: {err}"));
        let nested = blocker.join("child.txt");

        let err = writer
            .add_file(&nested, "child.txt")
            .expect_err("a file used as a directory cannot be opened");

        assert!(
            matches!(err, WorkspaceError::Io { ref path, .. } if *path == nested),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn zip64_is_enabled_only_for_entries_past_the_classic_limit() {
        assert!(!needs_zip64(0));
        assert!(!needs_zip64(ZIP64_THRESHOLD_BYTES - 1));
        assert!(needs_zip64(ZIP64_THRESHOLD_BYTES));
        assert!(needs_zip64(5 * 1024 * 1024 * 1024));
    }

    #[test]
    fn root_path_has_no_archive_name() {
        let builder = ArchiveBuilder::new("/tmp");
        let err = builder
            .archive_path_for(Utf8Path::new("/"))
            .expect_err("root has no base name");
        assert!(matches!(err, WorkspaceError::Invalid(_)));
    }
}
