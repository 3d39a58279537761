//! Temporary workspace trees for integration tests.

#![allow(dead_code, reason = "each test crate uses a different subset")]

use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use tempfile::TempDir;

/// A temporary directory with a UTF-8, canonical path.
pub struct TempTree {
    _tmp: TempDir,
    /// Canonical root of the tree.
    pub root: Utf8PathBuf,
}

impl TempTree {
    /// Creates an empty tree.
    pub fn new() -> Self {
        let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
        let root = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf())
            .unwrap_or_else(|path| panic!("temp path should be utf8: {}", path.display()))
            .canonicalize_utf8()
            .unwrap_or_else(|err| panic!("canonicalize temp dir: {err}"));
        Self { _tmp: tmp, root }
    }

    /// Creates `relative` (and its parents) below the root.
    pub fn dir(&self, relative: &str) -> Utf8PathBuf {
        let path = self.root.join(relative);
        fs::create_dir_all(&path).unwrap_or_else(|err| panic!("mkdir {path}: {err}"));
        path
    }

    /// Writes `len` bytes to `relative`, creating parent directories.
    pub fn file(&self, relative: &str, len: usize) -> Utf8PathBuf {
        let path = self.root.join(relative);
        write_bytes(&path, len);
        path
    }
}

fn write_bytes(path: &Utf8Path, len: usize) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap_or_else(|err| panic!("mkdir {parent}: {err}"));
    }
    fs::write(path, vec![b'a'; len]).unwrap_or_else(|err| panic!("write {path}: {err}"));
}
