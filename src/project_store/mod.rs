//! Per-directory project settings remembered between job submissions.
//!
//! Settings live in `.skiff/config.toml` under the working directory. They
//! fill parameters a submission leaves out and are rewritten, together with
//! the created job's identifier, after every successful submission.

use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use ortho_config::toml;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Directory holding project settings, relative to the working directory.
pub const PROJECT_DIR_NAME: &str = ".skiff";
/// File name of the project settings.
pub const PROJECT_FILE_NAME: &str = "config.toml";

/// Remembered job parameters for one working directory.
#[derive(Clone, Debug, Default, Deserialize, Serialize, Eq, PartialEq)]
pub struct ProjectConfig {
    /// Project name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    /// Project identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    /// Machine type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine_type: Option<String>,
    /// Container image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
    /// Command to run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Workspace reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<String>,
    /// Dataset reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset: Option<String>,
    /// Identifier of the most recently created job.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_job_id: Option<String>,
}

/// Errors raised while reading or writing project settings.
#[derive(Debug, Error)]
pub enum ProjectStoreError {
    /// Raised when file system operations fail.
    #[error("failed to access {path}: {message}")]
    Io {
        /// Path that could not be accessed.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
    /// Raised when existing settings are not valid TOML or cannot be
    /// rendered.
    #[error("failed to parse {path}: {message}")]
    Parse {
        /// Path that could not be parsed.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
}

/// Abstraction over project settings storage for dependency injection.
pub trait ProjectConfigStore {
    /// Reads the current settings; missing settings yield the default.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectStoreError`] when the file exists but cannot be read
    /// or parsed.
    fn load(&self) -> Result<ProjectConfig, ProjectStoreError>;

    /// Replaces the stored settings and returns where they were written.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectStoreError`] when the settings cannot be written.
    fn save(&self, config: &ProjectConfig) -> Result<Utf8PathBuf, ProjectStoreError>;
}

/// Stores settings under `<root>/.skiff/config.toml`.
#[derive(Clone, Debug)]
pub struct FileProjectStore {
    root: Utf8PathBuf,
}

impl FileProjectStore {
    /// Builds a store rooted at `root`, normally the working directory.
    #[must_use]
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory containing the settings file.
    #[must_use]
    pub fn dir_path(&self) -> Utf8PathBuf {
        self.root.join(PROJECT_DIR_NAME)
    }

    /// Full path of the settings file.
    #[must_use]
    pub fn file_path(&self) -> Utf8PathBuf {
        self.dir_path().join(PROJECT_FILE_NAME)
    }

    fn open_dir(&self) -> Result<Option<Dir>, ProjectStoreError> {
        let dir_path = self.dir_path();
        match Dir::open_ambient_dir(&dir_path, ambient_authority()) {
            Ok(dir) => Ok(Some(dir)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(io_error(&dir_path, &err)),
        }
    }
}

impl ProjectConfigStore for FileProjectStore {
    fn load(&self) -> Result<ProjectConfig, ProjectStoreError> {
        let path = self.file_path();
        let Some(dir) = self.open_dir()? else {
            return Ok(ProjectConfig::default());
        };
        let contents = match dir.read_to_string(PROJECT_FILE_NAME) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Ok(ProjectConfig::default());
            }
            Err(err) => return Err(io_error(&path, &err)),
        };
        parse_config(&path, &contents)
    }

    fn save(&self, config: &ProjectConfig) -> Result<Utf8PathBuf, ProjectStoreError> {
        let dir_path = self.dir_path();
        let path = self.file_path();
        Dir::create_ambient_dir_all(&dir_path, ambient_authority())
            .map_err(|err| io_error(&dir_path, &err))?;
        let dir = Dir::open_ambient_dir(&dir_path, ambient_authority())
            .map_err(|err| io_error(&dir_path, &err))?;

        let rendered = toml::to_string_pretty(config).map_err(|err| ProjectStoreError::Parse {
            path: path.clone(),
            message: err.to_string(),
        })?;
        dir.write(PROJECT_FILE_NAME, rendered)
            .map_err(|err| io_error(&path, &err))?;
        Ok(path)
    }
}

fn parse_config(path: &Utf8Path, contents: &str) -> Result<ProjectConfig, ProjectStoreError> {
    if contents.trim().is_empty() {
        return Ok(ProjectConfig::default());
    }
    toml::from_str(contents).map_err(|err| ProjectStoreError::Parse {
        path: path.to_path_buf(),
        message: err.to_string(),
    })
}

fn io_error(path: &Utf8Path, err: &io::Error) -> ProjectStoreError {
    ProjectStoreError::Io {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests;
