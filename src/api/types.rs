//! Records exchanged with the remote compute API.

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

/// Log message marking the end of a finished job's output.
pub const END_OF_LOG_MARKER: &str = "PSEOF";

/// Job as reported by the API.
#[derive(Clone, Debug, Default, Deserialize, Serialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    /// Job identifier.
    pub id: String,
    /// Display name assigned by the service.
    pub name: Option<String>,
    /// Lifecycle state (for example `Pending`, `Running`, `Stopped`).
    #[serde(default)]
    pub state: String,
    /// Project name the job belongs to.
    pub project: Option<String>,
    /// Project identifier the job belongs to.
    pub project_id: Option<String>,
    /// Container image the job runs in.
    pub container: Option<String>,
    /// Machine type the job runs on.
    pub machine_type: Option<String>,
    /// Command executed inside the container.
    pub command: Option<String>,
    /// Exit code once the job has finished.
    pub exit_code: Option<i64>,
    /// Service-side failure description, if any.
    pub job_error: Option<String>,
}

/// Machine as reported by the API.
#[derive(Clone, Debug, Default, Deserialize, Serialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MachineRecord {
    /// Machine identifier.
    pub id: String,
    /// Display name.
    pub name: Option<String>,
    /// Operational state (for example `off`, `serviceready`, `ready`).
    #[serde(default)]
    pub state: String,
    /// Machine type.
    pub machine_type: Option<String>,
    /// Public address, when one is assigned.
    pub public_ip_address: Option<String>,
}

/// Either kind of record a poll can resolve with.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RemoteRecord {
    /// A job record.
    Job(JobRecord),
    /// A machine record.
    Machine(MachineRecord),
}

impl RemoteRecord {
    /// State string carried by the record.
    #[must_use]
    pub fn state(&self) -> &str {
        match self {
            Self::Job(job) => &job.state,
            Self::Machine(machine) => &machine.state,
        }
    }

    /// Returns the job record, if this is one.
    #[must_use]
    pub fn into_job(self) -> Option<JobRecord> {
        match self {
            Self::Job(job) => Some(job),
            Self::Machine(_) => None,
        }
    }
}

/// One line of job output.
#[derive(Clone, Debug, Default, Deserialize, Serialize, Eq, PartialEq)]
pub struct LogLine {
    /// One-based line number within the job's log.
    pub line: u64,
    /// Line text.
    #[serde(default)]
    pub message: String,
    /// Service timestamp.
    pub timestamp: Option<String>,
}

impl LogLine {
    /// Returns `true` for the end-of-log marker.
    #[must_use]
    pub fn is_end_marker(&self) -> bool {
        self.message == END_OF_LOG_MARKER
    }
}

/// How the workspace reaches the service.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum WorkspaceUpload {
    /// Upload a local archive.
    Archive {
        /// Archive on disk.
        path: Utf8PathBuf,
        /// Name reported to the service.
        file_name: String,
    },
    /// Let the service fetch a remote link.
    Link(String),
    /// No workspace.
    #[default]
    None,
}

/// Private registry or workspace repository credentials.
#[derive(Clone, Default, Eq, PartialEq)]
pub struct Credentials {
    /// User name.
    pub username: String,
    /// Password or token.
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Parameters for creating a job.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CreateJobParams {
    /// Container image.
    pub container: String,
    /// Machine type.
    pub machine_type: String,
    /// Project name.
    pub project: String,
    /// Project identifier, when known.
    pub project_id: Option<String>,
    /// Command to run; the container default is used when absent.
    pub command: Option<String>,
    /// Dataset reference.
    pub dataset: Option<String>,
    /// Workspace to attach.
    pub workspace: WorkspaceUpload,
    /// Credentials for a private container registry.
    pub registry: Option<Credentials>,
    /// Credentials for a private workspace repository.
    pub workspace_auth: Option<Credentials>,
}
