//! Job submission orchestration for `skiff create`.
//!
//! A submission fills missing parameters from the project settings, packages
//! the workspace, creates the job, records the parameters for next time, and
//! in interactive mode follows the job until it finishes.

use std::time::Duration;

use camino::Utf8PathBuf;
use tracing::info;

use crate::api::{CreateJobParams, Credentials, JobApi, JobRecord, WorkspaceUpload};
use crate::context::{ExecutionMode, MessageSink, ProgressSink};
use crate::poll::DEFAULT_POLL_INTERVAL;
use crate::project_store::{ProjectConfig, ProjectConfigStore};
use crate::tail::tail_job;
use crate::workspace::{NO_WORKSPACE, WorkspaceDescriptor, WorkspaceKind, WorkspacePackager};
use helpers::{non_empty, project_name_for};

mod error;
mod helpers;

pub use error::{JobError, JobRequestError};
pub use helpers::{render_command, validate_command_args};

/// Workspace used in interactive mode when none is given.
const INTERACTIVE_DEFAULT_WORKSPACE: &str = ".";

/// Parameters for a job submission. Unset fields fall back to project
/// settings.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct JobRequest {
    /// Container image.
    pub container: Option<String>,
    /// Machine type.
    pub machine_type: Option<String>,
    /// Project name; defaults to the working directory's base name.
    pub project: Option<String>,
    /// Project identifier.
    pub project_id: Option<String>,
    /// Command line to run inside the container.
    pub command: Option<String>,
    /// Workspace reference: a path, a remote link, or `none`.
    pub workspace: Option<String>,
    /// Dataset reference.
    pub dataset: Option<String>,
    /// Private registry credentials.
    pub registry: Option<Credentials>,
    /// Private workspace repository credentials.
    pub workspace_auth: Option<Credentials>,
}

impl JobRequest {
    fn with_defaults(self, saved: &ProjectConfig) -> Self {
        let fill = |given: Option<String>, stored: Option<&str>| {
            non_empty(given).or_else(|| non_empty(stored.map(ToOwned::to_owned)))
        };
        Self {
            container: fill(self.container, saved.container.as_deref()),
            machine_type: fill(self.machine_type, saved.machine_type.as_deref()),
            project: fill(self.project, saved.project.as_deref()),
            project_id: fill(self.project_id, saved.project_id.as_deref()),
            command: fill(self.command, saved.command.as_deref()),
            workspace: fill(self.workspace, saved.workspace.as_deref()),
            dataset: fill(self.dataset, saved.dataset.as_deref()),
            registry: self.registry,
            workspace_auth: self.workspace_auth,
        }
    }
}

/// Outcome of a successful submission.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct JobOutcome {
    /// Record returned when the job was created.
    pub job: JobRecord,
    /// Workspace as packaged for the submission.
    pub workspace: WorkspaceDescriptor,
    /// Project settings file that was updated.
    pub config_path: Utf8PathBuf,
    /// Final record, present when the job was followed to completion.
    pub final_job: Option<JobRecord>,
}

impl JobOutcome {
    /// Most recent record known for the job.
    #[must_use]
    pub fn latest(&self) -> &JobRecord {
        self.final_job.as_ref().unwrap_or(&self.job)
    }
}

/// Coordinates workspace packaging, job creation, settings updates and
/// tailing.
#[derive(Debug)]
pub struct JobOrchestrator<A, S> {
    api: A,
    store: S,
    packager: WorkspacePackager,
    cwd: Utf8PathBuf,
    mode: ExecutionMode,
    poll_interval: Duration,
}

impl<A, S> JobOrchestrator<A, S>
where
    A: JobApi,
    S: ProjectConfigStore,
{
    /// Creates an orchestrator in programmatic mode resolving relative
    /// workspaces against `cwd`.
    #[must_use]
    pub fn new(api: A, store: S, packager: WorkspacePackager, cwd: impl Into<Utf8PathBuf>) -> Self {
        Self {
            api,
            store,
            packager,
            cwd: cwd.into(),
            mode: ExecutionMode::Programmatic,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Sets the execution mode.
    #[must_use]
    pub const fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Overrides the interval used while following the job.
    ///
    /// This is primarily used by tests to keep tailing scenarios fast.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Submits a job.
    ///
    /// # Errors
    ///
    /// Returns [`JobError`] when validation, workspace packaging, job
    /// creation, the settings update, or tailing fails. Nothing is sent to
    /// the service when validation or packaging fails.
    pub async fn execute(
        &self,
        request: JobRequest,
        progress: &mut dyn ProgressSink,
        sink: &mut dyn MessageSink,
    ) -> Result<JobOutcome, JobError<A::Error>> {
        let saved = self.store.load()?;
        let resolved = self.resolve(request, &saved);
        let container = require(resolved.container.as_deref(), "container")?;
        let machine_type = require(resolved.machine_type.as_deref(), "machine type")?;
        let project = require(resolved.project.as_deref(), "project")?;

        let workspace = self.prepare_workspace(resolved.workspace.as_deref(), progress, sink)?;
        let params = CreateJobParams {
            container: container.to_owned(),
            machine_type: machine_type.to_owned(),
            project: project.to_owned(),
            project_id: resolved.project_id.clone(),
            command: resolved.command.clone(),
            dataset: resolved.dataset.clone(),
            workspace: upload_for(&workspace),
            registry: resolved.registry.clone(),
            workspace_auth: resolved.workspace_auth.clone(),
        };

        sink.status("Creating job...");
        let job = self
            .api
            .create_job(&params)
            .await
            .map_err(JobError::Create)?;
        info!(job = %job.id, project = %project, "job created");
        sink.status(&format!("New job id: {}", job.id));

        let config_path = self.store.save(&ProjectConfig {
            project: Some(project.to_owned()),
            project_id: non_empty(job.project_id.clone()).or(resolved.project_id),
            machine_type: Some(machine_type.to_owned()),
            container: Some(container.to_owned()),
            command: resolved.command,
            workspace: resolved.workspace,
            dataset: resolved.dataset,
            last_job_id: Some(job.id.clone()),
        })?;

        let final_job = if self.mode.is_interactive() {
            Some(
                tail_job(&self.api, &job.id, self.poll_interval, sink)
                    .await
                    .map_err(JobError::Tail)?,
            )
        } else {
            None
        };

        Ok(JobOutcome {
            job,
            workspace,
            config_path,
            final_job,
        })
    }

    fn resolve(&self, request: JobRequest, saved: &ProjectConfig) -> JobRequest {
        let mut resolved = request.with_defaults(saved);
        if resolved.project.is_none() {
            resolved.project = project_name_for(&self.cwd);
        }
        resolved
    }

    fn prepare_workspace(
        &self,
        requested: Option<&str>,
        progress: &mut dyn ProgressSink,
        sink: &mut dyn MessageSink,
    ) -> Result<WorkspaceDescriptor, JobError<A::Error>> {
        let reference = requested.unwrap_or(if self.mode.is_interactive() {
            INTERACTIVE_DEFAULT_WORKSPACE
        } else {
            NO_WORKSPACE
        });
        let mut descriptor = WorkspaceDescriptor::describe(reference, &self.cwd)?;
        if matches!(
            descriptor.kind,
            WorkspaceKind::Directory | WorkspaceKind::File
        ) {
            sink.status(&format!("Packaging workspace {}", descriptor.source_path));
        }
        self.packager.package(&mut descriptor, progress)?;
        if let Some(name) = descriptor.upload_file_name() {
            sink.status(&format!(
                "Uploading {name} ({} bytes)",
                descriptor.size_bytes
            ));
        }
        Ok(descriptor)
    }
}

fn require<'a>(value: Option<&'a str>, name: &'static str) -> Result<&'a str, JobRequestError> {
    value.ok_or(JobRequestError::MissingField(name))
}

fn upload_for(workspace: &WorkspaceDescriptor) -> WorkspaceUpload {
    if let (Some(path), Some(file_name)) =
        (workspace.archive_path.as_ref(), workspace.upload_file_name())
    {
        return WorkspaceUpload::Archive {
            path: path.clone(),
            file_name: file_name.to_owned(),
        };
    }
    workspace
        .remote_link()
        .map_or(WorkspaceUpload::None, |link| {
            WorkspaceUpload::Link(link.to_owned())
        })
}

#[cfg(test)]
mod tests;
