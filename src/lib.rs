//! Core library for the skiff job submission client.
//!
//! The crate packages a local workspace into a size-capped zip archive,
//! submits it as a job through a [`JobApi`] implementation, polls jobs and
//! machines until they reach a requested state, and tails job logs until the
//! job finishes.

pub mod api;
pub mod config;
pub mod context;
pub mod job;
pub mod logging;
pub mod poll;
pub mod project_store;
pub mod tail;
pub mod test_support;
pub mod workspace;

pub use api::{ApiError, HttpJobApi, JobApi, JobRecord, MachineRecord, RemoteRecord};
pub use config::{ApiConfig, ConfigError};
pub use context::{ExecutionMode, MessageSink, ProgressSink};
pub use job::{JobError, JobOrchestrator, JobOutcome, JobRequest};
pub use poll::{PollError, PollRequest, TargetKind, poll_until};
pub use project_store::{FileProjectStore, ProjectConfig, ProjectConfigStore, ProjectStoreError};
pub use tail::{TailError, tail_job};
pub use workspace::{
    ArchiveBuilder, WorkspaceDescriptor, WorkspaceError, WorkspaceKind, WorkspacePackager,
};
