//! Command-line interface definitions for the `skiff` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::{Args, Parser, Subcommand};

/// Top-level CLI for the `skiff` binary.
#[derive(Debug, Parser)]
#[command(
    name = "skiff",
    about = "Ship a local workspace to a cloud GPU job and follow it to completion",
    arg_required_else_help = true
)]
pub(crate) struct Cli {
    /// Print the resulting record as JSON instead of progress and logs.
    #[arg(long, global = true)]
    pub(crate) json: bool,
    /// Subcommand to run.
    #[command(subcommand)]
    pub(crate) command: Command,
}

/// Subcommands accepted by `skiff`.
#[derive(Debug, Subcommand)]
pub(crate) enum Command {
    /// Package the workspace, create a job, and follow its logs.
    #[command(name = "create", about = "Package the workspace, create a job, and follow its logs")]
    Create(CreateCommand),
    /// Wait until a job reaches a state.
    #[command(name = "wait-job", about = "Wait until a job reaches a state")]
    WaitJob(WaitCommand),
    /// Wait until a machine reaches a state.
    #[command(name = "wait-machine", about = "Wait until a machine reaches a state")]
    WaitMachine(WaitCommand),
    /// Stream the logs of an existing job until it finishes.
    #[command(name = "logs", about = "Stream the logs of an existing job until it finishes")]
    Logs(LogsCommand),
}

/// Arguments for the `skiff create` subcommand.
#[derive(Debug, Args)]
pub(crate) struct CreateCommand {
    /// Container image the job runs in.
    #[arg(long, value_name = "IMAGE")]
    pub(crate) container: Option<String>,
    /// Machine type to run on, for example `P4000`.
    #[arg(long, value_name = "TYPE")]
    pub(crate) machine_type: Option<String>,
    /// Project name; defaults to the current directory's name.
    #[arg(long, value_name = "NAME")]
    pub(crate) project: Option<String>,
    /// Project identifier.
    #[arg(long, value_name = "ID")]
    pub(crate) project_id: Option<String>,
    /// Workspace to upload: a directory, a file, a remote link, or `none`.
    ///
    /// Defaults to the current directory, or to no workspace with `--json`.
    #[arg(long, value_name = "PATH|URL")]
    pub(crate) workspace: Option<String>,
    /// Dataset reference attached to the job.
    #[arg(long, value_name = "REF")]
    pub(crate) dataset: Option<String>,
    /// User name for a private container registry.
    #[arg(long, value_name = "USER", requires = "registry_password")]
    pub(crate) registry_username: Option<String>,
    /// Password for a private container registry.
    #[arg(
        long,
        value_name = "PASSWORD",
        env = "SKIFF_REGISTRY_PASSWORD",
        hide_env_values = true,
        requires = "registry_username"
    )]
    pub(crate) registry_password: Option<String>,
    /// User name for a private workspace repository.
    #[arg(long, value_name = "USER", requires = "workspace_password")]
    pub(crate) workspace_username: Option<String>,
    /// Password for a private workspace repository.
    #[arg(
        long,
        value_name = "PASSWORD",
        env = "SKIFF_WORKSPACE_PASSWORD",
        hide_env_values = true,
        requires = "workspace_username"
    )]
    pub(crate) workspace_password: Option<String>,
    /// Command to execute in the container (use -- to separate flags).
    #[arg(trailing_var_arg = true)]
    pub(crate) command: Vec<String>,
}

/// Arguments shared by `skiff wait-job` and `skiff wait-machine`.
#[derive(Debug, Args)]
pub(crate) struct WaitCommand {
    /// Identifier of the job or machine.
    #[arg(value_name = "ID")]
    pub(crate) id: String,
    /// State to wait for (case-insensitive).
    #[arg(long, value_name = "STATE")]
    pub(crate) state: String,
}

/// Arguments for the `skiff logs` subcommand.
#[derive(Debug, Args)]
pub(crate) struct LogsCommand {
    /// Job identifier; defaults to the last job created from this directory.
    #[arg(value_name = "JOB_ID")]
    pub(crate) job_id: Option<String>,
}
