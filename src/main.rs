//! Binary entry point for the skiff CLI.

use std::fmt::Display;
use std::io::{self, Write};
use std::process;

use camino::Utf8PathBuf;
use clap::Parser;
use serde::Serialize;
use thiserror::Error;

use skiff::api::{ApiError, Credentials, HttpJobApi, JobApi};
use skiff::context::{ExecutionMode, NoProgress, NullSink, TextProgress, WriterSink};
use skiff::job::{JobError, JobOrchestrator, JobRequest, JobRequestError, render_command};
use skiff::poll::{DEFAULT_POLL_INTERVAL, PollError, PollRequest, TargetKind, poll_until};
use skiff::project_store::{FileProjectStore, ProjectConfigStore, ProjectStoreError};
use skiff::tail::{TailError, tail_job};
use skiff::workspace::{ArchiveBuilder, WorkspaceError, WorkspacePackager};
use skiff::{ApiConfig, logging};

mod cli;

use cli::{Cli, Command, CreateCommand, LogsCommand, WaitCommand};

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Request(#[from] JobRequestError),
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),
    #[error(transparent)]
    Project(#[from] ProjectStoreError),
    #[error(transparent)]
    Job(#[from] JobError<ApiError>),
    #[error(transparent)]
    Poll(#[from] PollError<ApiError>),
    #[error(transparent)]
    Tail(#[from] TailError<ApiError>),
    #[error("failed to read the working directory: {0}")]
    WorkingDirectory(String),
    #[error("{kind} {id} ended as {actual} before reaching {expected}")]
    StateNotReached {
        kind: TargetKind,
        id: String,
        expected: String,
        actual: String,
    },
    #[error("no job id given and no previous job recorded for this directory")]
    NoJob,
    #[error("failed to write output: {0}")]
    Output(String),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(err) = logging::init() {
        write_error(io::stderr(), &err);
    }

    let exit_code = match dispatch(cli).await {
        Ok(()) => 0,
        Err(err) => {
            write_error(io::stderr(), &err);
            1
        }
    };

    process::exit(exit_code);
}

async fn dispatch(cli: Cli) -> Result<(), CliError> {
    let mode = mode_for(cli.json);
    match cli.command {
        Command::Create(args) => create_job(args, mode).await,
        Command::WaitJob(args) => wait(TargetKind::Job, args, mode).await,
        Command::WaitMachine(args) => wait(TargetKind::Machine, args, mode).await,
        Command::Logs(args) => follow_logs(args, mode).await,
    }
}

const fn mode_for(json: bool) -> ExecutionMode {
    if json {
        ExecutionMode::Programmatic
    } else {
        ExecutionMode::Interactive
    }
}

async fn create_job(args: CreateCommand, mode: ExecutionMode) -> Result<(), CliError> {
    let request = build_request(args)?;
    let api = connect()?;
    let cwd = current_dir()?;
    let packager = WorkspacePackager::new(ArchiveBuilder::in_temp_dir()?);
    let orchestrator = JobOrchestrator::new(api, FileProjectStore::new(cwd.clone()), packager, cwd)
        .with_mode(mode);

    if mode.is_interactive() {
        let mut progress = TextProgress::new(io::stderr(), "Archiving");
        let mut sink = WriterSink::new(io::stderr(), io::stdout());
        orchestrator
            .execute(request, &mut progress, &mut sink)
            .await?;
        return Ok(());
    }

    let outcome = orchestrator
        .execute(request, &mut NoProgress, &mut NullSink)
        .await?;
    write_json(io::stdout(), outcome.latest())
}

fn build_request(args: CreateCommand) -> Result<JobRequest, CliError> {
    Ok(JobRequest {
        command: render_command(&args.command)?,
        container: args.container,
        machine_type: args.machine_type,
        project: args.project,
        project_id: args.project_id,
        workspace: args.workspace,
        dataset: args.dataset,
        registry: credentials(args.registry_username, args.registry_password),
        workspace_auth: credentials(args.workspace_username, args.workspace_password),
    })
}

fn credentials(username: Option<String>, password: Option<String>) -> Option<Credentials> {
    username
        .zip(password)
        .map(|(user, secret)| Credentials {
            username: user,
            password: secret,
        })
}

async fn wait(kind: TargetKind, args: WaitCommand, mode: ExecutionMode) -> Result<(), CliError> {
    let api = connect()?;
    let request = PollRequest::new(kind, args.id, args.state);
    let record = poll_until(&api, &request).await?;
    if mode.is_interactive() {
        let mut stdout = io::stdout();
        writeln!(stdout, "{kind} {} is {}", request.target_id, record.state())
            .map_err(|err| CliError::Output(err.to_string()))?;
    } else {
        write_json(io::stdout(), &record)?;
    }
    ensure_reached(&request, record.state())
}

fn ensure_reached(request: &PollRequest, actual: &str) -> Result<(), CliError> {
    if request.is_reached_by(actual) {
        return Ok(());
    }
    Err(CliError::StateNotReached {
        kind: request.target_kind,
        id: request.target_id.clone(),
        expected: request.desired_state.clone(),
        actual: actual.to_owned(),
    })
}

async fn follow_logs(args: LogsCommand, mode: ExecutionMode) -> Result<(), CliError> {
    let job_id = match args.job_id {
        Some(id) => id,
        None => FileProjectStore::new(current_dir()?)
            .load()?
            .last_job_id
            .ok_or(CliError::NoJob)?,
    };
    let api = connect()?;
    if mode.is_interactive() {
        let mut sink = WriterSink::new(io::stderr(), io::stdout());
        tail_job(&api, &job_id, DEFAULT_POLL_INTERVAL, &mut sink).await?;
        return Ok(());
    }
    let record = tail_job(&api, &job_id, DEFAULT_POLL_INTERVAL, &mut NullSink).await?;
    write_json(io::stdout(), &record)
}

fn connect() -> Result<impl JobApi<Error = ApiError>, CliError> {
    let config =
        ApiConfig::load_without_cli_args().map_err(|err| CliError::Config(err.to_string()))?;
    Ok(HttpJobApi::new(&config)?)
}

fn current_dir() -> Result<Utf8PathBuf, CliError> {
    let cwd =
        std::env::current_dir().map_err(|err| CliError::WorkingDirectory(err.to_string()))?;
    Utf8PathBuf::from_path_buf(cwd).map_err(|path| {
        CliError::WorkingDirectory(format!("{} is not valid UTF-8", path.display()))
    })
}

fn write_json(mut target: impl Write, record: &impl Serialize) -> Result<(), CliError> {
    serde_json::to_writer_pretty(&mut target, record)
        .map_err(|err| CliError::Output(err.to_string()))?;
    writeln!(target).map_err(|err| CliError::Output(err.to_string()))
}

fn write_error(mut target: impl Write, err: &impl Display) {
    writeln!(target, "{err}").ok();
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;
