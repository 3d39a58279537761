//! Streams a submitted job's output until it finishes.
//!
//! Tailing waits for the job to start running, pages through its log from
//! the last line seen until the end-of-log marker arrives, then reports the
//! job's final state.

use std::time::Duration;

use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::api::{JobApi, JobRecord};
use crate::context::MessageSink;
use crate::poll::{PollError, is_terminal_job_state, poll_job};

/// Errors raised while tailing a job.
#[derive(Debug, Error)]
pub enum TailError<E>
where
    E: std::error::Error + 'static,
{
    /// Raised when waiting for the job to start fails.
    #[error("failed waiting for job to start: {0}")]
    Wait(#[source] PollError<E>),
    /// Raised when a log page cannot be fetched.
    #[error("failed to fetch job logs: {0}")]
    Logs(#[source] E),
    /// Raised when the final job status cannot be fetched.
    #[error("failed to fetch final job status: {0}")]
    Status(#[source] E),
}

/// Tails `job_id`, writing log lines and status messages to `sink`, and
/// returns the job's final record.
///
/// A job that finishes before it is observed running is reported as-is
/// without fetching logs.
///
/// # Errors
///
/// Returns [`TailError`] as soon as any query fails.
pub async fn tail_job<A: JobApi>(
    api: &A,
    job_id: &str,
    interval: Duration,
    sink: &mut dyn MessageSink,
) -> Result<JobRecord, TailError<A::Error>> {
    sink.status("Waiting for job to run...");
    let started = poll_job(api, job_id, "running", interval)
        .await
        .map_err(TailError::Wait)?;
    if is_terminal_job_state(&started.state) {
        report_final(&started, sink);
        return Ok(started);
    }

    sink.status("Job running; streaming logs...");
    stream_logs(api, job_id, interval, sink).await?;

    let finished = api.get_job(job_id).await.map_err(TailError::Status)?;
    report_final(&finished, sink);
    info!(job = job_id, state = %finished.state, "job finished");
    Ok(finished)
}

async fn stream_logs<A: JobApi>(
    api: &A,
    job_id: &str,
    interval: Duration,
    sink: &mut dyn MessageSink,
) -> Result<(), TailError<A::Error>> {
    let mut last_line = 0_u64;
    loop {
        let page = api
            .job_logs(job_id, last_line)
            .await
            .map_err(TailError::Logs)?;
        debug!(job = job_id, from = last_line, lines = page.len(), "log page");
        if page.is_empty() {
            sleep(interval).await;
            continue;
        }
        for entry in page {
            if entry.is_end_marker() {
                return Ok(());
            }
            last_line = last_line.max(entry.line);
            sink.log_line(&entry.message);
        }
    }
}

fn report_final(job: &JobRecord, sink: &mut dyn MessageSink) {
    let mut message = format!("Job {}: {}", job.id, job.state);
    if let Some(code) = job.exit_code {
        message.push_str(&format!(", exit code {code}"));
    }
    sink.status(&message);
    if let Some(job_error) = job.job_error.as_deref().filter(|text| !text.is_empty()) {
        sink.status(&format!("Job error: {job_error}"));
    }
}
