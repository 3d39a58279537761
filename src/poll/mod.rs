//! Interval polling of remote job and machine state.
//!
//! A poll validates the desired state once, then queries the target on a
//! fixed interval until the reported state matches. Queries are sequential:
//! the next one is scheduled only after the previous response arrives.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::sleep;
use tracing::debug;

use crate::api::{JobApi, JobRecord, MachineRecord, RemoteRecord};

/// Delay between consecutive status queries.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(5000);

/// States a job may be asked to reach.
pub const JOB_STATES: &[&str] = &[
    "pending",
    "provisioned",
    "network setup",
    "running",
    "stopped",
    "error",
    "failed",
    "cancelled",
];

/// Job states after which no further transition happens.
pub const TERMINAL_JOB_STATES: &[&str] = &["stopped", "error", "failed", "cancelled"];

/// States a machine may be asked to reach.
pub const MACHINE_STATES: &[&str] = &["off", "serviceready", "ready"];

/// Kind of remote object being watched.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TargetKind {
    /// A job.
    Job,
    /// A machine.
    Machine,
}

impl TargetKind {
    /// Legal desired states for this kind.
    #[must_use]
    pub const fn legal_states(self) -> &'static [&'static str] {
        match self {
            Self::Job => JOB_STATES,
            Self::Machine => MACHINE_STATES,
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Job => "job",
            Self::Machine => "machine",
        })
    }
}

/// Describes one wait.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PollRequest {
    /// Identifier of the job or machine.
    pub target_id: String,
    /// Whether `target_id` names a job or a machine.
    pub target_kind: TargetKind,
    /// State to wait for, compared case-insensitively.
    pub desired_state: String,
    /// Delay between queries.
    pub interval: Duration,
}

impl PollRequest {
    /// Builds a request using [`DEFAULT_POLL_INTERVAL`].
    #[must_use]
    pub fn new(
        target_kind: TargetKind,
        target_id: impl Into<String>,
        desired_state: impl Into<String>,
    ) -> Self {
        Self {
            target_id: target_id.into(),
            target_kind,
            desired_state: desired_state.into(),
            interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Returns `true` when `observed` is the desired state itself rather
    /// than a terminal job state that ended the wait early.
    #[must_use]
    pub fn is_reached_by(&self, observed: &str) -> bool {
        observed
            .trim()
            .eq_ignore_ascii_case(self.desired_state.trim())
    }

    /// Overrides the query interval.
    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

/// Errors raised while polling.
#[derive(Debug, Error)]
pub enum PollError<E>
where
    E: std::error::Error + 'static,
{
    /// Raised before any query when the desired state is not legal for the
    /// target kind.
    #[error("invalid {kind} state '{state}': expected one of {expected}")]
    InvalidState {
        /// Target kind the state was checked against.
        kind: TargetKind,
        /// Rejected state.
        state: String,
        /// Comma separated list of accepted states.
        expected: String,
    },
    /// Raised when a status query fails.
    #[error("failed to query {kind} status: {source}")]
    Query {
        /// Target kind being queried.
        kind: TargetKind,
        /// Underlying API error.
        #[source]
        source: E,
    },
}

/// Checks `state` against the legal set for `kind`, returning the lowercase
/// form.
///
/// # Errors
///
/// Returns [`PollError::InvalidState`] when the state is not recognised.
pub fn validate_state<E>(kind: TargetKind, state: &str) -> Result<String, PollError<E>>
where
    E: std::error::Error + 'static,
{
    let normalised = state.trim().to_lowercase();
    if kind.legal_states().contains(&normalised.as_str()) {
        return Ok(normalised);
    }
    Err(PollError::InvalidState {
        kind,
        state: state.to_owned(),
        expected: kind.legal_states().join(", "),
    })
}

/// Returns `true` when `state` is a terminal job state.
#[must_use]
pub fn is_terminal_job_state(state: &str) -> bool {
    let lowered = state.to_lowercase();
    TERMINAL_JOB_STATES.contains(&lowered.as_str())
}

fn is_satisfied(kind: TargetKind, desired: &str, observed: &str) -> bool {
    if observed.eq_ignore_ascii_case(desired) {
        return true;
    }
    kind == TargetKind::Job && !is_terminal_job_state(desired) && is_terminal_job_state(observed)
}

/// Queries the target until it reports the desired state and returns the
/// matching record.
///
/// When waiting for an in-flight job state, a job that has already finished
/// also ends the wait.
///
/// # Errors
///
/// Returns [`PollError::InvalidState`] without querying when the desired
/// state is not legal, and [`PollError::Query`] on the first failed query.
pub async fn poll_until<A: JobApi>(
    api: &A,
    request: &PollRequest,
) -> Result<RemoteRecord, PollError<A::Error>> {
    let desired = validate_state(request.target_kind, &request.desired_state)?;
    let id = request.target_id.as_str();
    match request.target_kind {
        TargetKind::Job => poll_loop(request, &desired, || api.get_job(id), job_state)
            .await
            .map(RemoteRecord::Job),
        TargetKind::Machine => {
            poll_loop(request, &desired, || api.get_machine(id), machine_state)
                .await
                .map(RemoteRecord::Machine)
        }
    }
}

/// Waits for job `job_id` to reach `desired_state` and returns its record.
///
/// # Errors
///
/// As [`poll_until`].
pub async fn poll_job<A: JobApi>(
    api: &A,
    job_id: &str,
    desired_state: &str,
    interval: Duration,
) -> Result<JobRecord, PollError<A::Error>> {
    let request = PollRequest::new(TargetKind::Job, job_id, desired_state).with_interval(interval);
    let desired = validate_state(TargetKind::Job, desired_state)?;
    poll_loop(&request, &desired, || api.get_job(job_id), job_state).await
}

fn job_state(job: &JobRecord) -> &str {
    &job.state
}

fn machine_state(machine: &MachineRecord) -> &str {
    &machine.state
}

async fn poll_loop<T, E, F, Fut>(
    request: &PollRequest,
    desired: &str,
    mut fetch: F,
    state_of: fn(&T) -> &str,
) -> Result<T, PollError<E>>
where
    E: std::error::Error + 'static,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let kind = request.target_kind;
    loop {
        let record = fetch()
            .await
            .map_err(|source| PollError::Query { kind, source })?;
        let state = state_of(&record);
        debug!(
            %kind,
            id = %request.target_id,
            state,
            desired,
            "poll tick"
        );
        if is_satisfied(kind, desired, state) {
            return Ok(record);
        }
        sleep(request.interval).await;
    }
}
