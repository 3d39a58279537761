//! Test support utilities shared across unit and integration tests.

use std::collections::{BTreeSet, VecDeque};
use std::env;
use std::ffi::OsString;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use camino::Utf8PathBuf;
use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;
use tokio::sync::MutexGuard as AsyncMutexGuard;

use crate::api::{ApiFuture, CreateJobParams, JobApi, JobRecord, LogLine, MachineRecord};
use crate::context::{MessageSink, ProgressSink};
use crate::project_store::{ProjectConfig, ProjectConfigStore, ProjectStoreError};

/// Error returned by [`ScriptedJobApi`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ScriptedApiError {
    /// A failure queued by the test.
    #[error("scripted failure: {0}")]
    Scripted(String),
    /// The test did not queue enough responses for the named call.
    #[error("no scripted response for {0}")]
    Exhausted(&'static str),
}

type Scripted<T> = Result<T, ScriptedApiError>;

#[derive(Debug, Default)]
struct ApiState {
    create_responses: VecDeque<Scripted<JobRecord>>,
    job_responses: VecDeque<Scripted<JobRecord>>,
    machine_responses: VecDeque<Scripted<MachineRecord>>,
    log_pages: VecDeque<Scripted<Vec<LogLine>>>,
    created: Vec<CreateJobParams>,
    get_job_calls: usize,
    get_machine_calls: usize,
    log_requests: Vec<u64>,
}

/// Scripted [`JobApi`] that answers from FIFO queues and records calls.
///
/// Clones share state, so a test can keep a handle for assertions after
/// moving one into an orchestrator.
#[derive(Clone, Debug, Default)]
pub struct ScriptedJobApi {
    state: Arc<Mutex<ApiState>>,
}

impl ScriptedJobApi {
    /// Creates an API with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, ApiState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queues the response to the next `create_job` call.
    pub fn push_create(&self, response: Scripted<JobRecord>) {
        self.state().create_responses.push_back(response);
    }

    /// Queues a job record returned by `get_job`.
    pub fn push_job(&self, job_id: &str, state: &str) {
        self.state().job_responses.push_back(Ok(job(job_id, state)));
    }

    /// Queues an arbitrary `get_job` response.
    pub fn push_job_response(&self, response: Scripted<JobRecord>) {
        self.state().job_responses.push_back(response);
    }

    /// Queues a machine record returned by `get_machine`.
    pub fn push_machine(&self, machine_id: &str, state: &str) {
        self.state()
            .machine_responses
            .push_back(Ok(MachineRecord {
                id: machine_id.to_owned(),
                state: state.to_owned(),
                ..MachineRecord::default()
            }));
    }

    /// Queues an arbitrary `get_machine` response.
    pub fn push_machine_response(&self, response: Scripted<MachineRecord>) {
        self.state().machine_responses.push_back(response);
    }

    /// Queues one page of log lines.
    pub fn push_log_page(&self, lines: Vec<LogLine>) {
        self.state().log_pages.push_back(Ok(lines));
    }

    /// Queues a failing log page request.
    pub fn push_log_failure(&self, message: &str) {
        self.state()
            .log_pages
            .push_back(Err(ScriptedApiError::Scripted(message.to_owned())));
    }

    /// Parameters passed to every `create_job` call so far.
    #[must_use]
    pub fn created(&self) -> Vec<CreateJobParams> {
        self.state().created.clone()
    }

    /// Number of `get_job` calls so far.
    #[must_use]
    pub fn get_job_calls(&self) -> usize {
        self.state().get_job_calls
    }

    /// Number of `get_machine` calls so far.
    #[must_use]
    pub fn get_machine_calls(&self) -> usize {
        self.state().get_machine_calls
    }

    /// `from_line` argument of every log request so far.
    #[must_use]
    pub fn log_requests(&self) -> Vec<u64> {
        self.state().log_requests.clone()
    }
}

impl JobApi for ScriptedJobApi {
    type Error = ScriptedApiError;

    fn create_job<'a>(
        &'a self,
        params: &'a CreateJobParams,
    ) -> ApiFuture<'a, JobRecord, Self::Error> {
        Box::pin(async move {
            let mut state = self.state();
            state.created.push(params.clone());
            state
                .create_responses
                .pop_front()
                .unwrap_or(Err(ScriptedApiError::Exhausted("create_job")))
        })
    }

    fn get_job<'a>(&'a self, _job_id: &'a str) -> ApiFuture<'a, JobRecord, Self::Error> {
        Box::pin(async move {
            let mut state = self.state();
            state.get_job_calls += 1;
            state
                .job_responses
                .pop_front()
                .unwrap_or(Err(ScriptedApiError::Exhausted("get_job")))
        })
    }

    fn get_machine<'a>(
        &'a self,
        _machine_id: &'a str,
    ) -> ApiFuture<'a, MachineRecord, Self::Error> {
        Box::pin(async move {
            let mut state = self.state();
            state.get_machine_calls += 1;
            state
                .machine_responses
                .pop_front()
                .unwrap_or(Err(ScriptedApiError::Exhausted("get_machine")))
        })
    }

    fn job_logs<'a>(
        &'a self,
        _job_id: &'a str,
        from_line: u64,
    ) -> ApiFuture<'a, Vec<LogLine>, Self::Error> {
        Box::pin(async move {
            let mut state = self.state();
            state.log_requests.push(from_line);
            state
                .log_pages
                .pop_front()
                .unwrap_or(Err(ScriptedApiError::Exhausted("job_logs")))
        })
    }
}

/// Builds a job record with the given identifier and state.
#[must_use]
pub fn job(job_id: &str, state: &str) -> JobRecord {
    JobRecord {
        id: job_id.to_owned(),
        state: state.to_owned(),
        ..JobRecord::default()
    }
}

/// Builds a log line.
#[must_use]
pub fn log_line(line: u64, message: &str) -> LogLine {
    LogLine {
        line,
        message: message.to_owned(),
        timestamp: None,
    }
}

#[derive(Debug, Default)]
struct StoreState {
    config: ProjectConfig,
    saved: Vec<ProjectConfig>,
    fail_on_save: bool,
}

/// In-memory [`ProjectConfigStore`].
#[derive(Clone, Debug, Default)]
pub struct MemoryProjectStore {
    state: Arc<Mutex<StoreState>>,
}

impl MemoryProjectStore {
    /// Creates a store whose `load` returns `config`.
    #[must_use]
    pub fn with_config(config: ProjectConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(StoreState {
                config,
                ..StoreState::default()
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes every subsequent `save` fail.
    pub fn fail_on_save(&self) {
        self.state().fail_on_save = true;
    }

    /// Every configuration passed to `save`.
    #[must_use]
    pub fn saved(&self) -> Vec<ProjectConfig> {
        self.state().saved.clone()
    }
}

impl ProjectConfigStore for MemoryProjectStore {
    fn load(&self) -> Result<ProjectConfig, ProjectStoreError> {
        Ok(self.state().config.clone())
    }

    fn save(&self, config: &ProjectConfig) -> Result<Utf8PathBuf, ProjectStoreError> {
        let mut state = self.state();
        if state.fail_on_save {
            return Err(ProjectStoreError::Io {
                path: Utf8PathBuf::from("memory"),
                message: String::from("simulated write failure"),
            });
        }
        state.saved.push(config.clone());
        state.config = config.clone();
        Ok(Utf8PathBuf::from("memory"))
    }
}

/// [`MessageSink`] that keeps everything it receives.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RecordingSink {
    /// Status messages in arrival order.
    pub statuses: Vec<String>,
    /// Log lines in arrival order.
    pub log_lines: Vec<String>,
}

impl MessageSink for RecordingSink {
    fn status(&mut self, message: &str) {
        self.statuses.push(message.to_owned());
    }

    fn log_line(&mut self, line: &str) {
        self.log_lines.push(line.to_owned());
    }
}

/// [`ProgressSink`] that keeps every call it receives.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RecordingProgress {
    /// Totals passed to `start`.
    pub starts: Vec<u64>,
    /// Deltas passed to `advance`.
    pub deltas: Vec<u64>,
    /// Number of `finish` calls.
    pub finishes: usize,
}

impl RecordingProgress {
    /// Sum of all deltas.
    #[must_use]
    pub fn advanced(&self) -> u64 {
        self.deltas.iter().sum()
    }
}

impl ProgressSink for RecordingProgress {
    fn start(&mut self, total_bytes: u64) {
        self.starts.push(total_bytes);
    }

    fn advance(&mut self, delta_bytes: u64) {
        self.deltas.push(delta_bytes);
    }

    fn finish(&mut self) {
        self.finishes += 1;
    }
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: AsyncMutex<()> = AsyncMutex::const_new(());

/// Guard that holds the env mutex and restores variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: AsyncMutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets (`Some`) or removes (`None`) environment variables while holding
    /// a global mutex.
    pub async fn set_vars(pairs: &[(&str, Option<&str>)]) -> Self {
        debug_assert!(
            {
                let mut seen = BTreeSet::new();
                pairs.iter().all(|(key, _)| seen.insert(*key))
            },
            "duplicate environment variable keys passed to EnvGuard::set_vars"
        );

        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let old = env::var_os(key);
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe {
                match value {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
            previous.push(((*key).to_owned(), old));
        }

        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in &self.previous {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }
}
