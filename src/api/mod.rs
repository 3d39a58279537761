//! Remote compute API abstraction and its HTTP implementation.

use std::future::Future;
use std::pin::Pin;

mod error;
mod http;
mod types;

pub use error::ApiError;
pub use http::HttpJobApi;
pub use types::{
    CreateJobParams, Credentials, END_OF_LOG_MARKER, JobRecord, LogLine, MachineRecord,
    RemoteRecord, WorkspaceUpload,
};

/// Future returned by API operations.
pub type ApiFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Operations the job pipeline needs from the remote service.
pub trait JobApi {
    /// Implementation specific error type.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Submits a job, uploading the workspace archive when one is attached.
    fn create_job<'a>(&'a self, params: &'a CreateJobParams)
    -> ApiFuture<'a, JobRecord, Self::Error>;

    /// Fetches the current record for `job_id`.
    fn get_job<'a>(&'a self, job_id: &'a str) -> ApiFuture<'a, JobRecord, Self::Error>;

    /// Fetches the current record for `machine_id`.
    fn get_machine<'a>(&'a self, machine_id: &'a str)
    -> ApiFuture<'a, MachineRecord, Self::Error>;

    /// Fetches log lines for `job_id` starting after line `from_line`.
    fn job_logs<'a>(
        &'a self,
        job_id: &'a str,
        from_line: u64,
    ) -> ApiFuture<'a, Vec<LogLine>, Self::Error>;
}
