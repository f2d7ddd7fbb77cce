//! Job queue collaborator: the remote service that creates, reports on and
//! aborts child jobs

mod error;
mod json_rpc;
#[cfg(any(test, feature = "test-support"))]
mod mock;
mod retrying;
mod types;

pub use error::RpcError;
pub use json_rpc::JsonRpcJobQueue;
#[cfg(any(test, feature = "test-support"))]
pub use mock::{MockCall, MockFailure, MockJobQueue, MockOutcome};
pub use retrying::RetryingJobQueue;
pub use types::{ControlType, CreateJobRequest, Host, Job, JobId, RebootBefore};

use crate::status::JobResult;

/// Blocking job queue operations the suite core depends on.
///
/// Implementations are shared behind `Arc<dyn JobQueue>` between the
/// scheduler, the waiter and the controller.
pub trait JobQueue: Send + Sync + std::fmt::Debug {
    /// Create one job; returns the job as registered by the queue
    fn create_job(&self, request: &CreateJobRequest) -> Result<Job, RpcError>;

    /// Child jobs of a parent (suite) job
    fn get_jobs(&self, parent_job_id: JobId) -> Result<Vec<Job>, RpcError>;

    /// Terminal results for whichever of `job_ids` have finished.
    ///
    /// Jobs still queued or running are simply absent from the answer.
    fn poll_results(&self, job_ids: &[JobId]) -> Result<Vec<JobResult>, RpcError>;

    /// Bulk-abort the host queue entries of the given jobs
    fn abort_host_queue_entries(&self, job_ids: &[JobId]) -> Result<(), RpcError>;

    /// Valid hosts carrying every label in `labels`
    fn get_hosts(&self, labels: &[String]) -> Result<Vec<Host>, RpcError>;

    /// Name for logging/display
    fn queue_name(&self) -> &str;
}
