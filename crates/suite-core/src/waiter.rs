//! Job result waiter: polls the job queue and hands out terminal results
//! one at a time

use crate::jobqueue::{JobId, JobQueue, RpcError};
use crate::status::JobResult;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Longest uninterrupted sleep between cancellation checks
const CANCEL_CHECK_STEP: Duration = Duration::from_millis(200);

#[derive(Debug, Error)]
pub enum WaitError {
    #[error("failed to poll job results: {0}")]
    Rpc(#[from] RpcError),

    #[error("waiting for results was cancelled")]
    Cancelled,
}

/// Source of terminal job results.
///
/// Jobs may be added while results are being consumed (retries); jobs are
/// never removed except when their result is handed out.
pub trait ResultWaiter {
    fn add_job(&mut self, job_id: JobId);

    fn add_jobs(&mut self, job_ids: &[JobId]) {
        for id in job_ids {
            self.add_job(*id);
        }
    }

    /// Block until the next result is available; `None` once every watched
    /// job has been reported
    fn next_result(&mut self) -> Result<Option<JobResult>, WaitError>;
}

/// Waiter that polls the job queue at a fixed interval
#[derive(Debug)]
pub struct PollingWaiter {
    queue: Arc<dyn JobQueue>,
    poll_interval: Duration,
    cancel: Option<CancellationToken>,
    pending: Vec<JobId>,
    seen: HashSet<JobId>,
    ready: VecDeque<JobResult>,
}

impl PollingWaiter {
    pub fn new(queue: Arc<dyn JobQueue>, poll_interval: Duration) -> Self {
        Self {
            queue,
            poll_interval,
            cancel: None,
            pending: Vec::new(),
            seen: HashSet::new(),
            ready: VecDeque::new(),
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Jobs still being watched
    pub fn pending(&self) -> &[JobId] {
        &self.pending
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled)
    }

    fn poll_once(&mut self) -> Result<(), RpcError> {
        let results = self.queue.poll_results(&self.pending)?;
        for result in results {
            if let Some(pos) = self.pending.iter().position(|id| *id == result.id) {
                self.pending.remove(pos);
                self.ready.push_back(result);
            }
        }
        trace!("{} jobs still pending", self.pending.len());
        Ok(())
    }

    fn sleep(&self) -> Result<(), WaitError> {
        let mut remaining = self.poll_interval;
        while !remaining.is_zero() {
            if self.is_cancelled() {
                return Err(WaitError::Cancelled);
            }
            let step = remaining.min(CANCEL_CHECK_STEP);
            std::thread::sleep(step);
            remaining -= step;
        }
        Ok(())
    }
}

impl ResultWaiter for PollingWaiter {
    fn add_job(&mut self, job_id: JobId) {
        if self.seen.insert(job_id) {
            debug!("Watching job {job_id}");
            self.pending.push(job_id);
        }
    }

    fn next_result(&mut self) -> Result<Option<JobResult>, WaitError> {
        loop {
            if let Some(result) = self.ready.pop_front() {
                return Ok(Some(result));
            }
            if self.pending.is_empty() {
                return Ok(None);
            }
            if self.is_cancelled() {
                return Err(WaitError::Cancelled);
            }
            self.poll_once()?;
            if self.ready.is_empty() {
                self.sleep()?;
            }
        }
    }
}
