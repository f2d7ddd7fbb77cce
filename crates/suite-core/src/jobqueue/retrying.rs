//! Decorator that retries transport failures

use super::error::RpcError;
use super::types::{CreateJobRequest, Host, Job, JobId};
use super::JobQueue;
use crate::status::JobResult;
use std::time::Duration;
use tracing::warn;

/// Wraps a job queue and retries calls that failed at the transport level.
///
/// Structured answers (no eligible host, validation errors, remote
/// exceptions) are returned immediately; only `RpcError::Transport` is
/// retried, at most `max_attempts` times in total.
///
/// `create_job` is never retried: a transport error after the request was
/// sent may hide a job the server already created.
#[derive(Debug)]
pub struct RetryingJobQueue<Q> {
    inner: Q,
    max_attempts: u32,
    delay: Duration,
}

impl<Q: JobQueue> RetryingJobQueue<Q> {
    pub fn new(inner: Q, max_attempts: u32, delay: Duration) -> Self {
        Self {
            inner,
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    pub fn inner(&self) -> &Q {
        &self.inner
    }

    fn with_retries<T>(
        &self,
        method: &str,
        op: impl Fn(&Q) -> Result<T, RpcError>,
    ) -> Result<T, RpcError> {
        let mut attempt = 1;
        loop {
            match op(&self.inner) {
                Err(e) if e.is_transport() && attempt < self.max_attempts => {
                    warn!(
                        "{method} failed (attempt {attempt}/{}): {e}; retrying in {:?}",
                        self.max_attempts, self.delay
                    );
                    attempt += 1;
                    if !self.delay.is_zero() {
                        std::thread::sleep(self.delay);
                    }
                }
                other => return other,
            }
        }
    }
}

impl<Q: JobQueue> JobQueue for RetryingJobQueue<Q> {
    fn create_job(&self, request: &CreateJobRequest) -> Result<Job, RpcError> {
        self.inner.create_job(request)
    }

    fn get_jobs(&self, parent_job_id: JobId) -> Result<Vec<Job>, RpcError> {
        self.with_retries("get_jobs", |q| q.get_jobs(parent_job_id))
    }

    fn poll_results(&self, job_ids: &[JobId]) -> Result<Vec<JobResult>, RpcError> {
        self.with_retries("poll_results", |q| q.poll_results(job_ids))
    }

    fn abort_host_queue_entries(&self, job_ids: &[JobId]) -> Result<(), RpcError> {
        self.with_retries("abort_host_queue_entries", |q| {
            q.abort_host_queue_entries(job_ids)
        })
    }

    fn get_hosts(&self, labels: &[String]) -> Result<Vec<Host>, RpcError> {
        self.with_retries("get_hosts", |q| q.get_hosts(labels))
    }

    fn queue_name(&self) -> &str {
        self.inner.queue_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobqueue::{ControlType, MockCall, MockFailure, MockJobQueue};
    use std::collections::BTreeMap;

    fn request(name: &str) -> CreateJobRequest {
        CreateJobRequest {
            control_file: "job.run_test('dummy_Pass')".to_string(),
            name: name.to_string(),
            control_type: ControlType::Client,
            meta_hosts: vec!["board:eve".to_string()],
            dependencies: Vec::new(),
            keyvals: BTreeMap::new(),
            max_runtime_mins: 1440,
            timeout_mins: 1440,
            parent_job_id: None,
            test_retry: 0,
            reboot_before: None,
            run_reset: true,
            priority: 0,
            synch_count: 1,
            require_ssp: None,
        }
    }

    #[test]
    fn test_transport_errors_are_retried() {
        let mock = MockJobQueue::new();
        mock.fail_polls_with_transport(2);
        let queue = RetryingJobQueue::new(mock.clone(), 3, Duration::ZERO);

        let results = queue.poll_results(&[JobId(1)]).unwrap();
        assert!(results.is_empty());
        let polls = mock
            .get_calls()
            .into_iter()
            .filter(|c| matches!(c, MockCall::PollResults(_)))
            .count();
        assert_eq!(polls, 3);
    }

    #[test]
    fn test_gives_up_after_max_attempts() {
        let mock = MockJobQueue::new();
        mock.fail_polls_with_transport(5);
        let queue = RetryingJobQueue::new(mock.clone(), 2, Duration::ZERO);

        let err = queue.poll_results(&[JobId(1)]).unwrap_err();
        assert!(err.is_transport());
        assert_eq!(mock.get_calls().len(), 2);
    }

    #[test]
    fn test_create_job_is_sent_once() {
        let mock = MockJobQueue::new();
        mock.fail_creates(
            "dummy_Pass",
            [MockFailure::Transport("connection reset".to_string())],
        );
        let queue = RetryingJobQueue::new(mock.clone(), 3, Duration::ZERO);
        let request = request("eve-release/R70-11000.0.0/bvt/dummy_Pass");

        let err = queue.create_job(&request).unwrap_err();
        assert!(err.is_transport());
        assert_eq!(mock.get_calls().len(), 1);
    }

    #[test]
    fn test_structured_errors_are_not_retried() {
        let mock = MockJobQueue::new();
        mock.fail_aborts_with(MockFailure::Remote("denied".to_string()));
        let queue = RetryingJobQueue::new(mock.clone(), 5, Duration::ZERO);

        assert!(queue.abort_host_queue_entries(&[JobId(1)]).is_err());
        assert_eq!(mock.get_calls().len(), 1);
    }
}
