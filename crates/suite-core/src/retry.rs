//! Retry bookkeeping: one record per retry-eligible job plus a suite-wide
//! retry budget

use crate::jobqueue::JobId;
use crate::status::{JobResult, Status};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use tracing::debug;

/// Retry state of one job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    NotAttempted,
    /// A retry was attempted but could not be scheduled
    Attempted,
    /// A retry job was created
    Retried,
}

impl fmt::Display for RetryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RetryState::NotAttempted => "NOT_ATTEMPTED",
            RetryState::Attempted => "ATTEMPTED",
            RetryState::Retried => "RETRIED",
        })
    }
}

/// Ledger entry for one job id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryRecord {
    state: RetryState,
    /// Retries left for this job's lineage
    retry_max: u32,
}

impl RetryRecord {
    pub fn state(&self) -> RetryState {
        self.state
    }

    pub fn retry_max(&self) -> u32 {
        self.retry_max
    }
}

/// Suite-wide number of retries still available
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuiteBudget {
    /// `None` is unbounded
    remaining: Option<u32>,
}

impl SuiteBudget {
    pub fn new(max_retries: Option<u32>) -> Self {
        Self {
            remaining: max_retries,
        }
    }

    pub fn remaining(&self) -> Option<u32> {
        self.remaining
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining == Some(0)
    }

    fn consume(&mut self) {
        if let Some(n) = self.remaining.as_mut() {
            *n = n.saturating_sub(1);
        }
    }
}

/// Ledger invariant violations. These are bugs in the caller and must not
/// be swallowed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("job {0} has no retry record")]
    UnknownJob(JobId),

    #[error("job {0} already has a retry record")]
    DuplicateJob(JobId),

    #[error("cannot move job {job_id} from {from} to {to}: retry state is set exactly once")]
    InvalidTransition {
        job_id: JobId,
        from: RetryState,
        to: RetryState,
    },
}

/// Decides whether failed jobs are retried and keeps every lineage within
/// its per-test and suite-wide limits.
///
/// All mutation goes through [`record_retry`](Self::record_retry) and
/// [`record_attempted`](Self::record_attempted), which allow only
/// `NotAttempted -> Retried` and `NotAttempted -> Attempted`.
#[derive(Debug, Clone)]
pub struct RetryLedger {
    records: HashMap<JobId, RetryRecord>,
    retry_level: Status,
    budget: SuiteBudget,
}

impl RetryLedger {
    /// Seed one record per job whose test asked for retries.
    ///
    /// `job_retries` of `None` or zero gets no record; normalising `None`
    /// under a suite-level retry request is the caller's job.
    pub fn initialize<I>(jobs: I, retry_level: Status, max_retries: Option<u32>) -> Self
    where
        I: IntoIterator<Item = (JobId, Option<u32>)>,
    {
        let records = jobs
            .into_iter()
            .filter_map(|(id, job_retries)| match job_retries {
                Some(n) if n > 0 => Some((
                    id,
                    RetryRecord {
                        state: RetryState::NotAttempted,
                        retry_max: n,
                    },
                )),
                _ => None,
            })
            .collect();
        Self {
            records,
            retry_level,
            budget: SuiteBudget::new(max_retries),
        }
    }

    pub fn retry_level(&self) -> Status {
        self.retry_level
    }

    pub fn budget(&self) -> SuiteBudget {
        self.budget
    }

    pub fn record(&self, job_id: JobId) -> Option<&RetryRecord> {
        self.records.get(&job_id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Whether the job behind `result` should be rescheduled now
    pub fn should_retry(&self, result: &JobResult) -> bool {
        if !result.test_executed {
            return false;
        }
        let Some(record) = self.records.get(&result.id) else {
            return false;
        };
        !self.budget.is_exhausted()
            && result.is_worse_than(self.retry_level)
            && record.state == RetryState::NotAttempted
            && record.retry_max > 0
    }

    /// Whether the lineage of `result` will be (or already was) retried, in
    /// which case this result is superseded.
    pub fn has_following_retry(&self, result: &JobResult) -> bool {
        self.records
            .get(&result.id)
            .is_some_and(|r| r.state == RetryState::Retried)
            || self.should_retry(result)
    }

    /// `old_id` was retried as `new_id`
    pub fn record_retry(&mut self, old_id: JobId, new_id: JobId) -> Result<(), LedgerError> {
        if self.records.contains_key(&new_id) {
            return Err(LedgerError::DuplicateJob(new_id));
        }
        let old = self.transition(old_id, RetryState::Retried)?;
        self.records.insert(
            new_id,
            RetryRecord {
                state: RetryState::NotAttempted,
                retry_max: old.retry_max.saturating_sub(1),
            },
        );
        self.budget.consume();
        debug!(
            "Job {old_id} retried as {new_id}; {} retries left for the test, suite budget {:?}",
            old.retry_max.saturating_sub(1),
            self.budget.remaining
        );
        Ok(())
    }

    /// A retry of `job_id` could not be scheduled; never try again
    pub fn record_attempted(&mut self, job_id: JobId) -> Result<(), LedgerError> {
        self.transition(job_id, RetryState::Attempted).map(|_| ())
    }

    fn transition(&mut self, job_id: JobId, to: RetryState) -> Result<RetryRecord, LedgerError> {
        let record = self
            .records
            .get_mut(&job_id)
            .ok_or(LedgerError::UnknownJob(job_id))?;
        if record.state != RetryState::NotAttempted {
            return Err(LedgerError::InvalidTransition {
                job_id,
                from: record.state,
                to,
            });
        }
        let before = *record;
        record.state = to;
        Ok(before)
    }
}
