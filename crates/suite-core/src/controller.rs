//! Suite controller: schedule every test, wait for results, retry failures
//! within budget and hand terminal failures to the reporter.

use crate::config::ConfigError;
use crate::control::{
    ComposedPredicate, ControlError, ControlFileCatalog, Predicate, TestDefinition,
};
use crate::jobqueue::{JobId, JobQueue, RpcError};
use crate::keyval::{self, KeyvalFile};
use crate::reporter::{ReportError, ResultReporter, TestFailure};
use crate::retry::{LedgerError, RetryLedger};
use crate::scheduler::{
    ChildJobScheduler, DeploymentMode, ScheduleOutcome, ScheduledJob, SchedulerOptions,
    get_test_source_build,
};
use crate::status::{JobResult, Status, StatusEntry, StatusRecorder};
use crate::summary::SuiteSummary;
use crate::waiter::{PollingWaiter, ResultWaiter, WaitError};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const TEST_NA_REASON: &str = "Skipping: test not supported on this board/pool.";

/// Top-level error of a suite run
#[derive(Debug, Error)]
pub enum SuiteError {
    #[error(transparent)]
    Control(#[from] ControlError),

    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error("retry bookkeeping violated: {0}")]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Report(#[from] ReportError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Wait(#[from] WaitError),

    #[error("invalid argument: {0}")]
    Argument(String),

    #[error("cannot {operation} a suite in state {state:?}")]
    InvalidState {
        operation: &'static str,
        state: SuiteState,
    },

    #[error("suite was cancelled while waiting for results")]
    Cancelled,
}

/// Lifecycle of a [`SuiteController`]; it only moves forward
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuiteState {
    Created,
    Scheduling,
    Scheduled,
    /// Results are being consumed; retries are scheduled in this state
    Waiting,
    Done,
}

/// When the controller stops consuming results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitStrategy {
    /// Until every watched job, retries included, has reported
    #[default]
    AllJobs,
    /// Until `required` jobs have finished GOOD
    UntilSuccesses { required: usize },
}

impl WaitStrategy {
    pub fn should_stop_waiting(&self, successes: usize) -> bool {
        match self {
            WaitStrategy::AllJobs => false,
            WaitStrategy::UntilSuccesses { required } => successes >= *required,
        }
    }
}

/// Settings of one suite run
#[derive(Debug, Clone)]
pub struct SuiteOptions {
    pub tag: String,
    pub builds: BTreeMap<String, String>,
    /// Board label, e.g. `board:eve`
    pub board: String,
    /// Pool label, e.g. `pool:bvt`
    pub pool: Option<String>,
    pub extra_deps: Vec<String>,
    pub child_dependencies: Vec<String>,
    pub max_runtime_mins: u32,
    pub timeout_mins: u32,
    pub suite_job_id: Option<JobId>,
    pub ignore_deps: bool,
    pub priority: i32,
    pub offload_failures_only: bool,
    pub test_source_build: Option<String>,
    pub job_keyvals: BTreeMap<String, Value>,
    pub deployment: DeploymentMode,
    /// Where suite keyvals are written
    pub results_dir: Option<PathBuf>,
    pub file_bugs: bool,
    /// Retry failed jobs, within each test's JOB_RETRIES
    pub job_retry: bool,
    /// Suite-wide retry budget; `None` is unbounded
    pub max_retries: Option<u32>,
    /// Only results strictly worse than this are retried
    pub retry_level: Status,
    pub wait_for_results: bool,
    pub wait_strategy: WaitStrategy,
    pub poll_interval: Duration,
}

impl Default for SuiteOptions {
    fn default() -> Self {
        let scheduler = SchedulerOptions::default();
        Self {
            tag: String::new(),
            builds: BTreeMap::new(),
            board: String::new(),
            pool: None,
            extra_deps: Vec::new(),
            child_dependencies: Vec::new(),
            max_runtime_mins: scheduler.max_runtime_mins,
            timeout_mins: scheduler.timeout_mins,
            suite_job_id: None,
            ignore_deps: false,
            priority: 0,
            offload_failures_only: false,
            test_source_build: None,
            job_keyvals: BTreeMap::new(),
            deployment: DeploymentMode::Lab,
            results_dir: None,
            file_bugs: false,
            job_retry: false,
            max_retries: None,
            retry_level: Status::Warn,
            wait_for_results: true,
            wait_strategy: WaitStrategy::AllJobs,
            poll_interval: Duration::from_secs(5),
        }
    }
}

impl SuiteOptions {
    /// Dependencies added to every child job: extra deps, board, pool,
    /// then child dependencies
    pub fn suite_dependencies(&self) -> Vec<String> {
        let mut deps = self.extra_deps.clone();
        deps.push(self.board.clone());
        deps.extend(self.pool.iter().cloned());
        deps.extend(self.child_dependencies.iter().cloned());
        deps
    }

    fn scheduler_options(&self, test_source_build: Option<String>) -> SchedulerOptions {
        SchedulerOptions {
            tag: self.tag.clone(),
            builds: self.builds.clone(),
            board: self.board.clone(),
            max_runtime_mins: self.max_runtime_mins,
            timeout_mins: self.timeout_mins,
            suite_job_id: self.suite_job_id,
            ignore_deps: self.ignore_deps,
            extra_deps: self.suite_dependencies(),
            priority: self.priority,
            offload_failures_only: self.offload_failures_only,
            test_source_build,
            job_keyvals: self.job_keyvals.clone(),
            deployment: self.deployment,
        }
    }
}

/// Orchestrates one suite: `Created -> Scheduling -> Scheduled -> Waiting -> Done`.
///
/// Single-threaded. The retry ledger is owned here and only touched from
/// the wait loop, so a retry's budget decrement and state transition happen
/// together.
#[derive(Debug)]
pub struct SuiteController {
    options: SuiteOptions,
    tests: Vec<Arc<TestDefinition>>,
    queue: Arc<dyn JobQueue>,
    scheduler: ChildJobScheduler,
    state: SuiteState,
    jobs: Vec<ScheduledJob>,
    jobs_to_tests: HashMap<JobId, Arc<TestDefinition>>,
    ledger: Option<RetryLedger>,
    reporter: Option<Box<dyn ResultReporter>>,
    cancel: Option<CancellationToken>,
    keyvals: Option<KeyvalFile>,
    summary: SuiteSummary,
    successes: usize,
}

impl SuiteController {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        tests: Vec<TestDefinition>,
        options: SuiteOptions,
    ) -> Result<Self, SuiteError> {
        if options.board.trim().is_empty() {
            return Err(SuiteError::Argument("a board label is required".to_string()));
        }
        let test_source_build = if options.builds.is_empty() {
            options.test_source_build.clone()
        } else {
            Some(get_test_source_build(
                &options.builds,
                options.test_source_build.as_deref(),
            )?)
        };
        let scheduler = ChildJobScheduler::new(
            Arc::clone(&queue),
            options.scheduler_options(test_source_build),
        );
        let keyvals = options.results_dir.as_deref().map(KeyvalFile::in_dir);
        let summary = SuiteSummary {
            tag: options.tag.clone(),
            ..Default::default()
        };
        Ok(Self {
            tests: tests.into_iter().map(Arc::new).collect(),
            queue,
            scheduler,
            state: SuiteState::Created,
            jobs: Vec::new(),
            jobs_to_tests: HashMap::new(),
            ledger: None,
            reporter: None,
            cancel: None,
            keyvals,
            summary,
            successes: 0,
            options,
        })
    }

    /// Suite of every test matching `predicate` anywhere in the catalog
    pub fn from_catalog(
        queue: Arc<dyn JobQueue>,
        catalog: &ControlFileCatalog,
        predicate: &ComposedPredicate,
        options: SuiteOptions,
    ) -> Result<Self, SuiteError> {
        let tests = catalog.find_and_parse_tests(predicate, None)?;
        info!("Discovered {} tests for suite {}", tests.len(), options.tag);
        Self::new(queue, tests, options)
    }

    /// Suite of the tests tagged with `options.tag`
    pub fn from_suite_name(
        queue: Arc<dyn JobQueue>,
        catalog: &ControlFileCatalog,
        options: SuiteOptions,
    ) -> Result<Self, SuiteError> {
        let predicate = ComposedPredicate::from(Predicate::name_in_suite(&options.tag));
        let tests = catalog.find_and_parse_tests(&predicate, Some(&options.tag))?;
        info!("Discovered {} tests for suite {}", tests.len(), options.tag);
        Self::new(queue, tests, options)
    }

    pub fn with_reporter(mut self, reporter: Box<dyn ResultReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn options(&self) -> &SuiteOptions {
        &self.options
    }

    pub fn state(&self) -> SuiteState {
        self.state
    }

    pub fn tests(&self) -> &[Arc<TestDefinition>] {
        &self.tests
    }

    /// Every created job, retries included, in creation order
    pub fn jobs(&self) -> &[ScheduledJob] {
        &self.jobs
    }

    /// Test behind a created job
    pub fn test_for(&self, job_id: JobId) -> Option<&Arc<TestDefinition>> {
        self.jobs_to_tests.get(&job_id)
    }

    /// Retry bookkeeping; set once scheduling finished with retries enabled
    pub fn ledger(&self) -> Option<&RetryLedger> {
        self.ledger.as_ref()
    }

    pub fn summary(&self) -> SuiteSummary {
        self.summary.clone()
    }

    fn expect_state(
        &self,
        expected: SuiteState,
        operation: &'static str,
    ) -> Result<(), SuiteError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(SuiteError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    /// Create one child job per test.
    ///
    /// A test with no eligible host is recorded as TEST_NA and skipped. Any
    /// other scheduling error stops the pass and is recorded as a suite FAIL.
    /// Returns the number of jobs created.
    pub fn schedule(&mut self, recorder: &mut dyn StatusRecorder) -> Result<usize, SuiteError> {
        self.expect_state(SuiteState::Created, "schedule")?;
        self.state = SuiteState::Scheduling;
        let tag = self.options.tag.clone();
        recorder.record(StatusEntry::info(tag.as_str(), format!("Start {tag}")));

        let suite_keyvals: Vec<(String, String)> = self
            .options
            .job_keyvals
            .iter()
            .map(|(key, value)| {
                let value = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (key.clone(), value)
            })
            .collect();
        self.write_keyvals(suite_keyvals);

        if self.options.job_retry {
            for test in &mut self.tests {
                if test.job_retries.is_none() {
                    Arc::make_mut(test).job_retries = Some(1);
                }
            }
        }

        let mut scheduled = 0;
        for test in self.tests.clone() {
            match self.schedule_test(&test, None, recorder) {
                Ok(Some(_)) => scheduled += 1,
                Ok(None) => {}
                Err(e) => {
                    error!("Exception while scheduling suite {tag}: {e}");
                    recorder.record(StatusEntry::result(
                        Status::Fail,
                        tag.as_str(),
                        format!("Exception while scheduling suite: {e}"),
                    ));
                    self.summary.schedule_failed = true;
                    break;
                }
            }
        }

        let names: Vec<String> = self.jobs.iter().map(|j| format!("'{}'", j.test.name)).collect();
        self.write_keyvals([
            (keyval::SCHEDULED_TEST_COUNT.to_string(), scheduled.to_string()),
            (keyval::SCHEDULED_TEST_NAMES.to_string(), format!("[{}]", names.join(", "))),
        ]);

        if self.options.job_retry {
            self.ledger = Some(RetryLedger::initialize(
                self.jobs_to_tests.iter().map(|(id, test)| (*id, test.job_retries)),
                self.options.retry_level,
                self.options.max_retries,
            ));
        }

        info!("Scheduled {scheduled} of {} tests for suite {tag}", self.tests.len());
        self.summary.scheduled = scheduled;
        self.state = SuiteState::Scheduled;
        Ok(scheduled)
    }

    /// Schedule one test; `Ok(None)` when it is not applicable to the board/pool
    fn schedule_test(
        &mut self,
        test: &Arc<TestDefinition>,
        retry_for: Option<JobId>,
        recorder: &mut dyn StatusRecorder,
    ) -> Result<Option<JobId>, SuiteError> {
        match self.scheduler.create_job(test, retry_for) {
            Ok(ScheduleOutcome::Scheduled(job)) => {
                if let (Some(old), Some(ledger)) = (retry_for, self.ledger.as_mut()) {
                    ledger.record_retry(old, job.id)?;
                }
                self.remember_job_keyval(&job.test.name, job.id, job.owner.as_deref());
                self.jobs_to_tests.insert(job.id, Arc::clone(test));
                let id = job.id;
                self.jobs.push(job);
                Ok(Some(id))
            }
            Ok(ScheduleOutcome::NotApplicable { test_name, message }) => {
                info!("{test_name} is not applicable: {message}");
                recorder.record(StatusEntry::result(Status::TestNa, test_name, TEST_NA_REASON));
                if retry_for.is_none() {
                    self.summary.not_applicable += 1;
                }
                Ok(None)
            }
            Err(e) => {
                if let (Some(old), Some(ledger)) = (retry_for, self.ledger.as_mut()) {
                    ledger.record_attempted(old)?;
                }
                Err(e.into())
            }
        }
    }

    /// Wait with a polling waiter over the job queue
    pub fn wait(&mut self, recorder: &mut dyn StatusRecorder) -> Result<(), SuiteError> {
        let mut waiter = PollingWaiter::new(Arc::clone(&self.queue), self.options.poll_interval);
        if let Some(token) = self.cancel.clone() {
            waiter = waiter.with_cancellation(token);
        }
        self.wait_with(&mut waiter, recorder)
    }

    /// Consume results from `waiter` until every job reported or the wait
    /// strategy says to stop.
    ///
    /// Collaborator failures are recorded as a suite FAIL and end waiting.
    /// Retry bookkeeping violations are recorded and returned.
    pub fn wait_with(
        &mut self,
        waiter: &mut dyn ResultWaiter,
        recorder: &mut dyn StatusRecorder,
    ) -> Result<(), SuiteError> {
        self.expect_state(SuiteState::Scheduled, "wait for")?;
        self.state = SuiteState::Waiting;
        let tag = self.options.tag.clone();

        let job_ids = match self.options.suite_job_id {
            Some(parent) => match self.queue.get_jobs(parent) {
                Ok(jobs) => jobs.into_iter().map(|j| j.id).collect(),
                Err(e) => {
                    self.record_wait_failure(recorder, &e.to_string());
                    self.state = SuiteState::Done;
                    return Ok(());
                }
            },
            None => self.jobs.iter().map(|j| j.id).collect::<Vec<_>>(),
        };
        waiter.add_jobs(&job_ids);

        loop {
            match waiter.next_result() {
                Ok(Some(result)) => {
                    if let Err(e) = self.handle_result(result, waiter, recorder) {
                        self.record_wait_failure(recorder, &e.to_string());
                        self.state = SuiteState::Done;
                        return Err(e);
                    }
                    if self.options.wait_strategy.should_stop_waiting(self.successes) {
                        debug!("Wait strategy satisfied after {} successes", self.successes);
                        break;
                    }
                }
                Ok(None) => break,
                Err(WaitError::Cancelled) => {
                    warn!("Waiting for suite {tag} was cancelled");
                    recorder.record(StatusEntry::result(
                        Status::Abort,
                        tag.as_str(),
                        "Waiting for results was cancelled",
                    ));
                    self.summary.cancelled = true;
                    self.state = SuiteState::Done;
                    return Err(SuiteError::Cancelled);
                }
                Err(WaitError::Rpc(e)) => {
                    self.record_wait_failure(recorder, &e.to_string());
                    break;
                }
            }
        }
        self.state = SuiteState::Done;
        Ok(())
    }

    fn record_wait_failure(&mut self, recorder: &mut dyn StatusRecorder, error: &str) {
        error!("Exception waiting for results of {}: {error}", self.options.tag);
        recorder.record(StatusEntry::result(
            Status::Fail,
            self.options.tag.as_str(),
            format!("Exception waiting for results: {error}"),
        ));
        self.summary.wait_failed = true;
    }

    fn handle_result(
        &mut self,
        result: JobResult,
        waiter: &mut dyn ResultWaiter,
        recorder: &mut dyn StatusRecorder,
    ) -> Result<(), SuiteError> {
        result.record_all(recorder);
        self.remember_job_keyval(&result.test_name, result.id, result.owner.as_deref());

        let mut retried = false;
        if self.options.job_retry
            && self.ledger.as_ref().is_some_and(|l| l.should_retry(&result))
        {
            retried = self.retry_result(&result, waiter, recorder)?;
        }

        // A retried result is superseded; a suite that stops waiting before
        // the retry reports loses it.
        let superseded = retried
            && self
                .ledger
                .as_ref()
                .is_some_and(|l| l.has_following_retry(&result));
        if superseded {
            debug!("Result of job {} superseded by a retry", result.id);
            return Ok(());
        }

        if self.options.file_bugs
            && result.test_executed
            && !result.is_testna()
            && result.is_worse_than(Status::Good)
        {
            self.report(&result);
        }
        if result.is_good() {
            self.successes += 1;
        }
        self.summary.final_results.push(result);
        Ok(())
    }

    /// Reschedule the test of `result`. Returns whether a retry job exists.
    fn retry_result(
        &mut self,
        result: &JobResult,
        waiter: &mut dyn ResultWaiter,
        recorder: &mut dyn StatusRecorder,
    ) -> Result<bool, SuiteError> {
        let Some(test) = self.jobs_to_tests.get(&result.id) else {
            warn!("No test known for job {}; not retrying", result.id);
            return Ok(false);
        };
        let mut retry_test = TestDefinition::clone(test);
        retry_test.fast = false;
        let retry_test = Arc::new(retry_test);

        match self.schedule_test(&retry_test, Some(result.id), recorder) {
            Ok(Some(new_id)) => {
                info!("Retrying {} (job {}) as job {new_id}", retry_test.name, result.id);
                waiter.add_job(new_id);
                self.summary.retries += 1;
                Ok(true)
            }
            Ok(None) => Ok(false),
            Err(SuiteError::Ledger(e)) => Err(SuiteError::Ledger(e)),
            Err(e) => {
                error!("Failed to schedule test: {}, Reason: {e}", retry_test.name);
                Ok(false)
            }
        }
    }

    fn report(&mut self, result: &JobResult) {
        let Some(reporter) = self.reporter.as_mut() else {
            return;
        };
        let failure = TestFailure {
            result: result.clone(),
            test: self.jobs_to_tests.get(&result.id).cloned(),
            build: self.scheduler.cros_build().unwrap_or_default().to_string(),
            suite: self.options.tag.clone(),
        };
        if let Err(e) = reporter.report(&failure) {
            warn!("Failed to report failure of {} (job {}): {e}", result.test_name, result.id);
        }
    }

    /// Best-effort bulk abort of every created job. Never fails.
    pub fn abort(&self) {
        let ids: Vec<JobId> = self.jobs.iter().map(|j| j.id).collect();
        if ids.is_empty() {
            return;
        }
        info!("Aborting {} jobs of suite {}", ids.len(), self.options.tag);
        if let Err(e) = self.queue.abort_host_queue_entries(&ids) {
            warn!("Failed to abort jobs of suite {}: {e}", self.options.tag);
        }
    }

    /// Schedule, wait when configured, and summarise. A cancelled wait
    /// aborts the outstanding jobs.
    pub fn run(&mut self, recorder: &mut dyn StatusRecorder) -> Result<SuiteSummary, SuiteError> {
        self.schedule(recorder)?;
        if self.options.wait_for_results {
            match self.wait(recorder) {
                Ok(()) => {}
                Err(SuiteError::Cancelled) => self.abort(),
                Err(e) => return Err(e),
            }
        }
        Ok(self.summary())
    }

    /// `sha256(test name) = <job id>-<owner>`, for result parsing
    fn remember_job_keyval(&self, test_name: &str, job_id: JobId, owner: Option<&str>) {
        let Some(owner) = owner else {
            return;
        };
        if test_name.is_empty() {
            return;
        }
        let key = format!("{:x}", Sha256::digest(test_name.as_bytes()));
        self.write_keyvals([(key, format!("{job_id}-{owner}"))]);
    }

    fn write_keyvals<I>(&self, pairs: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let Some(file) = self.keyvals.as_ref() else {
            return;
        };
        if let Err(e) = file.append(pairs) {
            warn!("Failed to write keyvals to {}: {e}", file.path().display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobqueue::MockJobQueue;
    use crate::status::{EntryCode, StatusLog};
    use tempfile::TempDir;

    fn test(name: &str) -> TestDefinition {
        TestDefinition::parse(
            &format!("client/site_tests/{name}/control"),
            &format!("NAME = '{name}'\nSUITE = 'bvt'\n"),
        )
        .unwrap()
    }

    fn options() -> SuiteOptions {
        SuiteOptions {
            tag: "bvt".to_string(),
            builds: BTreeMap::from([(
                "cros-version".to_string(),
                "eve-release/R70-11000.0.0".to_string(),
            )]),
            board: "board:eve".to_string(),
            pool: Some("pool:bvt".to_string()),
            poll_interval: Duration::ZERO,
            ..Default::default()
        }
    }

    #[test]
    fn test_wait_strategy() {
        assert!(!WaitStrategy::AllJobs.should_stop_waiting(100));
        let s = WaitStrategy::UntilSuccesses { required: 2 };
        assert!(!s.should_stop_waiting(1));
        assert!(s.should_stop_waiting(2));
    }

    #[test]
    fn test_suite_dependencies_order() {
        let opts = SuiteOptions {
            extra_deps: vec!["chameleon".to_string()],
            child_dependencies: vec!["servo".to_string()],
            ..options()
        };
        assert_eq!(
            opts.suite_dependencies(),
            vec!["chameleon", "board:eve", "pool:bvt", "servo"]
        );
    }

    #[test]
    fn test_board_is_required() {
        let opts = SuiteOptions {
            board: String::new(),
            ..options()
        };
        let err = SuiteController::new(Arc::new(MockJobQueue::new()), vec![], opts).unwrap_err();
        assert!(matches!(err, SuiteError::Argument(_)));
    }

    #[test]
    fn test_state_machine_only_moves_forward() {
        let queue = MockJobQueue::new();
        let mut suite =
            SuiteController::new(Arc::new(queue), vec![test("dummy_Pass")], options()).unwrap();
        let mut log = StatusLog::new();
        assert!(matches!(
            suite.wait(&mut log),
            Err(SuiteError::InvalidState { state: SuiteState::Created, .. })
        ));
        assert_eq!(suite.schedule(&mut log).unwrap(), 1);
        assert_eq!(suite.state(), SuiteState::Scheduled);
        assert!(suite.schedule(&mut log).is_err());
        suite.wait(&mut log).unwrap();
        assert_eq!(suite.state(), SuiteState::Done);
        assert_eq!(log.entries()[0].code, EntryCode::Info);
        assert_eq!(log.entries()[0].reason, "Start bvt");
    }

    #[test]
    fn test_job_keyvals_are_remembered() {
        let tmp = TempDir::new().unwrap();
        let queue = MockJobQueue::new();
        let mut suite = SuiteController::new(
            Arc::new(queue),
            vec![test("dummy_Pass"), test("dummy_Fail")],
            SuiteOptions {
                results_dir: Some(tmp.path().to_path_buf()),
                job_keyvals: BTreeMap::from([
                    ("cidb_build_id".to_string(), Value::from(4242)),
                    ("suite_owner".to_string(), Value::from("chromeos-test")),
                ]),
                ..options()
            },
        )
        .unwrap();
        suite.schedule(&mut StatusLog::new()).unwrap();

        let pairs = KeyvalFile::in_dir(tmp.path()).read().unwrap();
        // Suite keyvals come before anything about child jobs
        assert_eq!(pairs[0], ("cidb_build_id".to_string(), "4242".to_string()));
        assert_eq!(pairs[1], ("suite_owner".to_string(), "chromeos-test".to_string()));
        let hash = format!("{:x}", Sha256::digest(b"dummy_Pass"));
        assert!(pairs.contains(&(hash, "101-chromeos-test".to_string())));
        assert!(pairs.contains(&("scheduled_test_count".to_string(), "2".to_string())));
        assert!(pairs.contains(&(
            "scheduled_test_names".to_string(),
            "['dummy_Pass', 'dummy_Fail']".to_string()
        )));
    }
}
