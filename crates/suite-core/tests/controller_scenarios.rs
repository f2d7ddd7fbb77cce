//! End-to-end suite runs against the mock job queue

use dynamic_suite_core::jobqueue::{Host, MockCall, MockFailure, MockJobQueue, MockOutcome};
use dynamic_suite_core::provision::provision_tests;
use dynamic_suite_core::reporter::{ReportError, ResultReporter, TestFailure};
use dynamic_suite_core::status::{EntryCode, StatusLog};
use dynamic_suite_core::{
    JobId, ReturnCode, RetryState, Status, SuiteController, SuiteError, SuiteOptions, SuiteState,
    TestDefinition, WaitStrategy,
};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Reporter that keeps every failure it is handed
#[derive(Debug, Clone, Default)]
struct RecordingReporter(Arc<Mutex<Vec<TestFailure>>>);

impl RecordingReporter {
    fn reported_jobs(&self) -> Vec<JobId> {
        self.0.lock().unwrap().iter().map(|f| f.result.id).collect()
    }
}

impl ResultReporter for RecordingReporter {
    fn report(&mut self, failure: &TestFailure) -> Result<(), ReportError> {
        self.0.lock().unwrap().push(failure.clone());
        Ok(())
    }
}

fn test(name: &str, extra: &str) -> TestDefinition {
    TestDefinition::parse(
        &format!("client/site_tests/{name}/control"),
        &format!("NAME = '{name}'\nSUITE = 'bvt-inline'\n{extra}"),
    )
    .unwrap()
}

fn options() -> SuiteOptions {
    SuiteOptions {
        tag: "bvt-inline".to_string(),
        builds: BTreeMap::from([(
            "cros-version".to_string(),
            "eve-release/R70-11000.0.0".to_string(),
        )]),
        board: "board:eve".to_string(),
        pool: Some("pool:bvt".to_string()),
        file_bugs: true,
        poll_interval: Duration::ZERO,
        ..Default::default()
    }
}

fn retry_options(max_retries: Option<u32>) -> SuiteOptions {
    SuiteOptions {
        job_retry: true,
        max_retries,
        ..options()
    }
}

fn suite(
    queue: &MockJobQueue,
    tests: Vec<TestDefinition>,
    options: SuiteOptions,
) -> (SuiteController, RecordingReporter) {
    let reporter = RecordingReporter::default();
    let controller = SuiteController::new(Arc::new(queue.clone()), tests, options)
        .unwrap()
        .with_reporter(Box::new(reporter.clone()));
    (controller, reporter)
}

#[test]
fn retries_until_per_test_limit() {
    let queue = MockJobQueue::new();
    queue.script_statuses("flaky", [Status::Fail, Status::Fail, Status::Fail]);
    let (mut suite, reporter) = suite(
        &queue,
        vec![test("flaky", "JOB_RETRIES = 2\n")],
        retry_options(Some(5)),
    );

    let mut log = StatusLog::new();
    let summary = suite.run(&mut log).unwrap();

    let jobs = queue.jobs_for_test("flaky");
    assert_eq!(jobs, vec![JobId(101), JobId(102), JobId(103)]);
    let ledger = suite.ledger().unwrap();
    assert_eq!(ledger.record(JobId(101)).unwrap().state(), RetryState::Retried);
    assert_eq!(ledger.record(JobId(102)).unwrap().retry_max(), 1);
    assert_eq!(ledger.record(JobId(103)).unwrap().retry_max(), 0);
    assert_eq!(ledger.budget().remaining(), Some(3));

    // Only the last failure survives and is reported
    assert_eq!(summary.retries, 2);
    assert_eq!(summary.final_results.len(), 1);
    assert_eq!(summary.final_results[0].id, JobId(103));
    assert_eq!(reporter.reported_jobs(), vec![JobId(103)]);
    assert_eq!(summary.return_code(), ReturnCode::Error);

    // All three attempts are still in the status log
    assert_eq!(log.with_code(EntryCode::End(Status::Fail)).len(), 3);

    let requests = queue.create_requests();
    assert!(!requests[0].keyvals.contains_key("retry_original_job_id"));
    assert_eq!(requests[1].keyvals["retry_original_job_id"], json!(101));
    assert_eq!(requests[2].keyvals["retry_original_job_id"], json!(102));
}

#[test]
fn suite_budget_stops_retries_of_other_tests() {
    let queue = MockJobQueue::new();
    queue.script_statuses("first", [Status::Fail, Status::Good]);
    queue.script_statuses("second", [Status::Fail]);
    let (mut suite, reporter) = suite(
        &queue,
        vec![test("first", "JOB_RETRIES = 1\n"), test("second", "JOB_RETRIES = 1\n")],
        retry_options(Some(1)),
    );

    let summary = suite.run(&mut StatusLog::new()).unwrap();

    assert_eq!(queue.jobs_for_test("first").len(), 2);
    assert_eq!(queue.jobs_for_test("second"), vec![JobId(102)]);
    let ledger = suite.ledger().unwrap();
    assert!(ledger.budget().is_exhausted());
    let second = ledger.record(JobId(102)).unwrap();
    assert_eq!(second.state(), RetryState::NotAttempted);
    assert_eq!(second.retry_max(), 1);

    assert_eq!(reporter.reported_jobs(), vec![JobId(102)]);
    let finals: Vec<JobId> = summary.final_results.iter().map(|r| r.id).collect();
    assert_eq!(finals, vec![JobId(102), JobId(103)]);
}

#[test]
fn unsupported_tests_are_test_na() {
    let queue = MockJobQueue::new();
    queue.fail_creates("no_host", [MockFailure::NoEligibleHost]);
    queue.fail_creates("no_board", [MockFailure::NonexistentBoard]);
    let (mut suite, _) = suite(
        &queue,
        vec![
            test("no_host", "JOB_RETRIES = 1\n"),
            test("no_board", ""),
            test("dummy_Pass", "JOB_RETRIES = 1\n"),
        ],
        retry_options(None),
    );

    let mut log = StatusLog::new();
    assert_eq!(suite.schedule(&mut log).unwrap(), 1);

    let skipped = log.with_code(EntryCode::Result(Status::TestNa));
    assert_eq!(skipped.len(), 2);
    assert_eq!(skipped[0].operation, "no_host");
    assert!(skipped[0].reason.contains("not supported on this board/pool"));
    assert!(log.with_code(EntryCode::Result(Status::Fail)).is_empty());

    // Never mapped, never given a retry record
    assert_eq!(suite.jobs().len(), 1);
    assert_eq!(suite.jobs()[0].test.name, "dummy_Pass");
    assert_eq!(suite.ledger().unwrap().len(), 1);

    suite.wait(&mut log).unwrap();
    let summary = suite.summary();
    assert_eq!(summary.not_applicable, 2);
    assert_eq!(summary.return_code(), ReturnCode::Ok);
}

#[test]
fn board_not_available_when_nothing_schedules() {
    let queue = MockJobQueue::new();
    queue.fail_creates("dummy_Pass", [MockFailure::NoEligibleHost]);
    let (mut suite, _) = suite(&queue, vec![test("dummy_Pass", "")], options());
    let summary = suite.run(&mut StatusLog::new()).unwrap();
    assert_eq!(summary.scheduled, 0);
    assert_eq!(summary.return_code(), ReturnCode::BoardNotAvailable);
}

#[test]
fn failed_retry_marks_job_attempted() {
    let queue = MockJobQueue::new();
    queue.script_statuses("flaky", [Status::Fail]);
    let (mut suite, reporter) = suite(
        &queue,
        vec![test("flaky", "JOB_RETRIES = 2\n")],
        retry_options(None),
    );

    let mut log = StatusLog::new();
    suite.schedule(&mut log).unwrap();
    queue.fail_creates("flaky", [MockFailure::Transport("connection reset".to_string())]);
    suite.wait(&mut log).unwrap();

    let ledger = suite.ledger().unwrap();
    assert_eq!(ledger.record(JobId(101)).unwrap().state(), RetryState::Attempted);
    assert_eq!(ledger.budget().remaining(), None);
    assert_eq!(queue.create_requests().len(), 2);

    // The failure is final and reported
    let summary = suite.summary();
    assert_eq!(summary.retries, 0);
    assert_eq!(reporter.reported_jobs(), vec![JobId(101)]);
    // and a later result for the same job would not be retried again
    assert!(!ledger.should_retry(&summary.final_results[0]));
}

#[test]
fn hard_scheduling_failure_stops_the_pass() {
    let queue = MockJobQueue::new();
    queue.fail_creates("broken", [MockFailure::Remote("database is locked".to_string())]);
    let (mut suite, _) = suite(
        &queue,
        vec![test("first", ""), test("broken", ""), test("never", "")],
        options(),
    );

    let mut log = StatusLog::new();
    let summary = suite.run(&mut log).unwrap();

    assert_eq!(summary.scheduled, 1);
    assert!(summary.schedule_failed);
    assert!(queue.create_requests().iter().all(|r| !r.name.ends_with("/never")));
    let failures = log.with_code(EntryCode::Result(Status::Fail));
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].operation, "bvt-inline");
    assert!(failures[0].reason.starts_with("Exception while scheduling suite"));
    assert_eq!(summary.return_code(), ReturnCode::InfraFailure);
}

#[test]
fn unexecuted_and_mild_failures_are_not_retried() {
    let queue = MockJobQueue::new();
    queue.script_outcomes("aborted", [MockOutcome::not_executed(Status::Abort)]);
    queue.script_statuses("warning", [Status::Warn]);
    let (mut suite, reporter) = suite(
        &queue,
        vec![test("aborted", "JOB_RETRIES = 3\n"), test("warning", "JOB_RETRIES = 3\n")],
        retry_options(None),
    );

    let summary = suite.run(&mut StatusLog::new()).unwrap();
    assert_eq!(summary.retries, 0);
    assert_eq!(queue.create_requests().len(), 2);
    // Not executed: not reported either
    assert_eq!(reporter.reported_jobs(), vec![JobId(102)]);
    // The warning is outranked by the job that never started
    assert_eq!(summary.return_code(), ReturnCode::SuiteTimeout);
}

#[test]
fn abort_before_start_is_a_suite_timeout() {
    let queue = MockJobQueue::new();
    queue.script_outcomes("slow", [MockOutcome::not_executed(Status::Abort)]);
    let (mut suite, reporter) = suite(&queue, vec![test("slow", "")], options());

    let summary = suite.run(&mut StatusLog::new()).unwrap();
    assert_eq!(summary.final_results.len(), 1);
    assert!(!summary.final_results[0].test_executed);
    assert!(reporter.reported_jobs().is_empty());
    assert_eq!(summary.return_code(), ReturnCode::SuiteTimeout);
}

#[test]
fn suite_retry_defaults_missing_job_retries_to_one() {
    let queue = MockJobQueue::new();
    queue.script_statuses("plain", [Status::Fail, Status::Fail]);
    let (mut suite, _) = suite(&queue, vec![test("plain", "FAST = True\n")], retry_options(None));

    let summary = suite.run(&mut StatusLog::new()).unwrap();

    assert_eq!(suite.tests()[0].job_retries, Some(1));
    assert_eq!(summary.retries, 1);
    assert_eq!(queue.jobs_for_test("plain").len(), 2);

    // The retry runs with the full reset
    let requests = queue.create_requests();
    assert!(!requests[0].run_reset);
    assert!(requests[1].run_reset);
    assert!(!suite.test_for(JobId(102)).unwrap().fast);
}

#[test]
fn no_retries_without_suite_retry() {
    let queue = MockJobQueue::new();
    queue.script_statuses("flaky", [Status::Fail]);
    let (mut suite, reporter) = suite(&queue, vec![test("flaky", "JOB_RETRIES = 2\n")], options());
    let summary = suite.run(&mut StatusLog::new()).unwrap();
    assert!(suite.ledger().is_none());
    assert_eq!(summary.retries, 0);
    assert_eq!(reporter.reported_jobs(), vec![JobId(101)]);
    assert_eq!(reporter.0.lock().unwrap()[0].build, "eve-release/R70-11000.0.0");
}

#[test]
fn waits_on_children_of_the_suite_job() {
    let queue = MockJobQueue::new();
    let (mut suite, _) = suite(
        &queue,
        vec![test("a", ""), test("b", "")],
        SuiteOptions {
            suite_job_id: Some(JobId(9)),
            ..options()
        },
    );

    let summary = suite.run(&mut StatusLog::new()).unwrap();
    assert_eq!(summary.final_results.len(), 2);
    assert!(queue.get_calls().contains(&MockCall::GetJobs(JobId(9))));
    assert!(queue.create_requests().iter().all(|r| r.parent_job_id == Some(JobId(9))));
}

#[test]
fn poll_failure_is_a_suite_failure() {
    let queue = MockJobQueue::new();
    let (mut suite, _) = suite(&queue, vec![test("a", "")], options());
    let mut log = StatusLog::new();
    suite.schedule(&mut log).unwrap();
    queue.fail_polls_with_transport(1);
    suite.wait(&mut log).unwrap();

    let failures = log.with_code(EntryCode::Result(Status::Fail));
    assert_eq!(failures.len(), 1);
    assert!(failures[0].reason.starts_with("Exception waiting for results"));
    let summary = suite.summary();
    assert!(summary.wait_failed);
    assert_eq!(summary.return_code(), ReturnCode::InfraFailure);
}

#[test]
fn cancellation_aborts_outstanding_jobs() {
    let queue = MockJobQueue::new();
    queue.script_outcomes("slow", [MockOutcome::Running]);
    let token = CancellationToken::new();
    let (suite, _) = suite(&queue, vec![test("slow", "")], options());
    let mut suite = suite.with_cancellation(token.clone());
    token.cancel();

    let mut log = StatusLog::new();
    let summary = suite.run(&mut log).unwrap();

    assert!(summary.cancelled);
    assert_eq!(summary.return_code(), ReturnCode::SuiteTimeout);
    assert_eq!(queue.aborted_job_ids(), vec![JobId(101)]);
    assert_eq!(log.with_code(EntryCode::Result(Status::Abort)).len(), 1);
    assert_eq!(suite.state(), SuiteState::Done);
}

#[test]
fn abort_is_best_effort() {
    let queue = MockJobQueue::new();
    queue.fail_aborts_with(MockFailure::Transport("down".to_string()));
    let (mut suite, _) = suite(&queue, vec![test("a", ""), test("b", "")], options());
    suite.schedule(&mut StatusLog::new()).unwrap();
    suite.abort();
    assert_eq!(queue.aborted_job_ids(), vec![JobId(101), JobId(102)]);
}

#[test]
fn provisioning_stops_after_required_successes() {
    let queue = MockJobQueue::new();
    queue.set_hosts(
        ["h1", "h2", "h3"]
            .iter()
            .map(|name| Host {
                hostname: name.to_string(),
                status: "Ready".to_string(),
                locked: false,
                invalid: false,
                labels: vec!["board:eve".to_string(), "pool:bvt".to_string()],
            })
            .collect(),
    );
    queue.script_statuses("dummy_Pass", [Status::Fail, Status::Good, Status::Good]);

    let opts = options();
    let (tests, strategy) = provision_tests(
        &queue,
        &opts.suite_dependencies(),
        &test("dummy_Pass", ""),
        1,
        None,
    )
    .unwrap();
    assert_eq!(tests.len(), 3);

    let (mut suite, _) = suite(
        &queue,
        tests,
        SuiteOptions {
            wait_strategy: strategy,
            ..opts
        },
    );
    let summary = suite.run(&mut StatusLog::new()).unwrap();

    // One failure, then the first success ends waiting
    assert_eq!(summary.final_results.len(), 2);
    assert_eq!(summary.passed(), 1);
}

#[test]
fn stop_condition_is_checked_after_each_result() {
    let queue = MockJobQueue::new();
    let (mut suite, _) = suite(
        &queue,
        vec![test("a", ""), test("b", "")],
        SuiteOptions {
            wait_strategy: WaitStrategy::UntilSuccesses { required: 0 },
            ..options()
        },
    );

    let summary = suite.run(&mut StatusLog::new()).unwrap();
    assert_eq!(summary.final_results.len(), 1);
    assert_eq!(suite.state(), SuiteState::Done);
}

#[test]
fn schedule_twice_is_rejected() {
    let queue = MockJobQueue::new();
    let (mut suite, _) = suite(&queue, vec![test("a", "")], options());
    suite.schedule(&mut StatusLog::new()).unwrap();
    assert!(matches!(
        suite.schedule(&mut StatusLog::new()),
        Err(SuiteError::InvalidState { .. })
    ));
}
