//! Child job creation: one test definition in, one job queue request out

use crate::control::{TestDefinition, TestType};
use crate::controller::SuiteError;
use crate::jobqueue::{ControlType, CreateJobRequest, JobId, JobQueue, RebootBefore, RpcError};
use crate::keyval;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Suffix of CrOS builds that carry an ARC test image
const CHEETS_SUFFIX: &str = "-cheetsth";

/// Where the scheduler runs; only Moblab honours per-test priorities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentMode {
    #[default]
    Lab,
    Moblab,
}

/// Suite-level settings applied to every child job
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// Suite tag, e.g. `bvt-inline`
    pub tag: String,
    /// Version prefix to build, e.g. `cros-version -> eve-release/R70-11000.0.0`
    pub builds: BTreeMap<String, String>,
    /// Board label, e.g. `board:eve`
    pub board: String,
    pub max_runtime_mins: u32,
    pub timeout_mins: u32,
    /// Parent of every child job
    pub suite_job_id: Option<JobId>,
    /// Drop the tests' own DEPENDENCIES
    pub ignore_deps: bool,
    /// Appended to every job's dependencies
    pub extra_deps: Vec<String>,
    pub priority: i32,
    pub offload_failures_only: bool,
    pub test_source_build: Option<String>,
    /// Keyvals of the suite job; a few are inherited by child jobs
    pub job_keyvals: BTreeMap<String, Value>,
    pub deployment: DeploymentMode,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            tag: String::new(),
            builds: BTreeMap::new(),
            board: String::new(),
            max_runtime_mins: 24 * 60,
            timeout_mins: 24 * 60,
            suite_job_id: None,
            ignore_deps: false,
            extra_deps: Vec::new(),
            priority: 0,
            offload_failures_only: false,
            test_source_build: None,
            job_keyvals: BTreeMap::new(),
            deployment: DeploymentMode::Lab,
        }
    }
}

/// A job created for one scheduling attempt of a test.
///
/// Retries are new `ScheduledJob`s; the link to the original job lives in
/// the `retry_original_job_id` keyval only.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledJob {
    pub id: JobId,
    pub name: String,
    pub owner: Option<String>,
    pub test: Arc<TestDefinition>,
    pub created_at: DateTime<Utc>,
}

/// Result of one scheduling attempt
#[derive(Debug, Clone, PartialEq)]
pub enum ScheduleOutcome {
    Scheduled(ScheduledJob),
    /// No host can run the test on this board/pool; not a failure
    NotApplicable { test_name: String, message: String },
}

/// Test source build: `explicit` when given, otherwise the CrOS build with
/// the ARC test suffix removed.
pub fn get_test_source_build(
    builds: &BTreeMap<String, String>,
    explicit: Option<&str>,
) -> Result<String, SuiteError> {
    if let Some(build) = explicit.filter(|b| !b.is_empty()) {
        return Ok(build.to_string());
    }
    let cros_build = builds
        .get(keyval::CROS_VERSION_PREFIX)
        .map(|b| b.strip_suffix(CHEETS_SUFFIX).unwrap_or(b))
        .filter(|b| !b.is_empty());
    cros_build.map(str::to_string).ok_or_else(|| {
        SuiteError::Argument(
            "test_source_build must be specified if CrOS build is not specified".to_string(),
        )
    })
}

/// Creates child jobs for a suite
#[derive(Debug, Clone)]
pub struct ChildJobScheduler {
    queue: Arc<dyn JobQueue>,
    options: SchedulerOptions,
}

impl ChildJobScheduler {
    pub fn new(queue: Arc<dyn JobQueue>, options: SchedulerOptions) -> Self {
        Self { queue, options }
    }

    pub fn options(&self) -> &SchedulerOptions {
        &self.options
    }

    /// The CrOS build, or the first build in key order
    pub fn cros_build(&self) -> Option<&str> {
        self.options
            .builds
            .get(keyval::CROS_VERSION_PREFIX)
            .or_else(|| self.options.builds.values().next())
            .map(String::as_str)
    }

    /// Submit `test` to the job queue.
    ///
    /// "No eligible host" and a nonexistent board label come back as
    /// [`ScheduleOutcome::NotApplicable`]; every other error is returned.
    pub fn create_job(
        &self,
        test: &Arc<TestDefinition>,
        retry_for: Option<JobId>,
    ) -> Result<ScheduleOutcome, RpcError> {
        match retry_for {
            Some(old) => debug!("Scheduling {}, to retry job {old}", test.name),
            None => debug!("Scheduling {}", test.name),
        }
        let request = self.build_request(test, retry_for);
        match self.queue.create_job(&request) {
            Ok(job) => Ok(ScheduleOutcome::Scheduled(ScheduledJob {
                id: job.id,
                name: job.name,
                owner: job.owner,
                test: Arc::clone(test),
                created_at: Utc::now(),
            })),
            Err(e) if e.is_not_applicable() => {
                debug!("{} not applicable for this board/pool: {e}", test.name);
                Ok(ScheduleOutcome::NotApplicable {
                    test_name: test.name.clone(),
                    message: e.to_string(),
                })
            }
            Err(e) => Err(e),
        }
    }

    /// The `create_job` arguments for `test`
    pub fn build_request(
        &self,
        test: &TestDefinition,
        retry_for: Option<JobId>,
    ) -> CreateJobRequest {
        let opts = &self.options;
        let priority = match opts.deployment {
            DeploymentMode::Moblab => opts.priority.max(test.priority),
            DeploymentMode::Lab => opts.priority,
        };
        let build = opts
            .test_source_build
            .as_deref()
            .or(self.cros_build())
            .unwrap_or_default();

        CreateJobRequest {
            control_file: test.text.clone(),
            name: format!("{build}/{}/{}", opts.tag, test.name),
            control_type: match test.test_type {
                TestType::Client => ControlType::Client,
                TestType::Server => ControlType::Server,
            },
            meta_hosts: vec![opts.board.clone(); test.sync_count as usize],
            dependencies: self.job_dependencies(test),
            keyvals: self.job_keyvals(test, retry_for),
            max_runtime_mins: opts.max_runtime_mins,
            timeout_mins: opts.timeout_mins,
            parent_job_id: opts.suite_job_id,
            test_retry: test.retries,
            reboot_before: test.fast.then_some(RebootBefore::Never),
            run_reset: !test.fast,
            priority,
            synch_count: test.sync_count,
            require_ssp: test.require_ssp,
        }
    }

    fn job_dependencies(&self, test: &TestDefinition) -> Vec<String> {
        let mut deps = if self.options.ignore_deps {
            Vec::new()
        } else {
            test.dependencies.clone()
        };
        deps.extend(self.options.extra_deps.iter().cloned());
        deps
    }

    fn job_keyvals(
        &self,
        test: &TestDefinition,
        retry_for: Option<JobId>,
    ) -> BTreeMap<String, Value> {
        let opts = &self.options;
        let cros_build = self.cros_build().unwrap_or_default();
        let mut keyvals = BTreeMap::from([
            (keyval::BUILD.to_string(), Value::from(cros_build)),
            (keyval::SUITE.to_string(), Value::from(opts.tag.as_str())),
            (keyval::EXPERIMENTAL.to_string(), Value::from(test.experimental)),
            (
                keyval::BUILDS.to_string(),
                Value::Object(
                    opts.builds
                        .iter()
                        .map(|(k, v)| (k.clone(), Value::from(v.as_str())))
                        .collect(),
                ),
            ),
        ]);

        // Only when the test code comes from somewhere other than the
        // single CrOS build being tested.
        if let Some(source) = opts.test_source_build.as_deref() {
            if cros_build != source || opts.builds.len() > 1 {
                keyvals.insert(keyval::TEST_SOURCE_BUILD.to_string(), Value::from(source));
                for (prefix, build) in &opts.builds {
                    let key = match prefix.as_str() {
                        keyval::FW_RW_VERSION_PREFIX => keyval::FWRW_BUILD,
                        keyval::FW_RO_VERSION_PREFIX => keyval::FWRO_BUILD,
                        _ => continue,
                    };
                    keyvals.insert(key.to_string(), Value::from(build.as_str()));
                }
            }
        }
        if let Some(parent) = opts.suite_job_id {
            keyvals.insert(keyval::PARENT_JOB_ID.to_string(), Value::from(parent.0));
        }
        if let Some(old) = retry_for {
            keyvals.insert(keyval::RETRY_ORIGINAL_JOB_ID.to_string(), Value::from(old.0));
        }
        if opts.offload_failures_only {
            keyvals.insert(keyval::OFFLOAD_FAILURES_ONLY.to_string(), Value::Bool(true));
        }
        for key in keyval::INHERITED {
            if let Some(value) = opts.job_keyvals.get(*key) {
                keyvals.insert(key.to_string(), value.clone());
            }
        }
        keyvals
    }
}
