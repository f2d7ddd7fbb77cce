//! Configuration types

use super::discovery::ConfigError;
use crate::control::{CatalogOptions, DEFAULT_TEST_DIRS};
use crate::controller::SuiteOptions;
use crate::jobqueue::JobId;
use crate::scheduler::DeploymentMode;
use crate::status::Status;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Complete configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SuiteConfig {
    #[serde(default)]
    pub suite: SuiteSection,
    #[serde(default)]
    pub control_files: ControlFilesSection,
    #[serde(default)]
    pub job_queue: JobQueueSection,
    #[serde(default)]
    pub reporting: ReportingSection,
}

/// `[suite]`: what to run and how to treat failures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuiteSection {
    /// Suite tag, e.g. `bvt-inline`
    pub name: Option<String>,
    /// Board label, e.g. `board:eve`
    pub board: Option<String>,
    /// Pool label, e.g. `pool:bvt`
    pub pool: Option<String>,
    /// Version prefix to build, e.g. `cros-version = "eve-release/R70-11000.0.0"`
    pub builds: BTreeMap<String, String>,
    pub test_source_build: Option<String>,
    pub priority: i32,
    pub max_runtime_mins: u32,
    pub timeout_mins: u32,
    pub extra_deps: Vec<String>,
    pub child_dependencies: Vec<String>,
    pub ignore_deps: bool,
    pub offload_failures_only: bool,
    pub job_retry: bool,
    pub max_retries: Option<u32>,
    /// Status name; only results strictly worse are retried
    pub retry_level: String,
    pub deployment: DeploymentMode,
    pub wait_for_results: bool,
    pub poll_interval_secs: u64,
    pub results_dir: Option<PathBuf>,
    /// Keyvals of the suite job
    pub job_keyvals: BTreeMap<String, Value>,
}

impl Default for SuiteSection {
    fn default() -> Self {
        Self {
            name: None,
            board: None,
            pool: None,
            builds: BTreeMap::new(),
            test_source_build: None,
            priority: 0,
            max_runtime_mins: 24 * 60,
            timeout_mins: 24 * 60,
            extra_deps: Vec::new(),
            child_dependencies: Vec::new(),
            ignore_deps: false,
            offload_failures_only: false,
            job_retry: false,
            max_retries: None,
            retry_level: Status::Warn.as_str().to_string(),
            deployment: DeploymentMode::Lab,
            wait_for_results: true,
            poll_interval_secs: 5,
            results_dir: None,
            job_keyvals: BTreeMap::new(),
        }
    }
}

/// `[control_files]`: where tests come from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlFilesSection {
    /// Root of the test checkout
    pub base_dir: PathBuf,
    /// Directories under `base_dir` scanned for control files
    pub test_dirs: Vec<String>,
    /// JSON `{path: text}` manifest used instead of scanning the file system
    pub manifest: Option<PathBuf>,
    pub forgiving_parser: bool,
    pub add_experimental: bool,
    pub run_prod_code: bool,
    pub enable_controls_in_batch: bool,
    /// Injected into every control file as `args_dict`
    pub test_args: Option<Map<String, Value>>,
}

impl Default for ControlFilesSection {
    fn default() -> Self {
        let catalog = CatalogOptions::default();
        Self {
            base_dir: PathBuf::from("."),
            test_dirs: DEFAULT_TEST_DIRS.iter().map(|d| d.to_string()).collect(),
            manifest: None,
            forgiving_parser: catalog.forgiving_parser,
            add_experimental: catalog.add_experimental,
            run_prod_code: catalog.run_prod_code,
            enable_controls_in_batch: catalog.enable_controls_in_batch,
            test_args: None,
        }
    }
}

impl ControlFilesSection {
    pub fn catalog_options(&self) -> CatalogOptions {
        CatalogOptions {
            forgiving_parser: self.forgiving_parser,
            add_experimental: self.add_experimental,
            run_prod_code: self.run_prod_code,
            test_args: self.test_args.clone(),
            enable_controls_in_batch: self.enable_controls_in_batch,
        }
    }
}

/// `[job_queue]`: the RPC server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobQueueSection {
    /// Base URL, e.g. `http://cautotest`
    pub server: Option<String>,
    pub timeout_secs: u64,
    /// Attempts per call when the transport fails
    pub rpc_retries: u32,
    pub retry_delay_secs: u64,
}

impl Default for JobQueueSection {
    fn default() -> Self {
        Self {
            server: None,
            timeout_secs: 60,
            rpc_retries: 3,
            retry_delay_secs: 5,
        }
    }
}

/// `[reporting]`: what happens to terminal failures
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportingSection {
    pub file_bugs: bool,
    /// Reports are written here as JSON and Markdown; logged when unset
    pub report_dir: Option<PathBuf>,
    /// Suite-wide bug template merged under each test's BUG_TEMPLATE
    pub bug_template: Map<String, Value>,
}

impl SuiteConfig {
    pub fn retry_level(&self) -> Result<Status, ConfigError> {
        self.suite
            .retry_level
            .parse()
            .map_err(|e| ConfigError::Invalid(format!("suite.retry_level: {e}")))
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.suite.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "suite.poll_interval_secs must be at least 1".to_string(),
            ));
        }
        if self.suite.max_runtime_mins == 0 || self.suite.timeout_mins == 0 {
            return Err(ConfigError::Invalid(
                "suite.max_runtime_mins and suite.timeout_mins must be positive".to_string(),
            ));
        }
        self.retry_level()?;
        Ok(())
    }

    /// Controller settings for one run; needs a suite name and a board
    pub fn suite_options(&self, suite_job_id: Option<JobId>) -> Result<SuiteOptions, ConfigError> {
        self.validate()?;
        let s = &self.suite;
        let tag = s
            .name
            .clone()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| ConfigError::Invalid("no suite name configured".to_string()))?;
        let board = s
            .board
            .clone()
            .filter(|b| !b.is_empty())
            .ok_or_else(|| ConfigError::Invalid("no board configured".to_string()))?;
        Ok(SuiteOptions {
            tag,
            builds: s.builds.clone(),
            board: label("board", board),
            pool: s.pool.clone().filter(|p| !p.is_empty()).map(|p| label("pool", p)),
            extra_deps: s.extra_deps.clone(),
            child_dependencies: s.child_dependencies.clone(),
            max_runtime_mins: s.max_runtime_mins,
            timeout_mins: s.timeout_mins,
            suite_job_id,
            ignore_deps: s.ignore_deps,
            priority: s.priority,
            offload_failures_only: s.offload_failures_only,
            test_source_build: s.test_source_build.clone(),
            job_keyvals: s.job_keyvals.clone(),
            deployment: s.deployment,
            results_dir: s.results_dir.clone(),
            file_bugs: self.reporting.file_bugs,
            job_retry: s.job_retry,
            max_retries: s.max_retries,
            retry_level: self.retry_level()?,
            wait_for_results: s.wait_for_results,
            poll_interval: Duration::from_secs(s.poll_interval_secs),
            ..Default::default()
        })
    }
}

/// `eve` -> `board:eve`; values already carrying the prefix are kept
fn label(prefix: &str, value: String) -> String {
    if value.starts_with(&format!("{prefix}:")) {
        value
    } else {
        format!("{prefix}:{value}")
    }
}
