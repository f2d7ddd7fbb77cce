//! Reporting of terminal test failures

use crate::control::TestDefinition;
use crate::status::JobResult;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt::Debug;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info};

/// Suites whose failures are filed as bugs; every other suite only emails
pub const FILE_BUG_SUITES: &[&str] = &[
    "au",
    "bvt",
    "bvt-cq",
    "bvt-inline",
    "paygen_au_beta",
    "paygen_au_canary",
    "paygen_au_dev",
    "paygen_au_stable",
    "sanity",
    "push_to_prod",
];

const LIST_KEYS: &[&str] = &["labels", "cc", "components"];
const SCALAR_KEYS: &[&str] = &["owner", "status", "summary", "title"];

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("invalid bug template: {message}")]
    InvalidTemplate { message: String },

    #[error("failed to deliver report: {message}")]
    Delivery {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

/// Everything a reporter gets to know about one failure
#[derive(Debug, Clone)]
pub struct TestFailure {
    pub result: JobResult,
    /// Test definition of the failed job, when known
    pub test: Option<Arc<TestDefinition>>,
    pub build: String,
    pub suite: String,
}

/// Receives terminal, non-superseded failures
pub trait ResultReporter: Send + Debug {
    fn report(&mut self, failure: &TestFailure) -> Result<(), ReportError>;
}

/// Bug filing options: a suite-wide default merged with a test's own
/// `BUG_TEMPLATE`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BugTemplate {
    template: Map<String, Value>,
}

impl BugTemplate {
    pub fn new(template: Map<String, Value>) -> Result<Self, ReportError> {
        validate(&template)?;
        Ok(Self { template })
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.template
    }

    /// Merge a test's template over this one: list keys are unioned in
    /// order, scalar keys come from the test when it sets them.
    pub fn finalize(
        &self,
        test_template: &Map<String, Value>,
    ) -> Result<Map<String, Value>, ReportError> {
        validate(test_template)?;
        let mut merged = self.template.clone();
        for (key, value) in test_template {
            if LIST_KEYS.contains(&key.as_str()) {
                let mut items = merged
                    .get(key)
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();
                for item in value.as_array().into_iter().flatten() {
                    if !items.contains(item) {
                        items.push(item.clone());
                    }
                }
                merged.insert(key.clone(), Value::Array(items));
            } else {
                merged.insert(key.clone(), value.clone());
            }
        }
        Ok(merged)
    }
}

fn validate(template: &Map<String, Value>) -> Result<(), ReportError> {
    for (key, value) in template {
        let ok = if LIST_KEYS.contains(&key.as_str()) {
            value
                .as_array()
                .is_some_and(|items| items.iter().all(Value::is_string))
        } else if SCALAR_KEYS.contains(&key.as_str()) {
            value.is_string()
        } else {
            return Err(ReportError::InvalidTemplate {
                message: format!("unknown key '{key}'"),
            });
        };
        if !ok {
            return Err(ReportError::InvalidTemplate {
                message: format!("bad value for '{key}': {value}"),
            });
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BugAction {
    FileBug,
    Email,
}

impl BugAction {
    pub fn for_suite(suite: &str) -> Self {
        if FILE_BUG_SUITES.contains(&suite) {
            BugAction::FileBug
        } else {
            BugAction::Email
        }
    }
}

/// Structured bug/notification record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BugReport {
    pub action: BugAction,
    pub title: String,
    pub suite: String,
    pub build: String,
    pub test_name: String,
    pub job_id: u64,
    pub status: String,
    pub reason: String,
    pub owner: Option<String>,
    pub template: Map<String, Value>,
}

/// Delivery mechanism for bug reports
pub trait NotificationChannel: Send + Debug {
    fn deliver(&mut self, report: &BugReport) -> Result<(), ReportError>;
}

/// Channel that only logs
#[derive(Debug, Default)]
pub struct LogChannel;

impl NotificationChannel for LogChannel {
    fn deliver(&mut self, report: &BugReport) -> Result<(), ReportError> {
        info!(
            "[{:?}] {} (job {}, owner {})",
            report.action,
            report.title,
            report.job_id,
            report.owner.as_deref().unwrap_or("unknown")
        );
        Ok(())
    }
}

/// Channel writing `<job id>.json` and `<job id>.md` into a directory
#[derive(Debug, Clone)]
pub struct ReportDirChannel {
    dir: PathBuf,
}

impl ReportDirChannel {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

fn delivery_error(
    message: String,
    e: impl std::error::Error + Send + Sync + 'static,
) -> ReportError {
    ReportError::Delivery {
        message,
        source: Some(Box::new(e)),
    }
}

impl NotificationChannel for ReportDirChannel {
    fn deliver(&mut self, report: &BugReport) -> Result<(), ReportError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| {
            delivery_error(format!("Failed to create report directory: {}", self.dir.display()), e)
        })?;

        let json_path = self.dir.join(format!("{}.json", report.job_id));
        let json = serde_json::to_string_pretty(report).map_err(|e| {
            delivery_error(
                format!("Failed to serialize report for job {}", report.job_id),
                e,
            )
        })?;
        std::fs::write(&json_path, json)
            .map_err(|e| delivery_error(format!("Failed to write {}", json_path.display()), e))?;

        let list = |key: &str| {
            report
                .template
                .get(key)
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(Value::as_str)
                        .collect::<Vec<_>>()
                        .join(", ")
                })
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "-".to_string())
        };
        let md_path = self.dir.join(format!("{}.md", report.job_id));
        let md = format!(
            "# {}\n\n\
            **Action:** {:?}\n\
            **Suite:** {}\n\
            **Build:** {}\n\
            **Status:** {}\n\
            **Owner:** {}\n\
            **Labels:** {}\n\
            **Cc:** {}\n\n\
            ## Reason\n\n\
            {}\n",
            report.title,
            report.action,
            report.suite,
            report.build,
            report.status,
            report.owner.as_deref().unwrap_or("-"),
            list("labels"),
            list("cc"),
            report.reason
        );
        std::fs::write(&md_path, md)
            .map_err(|e| delivery_error(format!("Failed to write {}", md_path.display()), e))?;

        debug!(
            "Wrote report for job {}: {} and {}",
            report.job_id,
            json_path.display(),
            md_path.display()
        );
        Ok(())
    }
}

/// Reporter turning failures into [`BugReport`]s for a channel
#[derive(Debug)]
pub struct EmailReporter {
    suite_template: BugTemplate,
    channel: Box<dyn NotificationChannel>,
}

impl EmailReporter {
    pub fn new(suite_template: BugTemplate, channel: Box<dyn NotificationChannel>) -> Self {
        Self {
            suite_template,
            channel,
        }
    }

    /// Template for one failure; an invalid test template yields an empty one
    fn bug_template(&self, failure: &TestFailure) -> Map<String, Value> {
        let Some(test) = failure.test.as_ref() else {
            return self.suite_template.as_map().clone();
        };
        match self.suite_template.finalize(&test.bug_template) {
            Ok(template) => template,
            Err(e) => {
                error!(
                    "Merging bug templates failed with error: {e}; \
                     an empty bug template will be used"
                );
                Map::new()
            }
        }
    }

    pub fn build_report(&self, failure: &TestFailure) -> BugReport {
        let template = self.bug_template(failure);
        let result = &failure.result;
        let title = template
            .get("title")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| {
                format!(
                    "[{}] {} {} on {}",
                    failure.suite, result.test_name, result.status, failure.build
                )
            });
        let owner = template
            .get("owner")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| result.owner.clone());
        BugReport {
            action: BugAction::for_suite(&failure.suite),
            title,
            suite: failure.suite.clone(),
            build: failure.build.clone(),
            test_name: result.test_name.clone(),
            job_id: result.id.0,
            status: result.status.to_string(),
            reason: result.reason.clone(),
            owner,
            template,
        }
    }
}

impl ResultReporter for EmailReporter {
    fn report(&mut self, failure: &TestFailure) -> Result<(), ReportError> {
        let report = self.build_report(failure);
        self.channel.deliver(&report)
    }
}
