//! Shared types for the job queue abstraction

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Opaque job id assigned by the job queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which side the control file runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlType {
    Client,
    Server,
}

/// Host reboot policy before a job runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RebootBefore {
    Never,
    #[serde(rename = "If dirty")]
    IfDirty,
    Always,
}

/// Arguments of a single `create_job` call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateJobRequest {
    pub control_file: String,
    pub name: String,
    pub control_type: ControlType,
    pub meta_hosts: Vec<String>,
    pub dependencies: Vec<String>,
    pub keyvals: BTreeMap<String, serde_json::Value>,
    pub max_runtime_mins: u32,
    pub timeout_mins: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_job_id: Option<JobId>,
    pub test_retry: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reboot_before: Option<RebootBefore>,
    pub run_reset: bool,
    pub priority: i32,
    pub synch_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub require_ssp: Option<bool>,
}

/// A job as known to the job queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub name: String,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub parent_job_id: Option<JobId>,
}

/// A test host (DUT) as known to the job queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Host {
    pub hostname: String,
    pub status: String,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub invalid: bool,
    #[serde(default)]
    pub labels: Vec<String>,
}

impl Host {
    /// Whether the host can take a job right now
    pub fn is_available(&self) -> bool {
        !self.locked && !self.invalid && matches!(self.status.as_str(), "Ready" | "Running")
    }
}
