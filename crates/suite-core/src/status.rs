//! Job statuses, terminal job results and status log entries

use crate::jobqueue::JobId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Terminal status of a job, ordered by severity.
///
/// `Good < Warn < Fail < Error < Abort < TestNa`. The order is the job
/// queue's status comparison; this crate consumes it and never redefines it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Good,
    Warn,
    Fail,
    Error,
    Abort,
    TestNa,
}

impl Status {
    /// Canonical upper-case name used in status logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Good => "GOOD",
            Status::Warn => "WARN",
            Status::Fail => "FAIL",
            Status::Error => "ERROR",
            Status::Abort => "ABORT",
            Status::TestNa => "TEST_NA",
        }
    }

    /// True if `self` is strictly more severe than `other`
    pub fn is_worse_than(&self, other: Status) -> bool {
        *self > other
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a status name is not recognised
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown job status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for Status {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GOOD" => Ok(Status::Good),
            "WARN" => Ok(Status::Warn),
            "FAIL" => Ok(Status::Fail),
            "ERROR" => Ok(Status::Error),
            "ABORT" => Ok(Status::Abort),
            "TEST_NA" => Ok(Status::TestNa),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Terminal result of a scheduled job, as observed by the waiter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    /// Job id assigned by the job queue
    pub id: JobId,
    /// Test name the job was created for
    pub test_name: String,
    /// Job owner, if the queue reports one
    #[serde(default)]
    pub owner: Option<String>,
    /// Worst status reported by the job
    pub status: Status,
    /// Human-readable reason attached to the status
    #[serde(default)]
    pub reason: String,
    /// False when the job was aborted before the test ever ran
    pub test_executed: bool,
    #[serde(default)]
    pub begin_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
}

impl JobResult {
    pub fn is_worse_than(&self, level: Status) -> bool {
        self.status.is_worse_than(level)
    }

    pub fn is_good(&self) -> bool {
        self.status == Status::Good
    }

    pub fn is_testna(&self) -> bool {
        self.status == Status::TestNa
    }

    /// Emit START and END entries for this result
    pub fn record_all(&self, recorder: &mut dyn StatusRecorder) {
        recorder.record(StatusEntry {
            code: EntryCode::Start,
            operation: self.test_name.clone(),
            reason: String::new(),
            timestamp: self.begin_time.unwrap_or_else(Utc::now),
        });
        recorder.record(StatusEntry {
            code: EntryCode::End(self.status),
            operation: self.test_name.clone(),
            reason: self.reason.clone(),
            timestamp: self.end_time.unwrap_or_else(Utc::now),
        });
    }
}

/// Kind of a status log line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryCode {
    Info,
    Start,
    End(Status),
    /// A standalone status line (suite-level failures, TEST_NA skips)
    Result(Status),
}

impl fmt::Display for EntryCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryCode::Info => f.write_str("INFO"),
            EntryCode::Start => f.write_str("START"),
            EntryCode::End(status) => write!(f, "END {status}"),
            EntryCode::Result(status) => write!(f, "{status}"),
        }
    }
}

/// One line of the suite status log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEntry {
    pub code: EntryCode,
    /// Test name or suite tag the entry is about
    pub operation: String,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

impl StatusEntry {
    pub fn info(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            code: EntryCode::Info,
            operation: operation.into(),
            reason: reason.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn result(status: Status, operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            code: EntryCode::Result(status),
            operation: operation.into(),
            reason: reason.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

impl fmt::Display for StatusEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{}\t{}\t{}",
            self.code,
            self.operation,
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.reason
        )
    }
}

/// Sink for status log entries produced while scheduling and waiting
pub trait StatusRecorder {
    fn record(&mut self, entry: StatusEntry);
}

impl<F: FnMut(StatusEntry)> StatusRecorder for F {
    fn record(&mut self, entry: StatusEntry) {
        self(entry)
    }
}

/// Recorder that keeps every entry in memory
#[derive(Debug, Clone, Default)]
pub struct StatusLog {
    entries: Vec<StatusEntry>,
}

impl StatusLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[StatusEntry] {
        &self.entries
    }

    /// Entries whose code is `code`, in recording order
    pub fn with_code(&self, code: EntryCode) -> Vec<&StatusEntry> {
        self.entries.iter().filter(|e| e.code == code).collect()
    }
}

impl StatusRecorder for StatusLog {
    fn record(&mut self, entry: StatusEntry) {
        self.entries.push(entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(status: Status) -> JobResult {
        JobResult {
            id: JobId(7),
            test_name: "dummy_Pass".to_string(),
            owner: Some("chromeos-test".to_string()),
            status,
            reason: "reason".to_string(),
            test_executed: true,
            begin_time: None,
            end_time: None,
        }
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Status::Warn.is_worse_than(Status::Good));
        assert!(Status::Fail.is_worse_than(Status::Warn));
        assert!(Status::Error.is_worse_than(Status::Fail));
        assert!(!Status::Warn.is_worse_than(Status::Warn));
        assert!(!Status::Good.is_worse_than(Status::Fail));
    }

    #[test]
    fn test_status_parse_and_display() {
        assert_eq!("warn".parse::<Status>().unwrap(), Status::Warn);
        assert_eq!("TEST_NA".parse::<Status>().unwrap(), Status::TestNa);
        assert!("RUNNING".parse::<Status>().is_err());
        assert_eq!(Status::TestNa.to_string(), "TEST_NA");
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&Status::TestNa).unwrap();
        assert_eq!(json, r#""TEST_NA""#);
        let status: Status = serde_json::from_str(r#""ERROR""#).unwrap();
        assert_eq!(status, Status::Error);
    }

    #[test]
    fn test_result_predicates() {
        assert!(result(Status::Good).is_good());
        assert!(result(Status::TestNa).is_testna());
        assert!(result(Status::Fail).is_worse_than(Status::Warn));
        assert!(!result(Status::Warn).is_worse_than(Status::Warn));
    }

    #[test]
    fn test_record_all_emits_start_and_end() {
        let mut log = StatusLog::new();
        result(Status::Fail).record_all(&mut log);

        let entries = log.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].code, EntryCode::Start);
        assert_eq!(entries[1].code, EntryCode::End(Status::Fail));
        assert_eq!(entries[1].reason, "reason");
    }

    #[test]
    fn test_closure_recorder() {
        let mut seen = Vec::new();
        {
            let mut recorder = |entry: StatusEntry| seen.push(entry.code);
            StatusRecorder::record(&mut recorder, StatusEntry::info("bvt", "Start bvt"));
        }
        assert_eq!(seen, vec![EntryCode::Info]);
    }

    #[test]
    fn test_entry_display() {
        let entry = StatusEntry::result(Status::TestNa, "dummy_Pass", "not supported");
        let line = entry.to_string();
        assert!(line.starts_with("TEST_NA\tdummy_Pass\t"));
        assert!(line.ends_with("not supported"));
    }
}
