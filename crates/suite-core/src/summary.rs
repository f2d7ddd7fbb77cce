//! Outcome of a suite run and the process return code derived from it

use crate::status::{JobResult, Status};
use serde::Serialize;
use std::fmt;

/// Exit code of a suite run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReturnCode {
    Ok = 0,
    Error = 1,
    Warning = 2,
    InfraFailure = 3,
    SuiteTimeout = 4,
    BoardNotAvailable = 5,
}

impl ReturnCode {
    pub fn code(self) -> i32 {
        self as i32
    }
}

impl fmt::Display for ReturnCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReturnCode::Ok => "OK",
            ReturnCode::Error => "ERROR",
            ReturnCode::Warning => "WARNING",
            ReturnCode::InfraFailure => "INFRA_FAILURE",
            ReturnCode::SuiteTimeout => "SUITE_TIMEOUT",
            ReturnCode::BoardNotAvailable => "BOARD_NOT_AVAILABLE",
        };
        write!(f, "{name} ({})", self.code())
    }
}

impl From<ReturnCode> for std::process::ExitCode {
    fn from(code: ReturnCode) -> Self {
        std::process::ExitCode::from(code as u8)
    }
}

/// What a suite run produced
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SuiteSummary {
    pub tag: String,
    /// Jobs created in the initial scheduling pass
    pub scheduled: usize,
    /// Tests skipped as not applicable to the board/pool
    pub not_applicable: usize,
    /// Results not superseded by a retry, in arrival order
    pub final_results: Vec<JobResult>,
    /// Retry jobs created
    pub retries: usize,
    pub schedule_failed: bool,
    pub wait_failed: bool,
    /// Waiting was cancelled before every job reported
    pub cancelled: bool,
}

impl SuiteSummary {
    /// Worst status among executed final results
    pub fn worst_status(&self) -> Option<Status> {
        self.final_results
            .iter()
            .filter(|r| r.test_executed && !r.is_testna())
            .map(|r| r.status)
            .max()
    }

    /// Some job was aborted before its test started running
    pub fn aborted_before_start(&self) -> bool {
        self.final_results
            .iter()
            .any(|r| !r.test_executed && r.status == Status::Abort)
    }

    pub fn return_code(&self) -> ReturnCode {
        if self.schedule_failed || self.wait_failed {
            return ReturnCode::InfraFailure;
        }
        let worst = self.worst_status();
        let failed = worst.is_some_and(|s| s.is_worse_than(Status::Warn));
        if self.cancelled {
            return if failed {
                ReturnCode::Error
            } else {
                ReturnCode::SuiteTimeout
            };
        }
        if self.scheduled == 0 {
            return if self.not_applicable > 0 {
                ReturnCode::BoardNotAvailable
            } else {
                ReturnCode::InfraFailure
            };
        }
        if failed {
            ReturnCode::Error
        } else if self.aborted_before_start() {
            // Jobs only abort before starting when the suite ran out of time
            ReturnCode::SuiteTimeout
        } else if worst == Some(Status::Warn) || self.retries > 0 {
            ReturnCode::Warning
        } else {
            ReturnCode::Ok
        }
    }

    pub fn passed(&self) -> usize {
        self.final_results.iter().filter(|r| r.is_good()).count()
    }
}

impl fmt::Display for SuiteSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Suite {}: {}", self.tag, self.return_code())?;
        writeln!(
            f,
            "  scheduled {}, not applicable {}, retries {}, passed {}/{}",
            self.scheduled,
            self.not_applicable,
            self.retries,
            self.passed(),
            self.final_results.len()
        )?;
        for result in &self.final_results {
            writeln!(f, "  {:<8} {} (job {})", result.status, result.test_name, result.id)?;
        }
        Ok(())
    }
}
