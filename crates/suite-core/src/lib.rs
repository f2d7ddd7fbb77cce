//! Core of the dynamic suite scheduler
//!
//! Given a declarative set of tests (control files), this crate resolves which
//! tests to run, schedules one child job per test against a remote job queue,
//! waits for the jobs to finish and decides, with a bounded retry policy,
//! whether a failed job is rescheduled.
//!
//! The pieces:
//! - [`control`]: control file parsing, sources, predicates and the catalog
//! - [`retry`]: the per-job retry ledger and the suite-wide retry budget
//! - [`scheduler`]: turns a test definition into a job creation request
//! - [`controller`]: the schedule → wait → retry → report loop
//! - [`reporter`]: bug/notification records for terminal failures
//! - [`jobqueue`]: the job queue collaborator (JSON-RPC client, retrying decorator, mock)

pub mod config;
pub mod control;
pub mod controller;
pub mod jobqueue;
pub mod keyval;
pub mod logging;
pub mod provision;
pub mod reporter;
pub mod retry;
pub mod scheduler;
pub mod status;
pub mod summary;
pub mod waiter;

pub use control::{ComposedPredicate, ControlError, ControlFileCatalog, Predicate, TestDefinition};
pub use controller::{SuiteController, SuiteError, SuiteOptions, SuiteState, WaitStrategy};
pub use jobqueue::{JobId, JobQueue, RpcError};
pub use retry::{LedgerError, RetryLedger, RetryState};
pub use scheduler::{ChildJobScheduler, ScheduleOutcome, ScheduledJob, SchedulerOptions};
pub use status::{JobResult, Status, StatusEntry, StatusRecorder};
pub use summary::{ReturnCode, SuiteSummary};

// Re-export toml for config table access
pub use toml;
