//! Mock job queue for testing

use super::error::RpcError;
use super::types::{CreateJobRequest, Host, Job, JobId};
use super::JobQueue;
use crate::status::{JobResult, Status};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};

/// Record of method calls for test assertions
#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    CreateJob(Box<CreateJobRequest>),
    GetJobs(JobId),
    PollResults(Vec<JobId>),
    Abort(Vec<JobId>),
    GetHosts(Vec<String>),
}

/// Scripted failure returned instead of a real answer
#[derive(Debug, Clone, PartialEq)]
pub enum MockFailure {
    NoEligibleHost,
    NonexistentBoard,
    /// Validation error that is not about the board label
    Validation,
    Transport(String),
    Remote(String),
}

impl MockFailure {
    fn to_error(&self) -> RpcError {
        match self {
            MockFailure::NoEligibleHost => RpcError::NoEligibleHost {
                message: "No hosts satisfy the dependencies".to_string(),
            },
            MockFailure::NonexistentBoard => RpcError::Validation {
                message: "invalid meta_hosts".to_string(),
                problem_keys: BTreeMap::from([(
                    "meta_hosts".to_string(),
                    "Label \"board:doesnotexist\" not found".to_string(),
                )]),
            },
            MockFailure::Validation => RpcError::Validation {
                message: "invalid job".to_string(),
                problem_keys: BTreeMap::from([
                    ("meta_hosts".to_string(), "bad".to_string()),
                    ("dependencies".to_string(), "bad".to_string()),
                ]),
            },
            MockFailure::Transport(message) => RpcError::transport(message.clone()),
            MockFailure::Remote(message) => RpcError::Remote {
                name: "RemoteException".to_string(),
                message: message.clone(),
            },
        }
    }
}

/// How a created job ends
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MockOutcome {
    Finished { status: Status, executed: bool },
    /// Never finishes
    Running,
}

impl MockOutcome {
    pub fn status(status: Status) -> Self {
        MockOutcome::Finished {
            status,
            executed: true,
        }
    }

    /// Aborted before the test reached the running state
    pub fn not_executed(status: Status) -> Self {
        MockOutcome::Finished {
            status,
            executed: false,
        }
    }
}

#[derive(Debug)]
struct MockJob {
    job: Job,
    test_name: String,
    outcome: MockOutcome,
}

#[derive(Debug, Default)]
struct MockState {
    next_id: u64,
    jobs: BTreeMap<JobId, MockJob>,
    create_failures: HashMap<String, VecDeque<MockFailure>>,
    outcomes: HashMap<String, VecDeque<MockOutcome>>,
    hosts: Vec<Host>,
    abort_failure: Option<MockFailure>,
    poll_transport_failures: u32,
    calls: Vec<MockCall>,
}

/// Mock job queue. Jobs finish as soon as they are created, with outcomes
/// scripted per test name (default: GOOD).
#[derive(Debug, Clone, Default)]
pub struct MockJobQueue {
    state: Arc<Mutex<MockState>>,
}

fn test_name_of(job_name: &str) -> String {
    job_name.rsplit('/').next().unwrap_or(job_name).to_string()
}

impl MockJobQueue {
    pub fn new() -> Self {
        let queue = Self::default();
        queue.state.lock().unwrap().next_id = 100;
        queue
    }

    /// Outcomes for successive jobs created for `test_name`
    pub fn script_outcomes(
        &self,
        test_name: &str,
        outcomes: impl IntoIterator<Item = MockOutcome>,
    ) {
        self.state
            .lock()
            .unwrap()
            .outcomes
            .entry(test_name.to_string())
            .or_default()
            .extend(outcomes);
    }

    /// Shorthand for executed jobs ending with `statuses`
    pub fn script_statuses(&self, test_name: &str, statuses: impl IntoIterator<Item = Status>) {
        self.script_outcomes(test_name, statuses.into_iter().map(MockOutcome::status));
    }

    /// Failures for successive `create_job` calls for `test_name`
    pub fn fail_creates(&self, test_name: &str, failures: impl IntoIterator<Item = MockFailure>) {
        self.state
            .lock()
            .unwrap()
            .create_failures
            .entry(test_name.to_string())
            .or_default()
            .extend(failures);
    }

    /// The next `count` polls fail at the transport level
    pub fn fail_polls_with_transport(&self, count: u32) {
        self.state.lock().unwrap().poll_transport_failures = count;
    }

    pub fn fail_aborts_with(&self, failure: MockFailure) {
        self.state.lock().unwrap().abort_failure = Some(failure);
    }

    pub fn set_hosts(&self, hosts: Vec<Host>) {
        self.state.lock().unwrap().hosts = hosts;
    }

    pub fn get_calls(&self) -> Vec<MockCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    /// Every create_job request that reached the queue, including failed ones
    pub fn create_requests(&self) -> Vec<CreateJobRequest> {
        self.get_calls()
            .into_iter()
            .filter_map(|call| match call {
                MockCall::CreateJob(request) => Some(*request),
                _ => None,
            })
            .collect()
    }

    /// Ids of successfully created jobs, in creation order
    pub fn created_job_ids(&self) -> Vec<JobId> {
        self.state.lock().unwrap().jobs.keys().copied().collect()
    }

    /// Job ids of successfully created jobs for one test
    pub fn jobs_for_test(&self, test_name: &str) -> Vec<JobId> {
        self.state
            .lock()
            .unwrap()
            .jobs
            .values()
            .filter(|j| j.test_name == test_name)
            .map(|j| j.job.id)
            .collect()
    }

    pub fn aborted_job_ids(&self) -> Vec<JobId> {
        self.get_calls()
            .into_iter()
            .filter_map(|call| match call {
                MockCall::Abort(ids) => Some(ids),
                _ => None,
            })
            .flatten()
            .collect()
    }
}

impl JobQueue for MockJobQueue {
    fn create_job(&self, request: &CreateJobRequest) -> Result<Job, RpcError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(MockCall::CreateJob(Box::new(request.clone())));

        let test_name = test_name_of(&request.name);
        if let Some(failure) = state
            .create_failures
            .get_mut(&test_name)
            .and_then(VecDeque::pop_front)
        {
            return Err(failure.to_error());
        }

        state.next_id += 1;
        let id = JobId(state.next_id);
        let outcome = state
            .outcomes
            .get_mut(&test_name)
            .and_then(VecDeque::pop_front)
            .unwrap_or(MockOutcome::status(Status::Good));
        let job = Job {
            id,
            name: request.name.clone(),
            owner: Some("chromeos-test".to_string()),
            parent_job_id: request.parent_job_id,
        };
        state.jobs.insert(
            id,
            MockJob {
                job: job.clone(),
                test_name,
                outcome,
            },
        );
        Ok(job)
    }

    fn get_jobs(&self, parent_job_id: JobId) -> Result<Vec<Job>, RpcError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(MockCall::GetJobs(parent_job_id));
        Ok(state
            .jobs
            .values()
            .filter(|j| j.job.parent_job_id == Some(parent_job_id))
            .map(|j| j.job.clone())
            .collect())
    }

    fn poll_results(&self, job_ids: &[JobId]) -> Result<Vec<JobResult>, RpcError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(MockCall::PollResults(job_ids.to_vec()));
        if state.poll_transport_failures > 0 {
            state.poll_transport_failures -= 1;
            return Err(RpcError::transport("connection reset by peer"));
        }

        Ok(job_ids
            .iter()
            .filter_map(|id| state.jobs.get(id))
            .filter_map(|mock| match mock.outcome {
                MockOutcome::Finished { status, executed } => Some(JobResult {
                    id: mock.job.id,
                    test_name: mock.test_name.clone(),
                    owner: mock.job.owner.clone(),
                    status,
                    reason: format!("{} finished with {status}", mock.test_name),
                    test_executed: executed,
                    begin_time: None,
                    end_time: None,
                }),
                MockOutcome::Running => None,
            })
            .collect())
    }

    fn abort_host_queue_entries(&self, job_ids: &[JobId]) -> Result<(), RpcError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(MockCall::Abort(job_ids.to_vec()));
        match &state.abort_failure {
            Some(failure) => Err(failure.to_error()),
            None => Ok(()),
        }
    }

    fn get_hosts(&self, labels: &[String]) -> Result<Vec<Host>, RpcError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(MockCall::GetHosts(labels.to_vec()));
        Ok(state
            .hosts
            .iter()
            .filter(|h| !h.invalid && labels.iter().all(|l| h.labels.contains(l)))
            .cloned()
            .collect())
    }

    fn queue_name(&self) -> &str {
        "MockJobQueue"
    }
}
