//! JSON-RPC job queue client over HTTP

use super::error::RpcError;
use super::types::{CreateJobRequest, Host, Job, JobId};
use super::JobQueue;
use crate::status::{JobResult, Status};
use chrono::{DateTime, Utc};
use reqwest::blocking::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// Job queue reached through a JSON-RPC endpoint.
///
/// Requests are `{"id", "method", "params": [<kwargs>]}`; responses carry
/// either `result` or `error`. Error payloads name the server-side exception
/// (`NoEligibleHostException`, `ValidationError`, ...) so they can be mapped
/// onto [`RpcError`] variants.
#[derive(Debug)]
pub struct JsonRpcJobQueue {
    endpoint: String,
    client: Client,
    next_id: AtomicU64,
}

#[derive(Debug, Deserialize)]
struct RpcEnvelope {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorPayload>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorPayload {
    name: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    problem_keys: Option<BTreeMap<String, String>>,
}

/// Per-job status row returned by `get_job_statuses`
#[derive(Debug, Deserialize)]
struct JobStatusView {
    id: JobId,
    name: String,
    #[serde(default)]
    test_name: Option<String>,
    #[serde(default)]
    owner: Option<String>,
    finished: bool,
    #[serde(default)]
    status: Option<Status>,
    #[serde(default)]
    reason: String,
    #[serde(default = "default_executed")]
    test_executed: bool,
    #[serde(default)]
    begin_time: Option<DateTime<Utc>>,
    #[serde(default)]
    end_time: Option<DateTime<Utc>>,
}

fn default_executed() -> bool {
    true
}

impl JobStatusView {
    fn into_result(self) -> Option<JobResult> {
        if !self.finished {
            return None;
        }
        let status = self.status?;
        let test_name = self
            .test_name
            .unwrap_or_else(|| self.name.rsplit('/').next().unwrap_or_default().to_string());
        Some(JobResult {
            id: self.id,
            test_name,
            owner: self.owner,
            status,
            reason: self.reason,
            test_executed: self.test_executed,
            begin_time: self.begin_time,
            end_time: self.end_time,
        })
    }
}

impl JsonRpcJobQueue {
    /// Create a client for the job queue served at `server`
    pub fn new(server: &str, timeout: Duration) -> Result<Self, RpcError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RpcError::Transport {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;
        Ok(Self {
            endpoint: format!("{}/afe/server/rpc/", server.trim_end_matches('/')),
            client,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({ "id": id, "method": method, "params": [params] });
        debug!("RPC #{id} {method} -> {}", self.endpoint);

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .map_err(|e| RpcError::Transport {
                message: format!("{method} request failed: {e}"),
                source: Some(Box::new(e)),
            })?;

        let http_status = response.status();
        if !http_status.is_success() {
            return Err(RpcError::transport(format!(
                "{method} returned HTTP {http_status}"
            )));
        }

        let envelope: RpcEnvelope = response.json().map_err(|e| RpcError::Decode {
            method: method.to_string(),
            message: e.to_string(),
        })?;
        decode_envelope(method, envelope)
    }

    fn fetch_jobs(&self, filter: Value) -> Result<Vec<Job>, RpcError> {
        self.call("get_jobs", filter)
    }
}

fn decode_envelope<T: DeserializeOwned>(
    method: &str,
    envelope: RpcEnvelope,
) -> Result<T, RpcError> {
    if let Some(error) = envelope.error {
        return Err(classify_error(error));
    }
    serde_json::from_value(envelope.result.unwrap_or(Value::Null)).map_err(|e| RpcError::Decode {
        method: method.to_string(),
        message: e.to_string(),
    })
}

fn classify_error(payload: RpcErrorPayload) -> RpcError {
    match payload.name.as_str() {
        "NoEligibleHostException" => RpcError::NoEligibleHost {
            message: payload.message,
        },
        "ValidationError" => RpcError::Validation {
            message: payload.message,
            problem_keys: payload.problem_keys.unwrap_or_default(),
        },
        _ => RpcError::Remote {
            name: payload.name,
            message: payload.message,
        },
    }
}

impl JobQueue for JsonRpcJobQueue {
    fn create_job(&self, request: &CreateJobRequest) -> Result<Job, RpcError> {
        let params = serde_json::to_value(request).map_err(|e| RpcError::Decode {
            method: "create_job".to_string(),
            message: e.to_string(),
        })?;
        let id: JobId = self.call("create_job", params)?;

        // The queue only answers with an id; fetch the row for the owner.
        // The job exists from here on, so a failed lookup must not turn
        // into an error the caller would answer by creating it again.
        let fallback = || Job {
            id,
            name: request.name.clone(),
            owner: None,
            parent_job_id: request.parent_job_id,
        };
        match self.fetch_jobs(json!({ "id": id })) {
            Ok(mut jobs) if !jobs.is_empty() => Ok(jobs.swap_remove(0)),
            Ok(_) => Ok(fallback()),
            Err(e) => {
                warn!("Created job {id} but could not fetch it: {e}");
                Ok(fallback())
            }
        }
    }

    fn get_jobs(&self, parent_job_id: JobId) -> Result<Vec<Job>, RpcError> {
        self.fetch_jobs(json!({ "parent_job_id": parent_job_id }))
    }

    fn poll_results(&self, job_ids: &[JobId]) -> Result<Vec<JobResult>, RpcError> {
        if job_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows: Vec<JobStatusView> =
            self.call("get_job_statuses", json!({ "job_ids": job_ids }))?;
        Ok(rows.into_iter().filter_map(JobStatusView::into_result).collect())
    }

    fn abort_host_queue_entries(&self, job_ids: &[JobId]) -> Result<(), RpcError> {
        let _: Value = self.call("abort_host_queue_entries", json!({ "job__id__in": job_ids }))?;
        Ok(())
    }

    fn get_hosts(&self, labels: &[String]) -> Result<Vec<Host>, RpcError> {
        self.call(
            "get_hosts",
            json!({ "invalid": false, "multiple_labels": labels }),
        )
    }

    fn queue_name(&self) -> &str {
        "json-rpc"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobqueue::{ControlType, RetryingJobQueue};
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::sync::{Arc, Mutex};

    /// JSON-RPC endpoint on localhost. `answer` maps the method and how many
    /// times it was called before to an HTTP status and body. Returns the
    /// server URL and the log of called methods.
    fn serve(
        answer: impl Fn(&str, usize) -> (u16, String) + Send + 'static,
    ) -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let methods = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&methods);
        std::thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { break };
                let mut reader = BufReader::new(stream.try_clone().unwrap());
                let mut content_length = 0;
                loop {
                    let mut line = String::new();
                    if reader.read_line(&mut line).unwrap() == 0 || line == "\r\n" {
                        break;
                    }
                    if let Some((name, value)) = line.split_once(':') {
                        if name.eq_ignore_ascii_case("content-length") {
                            content_length = value.trim().parse().unwrap();
                        }
                    }
                }
                let mut body = vec![0; content_length];
                reader.read_exact(&mut body).unwrap();
                let request: Value = serde_json::from_slice(&body).unwrap();
                let method = request["method"].as_str().unwrap_or_default().to_string();

                let previous = {
                    let mut methods = log.lock().unwrap();
                    let previous = methods.iter().filter(|m| **m == method).count();
                    methods.push(method.clone());
                    previous
                };
                let (status, body) = answer(&method, previous);
                let response = format!(
                    "HTTP/1.1 {status} X\r\ncontent-type: application/json\r\n\
                     content-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = stream.write_all(response.as_bytes());
            }
        });
        (url, methods)
    }

    fn request() -> CreateJobRequest {
        CreateJobRequest {
            control_file: "job.run_test('dummy_Pass')".to_string(),
            name: "eve-release/R70-11000.0.0/bvt/dummy_Pass".to_string(),
            control_type: ControlType::Client,
            meta_hosts: vec!["board:eve".to_string()],
            dependencies: Vec::new(),
            keyvals: BTreeMap::new(),
            max_runtime_mins: 1440,
            timeout_mins: 1440,
            parent_job_id: Some(JobId(7)),
            test_retry: 0,
            reboot_before: None,
            run_reset: true,
            priority: 0,
            synch_count: 1,
            require_ssp: None,
        }
    }

    fn count(methods: &Mutex<Vec<String>>, method: &str) -> usize {
        methods.lock().unwrap().iter().filter(|m| *m == method).count()
    }

    #[test]
    fn test_failed_lookup_after_create_keeps_the_job() {
        let (url, methods) = serve(|method, previous| match (method, previous) {
            ("create_job", _) => (200, r#"{"id": 1, "result": 102}"#.to_string()),
            ("get_jobs", 0) => (500, "{}".to_string()),
            _ => (
                200,
                r#"{"id": 2, "result": [{"id": 102, "name": "x/bvt/dummy_Pass",
                    "owner": "chromeos-test"}]}"#
                    .to_string(),
            ),
        });
        let client = JsonRpcJobQueue::new(&url, Duration::from_secs(5)).unwrap();
        let queue = RetryingJobQueue::new(client, 3, Duration::ZERO);

        let job = queue.create_job(&request()).unwrap();
        assert_eq!(job.id, JobId(102));
        assert_eq!(job.owner, None);
        assert_eq!(job.parent_job_id, Some(JobId(7)));
        assert_eq!(count(&methods, "create_job"), 1);
        assert_eq!(count(&methods, "get_jobs"), 1);

        // Lookups on their own are still retried
        let jobs = queue.get_jobs(JobId(7)).unwrap();
        assert_eq!(jobs[0].owner.as_deref(), Some("chromeos-test"));
    }

    #[test]
    fn test_transport_failure_on_create_is_not_retried() {
        let (url, methods) = serve(|_, _| (503, "{}".to_string()));
        let client = JsonRpcJobQueue::new(&url, Duration::from_secs(5)).unwrap();
        let queue = RetryingJobQueue::new(client, 3, Duration::ZERO);

        assert!(queue.create_job(&request()).unwrap_err().is_transport());
        assert_eq!(count(&methods, "create_job"), 1);
    }

    fn envelope(raw: &str) -> RpcEnvelope {
        serde_json::from_str(raw).unwrap()
    }

    #[test]
    fn test_endpoint_normalization() {
        let queue = JsonRpcJobQueue::new("http://cautotest/", Duration::from_secs(5)).unwrap();
        assert_eq!(queue.endpoint(), "http://cautotest/afe/server/rpc/");
    }

    #[test]
    fn test_decode_result() {
        let id: JobId =
            decode_envelope("create_job", envelope(r#"{"id": 1, "result": 1234}"#)).unwrap();
        assert_eq!(id, JobId(1234));
    }

    #[test]
    fn test_decode_no_eligible_host() {
        let err = decode_envelope::<JobId>(
            "create_job",
            envelope(r#"{"error": {"name": "NoEligibleHostException", "message": "no hosts"}}"#),
        )
        .unwrap_err();
        assert!(matches!(err, RpcError::NoEligibleHost { .. }));
    }

    #[test]
    fn test_decode_validation_error_with_problem_keys() {
        let err = decode_envelope::<JobId>(
            "create_job",
            envelope(
                r#"{"error": {"name": "ValidationError", "message": "bad",
                    "problem_keys": {"meta_hosts": "Label \"board:doesnotexist\" not found"}}}"#,
            ),
        )
        .unwrap_err();
        assert!(err.is_nonexistent_board());
    }

    #[test]
    fn test_decode_other_remote_error() {
        let err = decode_envelope::<JobId>(
            "create_job",
            envelope(r#"{"error": {"name": "AclAccessViolation", "message": "denied"}}"#),
        )
        .unwrap_err();
        assert!(matches!(err, RpcError::Remote { ref name, .. } if name == "AclAccessViolation"));
        assert!(err.to_string().contains("denied"));
    }

    #[test]
    fn test_status_view_conversion() {
        let finished: JobStatusView = serde_json::from_str(
            r#"{"id": 5, "name": "eve-release/R70/bvt/dummy_Pass", "owner": "chromeos-test",
                "finished": true, "status": "FAIL", "reason": "boom"}"#,
        )
        .unwrap();
        let result = finished.into_result().unwrap();
        assert_eq!(result.id, JobId(5));
        assert_eq!(result.test_name, "dummy_Pass");
        assert_eq!(result.status, Status::Fail);
        assert!(result.test_executed);

        let running: JobStatusView =
            serde_json::from_str(r#"{"id": 6, "name": "x/y/z", "finished": false}"#).unwrap();
        assert!(running.into_result().is_none());
    }
}
