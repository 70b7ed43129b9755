//! Job records and enqueue requests

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::constants::{JobPriority, JobStatus};

/// A background job as persisted in the queue store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    /// Handler name this job is dispatched to
    pub job_type: String,
    pub queue: String,
    pub priority: JobPriority,
    pub payload: Value,
    pub status: JobStatus,
    pub retry_count: u32,
    pub max_retries: u32,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl Job {
    /// Build a fresh Pending job from an enqueue request
    pub fn from_request(request: JobRequest, default_max_retries: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_type: request.job_type,
            queue: request.queue,
            priority: request.priority,
            payload: request.payload,
            status: JobStatus::Pending,
            retry_count: 0,
            max_retries: request.max_retries.unwrap_or(default_max_retries),
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            result: None,
            last_error: None,
        }
    }
}

/// Caller-facing enqueue request
///
/// On the wire the handler name travels as `name` and the queue as
/// `queue_name`; priority, queue, and retry budget may be omitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRequest {
    #[serde(rename = "name")]
    pub job_type: String,
    pub payload: Value,
    #[serde(default)]
    pub priority: JobPriority,
    #[serde(rename = "queue_name", default = "default_queue")]
    pub queue: String,
    /// Overrides the configured default retry budget when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
}

fn default_queue() -> String {
    "default".to_string()
}

impl JobRequest {
    pub fn new(job_type: impl Into<String>, payload: Value) -> Self {
        Self {
            job_type: job_type.into(),
            payload,
            priority: JobPriority::default(),
            queue: default_queue(),
            max_retries: None,
        }
    }

    pub fn with_priority(mut self, priority: JobPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = queue.into();
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_job_from_request_defaults() {
        let request = JobRequest::new("noop", json!({"x": 1}));
        let job = Job::from_request(request, 3);

        assert_eq!(job.job_type, "noop");
        assert_eq!(job.queue, "default");
        assert_eq!(job.priority, JobPriority::Normal);
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.retry_count, 0);
        assert_eq!(job.max_retries, 3);
        assert_eq!(job.payload, json!({"x": 1}));
    }

    #[test]
    fn test_job_request_builder_overrides() {
        let request = JobRequest::new("cleanup", json!({}))
            .with_priority(JobPriority::Critical)
            .with_queue("maintenance")
            .with_max_retries(7);
        let job = Job::from_request(request, 3);

        assert_eq!(job.priority, JobPriority::Critical);
        assert_eq!(job.queue, "maintenance");
        assert_eq!(job.max_retries, 7);
    }

    #[test]
    fn test_job_request_deserializes_wire_names_and_defaults() {
        let request: JobRequest = serde_json::from_str(
            r#"{"name": "noop", "payload": {"x": 1}, "priority": "critical"}"#,
        )
        .unwrap();

        assert_eq!(request.job_type, "noop");
        assert_eq!(request.payload, json!({"x": 1}));
        assert_eq!(request.priority, JobPriority::Critical);
        assert_eq!(request.queue, "default");
        assert_eq!(request.max_retries, None);

        let explicit: JobRequest = serde_json::from_str(
            r#"{"name": "cleanup", "payload": {}, "queue_name": "maintenance", "max_retries": 5}"#,
        )
        .unwrap();
        assert_eq!(explicit.queue, "maintenance");
        assert_eq!(explicit.priority, JobPriority::Normal);
        assert_eq!(explicit.max_retries, Some(5));

        let wire = serde_json::to_value(&explicit).unwrap();
        assert_eq!(wire["name"], "cleanup");
        assert_eq!(wire["queue_name"], "maintenance");
    }

    #[test]
    fn test_job_serde_round_trip() {
        let job = Job::from_request(JobRequest::new("noop", json!({"k": "v"})), 2);
        let serialized = serde_json::to_string(&job).unwrap();
        let restored: Job = serde_json::from_str(&serialized).unwrap();

        assert_eq!(restored.id, job.id);
        assert_eq!(restored.payload, job.payload);
        assert_eq!(restored.status, JobStatus::Pending);
    }
}
