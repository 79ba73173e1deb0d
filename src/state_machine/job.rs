use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::batch::JobSpec;

/// How a remote failure should be treated by the retry logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    /// Counts against the retry budget; the job goes back to `Waiting`.
    Retryable,
    /// The platform said not to retry; the job gives up immediately.
    Permanent,
    /// The platform's queue is full; retried later at no cost.
    QueueLimit,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Retryable => write!(f, "retryable"),
            FailureKind::Permanent => write!(f, "permanent"),
            FailureKind::QueueLimit => write!(f, "queue limit exceeded"),
        }
    }
}

/// A classified failure together with its diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub kind: FailureKind,
    pub messages: Vec<String>,
}

impl Failure {
    pub fn new(kind: FailureKind, messages: Vec<String>) -> Self {
        Self { kind, messages }
    }
}

/// Lifecycle status of a job within the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobStatus {
    Waiting,
    Started,
    Successful,
    GivenUp,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Successful | JobStatus::GivenUp)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Waiting => write!(f, "WAITING"),
            JobStatus::Started => write!(f, "STARTED"),
            JobStatus::Successful => write!(f, "SUCCESSFUL"),
            JobStatus::GivenUp => write!(f, "GIVEN_UP"),
        }
    }
}

/// Retry budget shared by every job of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retryable failures tolerated before giving up. A job is attempted at
    /// most `max_retries + 1` times.
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 2 }
    }
}

impl RetryPolicy {
    pub fn is_exhausted(&self, retry_count: u32) -> bool {
        retry_count > self.max_retries
    }

    pub fn remaining(&self, retry_count: u32) -> u32 {
        self.max_retries.saturating_sub(retry_count)
    }
}

/// One job of the batch and everything the dispatcher knows about it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub name: String,
    pub input_path: String,
    pub output_path: String,
    /// Assigned on the first start attempt, never replaced afterwards.
    remote_id: Option<String>,
    pub status: JobStatus,
    pub status_history: Vec<JobStatus>,
    pub retry_count: u32,
    pub retry_policy: RetryPolicy,
    pub error_messages: Vec<String>,
    pub progress: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    pub fn new(spec: JobSpec, retry_policy: RetryPolicy) -> Self {
        Self {
            name: spec.name,
            input_path: spec.input_path,
            output_path: spec.output_path,
            remote_id: None,
            status: JobStatus::Waiting,
            status_history: Vec::new(),
            retry_count: 0,
            retry_policy,
            error_messages: Vec::new(),
            progress: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    pub fn spec(&self) -> JobSpec {
        JobSpec::new(&self.name, &self.input_path, &self.output_path)
    }

    pub fn remote_id(&self) -> Option<&str> {
        self.remote_id.as_deref()
    }

    /// Record the id of the remote job. Returns the id in effect, which is
    /// the earlier one if an id had already been assigned.
    pub fn assign_remote_id(&mut self, id: String) -> &str {
        self.remote_id.get_or_insert(id)
    }

    pub(super) fn set_status(&mut self, status: JobStatus) {
        self.status_history.push(self.status);
        self.status = status;
        let now = Utc::now();
        match status {
            JobStatus::Started => self.started_at = Some(now),
            JobStatus::Successful | JobStatus::GivenUp => self.finished_at = Some(now),
            JobStatus::Waiting => {}
        }
    }

    /// Short label for log lines: `'name' (remote id)`.
    pub fn label(&self) -> String {
        match &self.remote_id {
            Some(id) => format!("'{}' ({id})", self.name),
            None => format!("'{}'", self.name),
        }
    }
}
