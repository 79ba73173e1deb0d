//! End-of-run report, printed by the UI and optionally written as JSON.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dispatcher::JobDispatcher;
use crate::error::BatchError;
use crate::state_machine::{JobRecord, JobStatus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobReport {
    pub name: String,
    pub encoding_id: Option<String>,
    pub status: JobStatus,
    pub retry_count: u32,
    pub error_messages: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl From<&JobRecord> for JobReport {
    fn from(job: &JobRecord) -> Self {
        Self {
            name: job.name.clone(),
            encoding_id: job.remote_id().map(str::to_string),
            status: job.status,
            retry_count: job.retry_count,
            error_messages: job.error_messages.clone(),
            created_at: job.created_at,
            started_at: job.started_at,
            finished_at: job.finished_at,
        }
    }
}

/// Outcome of one batch run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: i64,
    pub total: usize,
    pub successful: usize,
    pub given_up: usize,
    pub jobs: Vec<JobReport>,
}

impl BatchReport {
    pub fn from_dispatcher(dispatcher: &JobDispatcher, started_at: DateTime<Utc>) -> Self {
        let now = Utc::now();
        let summary = dispatcher.summary();
        Self {
            run_id: Uuid::new_v4(),
            started_at,
            completed_at: now,
            duration_ms: (now - started_at).num_milliseconds(),
            total: summary.total(),
            successful: summary.successful,
            given_up: summary.given_up,
            jobs: dispatcher.jobs().iter().map(JobReport::from).collect(),
        }
    }

    pub fn write_json(&self, path: &Path) -> Result<(), BatchError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
