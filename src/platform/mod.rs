pub mod client;
pub mod error;
pub mod types;

pub use client::PlatformClient;
pub use error::PlatformError;
pub use types::{RemoteStatus, RetryHint};

use crate::batch::JobSpec;

/// Snapshot of a remote job's state as reported by a status poll.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub status: RemoteStatus,
    /// Percentage reported by the platform, if any.
    pub progress: Option<f64>,
    /// Present when the job ended in an error state.
    pub retry_hint: Option<RetryHint>,
    /// ERROR-typed diagnostic messages.
    pub messages: Vec<String>,
}

impl StatusReport {
    pub fn in_progress(status: RemoteStatus, progress: Option<f64>) -> Self {
        Self {
            status,
            progress,
            retry_hint: None,
            messages: Vec::new(),
        }
    }

    pub fn finished() -> Self {
        Self {
            status: RemoteStatus::Finished,
            progress: Some(100.0),
            retry_hint: None,
            messages: Vec::new(),
        }
    }

    pub fn failed(retry_hint: Option<RetryHint>, messages: Vec<String>) -> Self {
        Self {
            status: RemoteStatus::Error,
            progress: None,
            retry_hint,
            messages,
        }
    }
}

impl From<types::Task> for StatusReport {
    fn from(task: types::Task) -> Self {
        let mut messages = task.error_messages();
        if messages.is_empty() {
            messages.extend(task.error.as_ref().and_then(|e| e.text.clone()));
        }
        Self {
            status: task.status,
            progress: task.progress,
            retry_hint: task.error.and_then(|e| e.retry_hint),
            messages,
        }
    }
}

/// Capability the batch loop needs from the encoding platform.
///
/// Implemented over HTTP by [`crate::encoding::EncodingJobClient`]; tests
/// substitute a scripted fake.
#[allow(async_fn_in_trait)]
pub trait RemoteJobClient {
    /// Create the remote job (an encoding with its streams and muxings) and return its id.
    async fn create_job(&self, spec: &JobSpec) -> Result<String, PlatformError>;

    async fn start_job(&self, job_id: &str) -> Result<(), PlatformError>;

    async fn job_status(&self, job_id: &str) -> Result<StatusReport, PlatformError>;

    async fn count_jobs_in_state(&self, status: RemoteStatus) -> Result<u64, PlatformError>;
}
