use serde::{Deserialize, Serialize};

use super::job::{Failure, FailureKind, JobRecord, JobStatus};
use crate::platform::{PlatformError, RemoteStatus, RetryHint, StatusReport};

/// Result of a start attempt, as seen by the state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum StartOutcome {
    Accepted,
    Rejected(Failure),
}

/// Result of a status poll, as seen by the state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    InProgress { progress: Option<f64> },
    Finished,
    Failed(Failure),
}

impl From<StatusReport> for PollOutcome {
    fn from(report: StatusReport) -> Self {
        match report.status {
            RemoteStatus::Finished => PollOutcome::Finished,
            RemoteStatus::Canceled => PollOutcome::Failed(Failure::new(
                FailureKind::Permanent,
                with_fallback(report.messages, "The encoding was canceled"),
            )),
            status if status.is_error() => {
                let kind = match report.retry_hint {
                    Some(RetryHint::NoRetry) => FailureKind::Permanent,
                    _ => FailureKind::Retryable,
                };
                PollOutcome::Failed(Failure::new(
                    kind,
                    with_fallback(report.messages, "The encoding failed without error messages"),
                ))
            }
            _ => PollOutcome::InProgress {
                progress: report.progress,
            },
        }
    }
}

fn with_fallback(messages: Vec<String>, fallback: &str) -> Vec<String> {
    if messages.is_empty() {
        vec![fallback.to_string()]
    } else {
        messages
    }
}

/// Classify an error returned by the create or start call.
///
/// The queue-limit code takes precedence over any retry hint.
pub fn classify_start_error(err: &PlatformError) -> Failure {
    let kind = if err.is_queue_limit() {
        FailureKind::QueueLimit
    } else if err.retry_hint() == Some(RetryHint::NoRetry) {
        FailureKind::Permanent
    } else {
        FailureKind::Retryable
    };
    let messages = err
        .messages()
        .into_iter()
        .map(|m| format!("The encoding could not be started: {m}"))
        .collect();
    Failure::new(kind, messages)
}

/// Why a job was given up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GiveUpReason {
    Permanent,
    RetriesExhausted,
}

/// The effect an outcome had on a job.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// `Waiting → Started`.
    Started,
    /// The start was deferred by the platform's queue limit; still `Waiting`, no retry charged.
    Deferred,
    /// Failed but within budget; back to (or still) `Waiting`.
    Retry { retry_count: u32, remaining: u32 },
    /// `Started → Successful`.
    Succeeded,
    /// Terminal failure.
    GivenUp(GiveUpReason),
    /// Nothing changed: still running, or the outcome did not apply to the job's status.
    Unchanged,
}

/// Applies start and poll outcomes to a [`JobRecord`].
///
/// Terminal records are never touched; an outcome that does not match the
/// record's current status yields [`Transition::Unchanged`].
pub struct StateMachine;

impl StateMachine {
    pub fn on_start(job: &mut JobRecord, outcome: StartOutcome) -> Transition {
        if job.status != JobStatus::Waiting {
            return Transition::Unchanged;
        }

        match outcome {
            StartOutcome::Accepted => {
                job.set_status(JobStatus::Started);
                job.progress = None;
                Transition::Started
            }
            StartOutcome::Rejected(failure) => match failure.kind {
                FailureKind::QueueLimit => Transition::Deferred,
                _ => Self::handle_failure(job, failure),
            },
        }
    }

    pub fn on_poll(job: &mut JobRecord, outcome: PollOutcome) -> Transition {
        if job.status != JobStatus::Started {
            return Transition::Unchanged;
        }

        match outcome {
            PollOutcome::InProgress { progress } => {
                if progress.is_some() {
                    job.progress = progress;
                }
                Transition::Unchanged
            }
            PollOutcome::Finished => {
                job.progress = Some(100.0);
                job.set_status(JobStatus::Successful);
                Transition::Succeeded
            }
            // A queue-limit signal cannot come from a poll; count it like any retryable failure.
            PollOutcome::Failed(failure) => Self::handle_failure(job, failure),
        }
    }

    fn handle_failure(job: &mut JobRecord, failure: Failure) -> Transition {
        if failure.kind == FailureKind::Permanent {
            Self::give_up(job, failure.messages);
            return Transition::GivenUp(GiveUpReason::Permanent);
        }

        job.retry_count += 1;
        if job.retry_policy.is_exhausted(job.retry_count) {
            Self::give_up(job, failure.messages);
            return Transition::GivenUp(GiveUpReason::RetriesExhausted);
        }

        if job.status != JobStatus::Waiting {
            job.set_status(JobStatus::Waiting);
        }
        Transition::Retry {
            retry_count: job.retry_count,
            remaining: job.retry_policy.remaining(job.retry_count),
        }
    }

    fn give_up(job: &mut JobRecord, messages: Vec<String>) {
        job.error_messages.extend(messages);
        job.set_status(JobStatus::GivenUp);
    }
}
