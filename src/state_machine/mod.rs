mod job;
mod state;

pub use job::{Failure, FailureKind, JobRecord, JobStatus, RetryPolicy};
pub use state::{
    GiveUpReason, PollOutcome, StartOutcome, StateMachine, Transition, classify_start_error,
};
