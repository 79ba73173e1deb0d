//! The job dispatcher: owns the batch's records and answers the loop's queries.

use serde::Serialize;
use tracing::warn;

use crate::batch::BatchDefinition;
use crate::state_machine::{JobRecord, JobStatus, RetryPolicy};

/// Number of jobs in each status at a point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub waiting: usize,
    pub started: usize,
    pub successful: usize,
    pub given_up: usize,
}

impl BatchSummary {
    pub fn total(&self) -> usize {
        self.waiting + self.started + self.successful + self.given_up
    }

    pub fn finished(&self) -> usize {
        self.successful + self.given_up
    }
}

/// Holds every [`JobRecord`] of a batch in definition order.
pub struct JobDispatcher {
    jobs: Vec<JobRecord>,
}

impl JobDispatcher {
    pub fn new(batch: BatchDefinition, retry_policy: RetryPolicy) -> Self {
        let jobs = batch
            .into_jobs()
            .into_iter()
            .map(|spec| JobRecord::new(spec, retry_policy))
            .collect();
        Self { jobs }
    }

    /// Up to `limit` waiting jobs, first-waiting-first-started.
    pub fn jobs_to_start(&self, limit: usize) -> Vec<&JobRecord> {
        self.jobs
            .iter()
            .filter(|job| job.status == JobStatus::Waiting)
            .take(limit)
            .collect()
    }

    pub fn started_jobs(&self) -> Vec<&JobRecord> {
        self.jobs
            .iter()
            .filter(|job| job.status == JobStatus::Started)
            .collect()
    }

    pub fn all_jobs_finished(&self) -> bool {
        self.jobs.iter().all(|job| job.status.is_terminal())
    }

    pub fn failed_jobs(&self) -> Vec<&JobRecord> {
        self.jobs
            .iter()
            .filter(|job| job.status == JobStatus::GivenUp)
            .collect()
    }

    /// Log every given-up job with its diagnostics and return how many there were.
    pub fn log_failed_jobs(&self) -> usize {
        let failed = self.failed_jobs();
        for job in &failed {
            warn!(
                job = %job.name,
                encoding_id = job.remote_id().unwrap_or("-"),
                retries = job.retry_count,
                "Encoding {} could not be finished successfully: {}",
                job.label(),
                job.error_messages.join("; ")
            );
        }
        failed.len()
    }

    pub fn summary(&self) -> BatchSummary {
        self.jobs
            .iter()
            .fold(BatchSummary::default(), |mut summary, job| {
                match job.status {
                    JobStatus::Waiting => summary.waiting += 1,
                    JobStatus::Started => summary.started += 1,
                    JobStatus::Successful => summary.successful += 1,
                    JobStatus::GivenUp => summary.given_up += 1,
                }
                summary
            })
    }

    pub fn jobs(&self) -> &[JobRecord] {
        &self.jobs
    }

    /// Mutable access by name; names are unique within a validated batch.
    pub fn job_mut(&mut self, name: &str) -> Option<&mut JobRecord> {
        self.jobs.iter_mut().find(|job| job.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::{
        Failure, FailureKind, PollOutcome, StartOutcome, StateMachine,
    };

    fn dispatcher(count: usize) -> JobDispatcher {
        JobDispatcher::new(
            BatchDefinition::generate("videos/in.mp4", count).unwrap(),
            RetryPolicy { max_retries: 2 },
        )
    }

    fn names(jobs: &[&JobRecord]) -> Vec<String> {
        jobs.iter().map(|j| j.name.clone()).collect()
    }

    fn start(d: &mut JobDispatcher, name: &str) {
        let job = d.job_mut(name).unwrap();
        StateMachine::on_start(job, StartOutcome::Accepted);
    }

    #[test]
    fn fresh_batch_is_all_waiting() {
        let d = dispatcher(7);
        assert!(d
            .jobs()
            .iter()
            .all(|j| j.status == JobStatus::Waiting && j.retry_count == 0));
        assert_eq!(
            d.summary(),
            BatchSummary {
                waiting: 7,
                ..Default::default()
            }
        );
        assert!(!d.all_jobs_finished());
    }

    #[test]
    fn first_pass_selects_first_three_of_seven() {
        let d = dispatcher(7);
        assert_eq!(
            names(&d.jobs_to_start(3)),
            vec!["encoding1", "encoding2", "encoding3"]
        );
    }

    #[test]
    fn jobs_to_start_respects_limit_and_skips_non_waiting() {
        let mut d = dispatcher(5);
        start(&mut d, "encoding1");
        start(&mut d, "encoding3");

        let selected = d.jobs_to_start(2);
        assert_eq!(names(&selected), vec!["encoding2", "encoding4"]);
        assert!(selected.iter().all(|j| j.status == JobStatus::Waiting));

        assert_eq!(d.jobs_to_start(10).len(), 3);
        assert!(d.jobs_to_start(0).is_empty());
    }

    #[test]
    fn queries_are_idempotent() {
        let mut d = dispatcher(4);
        start(&mut d, "encoding2");

        assert_eq!(names(&d.jobs_to_start(2)), names(&d.jobs_to_start(2)));
        assert_eq!(names(&d.started_jobs()), names(&d.started_jobs()));
        assert_eq!(names(&d.started_jobs()), vec!["encoding2"]);
    }

    #[test]
    fn all_jobs_finished_only_when_every_job_is_terminal() {
        let mut d = dispatcher(2);
        start(&mut d, "encoding1");
        StateMachine::on_poll(d.job_mut("encoding1").unwrap(), PollOutcome::Finished);
        assert!(!d.all_jobs_finished());

        start(&mut d, "encoding2");
        assert!(!d.all_jobs_finished());

        let failure = Failure::new(FailureKind::Permanent, vec!["corrupt input".into()]);
        StateMachine::on_poll(
            d.job_mut("encoding2").unwrap(),
            PollOutcome::Failed(failure),
        );
        assert!(d.all_jobs_finished());
        assert_eq!(
            d.summary(),
            BatchSummary {
                successful: 1,
                given_up: 1,
                ..Default::default()
            }
        );
    }

    #[test]
    fn log_failed_jobs_counts_given_up() {
        let mut d = dispatcher(3);
        let failure = Failure::new(FailureKind::Permanent, vec!["forbidden".into()]);
        StateMachine::on_start(
            d.job_mut("encoding3").unwrap(),
            StartOutcome::Rejected(failure),
        );

        assert_eq!(d.log_failed_jobs(), 1);
        assert_eq!(names(&d.failed_jobs()), vec!["encoding3"]);
        assert_eq!(d.summary().waiting, 2);
    }

    #[test]
    fn summary_totals() {
        let summary = BatchSummary {
            waiting: 1,
            started: 2,
            successful: 3,
            given_up: 4,
        };
        assert_eq!(summary.total(), 10);
        assert_eq!(summary.finished(), 7);
    }
}
