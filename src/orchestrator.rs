use tracing::{debug, error, info, warn};

use crate::config::BatchSettings;
use crate::dispatcher::{BatchSummary, JobDispatcher};
use crate::pacer::Pacer;
use crate::platform::{RemoteJobClient, RemoteStatus};
use crate::state_machine::{
    GiveUpReason, JobRecord, PollOutcome, StartOutcome, StateMachine, Transition,
    classify_start_error,
};

/// What happened during one pass of the loop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Queued count reported by the platform; `None` if the query failed.
    pub queued: Option<u64>,
    pub free_slots: usize,
    /// Jobs that moved to `Started`.
    pub started: usize,
    /// The platform's queue limit cut the start phase short.
    pub deferred: bool,
    pub polled: usize,
}

/// Keeps the platform's queue filled until every job of the batch is finished.
pub struct BatchOrchestrator<C, P> {
    client: C,
    pacer: P,
    settings: BatchSettings,
}

impl<C: RemoteJobClient, P: Pacer> BatchOrchestrator<C, P> {
    pub fn new(client: C, pacer: P, settings: BatchSettings) -> Self {
        Self {
            client,
            pacer,
            settings,
        }
    }

    /// Run passes until every job is `Successful` or `GivenUp`.
    ///
    /// Individual job failures never abort the loop; `on_pass` sees the
    /// summary after each pass.
    pub async fn run(
        &self,
        dispatcher: &mut JobDispatcher,
        mut on_pass: impl FnMut(&BatchSummary),
    ) -> BatchSummary {
        let mut passes = 0u64;
        while !dispatcher.all_jobs_finished() {
            passes += 1;
            debug!(pass = passes, "Starting pass");
            self.run_pass(dispatcher).await;
            on_pass(&dispatcher.summary());
        }

        info!(passes, "All encoding jobs are finished!");
        dispatcher.log_failed_jobs();
        dispatcher.summary()
    }

    pub async fn run_pass(&self, dispatcher: &mut JobDispatcher) -> PassReport {
        let mut report = PassReport {
            queued: self.queued_count().await,
            ..Default::default()
        };

        if let Some(queued) = report.queued {
            report.free_slots =
                usize::try_from((self.settings.target_queue_size as u64).saturating_sub(queued))
                    .unwrap_or(usize::MAX);

            if report.free_slots > 0 {
                let names: Vec<String> = dispatcher
                    .jobs_to_start(report.free_slots)
                    .iter()
                    .map(|job| job.name.clone())
                    .collect();

                if names.is_empty() {
                    info!(
                        "No more jobs to start. Waiting for {} jobs to finish.",
                        dispatcher.started_jobs().len()
                    );
                } else {
                    info!(
                        "There are currently {queued} encodings queued. Starting {} more to reach target queue size of {}",
                        names.len(),
                        self.settings.target_queue_size
                    );
                    self.start_jobs(dispatcher, &names, &mut report).await;
                }
            } else {
                info!(
                    "There are currently {queued} / {} encodings queued. Waiting for free slots...",
                    self.settings.target_queue_size
                );
            }
        }

        self.pacer.pause(self.settings.poll_interval).await;

        report.polled = self.poll_started_jobs(dispatcher).await;
        report
    }

    async fn queued_count(&self) -> Option<u64> {
        match self.client.count_jobs_in_state(RemoteStatus::Queued).await {
            Ok(count) => Some(count),
            Err(e) => {
                warn!("Could not count queued encodings, not starting any this pass: {e}");
                None
            }
        }
    }

    async fn start_jobs(
        &self,
        dispatcher: &mut JobDispatcher,
        names: &[String],
        report: &mut PassReport,
    ) {
        for name in names {
            let Some(job) = dispatcher.job_mut(name) else {
                continue;
            };

            match self.start_job(job).await {
                Transition::Started => report.started += 1,
                Transition::Deferred => {
                    // Stop hammering the platform until the next pass.
                    report.deferred = true;
                    return;
                }
                _ => {}
            }

            self.pacer.pause(self.settings.request_delay).await;
        }
    }

    /// Create the remote job if needed, start it, and apply the outcome.
    async fn start_job(&self, job: &mut JobRecord) -> Transition {
        let remote_id = match job.remote_id() {
            Some(id) => id.to_string(),
            None => match self.client.create_job(&job.spec()).await {
                Ok(id) => job.assign_remote_id(id).to_string(),
                Err(e) => {
                    warn!("Encoding {} could not be created: {e}", job.label());
                    let transition = StateMachine::on_start(
                        job,
                        StartOutcome::Rejected(classify_start_error(&e)),
                    );
                    log_transition(job, &transition);
                    return transition;
                }
            },
        };

        let outcome = match self.client.start_job(&remote_id).await {
            Ok(()) => StartOutcome::Accepted,
            Err(e) => {
                if !e.is_queue_limit() {
                    warn!("Encoding {} could not be started: {e}", job.label());
                }
                StartOutcome::Rejected(classify_start_error(&e))
            }
        };

        let transition = StateMachine::on_start(job, outcome);
        log_transition(job, &transition);
        transition
    }

    /// Poll every started job once; returns how many polls were made.
    async fn poll_started_jobs(&self, dispatcher: &mut JobDispatcher) -> usize {
        let names: Vec<String> = dispatcher
            .started_jobs()
            .iter()
            .map(|job| job.name.clone())
            .collect();

        let mut polled = 0;
        for name in &names {
            let Some(job) = dispatcher.job_mut(name) else {
                continue;
            };
            let Some(remote_id) = job.remote_id().map(str::to_string) else {
                error!("Encoding {} is started but has no remote id", job.label());
                continue;
            };

            match self.client.job_status(&remote_id).await {
                Ok(status) => {
                    let transition = StateMachine::on_poll(job, PollOutcome::from(status));
                    log_transition(job, &transition);
                }
                Err(e) => warn!("Could not poll status of encoding {}: {e}", job.label()),
            }
            polled += 1;

            self.pacer.pause(self.settings.request_delay).await;
        }
        polled
    }
}

fn log_transition(job: &JobRecord, transition: &Transition) {
    match transition {
        Transition::Started => info!("Encoding {} has been started.", job.label()),
        Transition::Deferred => warn!(
            "Encoding {} could not be started because your platform limit for queued encodings has been reached. Will retry.",
            job.label()
        ),
        Transition::Retry { remaining, .. } => warn!(
            retries = job.retry_count,
            "Encoding {} has failed. Will attempt {remaining} more retries.",
            job.label()
        ),
        Transition::Succeeded => info!("Encoding {} has finished successfully.", job.label()),
        Transition::GivenUp(GiveUpReason::Permanent) => error!(
            "Encoding {} failed with a permanent error. Giving up.",
            job.label()
        ),
        Transition::GivenUp(GiveUpReason::RetriesExhausted) => error!(
            retries = job.retry_count,
            "Encoding {} has reached the maximum number of retries. Giving up.",
            job.label()
        ),
        Transition::Unchanged => match job.progress {
            Some(progress) => debug!("Encoding {} is at {progress:.0}%", job.label()),
            None => debug!("Encoding {} is in progress", job.label()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;
    use std::time::Duration;

    use crate::batch::{BatchDefinition, JobSpec};
    use crate::pacer::RecordingPacer;
    use crate::platform::{PlatformError, RetryHint, StatusReport};
    use crate::state_machine::{JobStatus, RetryPolicy};

    const POLL_INTERVAL: Duration = Duration::from_secs(10);
    const REQUEST_DELAY: Duration = Duration::from_millis(300);

    /// Scripted in-memory platform. Remote ids are `enc-<job name>`.
    struct FakeClient {
        queued: Mutex<VecDeque<Result<u64, PlatformError>>>,
        create_errors: Mutex<HashMap<String, VecDeque<PlatformError>>>,
        start_results: Mutex<HashMap<String, VecDeque<Result<(), PlatformError>>>>,
        statuses: Mutex<HashMap<String, VecDeque<StatusReport>>>,
        default_status: StatusReport,
        created: Mutex<Vec<String>>,
        start_attempts: Mutex<Vec<String>>,
        polls: Mutex<Vec<String>>,
    }

    impl FakeClient {
        fn new(default_status: StatusReport) -> Self {
            Self {
                queued: Mutex::new(VecDeque::new()),
                create_errors: Mutex::new(HashMap::new()),
                start_results: Mutex::new(HashMap::new()),
                statuses: Mutex::new(HashMap::new()),
                default_status,
                created: Mutex::new(Vec::new()),
                start_attempts: Mutex::new(Vec::new()),
                polls: Mutex::new(Vec::new()),
            }
        }

        fn finishing() -> Self {
            Self::new(StatusReport::finished())
        }

        fn running() -> Self {
            Self::new(StatusReport::in_progress(RemoteStatus::Running, Some(50.0)))
        }

        fn queued_counts(self, counts: Vec<Result<u64, PlatformError>>) -> Self {
            self.queued.lock().unwrap().extend(counts);
            self
        }

        fn create_error(self, name: &str, err: PlatformError) -> Self {
            self.create_errors
                .lock()
                .unwrap()
                .entry(name.to_string())
                .or_default()
                .push_back(err);
            self
        }

        fn start_results(self, remote_id: &str, results: Vec<Result<(), PlatformError>>) -> Self {
            self.start_results
                .lock()
                .unwrap()
                .entry(remote_id.to_string())
                .or_default()
                .extend(results);
            self
        }

        fn statuses(self, remote_id: &str, reports: Vec<StatusReport>) -> Self {
            self.statuses
                .lock()
                .unwrap()
                .entry(remote_id.to_string())
                .or_default()
                .extend(reports);
            self
        }

        fn created(&self) -> Vec<String> {
            self.created.lock().unwrap().clone()
        }

        fn start_attempts(&self) -> Vec<String> {
            self.start_attempts.lock().unwrap().clone()
        }

        fn polls(&self) -> Vec<String> {
            self.polls.lock().unwrap().clone()
        }
    }

    impl RemoteJobClient for FakeClient {
        async fn create_job(&self, spec: &JobSpec) -> Result<String, PlatformError> {
            if let Some(err) = self
                .create_errors
                .lock()
                .unwrap()
                .get_mut(&spec.name)
                .and_then(VecDeque::pop_front)
            {
                return Err(err);
            }
            self.created.lock().unwrap().push(spec.name.clone());
            Ok(format!("enc-{}", spec.name))
        }

        async fn start_job(&self, job_id: &str) -> Result<(), PlatformError> {
            self.start_attempts.lock().unwrap().push(job_id.to_string());
            self.start_results
                .lock()
                .unwrap()
                .get_mut(job_id)
                .and_then(VecDeque::pop_front)
                .unwrap_or(Ok(()))
        }

        async fn job_status(&self, job_id: &str) -> Result<StatusReport, PlatformError> {
            self.polls.lock().unwrap().push(job_id.to_string());
            Ok(self
                .statuses
                .lock()
                .unwrap()
                .get_mut(job_id)
                .and_then(VecDeque::pop_front)
                .unwrap_or_else(|| self.default_status.clone()))
        }

        async fn count_jobs_in_state(&self, status: RemoteStatus) -> Result<u64, PlatformError> {
            assert_eq!(status, RemoteStatus::Queued);
            self.queued.lock().unwrap().pop_front().unwrap_or(Ok(0))
        }
    }

    fn api_error(code: i64, retry_hint: Option<RetryHint>) -> PlatformError {
        PlatformError::Api {
            status: 400,
            code: Some(code),
            message: format!("error {code}"),
            details: vec![],
            retry_hint,
        }
    }

    fn queue_limit() -> PlatformError {
        api_error(8004, None)
    }

    fn retryable_failure() -> StatusReport {
        StatusReport::failed(Some(RetryHint::Retry), vec!["segment upload failed".into()])
    }

    fn settings() -> BatchSettings {
        BatchSettings {
            target_queue_size: 3,
            max_retries: 2,
            number_of_encodings: 7,
            poll_interval: POLL_INTERVAL,
            request_delay: REQUEST_DELAY,
        }
    }

    fn dispatcher(count: usize) -> JobDispatcher {
        JobDispatcher::new(
            BatchDefinition::generate("videos/in.mp4", count).unwrap(),
            RetryPolicy { max_retries: 2 },
        )
    }

    fn orchestrator(client: FakeClient) -> BatchOrchestrator<FakeClient, RecordingPacer> {
        BatchOrchestrator::new(client, RecordingPacer::default(), settings())
    }

    fn status_of(d: &JobDispatcher, name: &str) -> JobStatus {
        d.jobs().iter().find(|j| j.name == name).unwrap().status
    }

    #[tokio::test]
    async fn first_pass_starts_first_three_of_seven() {
        let orch = orchestrator(FakeClient::running());
        let mut d = dispatcher(7);

        let report = orch.run_pass(&mut d).await;

        assert_eq!(report.queued, Some(0));
        assert_eq!(report.free_slots, 3);
        assert_eq!(report.started, 3);
        assert_eq!(
            orch.client.start_attempts(),
            vec!["enc-encoding1", "enc-encoding2", "enc-encoding3"]
        );
        assert_eq!(d.summary().started, 3);
        assert_eq!(d.summary().waiting, 4);
        assert_eq!(report.polled, 3);
    }

    #[tokio::test]
    async fn full_queue_starts_nothing_but_still_polls() {
        let client = FakeClient::running().queued_counts(vec![Ok(1), Ok(3)]);
        let orch = orchestrator(client);
        let mut d = dispatcher(7);

        let first = orch.run_pass(&mut d).await;
        assert_eq!(first.started, 2);

        let second = orch.run_pass(&mut d).await;
        assert_eq!(second.queued, Some(3));
        assert_eq!(second.free_slots, 0);
        assert_eq!(second.started, 0);
        assert_eq!(second.polled, 2);
        assert_eq!(orch.client.start_attempts().len(), 2);
        assert_eq!(orch.client.polls().len(), 4);
    }

    #[tokio::test]
    async fn queue_limit_keeps_job_waiting_and_ends_start_phase() {
        let client = FakeClient::running().start_results("enc-encoding2", vec![Err(queue_limit())]);
        let orch = orchestrator(client);
        let mut d = dispatcher(7);

        let report = orch.run_pass(&mut d).await;

        assert!(report.deferred);
        assert_eq!(report.started, 1);
        assert_eq!(orch.client.created(), vec!["encoding1", "encoding2"]);
        assert_eq!(
            orch.client.start_attempts(),
            vec!["enc-encoding1", "enc-encoding2"]
        );
        let job = &d.jobs()[1];
        assert_eq!(job.status, JobStatus::Waiting);
        assert_eq!(job.retry_count, 0);
        assert!(job.error_messages.is_empty());
        assert_eq!(status_of(&d, "encoding3"), JobStatus::Waiting);
    }

    #[tokio::test]
    async fn deferred_job_is_restarted_with_same_remote_id() {
        let client = FakeClient::finishing().start_results("enc-encoding1", vec![Err(queue_limit())]);
        let orch = orchestrator(client);
        let mut d = dispatcher(1);

        let summary = orch.run(&mut d, |_| {}).await;

        assert_eq!(summary.successful, 1);
        assert_eq!(orch.client.created(), vec!["encoding1"]);
        assert_eq!(
            orch.client.start_attempts(),
            vec!["enc-encoding1", "enc-encoding1"]
        );
        assert_eq!(d.jobs()[0].retry_count, 0);
    }

    #[tokio::test]
    async fn non_retryable_start_failure_gives_up_immediately() {
        let client = FakeClient::running().start_results(
            "enc-encoding1",
            vec![Err(api_error(1000, Some(RetryHint::NoRetry)))],
        );
        let orch = orchestrator(client);
        let mut d = dispatcher(7);

        let report = orch.run_pass(&mut d).await;

        let job = &d.jobs()[0];
        assert_eq!(job.status, JobStatus::GivenUp);
        assert_eq!(job.retry_count, 0);
        assert_eq!(
            job.error_messages,
            vec!["The encoding could not be started: error 1000".to_string()]
        );
        assert_eq!(report.started, 2);
        assert_eq!(status_of(&d, "encoding2"), JobStatus::Started);
    }

    #[tokio::test]
    async fn create_failure_counts_as_failed_start() {
        let client = FakeClient::finishing()
            .create_error("encoding1", api_error(500, None))
            .create_error("encoding1", api_error(500, None))
            .create_error("encoding1", api_error(500, None));
        let orch = orchestrator(client);
        let mut d = dispatcher(1);

        let summary = orch.run(&mut d, |_| {}).await;

        assert_eq!(summary.given_up, 1);
        let job = &d.jobs()[0];
        assert_eq!(job.retry_count, 3);
        assert!(job.remote_id().is_none());
        assert!(!job.error_messages.is_empty());
        assert!(orch.client.start_attempts().is_empty());
    }

    #[tokio::test]
    async fn three_retryable_failures_exhaust_budget_of_two() {
        let client = FakeClient::finishing().statuses(
            "enc-encoding1",
            vec![retryable_failure(), retryable_failure(), retryable_failure()],
        );
        let orch = orchestrator(client);
        let mut d = dispatcher(1);

        let summary = orch.run(&mut d, |_| {}).await;

        assert_eq!(summary.given_up, 1);
        let job = &d.jobs()[0];
        assert_eq!(job.status, JobStatus::GivenUp);
        assert_eq!(job.retry_count, 3);
        assert_eq!(job.error_messages, vec!["segment upload failed".to_string()]);
        assert_eq!(orch.client.created(), vec!["encoding1"]);
        assert_eq!(orch.client.start_attempts().len(), 3);
    }

    #[tokio::test]
    async fn two_retryable_failures_then_success() {
        let client = FakeClient::finishing().statuses(
            "enc-encoding1",
            vec![retryable_failure(), retryable_failure()],
        );
        let orch = orchestrator(client);
        let mut d = dispatcher(1);

        let summary = orch.run(&mut d, |_| {}).await;

        assert_eq!(summary.successful, 1);
        let job = &d.jobs()[0];
        assert_eq!(job.status, JobStatus::Successful);
        assert_eq!(job.retry_count, 2);
        assert_eq!(job.remote_id(), Some("enc-encoding1"));
        assert_eq!(orch.client.created().len(), 1);
    }

    #[tokio::test]
    async fn failed_queue_count_skips_starts_but_polls() {
        let client = FakeClient::running().queued_counts(vec![
            Ok(0),
            Err(PlatformError::UnexpectedResponse("boom".into())),
        ]);
        let orch = orchestrator(client);
        let mut d = dispatcher(7);

        orch.run_pass(&mut d).await;
        let report = orch.run_pass(&mut d).await;

        assert_eq!(report.queued, None);
        assert_eq!(report.started, 0);
        assert_eq!(report.polled, 3);
        assert_eq!(d.summary().waiting, 4);
    }

    #[tokio::test]
    async fn still_running_jobs_stay_started() {
        let client = FakeClient::finishing().statuses(
            "enc-encoding1",
            vec![StatusReport::in_progress(RemoteStatus::Running, Some(30.0))],
        );
        let orch = orchestrator(client);
        let mut d = dispatcher(1);

        orch.run_pass(&mut d).await;
        let job = &d.jobs()[0];
        assert_eq!(job.status, JobStatus::Started);
        assert_eq!(job.progress, Some(30.0));
    }

    #[tokio::test]
    async fn run_paces_calls_and_reports_each_pass() {
        let orch = orchestrator(FakeClient::finishing());
        let mut d = dispatcher(7);
        let mut seen = Vec::new();

        let summary = orch.run(&mut d, |s| seen.push(*s)).await;

        assert_eq!(summary.successful, 7);
        assert!(d.all_jobs_finished());
        // 3 + 3 + 1 jobs started over three passes, each finishing on its first poll.
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0].successful, 3);
        assert_eq!(seen[2].successful, 7);
        assert_eq!(orch.pacer.count(POLL_INTERVAL), 3);
        // One pause after every start and every poll.
        assert_eq!(orch.pacer.count(REQUEST_DELAY), 14);
    }
}
