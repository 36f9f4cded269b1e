//! Batch job orchestration.
//!
//! A [`BatchJob`] validates its [`JobConfig`], feeds targets through a
//! [`BoundedDispatcher`] and wraps each target in a retry loop driven by the
//! [`RetryPolicy`]. Successful fetches go to the [`Sink`]; every terminal
//! outcome goes to the [`Reporter`] and onto the progress stream.
//!
//! # State Machine
//!
//! ```text
//! Idle -> Running -> Completed
//!                 -> Cancelled
//! Idle -> ConfigError
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use batch_fetch_core::fetch::{BatchJob, JobConfig};
//! use batch_fetch_core::sink::DirectorySink;
//! use batch_fetch_core::transport::HttpFetcher;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let job = BatchJob::new(
//!     Arc::new(HttpFetcher::new()?),
//!     Arc::new(DirectorySink::new("./images")),
//!     JobConfig::default(),
//! );
//! let report = job
//!     .start([("cat.jpg", "https://example.com/cat.jpg")], CancellationToken::new())
//!     .await?;
//! println!("{} succeeded, {} failed", report.succeeded.len(), report.failed.len());
//! # Ok(())
//! # }
//! ```

use std::collections::HashSet;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use futures_util::Stream;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::constants::{
    DEADLINE_MESSAGE, DEFAULT_BACKOFF_BASE, DEFAULT_BACKOFF_MAX, DEFAULT_CONCURRENCY,
    DEFAULT_MAX_ATTEMPTS, DEFAULT_PER_ITEM_TIMEOUT,
};
use super::dispatcher::{BoundedDispatcher, Slot};
use super::error::{ConfigError, JobError};
use super::outcome::{FailureKind, Outcome, SkipReason};
use super::report::{JobReport, Reporter};
use super::retry::{FullJitter, JitterSource, RetryDecision, RetryPolicy};
use super::target::{Target, TargetSpec};
use crate::sink::{OverridePolicy, Sink, WriteStatus};
use crate::transport::Fetcher;

/// Lifecycle state of a [`BatchJob`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Created, not started.
    Idle,
    /// Targets are being processed.
    Running,
    /// Every target reached a terminal outcome without cancellation.
    Completed,
    /// The job was cancelled (externally or by its deadline).
    Cancelled,
    /// Configuration was rejected at start; nothing was dispatched.
    ConfigError,
}

/// Settings for one job. Validated when the job starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobConfig {
    /// Maximum number of fetches in flight at once.
    pub concurrency_limit: usize,
    /// Timeout applied to each fetch attempt.
    pub per_item_timeout: Duration,
    /// Maximum attempts per target, including the first.
    pub max_attempts: u32,
    /// Backoff ladder value for the first retry.
    pub backoff_base: Duration,
    /// Backoff ladder cap.
    pub backoff_max: Duration,
    /// Behaviour when a sink entry already exists.
    pub override_policy: OverridePolicy,
    /// Optional whole-job deadline.
    pub job_timeout: Option<Duration>,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: DEFAULT_CONCURRENCY,
            per_item_timeout: DEFAULT_PER_ITEM_TIMEOUT,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_base: DEFAULT_BACKOFF_BASE,
            backoff_max: DEFAULT_BACKOFF_MAX,
            override_policy: OverridePolicy::default(),
            job_timeout: None,
        }
    }
}

impl JobConfig {
    /// Sets the concurrency limit.
    #[must_use]
    pub fn with_concurrency(mut self, limit: usize) -> Self {
        self.concurrency_limit = limit;
        self
    }

    /// Sets the per-item timeout.
    #[must_use]
    pub fn with_per_item_timeout(mut self, timeout: Duration) -> Self {
        self.per_item_timeout = timeout;
        self
    }

    /// Sets the maximum attempts per target.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Sets the backoff ladder bounds.
    #[must_use]
    pub fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.backoff_base = base;
        self.backoff_max = max;
        self
    }

    /// Sets the override policy.
    #[must_use]
    pub fn with_override_policy(mut self, policy: OverridePolicy) -> Self {
        self.override_policy = policy;
        self
    }

    /// Sets the whole-job deadline.
    #[must_use]
    pub fn with_job_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.job_timeout = timeout;
        self
    }

    /// Checks the configuration.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency_limit == 0 {
            return Err(ConfigError::InvalidConcurrency {
                value: self.concurrency_limit,
            });
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::InvalidMaxAttempts {
                value: self.max_attempts,
            });
        }
        if self.per_item_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout {
                value: self.per_item_timeout,
            });
        }
        if let Some(job_timeout) = self.job_timeout {
            if job_timeout.is_zero() {
                return Err(ConfigError::InvalidTimeout { value: job_timeout });
            }
        }
        if self.backoff_base > self.backoff_max {
            return Err(ConfigError::InvalidBackoff {
                base: self.backoff_base,
                max: self.backoff_max,
            });
        }
        Ok(())
    }
}

/// Runs one batch of targets to completion.
///
/// A job runs at most once. Dropping a [`JobRun`] without finishing it lets
/// the job continue in the background.
#[derive(Debug)]
pub struct BatchJob {
    fetcher: Arc<dyn Fetcher>,
    sink: Arc<dyn Sink>,
    config: JobConfig,
    jitter: Arc<dyn JitterSource>,
    state: Arc<Mutex<JobState>>,
    started: AtomicBool,
}

impl BatchJob {
    /// Creates an idle job.
    #[must_use]
    pub fn new(fetcher: Arc<dyn Fetcher>, sink: Arc<dyn Sink>, config: JobConfig) -> Self {
        Self {
            fetcher,
            sink,
            config,
            jitter: Arc::new(FullJitter),
            state: Arc::new(Mutex::new(JobState::Idle)),
            started: AtomicBool::new(false),
        }
    }

    /// Replaces the backoff jitter source.
    #[must_use]
    pub fn with_jitter(mut self, jitter: impl JitterSource + 'static) -> Self {
        self.jitter = Arc::new(jitter);
        self
    }

    /// Job configuration.
    #[must_use]
    pub fn config(&self) -> &JobConfig {
        &self.config
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> JobState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs the job and waits for its report.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::Config`] if the configuration or target list is
    /// invalid, [`JobError::AlreadyStarted`] on a second call, and
    /// [`JobError::Driver`] if the driver task dies.
    #[instrument(skip_all, fields(concurrency = self.config.concurrency_limit))]
    pub async fn start<I, T>(
        &self,
        targets: I,
        cancel: CancellationToken,
    ) -> Result<JobReport, JobError>
    where
        I: IntoIterator<Item = T>,
        T: Into<TargetSpec>,
    {
        self.run(targets, cancel)?.finish().await
    }

    /// Starts the job and returns a handle streaming terminal outcomes.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Same as [`start`](Self::start), minus driver failures.
    pub fn run<I, T>(&self, targets: I, cancel: CancellationToken) -> Result<JobRun, JobError>
    where
        I: IntoIterator<Item = T>,
        T: Into<TargetSpec>,
    {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(JobError::AlreadyStarted);
        }

        let targets = match self.prepare(targets) {
            Ok(targets) => targets,
            Err(error) => {
                warn!(error = %error, "job configuration rejected");
                self.set_state(JobState::ConfigError);
                return Err(error.into());
            }
        };

        let job_cancel = cancel.child_token();
        let dispatcher = match BoundedDispatcher::new(
            Arc::clone(&self.fetcher),
            self.config.concurrency_limit,
            self.config.per_item_timeout,
            job_cancel.clone(),
        ) {
            Ok(dispatcher) => Arc::new(dispatcher),
            Err(error) => {
                self.set_state(JobState::ConfigError);
                return Err(error.into());
            }
        };

        self.set_state(JobState::Running);
        info!(
            targets = targets.len(),
            concurrency = self.config.concurrency_limit,
            max_attempts = self.config.max_attempts,
            per_item_timeout_ms = self.config.per_item_timeout.as_millis(),
            override_policy = %self.config.override_policy,
            "starting batch job"
        );

        let deadline = self
            .config
            .job_timeout
            .map(|limit| spawn_deadline(Arc::clone(&dispatcher), limit));

        let reporter = Arc::new(Reporter::new(targets.len()));
        let context = Arc::new(TargetContext {
            policy: RetryPolicy::new(
                self.config.max_attempts,
                self.config.backoff_base,
                self.config.backoff_max,
            )
            .with_shared_jitter(Arc::clone(&self.jitter)),
            sink: Arc::clone(&self.sink),
            override_policy: self.config.override_policy,
            reporter: Arc::clone(&reporter),
        });

        let mut outcomes = dispatcher.drive(targets, move |dispatcher, slot, target| {
            process_target(dispatcher, Arc::clone(&context), slot, target)
        });

        // Bounded so an idle reader stalls admission instead of buffering bodies.
        let (events_tx, events_rx) = mpsc::channel(self.config.concurrency_limit);
        let state = Arc::clone(&self.state);
        let driver = tokio::spawn(async move {
            let mut abandoned = false;
            while let Some((target, outcome)) = outcomes.next_outcome().await {
                log_terminal(&target, &outcome);
                abandoned |= outcome.failure_kind() == Some(FailureKind::Cancelled);
                if reporter.record(&target, &outcome) {
                    // The receiver may be gone; the report still gets built.
                    let _ = events_tx.send((target, outcome)).await;
                }
            }
            if let Some(deadline) = deadline {
                deadline.abort();
            }

            let final_state = if abandoned {
                JobState::Cancelled
            } else {
                JobState::Completed
            };
            *state.lock().unwrap_or_else(PoisonError::into_inner) = final_state;

            let report = reporter.finalize(final_state);
            info!(
                total = report.total,
                succeeded = report.succeeded.len(),
                skipped = report.skipped.len(),
                failed = report.failed.len(),
                retries = report.retries,
                state = ?final_state,
                "batch job finished"
            );
            report
        });

        Ok(JobRun {
            events: events_rx,
            driver,
        })
    }

    fn set_state(&self, state: JobState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// Validates the config and converts specs into targets.
    fn prepare<I, T>(&self, targets: I) -> Result<Vec<Target>, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<TargetSpec>,
    {
        self.config.validate()?;

        let mut seen = HashSet::new();
        let mut prepared = Vec::new();
        for spec in targets {
            let spec: TargetSpec = spec.into();
            if !seen.insert(spec.id.clone()) {
                return Err(ConfigError::DuplicateTargetId { id: spec.id });
            }
            prepared.push(Target::from(spec));
        }
        Ok(prepared)
    }
}

/// Handle to a running job.
///
/// Yields each target's terminal `(Target, Outcome)` in completion order. The
/// stream ends once every target is terminal; [`finish`](Self::finish)
/// returns the report.
///
/// At most `concurrency_limit` unread events are buffered. While the buffer
/// is full no new targets are admitted; finishing or dropping the handle
/// lets the job run on.
#[derive(Debug)]
pub struct JobRun {
    events: mpsc::Receiver<(Target, Outcome)>,
    driver: JoinHandle<JobReport>,
}

impl JobRun {
    /// Waits for the next terminal outcome.
    pub async fn next_event(&mut self) -> Option<(Target, Outcome)> {
        self.events.recv().await
    }

    /// Waits for the job to finish and returns its report.
    ///
    /// Events not yet consumed are discarded.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::Driver`] if the driver task panicked.
    pub async fn finish(mut self) -> Result<JobReport, JobError> {
        self.events.close();
        Ok(self.driver.await?)
    }
}

impl Stream for JobRun {
    type Item = (Target, Outcome);

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.events.poll_recv(cx)
    }
}

/// Shared, read-only state for per-target retry loops.
#[derive(Debug)]
struct TargetContext {
    policy: RetryPolicy,
    sink: Arc<dyn Sink>,
    override_policy: OverridePolicy,
    reporter: Arc<Reporter>,
}

/// Retry loop for one target.
///
/// Attempts are strictly sequential. The slot is released after each fetch,
/// so a target waiting out its backoff does not block admission of others.
async fn process_target(
    dispatcher: Arc<BoundedDispatcher>,
    context: Arc<TargetContext>,
    slot: Slot,
    mut target: Target,
) -> (Target, Outcome) {
    let mut slot = Some(slot);
    loop {
        let current = match slot.take() {
            Some(slot) => slot,
            None => match dispatcher.acquire_slot().await {
                Some(slot) => slot,
                None => {
                    let attempt = target.attempt();
                    return (target, cancelled(&dispatcher, attempt));
                }
            },
        };

        let outcome = dispatcher.fetch(current, &mut target).await;
        let (kind, attempt) = match outcome {
            Outcome::Success { bytes } => {
                let stored = store(&context, &target, bytes).await;
                return (target, stored);
            }
            Outcome::Failed { kind, attempt, .. } if kind != FailureKind::Cancelled => {
                (kind, attempt)
            }
            other => return (target, other),
        };

        match context.policy.should_retry(kind, attempt) {
            RetryDecision::Retry {
                delay,
                attempt: next_attempt,
            } => {
                context.reporter.record_retry();
                debug!(
                    id = target.id(),
                    url = %target.url(),
                    kind = %kind,
                    attempt,
                    next_attempt,
                    delay_ms = delay.as_millis(),
                    "retry scheduled"
                );
                tokio::select! {
                    biased;
                    () = dispatcher.cancel_token().cancelled() => {
                        return (target, cancelled(&dispatcher, attempt));
                    }
                    () = tokio::time::sleep(delay) => {}
                }
            }
            RetryDecision::DoNotRetry { reason } => {
                debug!(id = target.id(), kind = %kind, attempt, reason, "not retrying");
                return (target, outcome);
            }
        }
    }
}

fn cancelled(dispatcher: &BoundedDispatcher, attempt: u32) -> Outcome {
    Outcome::failed(FailureKind::Cancelled, dispatcher.cancel_message(), attempt)
}

/// Hands a successful fetch to the sink. Not raced against cancellation, so
/// a write that started always completes.
async fn store(context: &TargetContext, target: &Target, bytes: Bytes) -> Outcome {
    match context
        .sink
        .write(target.id(), bytes.clone(), context.override_policy)
        .await
    {
        Ok(WriteStatus::SkippedExisting) => Outcome::Skipped {
            reason: SkipReason::AlreadyExists,
        },
        Ok(WriteStatus::Written | WriteStatus::Overwritten) => Outcome::Success { bytes },
        Err(error) => Outcome::failed(FailureKind::Storage, error.to_string(), target.attempt()),
    }
}

fn spawn_deadline(dispatcher: Arc<BoundedDispatcher>, limit: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            () = dispatcher.cancel_token().cancelled() => {}
            () = tokio::time::sleep(limit) => {
                warn!(limit_ms = limit.as_millis(), "job deadline exceeded, cancelling");
                dispatcher.cancel_with(DEADLINE_MESSAGE);
            }
        }
    })
}

fn log_terminal(target: &Target, outcome: &Outcome) {
    match outcome {
        Outcome::Success { bytes } => {
            info!(id = target.id(), url = %target.url(), bytes = bytes.len(), attempt = target.attempt(), "fetched");
        }
        Outcome::Skipped { reason } => {
            info!(id = target.id(), url = %target.url(), reason = %reason, "skipped");
        }
        Outcome::Failed {
            kind: FailureKind::Cancelled,
            ..
        } => {
            debug!(id = target.id(), url = %target.url(), "abandoned");
        }
        Outcome::Failed {
            kind,
            message,
            attempt,
        } => {
            warn!(
                id = target.id(),
                url = %target.url(),
                kind = %kind,
                attempt,
                error = %message,
                "target failed"
            );
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use futures_util::StreamExt;

    use super::*;
    use crate::fetch::outcome::RawResult;
    use crate::fetch::retry::NoJitter;
    use crate::fetch::test_support::{ScriptedFetcher, Step};
    use crate::sink::{DirectorySink, MemorySink};

    fn url(id: &str) -> String {
        format!("https://example.com/{id}")
    }

    fn specs(ids: &[&str]) -> Vec<TargetSpec> {
        ids.iter().map(|id| TargetSpec::new(*id, url(id))).collect()
    }

    fn fast_config() -> JobConfig {
        JobConfig::default()
            .with_backoff(Duration::from_millis(1), Duration::from_millis(5))
            .with_per_item_timeout(Duration::from_secs(5))
    }

    fn job(fetcher: &Arc<ScriptedFetcher>, sink: &Arc<MemorySink>, config: JobConfig) -> BatchJob {
        BatchJob::new(fetcher.clone(), sink.clone(), config).with_jitter(NoJitter)
    }

    // ==================== Config Tests ====================

    #[test]
    fn test_job_config_defaults() {
        let config = JobConfig::default();
        assert_eq!(config.concurrency_limit, 10);
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.per_item_timeout, Duration::from_secs(30));
        assert_eq!(config.override_policy, OverridePolicy::Overwrite);
        assert!(config.job_timeout.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_job_config_validate_rejects_bad_values() {
        assert_eq!(
            JobConfig::default().with_concurrency(0).validate(),
            Err(ConfigError::InvalidConcurrency { value: 0 })
        );
        assert_eq!(
            JobConfig::default().with_max_attempts(0).validate(),
            Err(ConfigError::InvalidMaxAttempts { value: 0 })
        );
        assert!(matches!(
            JobConfig::default()
                .with_per_item_timeout(Duration::ZERO)
                .validate(),
            Err(ConfigError::InvalidTimeout { .. })
        ));
        assert!(matches!(
            JobConfig::default()
                .with_backoff(Duration::from_secs(10), Duration::from_secs(1))
                .validate(),
            Err(ConfigError::InvalidBackoff { .. })
        ));
    }

    #[tokio::test]
    async fn test_config_error_dispatches_nothing() {
        let fetcher = Arc::new(ScriptedFetcher::new(Step::status(200)));
        let sink = Arc::new(MemorySink::new());
        let job = job(&fetcher, &sink, fast_config().with_concurrency(0));

        let result = job.start(specs(&["a", "b"]), CancellationToken::new()).await;
        assert!(matches!(
            result,
            Err(JobError::Config(ConfigError::InvalidConcurrency { value: 0 }))
        ));
        assert_eq!(job.state(), JobState::ConfigError);
        assert_eq!(fetcher.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_target_ids_rejected() {
        let fetcher = Arc::new(ScriptedFetcher::new(Step::status(200)));
        let sink = Arc::new(MemorySink::new());
        let job = job(&fetcher, &sink, fast_config());

        let result = job
            .start(
                [("a.jpg", "https://one.example/a.jpg"), ("a.jpg", "https://two.example/a.jpg")],
                CancellationToken::new(),
            )
            .await;
        let Err(JobError::Config(ConfigError::DuplicateTargetId { id })) = result else {
            panic!("expected duplicate id error");
        };
        assert_eq!(id, "a.jpg");
        assert_eq!(fetcher.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_second_start_rejected() {
        let fetcher = Arc::new(ScriptedFetcher::new(Step::status(200)));
        let sink = Arc::new(MemorySink::new());
        let job = job(&fetcher, &sink, fast_config());
        assert_eq!(job.state(), JobState::Idle);

        job.start(specs(&["a"]), CancellationToken::new()).await.unwrap();
        assert_eq!(job.state(), JobState::Completed);

        let again = job.start(specs(&["a"]), CancellationToken::new()).await;
        assert!(matches!(again, Err(JobError::AlreadyStarted)));
    }

    // ==================== Scenario Tests ====================

    #[tokio::test]
    async fn test_mixed_statuses_with_retry() {
        let fetcher = Arc::new(
            ScriptedFetcher::new(Step::status(200))
                .script(&url("ok"), [Step::status(200)])
                .script(&url("missing"), [Step::status(404)])
                .script(
                    &url("flaky"),
                    [Step::status(500), Step::status(500), Step::status(200)],
                ),
        );
        let sink = Arc::new(MemorySink::new());
        let job = job(&fetcher, &sink, fast_config().with_max_attempts(3));

        let report = job
            .start(specs(&["ok", "missing", "flaky"]), CancellationToken::new())
            .await
            .unwrap();

        let mut succeeded = report.succeeded.clone();
        succeeded.sort();
        assert_eq!(succeeded, vec!["flaky", "ok"]);
        assert_eq!(report.failed.len(), 1);
        let failed = &report.failed[0];
        assert_eq!(failed.id, "missing");
        assert_eq!(failed.kind, FailureKind::NotFound);
        assert_eq!(failed.attempt, 1);

        assert_eq!(report.retries, 2);
        assert_eq!(report.state, JobState::Completed);
        assert_eq!(fetcher.calls(&url("flaky")), 3);
        assert_eq!(fetcher.calls(&url("missing")), 1);
        assert_eq!(sink.get("flaky").unwrap(), Bytes::from_static(b"body-200"));
        assert!(!sink.contains("missing"));
    }

    #[tokio::test]
    async fn test_retries_exhausted_reports_last_kind() {
        let fetcher = Arc::new(ScriptedFetcher::new(Step::status(503)));
        let sink = Arc::new(MemorySink::new());
        let job = job(&fetcher, &sink, fast_config().with_max_attempts(3));

        let report = job
            .start(specs(&["a"]), CancellationToken::new())
            .await
            .unwrap();

        let failed = report.failure("a").unwrap();
        assert_eq!(failed.kind, FailureKind::ServerError(503));
        assert_eq!(failed.attempt, 3);
        assert_eq!(report.retries, 2);
        assert_eq!(report.exhausted().count(), 1);
        assert_eq!(report.abandoned().count(), 0);
    }

    #[tokio::test]
    async fn test_malformed_target_never_retried() {
        let fetcher = Arc::new(ScriptedFetcher::new(Step::Reply(RawResult::transport(
            crate::fetch::TransportFailure::MalformedUrl,
            "relative URL without a base",
        ))));
        let sink = Arc::new(MemorySink::new());
        let job = job(&fetcher, &sink, fast_config().with_max_attempts(5));

        let report = job
            .start([("bad", "www.example.com/a.jpg")], CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.failed[0].kind, FailureKind::InvalidTarget);
        assert_eq!(report.failed[0].attempt, 1);
        assert_eq!(report.retries, 0);
    }

    #[tokio::test]
    async fn test_cancel_after_two_of_ten() {
        let ids: Vec<String> = (0..10).map(|i| format!("t{i}")).collect();
        let fetcher = Arc::new(
            ScriptedFetcher::new(Step::Hang)
                .script(&url("t3"), [Step::status(200)])
                .script(&url("t7"), [Step::status(200)]),
        );
        let sink = Arc::new(MemorySink::new());
        let job = job(&fetcher, &sink, fast_config().with_concurrency(10));
        let cancel = CancellationToken::new();

        let mut run = job
            .run(
                ids.iter().map(|id| TargetSpec::new(id.as_str(), url(id))),
                cancel.clone(),
            )
            .unwrap();
        assert_eq!(job.state(), JobState::Running);

        for _ in 0..2 {
            let (_, outcome) = run.next_event().await.unwrap();
            assert!(outcome.is_success());
        }
        cancel.cancel();
        let report = tokio::time::timeout(Duration::from_secs(5), run.finish())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(report.total, 10);
        assert_eq!(report.succeeded.len(), 2);
        assert_eq!(report.abandoned().count(), 8);
        assert_eq!(report.exhausted().count(), 0);
        assert_eq!(report.state, JobState::Cancelled);
        assert_eq!(job.state(), JobState::Cancelled);
        assert!(!report.is_success());
    }

    #[tokio::test]
    async fn test_cancel_during_backoff_is_prompt() {
        let fetcher = Arc::new(ScriptedFetcher::new(Step::status(500)));
        let sink = Arc::new(MemorySink::new());
        let config = fast_config()
            .with_max_attempts(5)
            .with_backoff(Duration::from_secs(60), Duration::from_secs(60));
        let job = job(&fetcher, &sink, config);
        let cancel = CancellationToken::new();

        let run = job.run(specs(&["a"]), cancel.clone()).unwrap();
        while fetcher.total_calls() == 0 {
            tokio::task::yield_now().await;
        }
        cancel.cancel();

        let report = tokio::time::timeout(Duration::from_secs(2), run.finish())
            .await
            .unwrap()
            .unwrap();
        let failed = report.failure("a").unwrap();
        assert_eq!(failed.kind, FailureKind::Cancelled);
        assert_eq!(failed.attempt, 1);
        assert_eq!(fetcher.total_calls(), 1);
    }

    #[tokio::test]
    async fn test_job_deadline_cancels_without_touching_caller_token() {
        let fetcher = Arc::new(
            ScriptedFetcher::new(Step::Hang).script(&url("fast"), [Step::status(200)]),
        );
        let sink = Arc::new(MemorySink::new());
        let config = fast_config()
            .with_concurrency(2)
            .with_job_timeout(Some(Duration::from_millis(100)));
        let job = job(&fetcher, &sink, config);
        let cancel = CancellationToken::new();

        let report = job
            .start(specs(&["fast", "slow1", "slow2"]), cancel.clone())
            .await
            .unwrap();

        assert!(!cancel.is_cancelled());
        assert_eq!(report.succeeded, vec!["fast"]);
        assert_eq!(report.abandoned().count(), 2);
        assert!(
            report
                .abandoned()
                .all(|entry| entry.message == DEADLINE_MESSAGE)
        );
        assert_eq!(report.state, JobState::Cancelled);
    }

    // ==================== Sink Interaction Tests ====================

    #[tokio::test]
    async fn test_rerun_with_skip_if_exists_writes_nothing() {
        let fetcher = Arc::new(ScriptedFetcher::new(Step::status(200)));
        let sink = Arc::new(MemorySink::new());
        let ids = ["a", "b", "c", "d"];

        let first = job(&fetcher, &sink, fast_config())
            .start(specs(&ids), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(first.written(), 4);
        let writes_after_first = sink.write_count();

        let config = fast_config().with_override_policy(OverridePolicy::SkipIfExists);
        let second = job(&fetcher, &sink, config)
            .start(specs(&ids), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(second.skipped.len(), 4);
        assert_eq!(second.succeeded.len(), 4);
        assert!(second.failed.is_empty());
        assert_eq!(sink.write_count(), writes_after_first);
    }

    #[tokio::test]
    async fn test_sink_failure_recorded_as_storage() {
        let fetcher = Arc::new(ScriptedFetcher::new(Step::status(200)));
        let dir = tempfile::TempDir::new().unwrap();
        let sink = Arc::new(DirectorySink::new(dir.path().join("missing")));
        let job = BatchJob::new(fetcher.clone(), sink, fast_config());

        let report = job
            .start(specs(&["a"]), CancellationToken::new())
            .await
            .unwrap();
        let failed = report.failure("a").unwrap();
        assert_eq!(failed.kind, FailureKind::Storage);
        assert_eq!(fetcher.calls(&url("a")), 1);
    }

    // ==================== Stream Tests ====================

    #[tokio::test]
    async fn test_progress_stream_yields_each_target_once() {
        let fetcher = Arc::new(
            ScriptedFetcher::new(Step::status(200)).script(&url("b"), [Step::status(404)]),
        );
        let sink = Arc::new(MemorySink::new());
        let job = job(&fetcher, &sink, fast_config().with_concurrency(2));

        let run = job
            .run(specs(&["a", "b", "c", "d", "e"]), CancellationToken::new())
            .unwrap();
        let events: Vec<_> = run.collect().await;

        assert_eq!(events.len(), 5);
        let mut ids: Vec<_> = events.iter().map(|(t, _)| t.id().to_string()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 5);
        assert_eq!(
            events.iter().filter(|(_, o)| !o.is_success()).count(),
            1
        );
        assert_eq!(job.state(), JobState::Completed);
    }

    #[tokio::test]
    async fn test_unread_events_hold_back_admission() {
        let fetcher = Arc::new(ScriptedFetcher::new(Step::status(200)));
        let sink = Arc::new(MemorySink::new());
        let job = job(&fetcher, &sink, fast_config().with_concurrency(2));
        let ids: Vec<String> = (0..20).map(|i| format!("t{i}")).collect();
        let ids: Vec<&str> = ids.iter().map(String::as_str).collect();

        let run = job.run(specs(&ids), CancellationToken::new()).unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(
            fetcher.total_calls() < 20,
            "fetched {} targets with nobody reading",
            fetcher.total_calls()
        );

        let report = run.finish().await.unwrap();
        assert_eq!(report.succeeded.len(), 20);
        assert_eq!(fetcher.total_calls(), 20);
    }

    #[tokio::test]
    async fn test_empty_target_list_completes() {
        let fetcher = Arc::new(ScriptedFetcher::new(Step::status(200)));
        let sink = Arc::new(MemorySink::new());
        let report = job(&fetcher, &sink, fast_config())
            .start(Vec::<TargetSpec>::new(), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.total, 0);
        assert!(report.is_success());
    }

    #[tokio::test]
    async fn test_panicking_fetch_recorded_as_internal() {
        let fetcher = Arc::new(
            ScriptedFetcher::new(Step::status(200)).script(&url("boom"), [Step::Panic]),
        );
        let sink = Arc::new(MemorySink::new());
        let report = job(&fetcher, &sink, fast_config())
            .start(specs(&["ok", "boom"]), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.failure("boom").unwrap().kind, FailureKind::Internal);
        assert_eq!(report.succeeded, vec!["ok"]);
    }
}
