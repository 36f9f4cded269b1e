//! Bounded-concurrency dispatch of fetches.
//!
//! [`BoundedDispatcher`] owns the admission gate: a semaphore with exactly
//! `limit` permits. A fetch runs only while its [`Slot`] is held, so at no
//! instant are more than `limit` fetches in flight.
//!
//! Results are streamed as they complete through an [`OutcomeStream`]; the
//! first result is available as soon as the first fetch finishes, and the
//! output order is completion order, not input order.
//!
//! # Cancellation
//!
//! All waits race the job-wide [`CancellationToken`]:
//! - targets not yet admitted are emitted as `Failed(Cancelled)` without
//!   being fetched
//! - in-flight fetches are dropped and reported as `Failed(Cancelled)`
//! - outcomes emitted before cancellation stay valid

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::Stream;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, mpsc};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use super::constants::CANCELLED_MESSAGE;
use super::error::ConfigError;
use super::outcome::{FailureKind, Outcome, classify};
use super::target::Target;
use crate::transport::Fetcher;

/// One unit of admission capacity. Released on drop.
#[derive(Debug)]
pub struct Slot {
    _permit: OwnedSemaphorePermit,
}

/// Runs fetches under a fixed concurrency ceiling and per-item timeout.
#[derive(Debug)]
pub struct BoundedDispatcher {
    fetcher: Arc<dyn Fetcher>,
    semaphore: Arc<Semaphore>,
    limit: usize,
    per_item_timeout: Duration,
    cancel: CancellationToken,
    cancel_reason: OnceLock<&'static str>,
}

impl BoundedDispatcher {
    /// Creates a dispatcher.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidConcurrency`] if `limit` is zero and
    /// [`ConfigError::InvalidTimeout`] if `per_item_timeout` is zero.
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        limit: usize,
        per_item_timeout: Duration,
        cancel: CancellationToken,
    ) -> Result<Self, ConfigError> {
        if limit == 0 {
            return Err(ConfigError::InvalidConcurrency { value: limit });
        }
        if per_item_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout {
                value: per_item_timeout,
            });
        }

        Ok(Self {
            fetcher,
            semaphore: Arc::new(Semaphore::new(limit)),
            limit,
            per_item_timeout,
            cancel,
            cancel_reason: OnceLock::new(),
        })
    }

    /// Configured concurrency ceiling.
    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Number of slots currently held.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.limit - self.semaphore.available_permits()
    }

    /// Token observed by every wait in this dispatcher.
    #[must_use]
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Cancels the dispatcher, recording `reason` on abandoned targets.
    ///
    /// Only the first reason sticks. Cancelling the token directly records
    /// the generic "job cancelled" message.
    pub fn cancel_with(&self, reason: &'static str) {
        let _ = self.cancel_reason.set(reason);
        self.cancel.cancel();
    }

    /// Message recorded on targets abandoned by cancellation.
    #[must_use]
    pub fn cancel_message(&self) -> &'static str {
        self.cancel_reason.get().copied().unwrap_or(CANCELLED_MESSAGE)
    }

    /// Waits for a free slot. Returns `None` if the job is cancelled first.
    pub async fn acquire_slot(&self) -> Option<Slot> {
        if self.cancel.is_cancelled() {
            return None;
        }
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => None,
            permit = Arc::clone(&self.semaphore).acquire_owned() => {
                permit.ok().map(|permit| Slot { _permit: permit })
            }
        }
    }

    /// Runs one fetch attempt for `target` while holding `slot`.
    ///
    /// Increments the target's attempt counter before dispatching. The slot
    /// is released as soon as the fetch finishes, before classification
    /// results are handed back.
    pub async fn fetch(&self, slot: Slot, target: &mut Target) -> Outcome {
        let attempt = target.begin_attempt();
        debug!(
            id = target.id(),
            url = %target.url(),
            attempt,
            in_flight = self.in_flight(),
            "fetch admitted"
        );

        let timeout = self.per_item_timeout;
        let outcome = tokio::select! {
            biased;
            () = self.cancel.cancelled() => {
                Outcome::failed(FailureKind::Cancelled, self.cancel_message(), attempt)
            }
            result = tokio::time::timeout(timeout, self.fetcher.fetch(target.url(), timeout)) => {
                match result {
                    Ok(raw) => classify(raw, attempt),
                    Err(_) => Outcome::failed(
                        FailureKind::Timeout,
                        format!("no response within {} ms", timeout.as_millis()),
                        attempt,
                    ),
                }
            }
        };
        drop(slot);
        outcome
    }

    /// Fetches every target once and streams the classified outcomes.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn run(self: &Arc<Self>, targets: impl IntoIterator<Item = Target>) -> OutcomeStream {
        self.drive(targets, |dispatcher, slot, mut target| async move {
            let outcome = dispatcher.fetch(slot, &mut target).await;
            (target, outcome)
        })
    }

    /// Admits targets one slot at a time and runs `work` for each.
    ///
    /// `work` receives the slot for the target's first attempt and returns
    /// the terminal outcome. It may release the slot and acquire new ones
    /// (for retries) through [`acquire_slot`](Self::acquire_slot).
    pub(crate) fn drive<W, Fut>(
        self: &Arc<Self>,
        targets: impl IntoIterator<Item = Target>,
        work: W,
    ) -> OutcomeStream
    where
        W: Fn(Arc<Self>, Slot, Target) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = (Target, Outcome)> + Send + 'static,
    {
        let pending: VecDeque<Target> = targets.into_iter().collect();
        let (tx, rx) = mpsc::channel(self.limit);
        let dispatcher = Arc::clone(self);
        tokio::spawn(async move {
            dispatcher.coordinate(pending, work, tx).await;
        });
        OutcomeStream { rx }
    }

    #[instrument(level = "debug", skip_all, fields(targets = pending.len(), limit = self.limit))]
    async fn coordinate<W, Fut>(
        self: Arc<Self>,
        mut pending: VecDeque<Target>,
        work: W,
        tx: mpsc::Sender<(Target, Outcome)>,
    ) where
        W: Fn(Arc<Self>, Slot, Target) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = (Target, Outcome)> + Send + 'static,
    {
        let mut tasks = JoinSet::new();
        let mut admitted: HashMap<tokio::task::Id, Target> = HashMap::new();

        loop {
            if pending.is_empty() && tasks.is_empty() {
                break;
            }

            tokio::select! {
                biased;
                () = self.cancel.cancelled(), if !pending.is_empty() => {
                    debug!(abandoned = pending.len(), "cancelled before admission");
                    let message = self.cancel_message();
                    while let Some(target) = pending.pop_front() {
                        let outcome =
                            Outcome::failed(FailureKind::Cancelled, message, target.attempt());
                        if tx.send((target, outcome)).await.is_err() {
                            return;
                        }
                    }
                }
                Some(joined) = tasks.join_next_with_id(), if !tasks.is_empty() => {
                    let emitted = match joined {
                        Ok((id, result)) => {
                            admitted.remove(&id);
                            Some(result)
                        }
                        Err(error) => admitted
                            .remove(&error.id())
                            .map(|target| contain_task_failure(target, &error)),
                    };
                    if let Some(result) = emitted {
                        if tx.send(result).await.is_err() {
                            debug!("outcome receiver dropped, stopping dispatch");
                            return;
                        }
                    }
                }
                permit = Arc::clone(&self.semaphore).acquire_owned(), if !pending.is_empty() => {
                    let (Ok(permit), Some(target)) = (permit, pending.pop_front()) else {
                        break;
                    };
                    let slot = Slot { _permit: permit };
                    let handle = tasks.spawn(work(Arc::clone(&self), slot, target.clone()));
                    admitted.insert(handle.id(), target);
                }
            }
        }
    }
}

/// Converts a panicked or aborted per-target task into a terminal outcome.
fn contain_task_failure(target: Target, error: &JoinError) -> (Target, Outcome) {
    let message = if error.is_panic() {
        "task panicked"
    } else {
        "task aborted"
    };
    warn!(id = target.id(), url = %target.url(), error = %error, "{message}");
    let attempt = target.attempt().max(1);
    (
        target,
        Outcome::failed(FailureKind::Internal, message, attempt),
    )
}

/// Completion-ordered stream of `(Target, Outcome)` pairs.
///
/// Finite: ends once every target has produced its terminal outcome.
#[derive(Debug)]
pub struct OutcomeStream {
    rx: mpsc::Receiver<(Target, Outcome)>,
}

impl OutcomeStream {
    /// Waits for the next completed target.
    pub async fn next_outcome(&mut self) -> Option<(Target, Outcome)> {
        self.rx.recv().await
    }
}

impl Stream for OutcomeStream {
    type Item = (Target, Outcome);

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
