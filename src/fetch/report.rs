//! Aggregation of per-target terminal outcomes into a [`JobReport`].
//!
//! The [`Reporter`] is shared by the job driver and any observer; every
//! `record` call appends under a single lock, so concurrent callers never
//! interleave partial entries. Entries appear in completion order, not input
//! order.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use tracing::warn;

use super::job::JobState;
use super::outcome::{FailureKind, Outcome};
use super::target::Target;

/// A target that ended in failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedTarget {
    /// Target id.
    pub id: String,
    /// Target URL.
    pub url: String,
    /// Final failure classification.
    pub kind: FailureKind,
    /// Final failure detail.
    pub message: String,
    /// Number of attempts made (0 if the target was never dispatched).
    pub attempt: u32,
}

/// Final per-target results of one job.
///
/// `succeeded` and `failed` partition all targets. `skipped` lists the
/// successful targets whose sink write was skipped because the entry already
/// existed; every id in it is also in `succeeded`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobReport {
    /// Number of targets that entered the job.
    pub total: usize,
    /// Ids of targets that fetched successfully, in completion order.
    pub succeeded: Vec<String>,
    /// Subset of `succeeded` that produced no write.
    pub skipped: Vec<String>,
    /// Targets that failed, in completion order.
    pub failed: Vec<FailedTarget>,
    /// Number of retries scheduled across all targets.
    pub retries: usize,
    /// Terminal job state (`Completed` or `Cancelled`).
    pub state: JobState,
}

impl JobReport {
    /// Number of targets whose bytes were written to the sink.
    #[must_use]
    pub fn written(&self) -> usize {
        self.succeeded.len() - self.skipped.len()
    }

    /// Returns true when every target succeeded and the job was not cancelled.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.state == JobState::Completed
    }

    /// Failures that were final on their own merits: non-retryable errors and
    /// transient errors that exhausted their attempts.
    pub fn exhausted(&self) -> impl Iterator<Item = &FailedTarget> {
        self.failed
            .iter()
            .filter(|entry| entry.kind != FailureKind::Cancelled)
    }

    /// Targets abandoned because the job was cancelled.
    pub fn abandoned(&self) -> impl Iterator<Item = &FailedTarget> {
        self.failed
            .iter()
            .filter(|entry| entry.kind == FailureKind::Cancelled)
    }

    /// Number of failures per kind.
    #[must_use]
    pub fn kind_counts(&self) -> BTreeMap<FailureKind, usize> {
        let mut counts = BTreeMap::new();
        for entry in &self.failed {
            *counts.entry(entry.kind).or_insert(0) += 1;
        }
        counts
    }

    /// Looks up the failure entry for a target id.
    #[must_use]
    pub fn failure(&self, id: &str) -> Option<&FailedTarget> {
        self.failed.iter().find(|entry| entry.id == id)
    }
}

#[derive(Debug, Default)]
struct ReportState {
    succeeded: Vec<String>,
    skipped: Vec<String>,
    failed: Vec<FailedTarget>,
    seen: HashSet<String>,
}

/// Thread-safe accumulator for terminal outcomes.
#[derive(Debug)]
pub struct Reporter {
    total: usize,
    retries: AtomicUsize,
    state: Mutex<ReportState>,
}

impl Reporter {
    /// Creates a reporter for a job with `total` targets.
    #[must_use]
    pub fn new(total: usize) -> Self {
        Self {
            total,
            retries: AtomicUsize::new(0),
            state: Mutex::new(ReportState::default()),
        }
    }

    /// Records the terminal outcome of a target.
    ///
    /// Returns false (and records nothing) if the target was already recorded.
    pub fn record(&self, target: &Target, outcome: &Outcome) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if !state.seen.insert(target.id().to_string()) {
            warn!(id = target.id(), "ignoring second terminal outcome for target");
            return false;
        }

        match outcome {
            Outcome::Success { .. } => state.succeeded.push(target.id().to_string()),
            Outcome::Skipped { .. } => {
                state.succeeded.push(target.id().to_string());
                state.skipped.push(target.id().to_string());
            }
            Outcome::Failed {
                kind,
                message,
                attempt,
            } => state.failed.push(FailedTarget {
                id: target.id().to_string(),
                url: target.url().to_string(),
                kind: *kind,
                message: message.clone(),
                attempt: *attempt,
            }),
        }
        true
    }

    /// Counts one scheduled retry.
    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::SeqCst);
    }

    /// Number of targets recorded so far.
    #[must_use]
    pub fn recorded(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .seen
            .len()
    }

    /// Builds the report from everything recorded so far.
    #[must_use]
    pub fn finalize(&self, state: JobState) -> JobReport {
        let recorded = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        JobReport {
            total: self.total,
            succeeded: recorded.succeeded.clone(),
            skipped: recorded.skipped.clone(),
            failed: recorded.failed.clone(),
            retries: self.retries.load(Ordering::SeqCst),
            state,
        }
    }
}
