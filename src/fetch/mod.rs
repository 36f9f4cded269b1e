//! Concurrent, fault-tolerant batch fetch engine.
//!
//! This module contains the engine proper:
//! - [`classify`]: maps raw transport results to [`Outcome`]s
//! - [`RetryPolicy`]: decides whether and when to retry a failure
//! - [`BoundedDispatcher`]: runs fetches under a concurrency ceiling
//! - [`BatchJob`]: drives targets through retries into the sink
//! - [`Reporter`]: aggregates terminal outcomes into a [`JobReport`]
//!
//! The network and the storage side are abstracted behind
//! [`Fetcher`](crate::transport::Fetcher) and [`Sink`](crate::sink::Sink).

mod constants;
mod dispatcher;
mod error;
mod job;
mod outcome;
mod report;
mod retry;
mod target;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test_support;

pub use constants::{
    CANCELLED_MESSAGE, DEADLINE_MESSAGE, DEFAULT_BACKOFF_BASE, DEFAULT_BACKOFF_MAX,
    DEFAULT_CONCURRENCY, DEFAULT_MAX_ATTEMPTS, DEFAULT_PER_ITEM_TIMEOUT,
};
pub use dispatcher::{BoundedDispatcher, OutcomeStream, Slot};
pub use error::{ConfigError, JobError};
pub use job::{BatchJob, JobConfig, JobRun, JobState};
pub use outcome::{FailureKind, Outcome, RawResult, SkipReason, TransportFailure, classify};
pub use report::{FailedTarget, JobReport, Reporter};
pub use retry::{
    FullJitter, JitterSource, NoJitter, RetryDecision, RetryPolicy, backoff_ceiling, should_retry,
};
pub use target::{Target, TargetSpec};
