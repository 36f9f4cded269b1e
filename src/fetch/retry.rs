//! Retry logic with exponential backoff for transient fetch failures.
//!
//! Whether a failed attempt is retried depends only on its [`FailureKind`]
//! and the attempt count:
//! - `InvalidTarget`, `NotFound` and 4xx `ServerError` are never retried
//! - `Timeout`, `NetworkError` and 5xx `ServerError` are retried while
//!   `attempt < max_attempts`
//!
//! Delays follow the ladder `min(base * 2^(attempt-1), max)`, after which a
//! [`JitterSource`] draws the actual delay from `[0, ladder value]`. The
//! ladder itself ([`backoff_ceiling`]) is deterministic, so it can be tested
//! without touching the jitter draw.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use batch_fetch_core::fetch::{FailureKind, NoJitter, RetryDecision, RetryPolicy};
//!
//! let policy = RetryPolicy::new(3, Duration::from_secs(1), Duration::from_secs(8))
//!     .with_jitter(NoJitter);
//!
//! match policy.should_retry(FailureKind::ServerError(503), 1) {
//!     RetryDecision::Retry { delay, attempt } => {
//!         assert_eq!(delay, Duration::from_secs(1));
//!         assert_eq!(attempt, 2);
//!     }
//!     RetryDecision::DoNotRetry { reason } => panic!("unexpected: {reason}"),
//! }
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, instrument};

use super::constants::{DEFAULT_BACKOFF_BASE, DEFAULT_BACKOFF_MAX, DEFAULT_MAX_ATTEMPTS};
use super::outcome::FailureKind;

/// Decides whether an attempt that failed with `kind` should be retried.
///
/// `attempt` is the 1-indexed number of the attempt that just failed.
#[must_use]
pub fn should_retry(kind: FailureKind, attempt: u32, max_attempts: u32) -> bool {
    kind.is_transient() && attempt < max_attempts
}

/// Deterministic backoff ladder: `min(base * 2^(attempt-1), max)`.
///
/// Attempt 0 is treated like attempt 1. Overflow saturates at `max`.
#[must_use]
pub fn backoff_ceiling(attempt: u32, base: Duration, max: Duration) -> Duration {
    let exponent = attempt.max(1) - 1;
    2u32.checked_pow(exponent)
        .and_then(|multiplier| base.checked_mul(multiplier))
        .map_or(max, |delay| delay.min(max))
}

/// Source of the random component of a backoff delay.
pub trait JitterSource: Send + Sync + fmt::Debug {
    /// Returns a delay in `[0, ceiling]`.
    fn jitter(&self, ceiling: Duration) -> Duration;
}

/// Uniform draw from `[0, ceiling]` ("full jitter").
#[derive(Debug, Clone, Copy, Default)]
pub struct FullJitter;

impl JitterSource for FullJitter {
    #[allow(clippy::cast_possible_truncation)]
    fn jitter(&self, ceiling: Duration) -> Duration {
        let ceiling_ms = ceiling.as_millis().min(u128::from(u64::MAX)) as u64;
        let mut rng = rand::thread_rng();
        Duration::from_millis(rng.gen_range(0..=ceiling_ms))
    }
}

/// Returns the ceiling unchanged. Useful for tests and reproducible runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoJitter;

impl JitterSource for NoJitter {
    fn jitter(&self, ceiling: Duration) -> Duration {
        ceiling
    }
}

/// Decision on whether to retry a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry {
        /// How long to wait before retrying.
        delay: Duration,
        /// Which attempt number the retry will be (first retry is attempt 2).
        attempt: u32,
    },

    /// Do not retry; the failure is terminal.
    DoNotRetry {
        /// Human-readable reason why retry is not attempted.
        reason: String,
    },
}

/// Retry limits plus the jitter source used for backoff delays.
///
/// # Default Values
///
/// - `max_attempts`: 3
/// - `backoff_base`: 1 second
/// - `backoff_max`: 32 seconds
/// - jitter: [`FullJitter`]
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the initial attempt).
    max_attempts: u32,

    /// Ladder value for the first retry.
    backoff_base: Duration,

    /// Ladder cap.
    backoff_max: Duration,

    jitter: Arc<dyn JitterSource>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_BACKOFF_BASE, DEFAULT_BACKOFF_MAX)
    }
}

impl RetryPolicy {
    /// Creates a policy with full jitter.
    ///
    /// `max_attempts` below 1 is raised to 1.
    #[must_use]
    pub fn new(max_attempts: u32, backoff_base: Duration, backoff_max: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_base,
            backoff_max,
            jitter: Arc::new(FullJitter),
        }
    }

    /// Replaces the jitter source.
    #[must_use]
    pub fn with_jitter(mut self, jitter: impl JitterSource + 'static) -> Self {
        self.jitter = Arc::new(jitter);
        self
    }

    /// Replaces the jitter source with a shared one.
    #[must_use]
    pub fn with_shared_jitter(mut self, jitter: Arc<dyn JitterSource>) -> Self {
        self.jitter = jitter;
        self
    }

    /// Returns the maximum number of attempts configured.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay to wait after `attempt` failed: the ladder value with jitter applied.
    #[must_use]
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let ceiling = backoff_ceiling(attempt, self.backoff_base, self.backoff_max);
        self.jitter.jitter(ceiling).min(ceiling)
    }

    /// Determines whether to retry a failed attempt.
    ///
    /// `attempt` is the attempt number that just failed (1-indexed).
    #[instrument(level = "debug", skip(self), fields(max_attempts = self.max_attempts))]
    pub fn should_retry(&self, kind: FailureKind, attempt: u32) -> RetryDecision {
        if !kind.is_transient() {
            return RetryDecision::DoNotRetry {
                reason: format!("{kind} is not retryable"),
            };
        }

        if !should_retry(kind, attempt, self.max_attempts) {
            debug!(attempt, max = self.max_attempts, "max attempts reached");
            return RetryDecision::DoNotRetry {
                reason: format!("max attempts ({}) exhausted", self.max_attempts),
            };
        }

        let delay = self.backoff_for(attempt);
        debug!(
            attempt,
            next_attempt = attempt + 1,
            delay_ms = delay.as_millis(),
            "will retry"
        );

        RetryDecision::Retry {
            delay,
            attempt: attempt + 1,
        }
    }
}
