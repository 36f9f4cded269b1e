//! Error types for the fetch engine.
//!
//! Only job-level problems are errors. Per-target failures are carried as
//! [`Outcome::Failed`](super::Outcome::Failed) values in the report.

use std::time::Duration;

use thiserror::Error;

/// Invalid job configuration or target list, detected before anything is dispatched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Concurrency limit of zero.
    #[error("invalid concurrency limit {value}: must be at least 1")]
    InvalidConcurrency {
        /// The invalid value that was provided.
        value: usize,
    },

    /// Max attempts of zero.
    #[error("invalid max attempts {value}: must be at least 1")]
    InvalidMaxAttempts {
        /// The invalid value that was provided.
        value: u32,
    },

    /// Zero per-item timeout.
    #[error("invalid per-item timeout {value:?}: must be greater than zero")]
    InvalidTimeout {
        /// The invalid value that was provided.
        value: Duration,
    },

    /// Backoff base larger than backoff max.
    #[error("invalid backoff: base {base:?} exceeds max {max:?}")]
    InvalidBackoff {
        /// Configured base delay.
        base: Duration,
        /// Configured max delay.
        max: Duration,
    },

    /// Two targets share an id.
    #[error("duplicate target id '{id}'")]
    DuplicateTargetId {
        /// The repeated id.
        id: String,
    },
}

/// Errors from starting or driving a batch job.
#[derive(Debug, Error)]
pub enum JobError {
    /// Configuration was rejected; no target was dispatched.
    #[error("job configuration rejected: {0}")]
    Config(#[from] ConfigError),

    /// The job was already started once.
    #[error("batch job already started")]
    AlreadyStarted,

    /// The background driver task failed unexpectedly.
    #[error("job driver task failed: {0}")]
    Driver(#[from] tokio::task::JoinError),
}
