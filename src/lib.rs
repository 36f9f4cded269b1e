//! Batch Fetch Core Library
//!
//! This library provides a concurrent, fault-tolerant batch fetch engine:
//! given a list of `(id, url)` targets it fetches them under a concurrency
//! cap, retries transient failures with backoff, stores successful bodies
//! through a sink, and returns a per-target report.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`fetch`] - Outcome classification, retry policy, dispatcher, batch job, reporter
//! - [`transport`] - `Fetcher` capability and the reqwest-backed `HttpFetcher`
//! - [`sink`] - `Sink` capability with directory and in-memory implementations
//! - [`parser`] - Target list parsing and target id derivation

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod fetch;
pub mod parser;
pub mod sink;
pub mod transport;

// Re-export commonly used types
pub use fetch::{
    BatchJob, BoundedDispatcher, ConfigError, FailureKind, JobConfig, JobError, JobReport,
    JobRun, JobState, Outcome, RetryPolicy, Target, TargetSpec, classify,
};
pub use parser::{InputError, load_target_file, parse_target_list};
pub use sink::{DirectorySink, MemorySink, OverridePolicy, Sink, SinkError, WriteStatus};
pub use transport::{Fetcher, HttpFetcher};
