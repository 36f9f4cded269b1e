//! Fetch targets: the caller-supplied `(id, url)` pair and its in-flight form.

use std::fmt;

use serde::Serialize;

/// A target as supplied by the caller, before the job starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetSpec {
    /// Opaque identity, unique within one job. Used as the sink entry name.
    pub id: String,
    /// URL to fetch.
    pub url: String,
}

impl TargetSpec {
    /// Creates a target spec.
    #[must_use]
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
        }
    }
}

impl<I: Into<String>, U: Into<String>> From<(I, U)> for TargetSpec {
    fn from((id, url): (I, U)) -> Self {
        Self::new(id, url)
    }
}

/// One URL-plus-identity item being processed by a job.
///
/// Only `attempt` changes over the target's lifetime. It starts at 0 and is
/// incremented right before each dispatch, so it always equals the number of
/// fetches started for this target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Target {
    id: String,
    url: String,
    attempt: u32,
}

impl Target {
    /// Creates a target that has not been attempted yet.
    #[must_use]
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            attempt: 0,
        }
    }

    /// Target identity.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// URL to fetch.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Number of fetch attempts started so far.
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Marks the start of the next attempt and returns its number (1-indexed).
    pub(crate) fn begin_attempt(&mut self) -> u32 {
        self.attempt = self.attempt.saturating_add(1);
        self.attempt
    }
}

impl From<TargetSpec> for Target {
    fn from(spec: TargetSpec) -> Self {
        Self::new(spec.id, spec.url)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.id, self.url)
    }
}
