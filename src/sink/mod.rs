//! Persistence capability for fetched bytes.
//!
//! A [`Sink`] stores one named entry per successful target. The
//! [`OverridePolicy`] decides what happens when the name is already taken.
//!
//! Two implementations ship with the crate:
//! - [`DirectorySink`] writes files into an existing directory
//! - [`MemorySink`] keeps entries in memory and counts writes

mod dir;
mod memory;

use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;

pub use dir::DirectorySink;
pub(crate) use dir::replace_unsafe_chars;
pub use memory::MemorySink;

/// What to do when a sink entry with the same name already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OverridePolicy {
    /// Replace the existing entry.
    #[default]
    Overwrite,
    /// Leave the existing entry alone and report the target as skipped.
    SkipIfExists,
}

impl fmt::Display for OverridePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Overwrite => f.write_str("overwrite"),
            Self::SkipIfExists => f.write_str("skip-if-exists"),
        }
    }
}

/// Result of a successful [`Sink::write`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStatus {
    /// A new entry was created.
    Written,
    /// An existing entry was replaced.
    Overwritten,
    /// An entry existed and the policy was `SkipIfExists`; nothing was written.
    SkippedExisting,
}

impl WriteStatus {
    /// Returns true if bytes were actually stored.
    #[must_use]
    pub fn wrote(self) -> bool {
        matches!(self, Self::Written | Self::Overwritten)
    }
}

/// Errors raised by sink implementations.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The entry name cannot be stored safely.
    #[error("invalid entry name '{name}': {reason}")]
    InvalidName {
        /// The rejected name.
        name: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// Filesystem error while writing an entry.
    #[error("failed to write {path}: {source}")]
    Io {
        /// Path being written.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl SinkError {
    /// Creates an invalid-name error.
    pub fn invalid_name(name: impl Into<String>, reason: &'static str) -> Self {
        Self::InvalidName {
            name: name.into(),
            reason,
        }
    }

    /// Creates an IO error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Stores fetched bytes under a name.
#[async_trait]
pub trait Sink: Send + Sync + fmt::Debug {
    /// Writes `bytes` under `name`, honouring `policy`.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] if the name is unusable or the write fails.
    async fn write(
        &self,
        name: &str,
        bytes: Bytes,
        policy: OverridePolicy,
    ) -> Result<WriteStatus, SinkError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_status_wrote() {
        assert!(WriteStatus::Written.wrote());
        assert!(WriteStatus::Overwritten.wrote());
        assert!(!WriteStatus::SkippedExisting.wrote());
    }

    #[test]
    fn test_override_policy_default_is_overwrite() {
        assert_eq!(OverridePolicy::default(), OverridePolicy::Overwrite);
        assert_eq!(OverridePolicy::SkipIfExists.to_string(), "skip-if-exists");
    }

    #[test]
    fn test_sink_error_display_includes_context() {
        let error = SinkError::io(
            "/tmp/out/a.jpg",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        let msg = error.to_string();
        assert!(msg.contains("/tmp/out/a.jpg"), "{msg}");
        assert!(msg.contains("denied"), "{msg}");

        let msg = SinkError::invalid_name("..", "path component").to_string();
        assert!(msg.contains("'..'"), "{msg}");
    }
}
