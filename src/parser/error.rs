//! Error types for loading target lists.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while loading a target list.
#[derive(Debug, Error)]
pub enum InputError {
    /// The input file does not exist.
    #[error("{} does not exist", path.display())]
    NotFound {
        /// Path that was looked up.
        path: PathBuf,
    },

    /// The input file exists but could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Read {
        /// Path being read.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl InputError {
    /// Creates a `NotFound` error.
    #[must_use]
    pub fn not_found(path: impl Into<PathBuf>) -> Self {
        Self::NotFound { path: path.into() }
    }

    /// Creates a `Read` error, mapping "not found" IO errors to `NotFound`.
    #[must_use]
    pub fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            return Self::NotFound { path };
        }
        Self::Read { path, source }
    }
}
