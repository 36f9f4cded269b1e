//! Filesystem sink writing one file per entry.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};

use super::{OverridePolicy, Sink, SinkError, WriteStatus};

/// Writes entries as files directly under a root directory.
///
/// The directory must already exist; the sink never creates it.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    root: PathBuf,
}

impl DirectorySink {
    /// Creates a sink rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory entries are written to.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path an entry name maps to.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::InvalidName`] for names that sanitize to nothing
    /// or to a path component.
    pub fn entry_path(&self, name: &str) -> Result<PathBuf, SinkError> {
        Ok(self.root.join(sanitize_entry_name(name)?))
    }
}

#[async_trait]
impl Sink for DirectorySink {
    #[instrument(level = "debug", skip(self, bytes), fields(bytes = bytes.len()))]
    async fn write(
        &self,
        name: &str,
        bytes: Bytes,
        policy: OverridePolicy,
    ) -> Result<WriteStatus, SinkError> {
        let path = self.entry_path(name)?;

        let (options, status) = match policy {
            OverridePolicy::SkipIfExists => {
                let mut options = OpenOptions::new();
                options.write(true).create_new(true);
                (options, WriteStatus::Written)
            }
            OverridePolicy::Overwrite => {
                let existed = tokio::fs::try_exists(&path)
                    .await
                    .map_err(|error| SinkError::io(&path, error))?;
                let mut options = OpenOptions::new();
                options.write(true).create(true).truncate(true);
                let status = if existed {
                    WriteStatus::Overwritten
                } else {
                    WriteStatus::Written
                };
                (options, status)
            }
        };

        let mut file = match options.open(&path).await {
            Ok(file) => file,
            Err(error) if error.kind() == ErrorKind::AlreadyExists => {
                debug!(path = %path.display(), "entry exists, skipping");
                return Ok(WriteStatus::SkippedExisting);
            }
            Err(error) => return Err(SinkError::io(&path, error)),
        };

        if let Err(error) = write_all(&mut file, &bytes).await {
            drop(file);
            // Leave no truncated entry behind.
            let _ = tokio::fs::remove_file(&path).await;
            return Err(SinkError::io(&path, error));
        }

        debug!(path = %path.display(), ?status, "entry written");
        Ok(status)
    }
}

async fn write_all(file: &mut tokio::fs::File, bytes: &[u8]) -> std::io::Result<()> {
    file.write_all(bytes).await?;
    file.flush().await?;
    file.sync_all().await
}

/// Replaces path separators, reserved characters and control characters
/// with `_`.
///
/// Target ids are derived with the same mapping, so distinct ids never
/// collapse onto one file.
pub(crate) fn replace_unsafe_chars(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

/// Maps an entry name to a single safe file name.
///
/// Path separators, reserved characters and control characters become `_`.
/// Names that are empty after trimming, or that are `.`/`..`, are rejected.
pub(crate) fn sanitize_entry_name(name: &str) -> Result<String, SinkError> {
    let sanitized = replace_unsafe_chars(name.trim());

    if sanitized.is_empty() {
        return Err(SinkError::invalid_name(name, "empty name"));
    }
    if sanitized.chars().all(|c| c == '.') {
        return Err(SinkError::invalid_name(name, "path component"));
    }
    Ok(sanitized)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_sanitize_entry_name_replaces_separators() {
        assert_eq!(sanitize_entry_name("a/b\\c.jpg").unwrap(), "a_b_c.jpg");
        assert_eq!(sanitize_entry_name("what?.png").unwrap(), "what_.png");
        assert_eq!(sanitize_entry_name("  cat.jpg ").unwrap(), "cat.jpg");
    }

    #[test]
    fn test_sanitize_entry_name_rejects_empty_and_dots() {
        for name in ["", "   ", ".", ".."] {
            assert!(
                matches!(
                    sanitize_entry_name(name),
                    Err(SinkError::InvalidName { .. })
                ),
                "{name:?}"
            );
        }
    }

    #[tokio::test]
    async fn test_write_creates_then_overwrites() {
        let dir = TempDir::new().unwrap();
        let sink = DirectorySink::new(dir.path());

        let status = sink
            .write("a.jpg", Bytes::from_static(b"one"), OverridePolicy::Overwrite)
            .await
            .unwrap();
        assert_eq!(status, WriteStatus::Written);

        let status = sink
            .write("a.jpg", Bytes::from_static(b"two"), OverridePolicy::Overwrite)
            .await
            .unwrap();
        assert_eq!(status, WriteStatus::Overwritten);
        assert_eq!(std::fs::read(dir.path().join("a.jpg")).unwrap(), b"two");
    }

    #[tokio::test]
    async fn test_skip_if_exists_leaves_entry_untouched() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.jpg"), b"original").unwrap();
        let sink = DirectorySink::new(dir.path());

        let status = sink
            .write("a.jpg", Bytes::from_static(b"new"), OverridePolicy::SkipIfExists)
            .await
            .unwrap();
        assert_eq!(status, WriteStatus::SkippedExisting);
        assert_eq!(std::fs::read(dir.path().join("a.jpg")).unwrap(), b"original");

        let status = sink
            .write("b.jpg", Bytes::from_static(b"new"), OverridePolicy::SkipIfExists)
            .await
            .unwrap();
        assert_eq!(status, WriteStatus::Written);
    }

    #[tokio::test]
    async fn test_write_into_missing_directory_is_io_error() {
        let dir = TempDir::new().unwrap();
        let sink = DirectorySink::new(dir.path().join("missing"));
        let error = sink
            .write("a.jpg", Bytes::from_static(b"x"), OverridePolicy::Overwrite)
            .await
            .unwrap_err();
        assert!(matches!(error, SinkError::Io { .. }), "{error}");
    }

    #[tokio::test]
    async fn test_overwrite_reports_metadata_error() {
        let dir = TempDir::new().unwrap();
        let not_a_dir = dir.path().join("plain-file");
        std::fs::write(&not_a_dir, b"x").unwrap();
        let sink = DirectorySink::new(&not_a_dir);

        let error = sink
            .write("a.jpg", Bytes::from_static(b"x"), OverridePolicy::Overwrite)
            .await
            .unwrap_err();
        match error {
            SinkError::Io { path, .. } => assert_eq!(path, not_a_dir.join("a.jpg")),
            other => panic!("expected io error, got {other}"),
        }
    }

    #[test]
    fn test_replace_unsafe_chars_matches_sanitize() {
        for name in ["a/b.jpg", "x:y|z.png", "tab\there"] {
            assert_eq!(replace_unsafe_chars(name), sanitize_entry_name(name).unwrap());
        }
    }

    #[tokio::test]
    async fn test_write_never_escapes_root() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("out");
        std::fs::create_dir(&root).unwrap();
        let sink = DirectorySink::new(&root);

        sink.write("../escape.jpg", Bytes::from_static(b"x"), OverridePolicy::Overwrite)
            .await
            .unwrap();
        assert!(!dir.path().join("escape.jpg").exists());
        assert!(root.join(".._escape.jpg").exists());
    }
}
