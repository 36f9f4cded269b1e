//! In-process sink backed by a concurrent map.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use super::{OverridePolicy, Sink, SinkError, WriteStatus};

/// Keeps entries in memory and counts the writes it performed.
///
/// Used for dry runs and for checking that a re-run with
/// [`OverridePolicy::SkipIfExists`] writes nothing.
#[derive(Debug, Default)]
pub struct MemorySink {
    entries: DashMap<String, Bytes>,
    writes: AtomicUsize,
}

impl MemorySink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds an entry without counting it as a write.
    pub fn insert(&self, name: impl Into<String>, bytes: impl Into<Bytes>) {
        self.entries.insert(name.into(), bytes.into());
    }

    /// Returns the stored bytes for `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Bytes> {
        self.entries.get(name).map(|entry| entry.value().clone())
    }

    /// Returns true if an entry named `name` exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Stored entry names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Number of writes performed through [`Sink::write`].
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Sink for MemorySink {
    async fn write(
        &self,
        name: &str,
        bytes: Bytes,
        policy: OverridePolicy,
    ) -> Result<WriteStatus, SinkError> {
        if name.trim().is_empty() {
            return Err(SinkError::invalid_name(name, "empty name"));
        }

        let status = match (self.entries.entry(name.to_string()), policy) {
            (Entry::Occupied(_), OverridePolicy::SkipIfExists) => {
                return Ok(WriteStatus::SkippedExisting);
            }
            (Entry::Occupied(mut entry), OverridePolicy::Overwrite) => {
                entry.insert(bytes);
                WriteStatus::Overwritten
            }
            (Entry::Vacant(entry), _) => {
                entry.insert(bytes);
                WriteStatus::Written
            }
        };
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(status)
    }
}
