//! Scripted fetcher shared by the engine's unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use super::outcome::RawResult;
use crate::transport::Fetcher;

/// One scripted reply.
#[derive(Debug, Clone)]
pub(crate) enum Step {
    /// Reply immediately.
    Reply(RawResult),
    /// Reply after a delay.
    Delayed(Duration, RawResult),
    /// Never reply.
    Hang,
    /// Panic inside the fetch.
    Panic,
}

impl Step {
    pub(crate) fn status(status: u16) -> Self {
        Self::Reply(RawResult::response(status, format!("body-{status}")))
    }
}

/// Replays per-URL scripts and tracks concurrency.
///
/// URLs without a script (or whose script ran out) get `fallback`.
#[derive(Debug)]
pub(crate) struct ScriptedFetcher {
    scripts: Mutex<HashMap<String, VecDeque<Step>>>,
    fallback: Step,
    calls: Mutex<HashMap<String, usize>>,
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedFetcher {
    pub(crate) fn new(fallback: Step) -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            fallback,
            calls: Mutex::new(HashMap::new()),
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub(crate) fn script(self, url: &str, steps: impl IntoIterator<Item = Step>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(url.to_string(), steps.into_iter().collect());
        self
    }

    pub(crate) fn calls(&self, url: &str) -> usize {
        self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    pub(crate) fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    pub(crate) fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Decrements the in-flight gauge even when the fetch future is dropped.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, url: &str, _timeout: Duration) -> RawResult {
        *self.calls.lock().unwrap().entry(url.to_string()).or_insert(0) += 1;
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.current);

        let step = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(url)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| self.fallback.clone());

        match step {
            Step::Reply(raw) => {
                tokio::task::yield_now().await;
                raw
            }
            Step::Delayed(delay, raw) => {
                tokio::time::sleep(delay).await;
                raw
            }
            Step::Hang => std::future::pending().await,
            Step::Panic => panic!("scripted panic for {url}"),
        }
    }
}
