//! Progress bar for fetch runs, driven by the job's progress stream.

use std::time::Duration;

use batch_fetch_core::{Outcome, Target};
use indicatif::{ProgressBar, ProgressStyle};

/// Counts terminal outcomes and renders them as a bar on stderr.
///
/// When hidden, the bar still counts so callers need no special case.
pub(crate) struct ProgressDisplay {
    bar: ProgressBar,
    failed: usize,
}

impl ProgressDisplay {
    pub(crate) fn new(visible: bool, total: usize) -> Self {
        let len = u64::try_from(total).unwrap_or(u64::MAX);
        if !visible {
            let bar = ProgressBar::hidden();
            bar.set_length(len);
            return Self { bar, failed: 0 };
        }

        let bar = ProgressBar::new(len);
        bar.set_style(
            ProgressStyle::with_template("{spinner} [{bar:30}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        bar.enable_steady_tick(Duration::from_millis(100));
        Self { bar, failed: 0 }
    }

    /// Advances the bar by one terminal outcome.
    pub(crate) fn observe(&mut self, target: &Target, outcome: &Outcome) {
        if outcome.failure_kind().is_some() {
            self.failed += 1;
        }
        self.bar.inc(1);
        if self.failed == 0 {
            self.bar.set_message(format!("{}: {outcome}", target.id()));
        } else {
            self.bar.set_message(format!(
                "{}: {outcome} ({} failed)",
                target.id(),
                self.failed
            ));
        }
    }

    #[cfg(test)]
    pub(crate) fn position(&self) -> u64 {
        self.bar.position()
    }

    #[cfg(test)]
    pub(crate) fn failed(&self) -> usize {
        self.failed
    }

    pub(crate) fn finish(self) {
        self.bar.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::ProgressDisplay;
    use batch_fetch_core::{FailureKind, Outcome, Target};
    use bytes::Bytes;

    #[test]
    fn test_hidden_progress_still_counts() {
        let mut progress = ProgressDisplay::new(false, 3);
        progress.observe(
            &Target::new("a.jpg", "http://h/a.jpg"),
            &Outcome::Success {
                bytes: Bytes::from_static(b"data"),
            },
        );
        progress.observe(
            &Target::new("b.jpg", "http://h/b.jpg"),
            &Outcome::failed(FailureKind::NotFound, "HTTP 404", 1),
        );
        assert_eq!(progress.position(), 2);
        assert_eq!(progress.failed(), 1);
        progress.finish();
    }
}
