//! Exit code logic for the batch fetcher process.
//!
//! Single responsibility: map a job report to the process exit outcome.

use batch_fetch_core::{JobReport, JobState};

use crate::ProcessExit;

/// Determines the process exit outcome from a finished job's report.
///
/// A cancelled job always fails the process, even when some targets made it
/// through before the cancel.
pub(crate) fn determine_exit_outcome(report: &JobReport) -> ProcessExit {
    if report.state == JobState::Cancelled {
        return ProcessExit::Failure;
    }
    exit_for_counts(report.succeeded.len(), report.failed.len())
}

fn exit_for_counts(completed: usize, failed: usize) -> ProcessExit {
    if failed == 0 {
        ProcessExit::Success
    } else if completed > 0 {
        ProcessExit::Partial
    } else {
        ProcessExit::Failure
    }
}
