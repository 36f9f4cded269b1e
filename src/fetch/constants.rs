//! Default values for job configuration (concurrency, timeouts, backoff).

use std::time::Duration;

/// Default number of concurrent in-flight fetches.
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Default maximum attempts per target, including the first one.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default per-item fetch timeout (30 seconds).
pub const DEFAULT_PER_ITEM_TIMEOUT: Duration = Duration::from_secs(30);

/// Default base delay for exponential backoff (1 second).
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(1);

/// Default maximum backoff delay (32 seconds).
pub const DEFAULT_BACKOFF_MAX: Duration = Duration::from_secs(32);

/// Message recorded for targets abandoned by an external cancellation signal.
pub const CANCELLED_MESSAGE: &str = "job cancelled";

/// Message recorded for targets abandoned because the job deadline elapsed.
pub const DEADLINE_MESSAGE: &str = "job deadline exceeded";
