//! Outcome classification for fetch attempts.
//!
//! A [`Fetcher`](crate::transport::Fetcher) reports what happened on the wire
//! as a [`RawResult`]. [`classify`] maps that raw result onto the fixed
//! [`Outcome`] taxonomy that the retry policy and the reporter work with.
//!
//! # Status Code Classification
//!
//! | Raw result | Outcome |
//! |------------|---------|
//! | 200-299 | `Success` |
//! | 404 | `Failed(NotFound)` |
//! | other 4xx | `Failed(ServerError(code))`, non-retryable |
//! | 500-599 | `Failed(ServerError(code))`, retryable |
//! | 1xx / 3xx | `Failed(ServerError(code))`, non-retryable |
//! | timeout expired | `Failed(Timeout)` |
//! | connection refused / DNS failure | `Failed(NetworkError)` |
//! | malformed URL | `Failed(InvalidTarget)` |

use std::fmt;

use bytes::Bytes;
use serde::Serialize;

/// Transport-level failure tags reported by a fetcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportFailure {
    /// The remote host refused or dropped the connection.
    ConnectionRefused,
    /// The host name could not be resolved.
    DnsFailure,
    /// The request did not complete within its timeout.
    TimeoutExpired,
    /// The URL could not be parsed or uses an unsupported scheme.
    MalformedUrl,
    /// Any other transport error (interrupted body, protocol error).
    Other,
}

impl fmt::Display for TransportFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::ConnectionRefused => "connection refused",
            Self::DnsFailure => "dns failure",
            Self::TimeoutExpired => "timeout expired",
            Self::MalformedUrl => "malformed url",
            Self::Other => "transport error",
        };
        f.write_str(label)
    }
}

/// What a fetcher observed for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawResult {
    /// The server answered; any status code.
    Response {
        /// HTTP status code.
        status: u16,
        /// Full response body.
        body: Bytes,
    },
    /// The request failed before a response was available.
    Transport {
        /// Failure tag.
        failure: TransportFailure,
        /// Human-readable detail from the transport.
        detail: String,
    },
}

impl RawResult {
    /// Creates a response result.
    pub fn response(status: u16, body: impl Into<Bytes>) -> Self {
        Self::Response {
            status,
            body: body.into(),
        }
    }

    /// Creates a transport failure result.
    pub fn transport(failure: TransportFailure, detail: impl Into<String>) -> Self {
        Self::Transport {
            failure,
            detail: detail.into(),
        }
    }
}

/// Classification of a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(tag = "kind", content = "status", rename_all = "snake_case")]
pub enum FailureKind {
    /// HTTP 404.
    NotFound,
    /// Any non-success status other than 404. Retryable only for 5xx.
    ServerError(u16),
    /// Connection refused, DNS failure, or other transport error.
    NetworkError,
    /// The fetch did not complete within the per-item timeout.
    Timeout,
    /// The target URL is malformed and can never succeed.
    InvalidTarget,
    /// The fetched bytes could not be written to the sink.
    Storage,
    /// The job was cancelled (or hit its deadline) before this target finished.
    Cancelled,
    /// The task processing this target panicked.
    Internal,
}

impl FailureKind {
    /// Returns true if a retry could plausibly produce a different result.
    #[must_use]
    pub fn is_transient(self) -> bool {
        match self {
            Self::Timeout | Self::NetworkError => true,
            Self::ServerError(status) => (500..600).contains(&status),
            Self::NotFound | Self::InvalidTarget | Self::Storage | Self::Cancelled | Self::Internal => {
                false
            }
        }
    }

    /// Returns the stable label used in logs and summaries.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::ServerError(status) if (500..600).contains(&status) => "server_error",
            Self::ServerError(_) => "client_error",
            Self::NetworkError => "network_error",
            Self::Timeout => "timeout",
            Self::InvalidTarget => "invalid_target",
            Self::Storage => "storage",
            Self::Cancelled => "cancelled",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ServerError(status) => write!(f, "{} (HTTP {status})", self.label()),
            other => f.write_str(other.label()),
        }
    }
}

/// Why a successful fetch produced no sink write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The sink already held an entry with this name and the policy was
    /// `SkipIfExists`.
    AlreadyExists,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyExists => f.write_str("entry already exists"),
        }
    }
}

/// Result of one fetch attempt, or the terminal result of a target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The fetch returned a 2xx response.
    Success {
        /// Response body.
        bytes: Bytes,
    },
    /// The fetch succeeded but nothing was written.
    Skipped {
        /// Why the write was skipped.
        reason: SkipReason,
    },
    /// The attempt failed.
    Failed {
        /// Failure classification.
        kind: FailureKind,
        /// Detail for humans.
        message: String,
        /// Attempt number on which the failure happened (0 if never attempted).
        attempt: u32,
    },
}

impl Outcome {
    /// Creates a failed outcome.
    pub fn failed(kind: FailureKind, message: impl Into<String>, attempt: u32) -> Self {
        Self::Failed {
            kind,
            message: message.into(),
            attempt,
        }
    }

    /// Returns the failure kind, if this is a failure.
    #[must_use]
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::Failed { kind, .. } => Some(*kind),
            Self::Success { .. } | Self::Skipped { .. } => None,
        }
    }

    /// Returns true for `Success` and `Skipped`.
    #[must_use]
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }

    /// Body length for `Success`, zero otherwise.
    #[must_use]
    pub fn byte_length(&self) -> u64 {
        match self {
            Self::Success { bytes } => bytes.len() as u64,
            Self::Skipped { .. } | Self::Failed { .. } => 0,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success { bytes } => write!(f, "success ({} bytes)", bytes.len()),
            Self::Skipped { reason } => write!(f, "skipped: {reason}"),
            Self::Failed {
                kind,
                message,
                attempt,
            } => write!(f, "failed on attempt {attempt}: {kind}: {message}"),
        }
    }
}

/// Maps a raw transport result to an [`Outcome`].
///
/// Pure function; `attempt` is stamped onto failures so the reporter can tell
/// how many attempts a target used.
#[must_use]
pub fn classify(raw: RawResult, attempt: u32) -> Outcome {
    match raw {
        RawResult::Response { status, body } => classify_status(status, body, attempt),
        RawResult::Transport { failure, detail } => {
            let kind = match failure {
                TransportFailure::TimeoutExpired => FailureKind::Timeout,
                TransportFailure::ConnectionRefused
                | TransportFailure::DnsFailure
                | TransportFailure::Other => FailureKind::NetworkError,
                TransportFailure::MalformedUrl => FailureKind::InvalidTarget,
            };
            Outcome::failed(kind, format!("{failure}: {detail}"), attempt)
        }
    }
}

/// Classifies an HTTP status code.
///
/// Explicit match arms are kept for documentation even where they return the
/// same kind.
#[allow(clippy::match_same_arms)]
fn classify_status(status: u16, body: Bytes, attempt: u32) -> Outcome {
    match status {
        200..=299 => Outcome::Success { bytes: body },
        404 => Outcome::failed(FailureKind::NotFound, "HTTP 404 Not Found", attempt),
        400..=499 => Outcome::failed(
            FailureKind::ServerError(status),
            format!("HTTP {status} client error"),
            attempt,
        ),
        500..=599 => Outcome::failed(
            FailureKind::ServerError(status),
            format!("HTTP {status} server error"),
            attempt,
        ),
        // Redirects are followed by the transport; one that reaches us was not.
        _ => Outcome::failed(
            FailureKind::ServerError(status),
            format!("HTTP {status} unexpected status"),
            attempt,
        ),
    }
}
