//! Fetch capability consumed by the engine.
//!
//! The engine never talks to the network directly. It calls a [`Fetcher`]
//! with a URL and a timeout and gets back a [`RawResult`]: either a status
//! code plus body, or a transport failure tag. [`HttpFetcher`] is the
//! reqwest-backed implementation used by the binary.

mod http;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

pub use crate::fetch::{RawResult, TransportFailure};
pub use http::{CONNECT_TIMEOUT, HttpFetcher};

/// Fetches one URL.
///
/// Implementations must not panic on bad input and should honour `timeout`
/// themselves where they can; the dispatcher enforces it as well.
#[async_trait]
pub trait Fetcher: Send + Sync + fmt::Debug {
    /// Fetches `url`, giving up after `timeout`.
    async fn fetch(&self, url: &str, timeout: Duration) -> RawResult;
}
