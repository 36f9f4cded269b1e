//! reqwest-backed [`Fetcher`].

use std::error::Error as _;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use tracing::{debug, instrument};
use url::Url;

use super::{Fetcher, RawResult, TransportFailure};

/// Default HTTP connect timeout (10 seconds).
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP(S) fetcher built on a pooled [`reqwest::Client`].
///
/// Create it once and share it; clones reuse the same connection pool.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Creates a fetcher with the default connect timeout.
    ///
    /// # Errors
    ///
    /// Returns the reqwest error if the TLS backend or resolver cannot be
    /// initialised.
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::with_connect_timeout(CONNECT_TIMEOUT)
    }

    /// Creates a fetcher with an explicit connect timeout.
    ///
    /// # Errors
    ///
    /// Returns the reqwest error if the client cannot be built.
    pub fn with_connect_timeout(connect_timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .gzip(true)
            .user_agent(default_user_agent())
            .build()?;
        Ok(Self { client })
    }

    /// Wraps an existing client.
    #[must_use]
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    #[instrument(level = "debug", skip(self), fields(timeout_ms = timeout.as_millis()))]
    async fn fetch(&self, url: &str, timeout: Duration) -> RawResult {
        let parsed = match parse_http_url(url) {
            Ok(parsed) => parsed,
            Err(raw) => return raw,
        };

        let response = match self.client.get(parsed).timeout(timeout).send().await {
            Ok(response) => response,
            Err(error) => return map_reqwest_error(&error),
        };

        let status = response.status().as_u16();
        if !response.status().is_success() {
            debug!(status, "non-success status");
            return RawResult::response(status, Bytes::new());
        }

        match response.bytes().await {
            Ok(body) => {
                debug!(status, bytes = body.len(), "response received");
                RawResult::response(status, body)
            }
            Err(error) => map_reqwest_error(&error),
        }
    }
}

/// Identifies the tool to servers.
fn default_user_agent() -> String {
    format!("batch-fetch/{}", env!("CARGO_PKG_VERSION"))
}

/// Parses and checks the scheme of a target URL.
///
/// Scheme-less input such as `www.example.com/a.jpg` fails to parse and is
/// reported as malformed rather than guessed at.
fn parse_http_url(url: &str) -> Result<Url, RawResult> {
    let parsed = Url::parse(url.trim())
        .map_err(|error| RawResult::transport(TransportFailure::MalformedUrl, error.to_string()))?;

    match parsed.scheme() {
        "http" | "https" => {}
        other => {
            return Err(RawResult::transport(
                TransportFailure::MalformedUrl,
                format!("unsupported scheme '{other}'"),
            ));
        }
    }

    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(RawResult::transport(
            TransportFailure::MalformedUrl,
            "missing host",
        ));
    }

    Ok(parsed)
}

/// Maps a reqwest error to a transport failure tag.
fn map_reqwest_error(error: &reqwest::Error) -> RawResult {
    let detail = error_chain(error);
    let failure = if error.is_timeout() {
        TransportFailure::TimeoutExpired
    } else if error.is_connect() {
        if looks_like_dns_failure(&detail) {
            TransportFailure::DnsFailure
        } else {
            TransportFailure::ConnectionRefused
        }
    } else if error.is_builder() {
        TransportFailure::MalformedUrl
    } else {
        TransportFailure::Other
    };
    RawResult::transport(failure, detail)
}

/// Joins an error and its sources into one line.
fn error_chain(error: &reqwest::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

fn looks_like_dns_failure(detail: &str) -> bool {
    let lower = detail.to_ascii_lowercase();
    lower.contains("dns error")
        || lower.contains("failed to lookup address")
        || lower.contains("name or service not known")
        || lower.contains("no such host")
}
