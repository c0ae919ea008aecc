//! Remote resource downloads
//!
//! Downloads run under two independent caps: a byte limit, checked after
//! every read chunk, and a time budget covering the whole transfer. A cap of
//! 0 disables that check.

use crate::error::{BundleError, BundleResult};
use async_trait::async_trait;
use std::io::{ErrorKind, Read};
use std::time::{Duration, Instant};
use ureq::Agent;
use url::Url;

/// Size of each body read; the byte cap can be overshot by at most this much
const READ_CHUNK: usize = 8 * 1024;

/// Per-fetch byte and time caps
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchLimits {
    /// Maximum body size in bytes (0 = unlimited)
    pub max_bytes: u64,
    /// Time budget in milliseconds (0 = unlimited)
    pub timeout_ms: u64,
}

impl FetchLimits {
    pub fn new(max_bytes: u64, timeout_ms: u64) -> Self {
        Self {
            max_bytes,
            timeout_ms,
        }
    }

    /// The time budget, if one applies
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }

    fn exceeds_size(&self, len: u64) -> bool {
        self.max_bytes > 0 && len > self.max_bytes
    }
}

/// Downloads remote resource text
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch `url` as text within `limits`
    async fn fetch(&self, url: &Url, limits: FetchLimits) -> BundleResult<String>;
}

/// HTTP(S) fetcher built on a blocking `ureq` agent
#[derive(Debug, Clone, Default)]
pub struct HttpFetcher;

impl HttpFetcher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &Url, limits: FetchLimits) -> BundleResult<String> {
        let target = url.clone();
        let task = tokio::task::spawn_blocking(move || fetch_blocking(&target, limits));

        let joined = match limits.timeout() {
            Some(budget) => tokio::time::timeout(budget, task)
                .await
                .map_err(|_| timeout_error(url, limits))?,
            None => task.await,
        };

        joined.map_err(|e| BundleError::Internal(format!("fetch task failed: {}", e)))?
    }
}

fn fetch_blocking(url: &Url, limits: FetchLimits) -> BundleResult<String> {
    let started = Instant::now();

    let mut config = Agent::config_builder().http_status_as_error(true);
    if let Some(budget) = limits.timeout() {
        config = config.timeout_global(Some(budget));
    }
    let agent: Agent = config.build().into();

    let response = agent
        .get(url.as_str())
        .call()
        .map_err(|e| map_ureq_error(url, limits, e))?;

    let declared_len = response
        .headers()
        .get("content-length")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());
    if declared_len.is_some_and(|len| limits.exceeds_size(len)) {
        return Err(too_large_error(url, limits));
    }

    let mut reader = response.into_body().into_reader();
    let mut body = Vec::new();
    let mut chunk = [0u8; READ_CHUNK];

    loop {
        if limits.timeout().is_some_and(|budget| started.elapsed() >= budget) {
            return Err(timeout_error(url, limits));
        }

        let read = match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) if e.kind() == ErrorKind::TimedOut => return Err(timeout_error(url, limits)),
            Err(e) => {
                return Err(BundleError::FetchTransport {
                    url: url.to_string(),
                    reason: e.to_string(),
                })
            }
        };

        if limits.exceeds_size((body.len() + read) as u64) {
            return Err(too_large_error(url, limits));
        }
        body.extend_from_slice(&chunk[..read]);
    }

    String::from_utf8(body).map_err(|e| BundleError::FetchTransport {
        url: url.to_string(),
        reason: format!("response is not valid UTF-8: {}", e),
    })
}

fn map_ureq_error(url: &Url, limits: FetchLimits, error: ureq::Error) -> BundleError {
    match error {
        ureq::Error::Timeout(_) => timeout_error(url, limits),
        ureq::Error::Io(e) if e.kind() == ErrorKind::TimedOut => timeout_error(url, limits),
        ureq::Error::StatusCode(code) => BundleError::FetchTransport {
            url: url.to_string(),
            reason: format!("HTTP status {}", code),
        },
        other => BundleError::FetchTransport {
            url: url.to_string(),
            reason: other.to_string(),
        },
    }
}

fn timeout_error(url: &Url, limits: FetchLimits) -> BundleError {
    BundleError::FetchTimeout {
        url: url.to_string(),
        limit_ms: limits.timeout_ms,
    }
}

fn too_large_error(url: &Url, limits: FetchLimits) -> BundleError {
    BundleError::FetchTooLarge {
        url: url.to_string(),
        limit: limits.max_bytes,
    }
}
