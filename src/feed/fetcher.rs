use futures::StreamExt;
use reqwest::header::{ACCEPT, ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED};
use reqwest::StatusCode;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Upper bound on a single feed request, body included.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(15);
/// Concurrent requests allowed against one upstream host.
pub const DEFAULT_MAX_PER_HOST: usize = 5;

const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB
const ACCEPT_FEEDS: &str = "application/atom+xml, application/rss+xml, application/xml";

/// Errors that abort a poll cycle before any parsing happens.
///
/// None of these are fatal: the poll loop records the failure, backs off and
/// tries again.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response that is neither 2xx nor 304
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request exceeded the per-request timeout
    #[error("Request timed out")]
    Timeout,
    /// Response body exceeded the 10MB size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
}

/// Result of a conditional GET.
///
/// Validator tokens are `Some` only when the server sent the header; callers
/// keep their previous token otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// `304 Not Modified`: the cached copy is still current.
    NotModified {
        etag: Option<String>,
        last_modified: Option<String>,
    },
    /// `2xx` with a fresh body.
    Modified {
        body: Vec<u8>,
        etag: Option<String>,
        last_modified: Option<String>,
    },
}

/// HTTP client shared by every poll loop.
///
/// Cloning is cheap: the underlying `reqwest` connection pool and the per-host
/// semaphores are reference counted. Each upstream host gets its own
/// semaphore so one busy provider host cannot open more than `max_per_host`
/// simultaneous connections.
#[derive(Debug, Clone)]
pub struct FeedClient {
    http: reqwest::Client,
    timeout: Duration,
    max_per_host: usize,
    hosts: Arc<Mutex<HashMap<String, Arc<Semaphore>>>>,
}

impl FeedClient {
    /// Builds a client with the default 15s timeout and 5 connections per host.
    pub fn new() -> Result<Self, FetchError> {
        Self::with_limits(FETCH_TIMEOUT, DEFAULT_MAX_PER_HOST)
    }

    pub fn with_limits(timeout: Duration, max_per_host: usize) -> Result<Self, FetchError> {
        let max_per_host = max_per_host.max(1);
        let http = reqwest::Client::builder()
            .user_agent(concat!("statuswatch/", env!("CARGO_PKG_VERSION")))
            .pool_max_idle_per_host(max_per_host)
            .build()?;

        Ok(Self {
            http,
            timeout,
            max_per_host,
            hosts: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Semaphore guarding connections to the host (and port) of `url`.
    fn host_permits(&self, url: &str) -> Arc<Semaphore> {
        let key = match url::Url::parse(url) {
            Ok(parsed) => format!(
                "{}:{}",
                parsed.host_str().unwrap_or_default(),
                parsed.port_or_known_default().unwrap_or_default()
            ),
            Err(_) => url.to_string(),
        };

        let mut hosts = self.hosts.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(
            hosts
                .entry(key)
                .or_insert_with(|| Arc::new(Semaphore::new(self.max_per_host))),
        )
    }

    /// Performs a conditional GET of `url`.
    ///
    /// `If-None-Match` / `If-Modified-Since` are only sent for tokens that are
    /// present. Waiting for a per-host slot does not count against the
    /// request timeout.
    ///
    /// # Errors
    ///
    /// - [`FetchError::HttpStatus`] - any status other than 2xx or 304
    /// - [`FetchError::Timeout`] - the request or body read exceeded the timeout
    /// - [`FetchError::Network`] - connection, DNS or TLS failure
    /// - [`FetchError::ResponseTooLarge`] / [`FetchError::IncompleteResponse`]
    pub async fn fetch(
        &self,
        url: &str,
        etag: Option<&str>,
        last_modified: Option<&str>,
    ) -> Result<FetchOutcome, FetchError> {
        let permits = self.host_permits(url);
        // The semaphore is never closed, so acquisition only fails if that changes.
        let _permit: Option<OwnedSemaphorePermit> = permits.acquire_owned().await.ok();

        tokio::time::timeout(self.timeout, self.send(url, etag, last_modified))
            .await
            .map_err(|_| FetchError::Timeout)?
    }

    async fn send(
        &self,
        url: &str,
        etag: Option<&str>,
        last_modified: Option<&str>,
    ) -> Result<FetchOutcome, FetchError> {
        let mut request = self.http.get(url).header(ACCEPT, ACCEPT_FEEDS);
        if let Some(tag) = etag {
            request = request.header(IF_NONE_MATCH, tag);
        }
        if let Some(since) = last_modified {
            request = request.header(IF_MODIFIED_SINCE, since);
        }

        let response = request.send().await?;
        let status = response.status();

        let header = |name: reqwest::header::HeaderName| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned)
        };
        let etag = header(ETAG);
        let last_modified = header(LAST_MODIFIED);

        if status == StatusCode::NOT_MODIFIED {
            tracing::debug!(url = %url, "Feed not modified");
            return Ok(FetchOutcome::NotModified {
                etag,
                last_modified,
            });
        }

        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        let body = read_limited_bytes(response, MAX_FEED_SIZE).await?;
        tracing::debug!(url = %url, bytes = body.len(), "Feed fetched");

        Ok(FetchOutcome::Modified {
            body,
            etag,
            last_modified,
        })
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    if let Some(len) = expected_length {
        if len as usize > limit {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}
