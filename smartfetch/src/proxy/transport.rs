//! HTTP transport abstraction for testability.

use std::io::Read;
use std::time::Duration;

use url::Url;

use super::types::FetchError;

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// A conditional GET.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: Url,
    /// Pre-formatted `If-Modified-Since` value.
    pub if_modified_since: Option<String>,
}

/// Status line plus a streaming body.
pub struct HttpResponse {
    pub status: u16,
    pub reason: String,
    pub content_length: Option<u64>,
    pub body: Box<dyn Read + Send>,
}

impl HttpResponse {
    /// `"<code> <reason>"`, as carried by status errors.
    pub fn status_line(&self) -> String {
        format!("{} {}", self.status, self.reason)
    }
}

impl std::fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .field("reason", &self.reason)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Trait for HTTP transport operations.
///
/// Lets proxies run against scripted responses in tests.
pub trait HttpTransport: Send + Sync {
    fn get(&self, request: &HttpRequest) -> Result<HttpResponse, FetchError>;
}

/// Blocking transport backed by reqwest.
pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
    timeout: Duration,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, FetchError> {
        Self::with_timeout(DEFAULT_TIMEOUT_SECS)
    }

    pub fn with_timeout(timeout_secs: u64) -> Result<Self, FetchError> {
        let timeout = Duration::from_secs(timeout_secs);
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Transport(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self { client, timeout })
    }
}

impl HttpTransport for ReqwestTransport {
    fn get(&self, request: &HttpRequest) -> Result<HttpResponse, FetchError> {
        let mut builder = self.client.get(request.url.clone());
        if let Some(since) = &request.if_modified_since {
            builder = builder.header(reqwest::header::IF_MODIFIED_SINCE, since);
        }

        let response = builder.send().map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout {
                    url: request.url.to_string(),
                    timeout_secs: self.timeout.as_secs(),
                }
            } else {
                FetchError::Transport(format!("request failed: {}", e))
            }
        })?;

        let status = response.status();
        Ok(HttpResponse {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or("").to_string(),
            content_length: response.content_length(),
            body: Box::new(response),
        })
    }
}
