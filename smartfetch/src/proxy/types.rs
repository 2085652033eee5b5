//! Proxy contract types.

use std::io;

use thiserror::Error;

use crate::codec::CodecError;
use crate::link::LinkClass;
use crate::resource::{Resource, ResourceUri, Status};

/// Query parameter carrying the link class.
pub const PARAM_LINK: &str = "c";

/// Query parameter carrying the quality the fetch will be stored at.
pub const PARAM_QUALITY: &str = "q";

/// Query parameter carrying the newest cached timestamp (0 if none).
pub const PARAM_TIMESTAMP: &str = "ts";

/// Parameters sent with every conditional fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchParams {
    pub link: LinkClass,
    pub quality: Status,
    pub since_ms: i64,
}

impl FetchParams {
    pub fn new(link: LinkClass, since_ms: i64) -> Self {
        Self {
            link,
            quality: link.expected_quality(),
            since_ms,
        }
    }

    /// The `c`, `q` and `ts` query pairs, in that order.
    pub fn query_pairs(&self) -> [(&'static str, String); 3] {
        [
            (PARAM_LINK, self.link.wire().to_string()),
            (PARAM_QUALITY, self.quality.as_i32().to_string()),
            (PARAM_TIMESTAMP, self.since_ms.to_string()),
        ]
    }
}

/// Result of a fetch that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The payload was replaced; `bytes` were read.
    Updated { bytes: u64 },
    /// The origin has nothing newer; the resource is untouched.
    NotModified,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("bad response: did not get HTTP/OK, but {0}")]
    Status(String),

    #[error("invalid authority {authority}: {reason}")]
    InvalidAuthority { authority: String, reason: String },

    #[error("request to {url} timed out after {timeout_secs}s")]
    Timeout { url: String, timeout_secs: u64 },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("I/O error while storing payload: {0}")]
    Io(#[from] io::Error),

    #[error("corrupt proxy descriptor: {0}")]
    Descriptor(#[from] CodecError),
}

/// Receives byte-level progress of a running fetch.
///
/// `bytes_total` and `bytes_per_second` are -1 when unknown.
pub trait ProgressListener: Send + Sync {
    fn on_progress(
        &self,
        uri: &ResourceUri,
        bytes_read: u64,
        bytes_total: i64,
        bytes_per_second: i64,
    );
}

/// A listener that drops every update.
pub struct NoProgress;

impl ProgressListener for NoProgress {
    fn on_progress(&self, _: &ResourceUri, _: u64, _: i64, _: i64) {}
}

/// Loads resources from a remote origin.
pub trait ResourceProxy: Send {
    /// Conditionally fetch `r`, replacing its payload on success.
    fn do_load(
        &mut self,
        r: &mut Resource,
        params: &FetchParams,
        progress: &dyn ProgressListener,
    ) -> Result<FetchOutcome, FetchError>;
}

/// Builds one proxy per worker.
pub trait ProxyFactory: Send + Sync {
    fn create_proxy(&self) -> Result<Box<dyn ResourceProxy>, FetchError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_follow_link_quality() {
        let params = FetchParams::new(LinkClass::Wifi, 42);
        assert_eq!(params.quality, Status::Best);
        let pairs = params.query_pairs();
        assert_eq!(pairs[0], ("c", "64".to_string()));
        assert_eq!(pairs[1], ("q", "300".to_string()));
        assert_eq!(pairs[2], ("ts", "42".to_string()));
    }

    #[test]
    fn test_status_error_carries_response_line() {
        let err = FetchError::Status("503 Service Unavailable".into());
        assert!(err.to_string().contains("503 Service Unavailable"));
    }
}
