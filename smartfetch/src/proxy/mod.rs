//! Network proxies.
//!
//! A [`ResourceProxy`] performs one conditional fetch per call. The
//! default [`HttpResourceProxy`] issues a GET to
//! `authority + uri?c=<link>&q=<quality>&ts=<last timestamp>` with an
//! `If-Modified-Since` header, treats `304` as [`FetchOutcome::NotModified`]
//! and streams `200` bodies into the resource payload in 4 KiB chunks.
//!
//! Proxies are described by a [`ProxySpec`] so that another process can
//! rebuild them; workers obtain their own instance from a [`ProxyFactory`].
//!
//! # Example
//!
//! ```
//! use smartfetch::proxy::{ProxyMethod, ProxySpec};
//!
//! let spec = ProxySpec::http("http://origin.example/").unwrap();
//! assert_eq!(spec.method(), ProxyMethod::Http);
//! let back = ProxySpec::from_parts(spec.method().wire(), spec.extra()).unwrap();
//! assert_eq!(back, spec);
//! ```

mod http;
mod progress;
mod spec;
mod transport;
mod types;

pub use http::{if_modified_since, HttpResourceProxy, CHUNK_SIZE};
pub use progress::{ProgressTracker, PROGRESS_INTERVAL_MS};
pub use spec::{HttpProxyFactory, ProxyMethod, ProxySpec};
pub use transport::{
    HttpRequest, HttpResponse, HttpTransport, ReqwestTransport, DEFAULT_TIMEOUT_SECS,
};
#[cfg(test)]
pub(crate) use transport::tests::MockTransport;
pub use types::{
    FetchError, FetchOutcome, FetchParams, NoProgress, ProgressListener, ProxyFactory,
    ResourceProxy, PARAM_LINK, PARAM_QUALITY, PARAM_TIMESTAMP,
};
