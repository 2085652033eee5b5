//! Conditional HTTP GET proxy.

use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::debug;
use url::Url;

use super::progress::ProgressTracker;
use super::transport::{HttpRequest, HttpResponse, HttpTransport};
use super::types::{FetchError, FetchOutcome, FetchParams, ProgressListener, ResourceProxy};
use crate::clock::Clock;
use crate::resource::{Payload, Resource, ResourceUri, SMALL_RESOURCE_WARN_BYTES};

/// Streaming chunk size (4 KiB).
pub const CHUNK_SIZE: usize = 4 * 1024;

const HTTP_DATE: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Format `since_ms` as an `If-Modified-Since` value, or `None` for 0.
pub fn if_modified_since(since_ms: i64) -> Option<String> {
    if since_ms <= 0 {
        return None;
    }
    DateTime::<Utc>::from_timestamp_millis(since_ms).map(|t| t.format(HTTP_DATE).to_string())
}

/// Parse `authority` and require the given scheme.
pub(crate) fn parse_authority(authority: &str, scheme: &str) -> Result<Url, FetchError> {
    let url = Url::parse(authority).map_err(|e| FetchError::InvalidAuthority {
        authority: authority.to_string(),
        reason: e.to_string(),
    })?;
    if !url.scheme().eq_ignore_ascii_case(scheme) {
        return Err(FetchError::InvalidAuthority {
            authority: authority.to_string(),
            reason: format!(
                "the authority must have the scheme \"{}\" but it has \"{}\"",
                scheme,
                url.scheme()
            ),
        });
    }
    Ok(url)
}

/// Fetches resources from `authority + uri?c=..&q=..&ts=..`.
///
/// 304 leaves the resource untouched, 200 streams the body into its
/// payload and any other status is a [`FetchError::Status`].
pub struct HttpResourceProxy {
    authority: Url,
    transport: Arc<dyn HttpTransport>,
    clock: Arc<dyn Clock>,
}

impl HttpResourceProxy {
    /// Proxy for an `http://` authority.
    pub fn new(
        authority: &str,
        transport: Arc<dyn HttpTransport>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, FetchError> {
        Ok(Self {
            authority: parse_authority(authority, "http")?,
            transport,
            clock,
        })
    }

    /// Proxy for an `https://` authority.
    pub fn https(
        authority: &str,
        transport: Arc<dyn HttpTransport>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, FetchError> {
        Ok(Self {
            authority: parse_authority(authority, "https")?,
            transport,
            clock,
        })
    }

    pub fn authority(&self) -> &Url {
        &self.authority
    }

    pub fn build_url(&self, uri: &ResourceUri, params: &FetchParams) -> Url {
        let mut url = self.authority.clone();
        url.set_path(uri.as_str());
        url.query_pairs_mut().extend_pairs(params.query_pairs());
        url
    }

    fn store_body(
        &self,
        r: &mut Resource,
        mut response: HttpResponse,
        progress: &dyn ProgressListener,
    ) -> Result<u64, FetchError> {
        let uri = r.uri().clone();
        let mut tracker =
            ProgressTracker::new(&uri, progress, self.clock.clone(), response.content_length);
        tracker.report(0, false);

        let target: Option<(PathBuf, PathBuf)> = match r.payload() {
            Payload::File(body) => Some((body.path().to_path_buf(), body.part_path())),
            Payload::Memory(_) => None,
        };

        match target {
            Some((path, part)) => {
                if let Some(parent) = part.parent() {
                    fs::create_dir_all(parent)?;
                }
                let result = File::create(&part).map_err(FetchError::from).and_then(|file| {
                    let mut writer = BufWriter::new(file);
                    let n = copy_chunks(&mut response.body, &mut writer, &mut tracker)?;
                    writer.flush()?;
                    Ok(n)
                });
                match result {
                    Ok(n) => {
                        fs::rename(&part, &path)?;
                        Ok(n)
                    }
                    Err(e) => {
                        let _ = fs::remove_file(&part);
                        Err(e)
                    }
                }
            }
            None => {
                // Content-Length is only a hint; the body may be shorter or a lie.
                let capacity = response
                    .content_length
                    .map_or(0, |n| n.min(SMALL_RESOURCE_WARN_BYTES as u64) as usize);
                let mut buf = Vec::with_capacity(capacity);
                let n = copy_chunks(&mut response.body, &mut buf, &mut tracker)?;
                r.set_data(buf)?;
                Ok(n)
            }
        }
    }
}

/// Copy `body` into `sink` in 4 KiB chunks, then force a final report.
fn copy_chunks(
    body: &mut dyn Read,
    sink: &mut dyn Write,
    tracker: &mut ProgressTracker<'_>,
) -> Result<u64, FetchError> {
    let mut chunk = [0u8; CHUNK_SIZE];
    let mut total = 0u64;
    loop {
        let n = match body.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(FetchError::Transport(format!("read error: {}", e))),
        };
        sink.write_all(&chunk[..n])?;
        total += n as u64;
        tracker.report(total, false);
    }
    tracker.report(total, true);
    Ok(total)
}

impl ResourceProxy for HttpResourceProxy {
    fn do_load(
        &mut self,
        r: &mut Resource,
        params: &FetchParams,
        progress: &dyn ProgressListener,
    ) -> Result<FetchOutcome, FetchError> {
        let start = Instant::now();
        let request = HttpRequest {
            url: self.build_url(r.uri(), params),
            if_modified_since: if_modified_since(params.since_ms),
        };
        debug!(url = %request.url, "Loading resource");

        let response = self.transport.get(&request)?;
        match response.status {
            304 => {
                debug!(uri = %r.uri(), "Not modified");
                Ok(FetchOutcome::NotModified)
            }
            200 => {
                let bytes = self.store_body(r, response, progress)?;
                debug!(
                    uri = %r.uri(),
                    bytes,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Loaded resource"
                );
                Ok(FetchOutcome::Updated { bytes })
            }
            _ => Err(FetchError::Status(response.status_line())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::link::LinkClass;
    use crate::proxy::transport::tests::MockTransport;
    use crate::proxy::types::NoProgress;
    use parking_lot::Mutex;
    use tempfile::TempDir;

    fn proxy(responses: Vec<Result<(u16, Vec<u8>), String>>) -> (HttpResourceProxy, Arc<MockTransport>) {
        let transport = Arc::new(MockTransport::new(responses));
        let proxy = HttpResourceProxy::new(
            "http://origin.example:8080/ignored",
            transport.clone(),
            Arc::new(FixedClock::new(0)),
        )
        .unwrap();
        (proxy, transport)
    }

    #[test]
    fn test_if_modified_since_format() {
        assert_eq!(if_modified_since(0), None);
        assert_eq!(
            if_modified_since(784_111_777_000).as_deref(),
            Some("Sun, 06 Nov 1994 08:49:37 GMT")
        );
    }

    #[test]
    fn test_url_carries_path_and_params() {
        let (proxy, _) = proxy(vec![]);
        let uri = ResourceUri::new("/news/today").unwrap();
        let url = proxy.build_url(&uri, &FetchParams::new(LinkClass::MobileSlow, 5));
        assert_eq!(
            url.as_str(),
            "http://origin.example:8080/news/today?c=32&q=1&ts=5"
        );
    }

    #[test]
    fn test_ok_replaces_memory_payload() {
        let body = vec![7u8; CHUNK_SIZE * 2 + 10];
        let (mut proxy, transport) = proxy(vec![Ok((200, body.clone()))]);
        let mut r = Resource::small("/a").unwrap();

        let outcome = proxy
            .do_load(&mut r, &FetchParams::new(LinkClass::Wifi, 0), &NoProgress)
            .unwrap();

        assert_eq!(outcome, FetchOutcome::Updated { bytes: body.len() as u64 });
        assert_eq!(r.read_payload().unwrap(), body);
        assert_eq!(transport.requests.lock()[0].if_modified_since, None);
    }

    #[test]
    fn test_not_modified_leaves_payload() {
        let (mut proxy, transport) = proxy(vec![Ok((304, vec![]))]);
        let mut r = Resource::small("/a").unwrap();
        r.set_data(b"old".to_vec()).unwrap();

        let outcome = proxy
            .do_load(&mut r, &FetchParams::new(LinkClass::Wifi, 1_000), &NoProgress)
            .unwrap();

        assert_eq!(outcome, FetchOutcome::NotModified);
        assert_eq!(r.read_payload().unwrap(), b"old");
        assert!(transport.requests.lock()[0].if_modified_since.is_some());
    }

    #[test]
    fn test_other_status_is_error() {
        let (mut proxy, _) = proxy(vec![Ok((404, vec![]))]);
        let mut r = Resource::small("/a").unwrap();
        let err = proxy
            .do_load(&mut r, &FetchParams::new(LinkClass::Wifi, 0), &NoProgress)
            .unwrap_err();
        assert!(matches!(err, FetchError::Status(line) if line == "404 Not Found"));
    }

    #[test]
    fn test_oversized_content_length_is_only_a_hint() {
        struct ClaimsHuge;
        impl HttpTransport for ClaimsHuge {
            fn get(&self, _: &HttpRequest) -> Result<HttpResponse, FetchError> {
                Ok(HttpResponse {
                    status: 200,
                    reason: "OK".to_string(),
                    content_length: Some(u64::MAX),
                    body: Box::new(io::Cursor::new(b"tiny".to_vec())),
                })
            }
        }

        let mut proxy = HttpResourceProxy::new(
            "http://origin.example",
            Arc::new(ClaimsHuge),
            Arc::new(FixedClock::new(0)),
        )
        .unwrap();
        let mut r = Resource::small("/lie").unwrap();

        let outcome = proxy
            .do_load(&mut r, &FetchParams::new(LinkClass::Wifi, 0), &NoProgress)
            .unwrap();

        assert_eq!(outcome, FetchOutcome::Updated { bytes: 4 });
        assert_eq!(r.read_payload().unwrap(), b"tiny");
    }

    #[test]
    fn test_big_resource_streams_to_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("big/body.bin");
        let body = vec![3u8; 10_000];
        let (mut proxy, _) = proxy(vec![Ok((200, body.clone()))]);
        let mut r = Resource::big("/big", &path).unwrap();

        proxy
            .do_load(&mut r, &FetchParams::new(LinkClass::Wifi, 0), &NoProgress)
            .unwrap();

        assert_eq!(fs::read(&path).unwrap(), body);
        assert!(!dir.path().join("big/body.bin.part").exists());
    }

    #[test]
    fn test_final_progress_is_forced() {
        #[derive(Default)]
        struct Last(Mutex<Vec<(u64, i64)>>);
        impl ProgressListener for Last {
            fn on_progress(&self, _: &ResourceUri, read: u64, total: i64, _: i64) {
                self.0.lock().push((read, total));
            }
        }

        let (mut proxy, _) = proxy(vec![Ok((200, vec![1u8; 9000]))]);
        let mut r = Resource::small("/a").unwrap();
        let listener = Last::default();
        proxy
            .do_load(&mut r, &FetchParams::new(LinkClass::Wifi, 0), &listener)
            .unwrap();

        let seen = listener.0.lock().clone();
        assert_eq!(seen.first(), Some(&(0, 9000)));
        assert_eq!(seen.last(), Some(&(9000, 9000)));
        // Frozen clock: only the first and the forced final update get through.
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn test_scheme_is_enforced() {
        let transport: Arc<dyn HttpTransport> = Arc::new(MockTransport::new(vec![]));
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(0));
        assert!(matches!(
            HttpResourceProxy::new("https://a.example", transport.clone(), clock.clone()),
            Err(FetchError::InvalidAuthority { .. })
        ));
        assert!(HttpResourceProxy::https("https://a.example", transport.clone(), clock.clone()).is_ok());
        assert!(HttpResourceProxy::new("not a url", transport, clock).is_err());
    }
}
