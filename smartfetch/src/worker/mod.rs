//! Concurrent update workers.
//!
//! A pool drains a shared queue of resources with `N` threads. Each item
//! goes through the same chain:
//!
//! ```text
//! pop (queue lock) -> read ts, store UPDATING marker (cache lock)
//!     -> conditional fetch (no lock) -> store fetched candidate (cache lock)
//!     -> Updated | Error event
//! ```
//!
//! Every popped resource produces exactly one `Updated` or `Error` event.
//! A `304` still yields `Updated` so listeners re-read the cache.

use std::collections::VecDeque;
use std::fmt;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::CacheProvider;
use crate::events::ManagerEvents;
use crate::link::LinkClass;
use crate::proxy::{FetchError, FetchOutcome, FetchParams, ProxyFactory, ResourceProxy};
use crate::resource::{Resource, Status};

/// Pause after each item, keeping event delivery ordered on slow hosts.
pub const DEFAULT_POST_FETCH_PAUSE: Duration = Duration::from_millis(200);

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("No connection available!")]
    NoConnection,

    #[error("cannot create proxy: {0}")]
    Proxy(#[source] FetchError),

    #[error("update worker panicked")]
    Panicked,
}

/// Tally of one pool run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolReport {
    pub processed: usize,
    pub updated: usize,
    pub not_modified: usize,
    pub failed: usize,
}

impl PoolReport {
    fn merge(&mut self, other: PoolReport) {
        self.processed += other.processed;
        self.updated += other.updated;
        self.not_modified += other.not_modified;
        self.failed += other.failed;
    }
}

impl fmt::Display for PoolReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} processed: {} updated, {} not modified, {} failed",
            self.processed, self.updated, self.not_modified, self.failed
        )
    }
}

/// Worker pool settings.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    workers: usize,
    pause: Duration,
    cancel: CancellationToken,
}

impl WorkerPool {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
            pause: DEFAULT_POST_FETCH_PAUSE,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    /// Stop picking new items once `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Drain `queue` front to back and wait for all workers.
    ///
    /// Per-resource failures become `Error` events; only setup failures
    /// (no link, proxy construction) and panics are returned.
    pub fn run(
        &self,
        queue: Vec<Resource>,
        link: LinkClass,
        cache: &Mutex<Box<dyn CacheProvider>>,
        proxies: &dyn ProxyFactory,
        events: ManagerEvents<'_>,
    ) -> Result<PoolReport, WorkerError> {
        if link == LinkClass::None {
            return Err(WorkerError::NoConnection);
        }
        let total = queue.len();
        let queue = Mutex::new(VecDeque::from(queue));
        let workers = self.workers.min(total.max(1));
        debug!(workers, queued = total, link = %link, "Starting update workers");

        let results: Vec<Result<PoolReport, WorkerError>> = thread::scope(|s| {
            let handles: Vec<_> = (0..workers)
                .map(|index| {
                    let queue = &queue;
                    s.spawn(move || self.work(index, queue, link, cache, proxies, events))
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap_or(Err(WorkerError::Panicked)))
                .collect()
        });

        let mut report = PoolReport::default();
        let mut first_error = None;
        for result in results {
            match result {
                Ok(tally) => report.merge(tally),
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }
        info!(manager = events.manager(), %report, "Update workers finished");
        Ok(report)
    }

    fn work(
        &self,
        index: usize,
        queue: &Mutex<VecDeque<Resource>>,
        link: LinkClass,
        cache: &Mutex<Box<dyn CacheProvider>>,
        proxies: &dyn ProxyFactory,
        events: ManagerEvents<'_>,
    ) -> Result<PoolReport, WorkerError> {
        let mut proxy = proxies.create_proxy().map_err(WorkerError::Proxy)?;
        let mut tally = PoolReport::default();
        debug!(worker = index, "Update worker started");

        loop {
            if self.cancel.is_cancelled() {
                debug!(worker = index, "Update worker cancelled");
                break;
            }
            let Some(mut r) = queue.lock().pop_front() else {
                break;
            };
            tally.processed += 1;

            match update_one(&mut r, link, cache, proxy.as_mut(), events) {
                Ok(FetchOutcome::Updated { .. }) => tally.updated += 1,
                Ok(FetchOutcome::NotModified) => tally.not_modified += 1,
                Err(message) => {
                    warn!(worker = index, uri = %r.uri(), error = %message, "Update failed");
                    events.error(Some(r.uri()), message);
                    tally.failed += 1;
                    continue;
                }
            }
            events.updated(r.uri());

            if !self.pause.is_zero() {
                thread::sleep(self.pause);
            }
        }

        debug!(worker = index, processed = tally.processed, "Update worker finished");
        Ok(tally)
    }
}

/// Fetch one resource and store the result. Errors are rendered messages.
fn update_one(
    r: &mut Resource,
    link: LinkClass,
    cache: &Mutex<Box<dyn CacheProvider>>,
    proxy: &mut dyn ResourceProxy,
    events: ManagerEvents<'_>,
) -> Result<FetchOutcome, String> {
    let since = {
        let cache = cache.lock();
        let since = cache.timestamp(r.uri()).map_err(|e| e.to_string())?;
        r.set_status(Status::Updating);
        cache.cache(r).map_err(|e| e.to_string())?;
        since
    };

    let params = FetchParams::new(link, since);
    let outcome = proxy
        .do_load(r, &params, &events)
        .map_err(|e| e.to_string())?;

    match outcome {
        FetchOutcome::Updated { bytes } => {
            r.set_status(params.quality);
            let stored = cache.lock().cache(r).map_err(|e| e.to_string())?;
            debug!(uri = %r.uri(), bytes, stored, quality = %params.quality, "Fetched resource");
        }
        FetchOutcome::NotModified => {
            debug!(uri = %r.uri(), "Resource not modified");
        }
    }
    Ok(outcome)
}
