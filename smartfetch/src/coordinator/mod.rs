//! Update coordinator.
//!
//! Runs one wakeup for one manager in either mode:
//!
//! - **Now**: every registered resource is fetched by 3 workers.
//! - **Smart**: the stats matrix must be complete, the decision engine
//!   filters and orders the registered resources, and 2 workers fetch
//!   the accepted ones.
//!
//! # Architecture
//!
//! ```text
//!                  ┌──────────────────────┐
//!                  │   UpdateCoordinator  │
//!                  └──────────┬───────────┘
//!       ┌──────────────┬──────┴───────┬───────────────┐
//!       ▼              ▼              ▼               ▼
//! ┌───────────┐ ┌────────────┐ ┌─────────────┐ ┌────────────┐
//! │ Registry  │ │ StatsMatrix│ │DecisionEngine│ │ WorkerPool │
//! │ (queue)   │ │ (snapshot) │ │ (smart only) │ │ cache+proxy│
//! └───────────┘ └────────────┘ └─────────────┘ └────────────┘
//! ```
//!
//! A wakeup that fails (no link, low battery, incomplete statistics,
//! cache or registry errors) emits one `Error` event without a URI. The
//! cache is closed on every exit path.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::cache::{CacheError, CacheProvider, CacheSpec};
use crate::clock::Clock;
use crate::config::{StorageLayout, UpdateSettings};
use crate::engine::{CacheSnapshot, DecisionContext, DecisionEngine, EngineConfig, EngineError};
use crate::events::{EventSink, ManagerEvents};
use crate::link::LinkClass;
use crate::proxy::{FetchError, ProxyFactory};
use crate::registry::{RegistryError, ResourceRegistry};
use crate::resource::Resource;
use crate::sensors::{LinkSensor, PowerSensor};
use crate::stats::{IncompleteStats, StatsError, StatsMatrix, StatsStore};
use crate::worker::{PoolReport, WorkerError, WorkerPool};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Stats(#[from] StatsError),

    #[error(transparent)]
    Incomplete(#[from] IncompleteStats),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Worker(#[from] WorkerError),

    #[error(transparent)]
    Proxy(#[from] FetchError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateMode {
    Now,
    Smart,
}

impl fmt::Display for UpdateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateMode::Now => f.write_str("now"),
            UpdateMode::Smart => f.write_str("smart"),
        }
    }
}

/// Outcome of one wakeup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateReport {
    pub mode: UpdateMode,
    pub manager: String,
    /// Registered resources.
    pub considered: usize,
    /// Resources handed to the workers.
    pub selected: usize,
    pub updated: usize,
    pub not_modified: usize,
    pub failed: usize,
    pub duration_ms: u64,
}

impl UpdateReport {
    fn new(mode: UpdateMode, manager: &str, considered: usize, selected: usize) -> Self {
        Self {
            mode,
            manager: manager.to_string(),
            considered,
            selected,
            updated: 0,
            not_modified: 0,
            failed: 0,
            duration_ms: 0,
        }
    }

    fn absorb(&mut self, pool: PoolReport) {
        self.updated = pool.updated;
        self.not_modified = pool.not_modified;
        self.failed = pool.failed;
    }
}

impl fmt::Display for UpdateReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} update of '{}': {}/{} selected, {} updated, {} not modified, {} failed in {}ms",
            self.mode,
            self.manager,
            self.selected,
            self.considered,
            self.updated,
            self.not_modified,
            self.failed,
            self.duration_ms
        )
    }
}

/// Everything a wakeup needs from its host.
#[derive(Clone)]
pub struct SyncContext {
    pub clock: Arc<dyn Clock>,
    pub link: Arc<dyn LinkSensor>,
    pub power: Arc<dyn PowerSensor>,
    pub stats: Arc<StatsStore>,
    pub registry: Arc<ResourceRegistry>,
    pub layout: StorageLayout,
    pub engine: EngineConfig,
    pub update: UpdateSettings,
    pub events: Arc<dyn EventSink>,
}

pub struct UpdateCoordinator {
    ctx: SyncContext,
    cancel: CancellationToken,
}

impl UpdateCoordinator {
    pub fn new(ctx: SyncContext) -> Self {
        Self {
            ctx,
            cancel: CancellationToken::new(),
        }
    }

    /// Workers stop picking new resources once `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn context(&self) -> &SyncContext {
        &self.ctx
    }

    /// Fetch every registered resource of `manager`.
    pub fn update_now(
        &self,
        manager: &str,
        cache: &CacheSpec,
        proxies: &dyn ProxyFactory,
    ) -> Result<UpdateReport, SyncError> {
        self.wakeup(UpdateMode::Now, manager, cache, proxies)
    }

    /// Fetch the resources the decision engine accepts.
    pub fn update_smart(
        &self,
        manager: &str,
        cache: &CacheSpec,
        proxies: &dyn ProxyFactory,
    ) -> Result<UpdateReport, SyncError> {
        self.wakeup(UpdateMode::Smart, manager, cache, proxies)
    }

    fn wakeup(
        &self,
        mode: UpdateMode,
        manager: &str,
        spec: &CacheSpec,
        proxies: &dyn ProxyFactory,
    ) -> Result<UpdateReport, SyncError> {
        let start = Instant::now();
        let events = ManagerEvents::new(manager, self.ctx.events.as_ref());
        debug!(manager, %mode, cache = %spec, "Wakeup started");

        let result = spec
            .open(&self.ctx.layout, self.ctx.clock.clone())
            .map_err(SyncError::from)
            .and_then(|provider| {
                let cache = Mutex::new(provider);
                let result = self.run(mode, manager, &cache, proxies, events);
                let mut provider = cache.into_inner();
                if let Err(e) = provider.close() {
                    error!(manager, error = %e, "Failed to close cache");
                }
                result
            });

        match result {
            Ok(mut report) => {
                report.duration_ms = start.elapsed().as_millis() as u64;
                info!(%report, "Wakeup finished");
                Ok(report)
            }
            Err(e) => {
                error!(manager, %mode, error = %e, "Wakeup failed");
                events.error(None, e.to_string());
                Err(e)
            }
        }
    }

    fn run(
        &self,
        mode: UpdateMode,
        manager: &str,
        cache: &Mutex<Box<dyn CacheProvider>>,
        proxies: &dyn ProxyFactory,
        events: ManagerEvents<'_>,
    ) -> Result<UpdateReport, SyncError> {
        let staging = self.ctx.layout.staging_dir();
        let resources: Vec<Resource> = self
            .ctx
            .registry
            .resources(manager)?
            .iter()
            .map(|m| m.to_resource(&staging))
            .collect();
        let considered = resources.len();
        let link = self.ctx.link.current_link();

        let (queue, workers) = match mode {
            UpdateMode::Now => (resources, self.ctx.update.now_workers),
            UpdateMode::Smart => {
                let selected = self.select(link, resources, cache)?;
                (selected, self.ctx.update.smart_workers)
            }
        };

        let mut report = UpdateReport::new(mode, manager, considered, queue.len());
        if queue.is_empty() {
            debug!(manager, %mode, "Nothing to update");
            return Ok(report);
        }

        let pool = WorkerPool::new(workers)
            .with_pause(self.pause())
            .with_cancellation(self.cancel.clone());
        report.absorb(pool.run(queue, link, cache, proxies, events)?);
        Ok(report)
    }

    /// Smart-mode filtering: stats check, pre-check, scoring.
    fn select(
        &self,
        link: LinkClass,
        resources: Vec<Resource>,
        cache: &Mutex<Box<dyn CacheProvider>>,
    ) -> Result<Vec<Resource>, SyncError> {
        let matrix = StatsMatrix::load(&self.ctx.stats)?;
        matrix.require_complete()?;

        let decision = DecisionContext::new(
            link,
            self.ctx.power.power_state(),
            self.ctx.clock.as_ref(),
        );
        let engine = DecisionEngine::new(self.ctx.engine);
        engine.precheck(&decision)?;

        let mut candidates = Vec::with_capacity(resources.len());
        {
            let cache = cache.lock();
            for r in resources {
                let snapshot = CacheSnapshot {
                    status: cache.caching_status(r.uri())?,
                    timestamp: cache.timestamp(r.uri())?,
                    outdated: cache.is_outdated(r.uri())?,
                };
                candidates.push((r, snapshot));
            }
        }

        let before = candidates.len();
        let selected = engine.evaluate(&decision, &matrix, candidates)?;
        debug!(before, after = selected.len(), "Decision engine filtered resources");
        Ok(selected)
    }

    fn pause(&self) -> Duration {
        self.ctx.update.post_fetch_pause()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{FixedClock, SECOND_MS};
    use crate::config::ConfigFile;
    use crate::events::{RecordingSink, SyncEvent};
    use crate::proxy::{HttpProxyFactory, MockTransport, ProxySpec};
    use crate::resource::{ResourceConfig, ResourceUri};
    use crate::sensors::{PowerState, StaticLinkSensor, StaticPowerSensor};
    use crate::stats::StatsAggregator;
    use tempfile::TempDir;

    // Wednesday 2024-01-10 14:00 UTC.
    const NOW: i64 = 1_704_895_200_000;

    struct Harness {
        _dir: TempDir,
        clock: Arc<FixedClock>,
        link: Arc<StaticLinkSensor>,
        power: Arc<StaticPowerSensor>,
        sink: Arc<RecordingSink>,
        coordinator: UpdateCoordinator,
    }

    impl Harness {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let clock = Arc::new(FixedClock::new(NOW));
            let link = Arc::new(StaticLinkSensor::new(LinkClass::Wifi));
            let power = Arc::new(StaticPowerSensor::new(PowerState {
                connected: true,
                low: false,
            }));
            let sink = Arc::new(RecordingSink::new());
            let mut update = ConfigFile::default().update;
            update.post_fetch_pause_ms = 0;
            update.smart_workers = 1;

            let ctx = SyncContext {
                clock: clock.clone(),
                link: link.clone(),
                power: power.clone(),
                stats: Arc::new(StatsStore::open_in_memory(clock.clone()).unwrap()),
                registry: Arc::new(ResourceRegistry::open_in_memory().unwrap()),
                layout: StorageLayout::new(dir.path()),
                engine: EngineConfig::default(),
                update,
                events: sink.clone(),
            };
            Self {
                _dir: dir,
                clock,
                link,
                power,
                sink,
                coordinator: UpdateCoordinator::new(ctx),
            }
        }

        fn register(&self, uri: &str, priority: i32) {
            let config = ResourceConfig::new(priority, 60 * SECOND_MS, 3600 * SECOND_MS, false);
            self.coordinator
                .context()
                .registry
                .register("news", &ResourceUri::new(uri).unwrap(), &config, false)
                .unwrap();
        }

        fn fill_stats(&self) {
            StatsAggregator::new(self.coordinator.context().stats.clone())
                .rebuild()
                .unwrap();
        }

        fn proxies(&self, responses: Vec<Result<(u16, Vec<u8>), String>>) -> (Arc<MockTransport>, HttpProxyFactory) {
            let transport = Arc::new(MockTransport::new(responses));
            let factory = HttpProxyFactory::new(
                ProxySpec::http("http://origin.example").unwrap(),
                transport.clone(),
                self.clock.clone(),
            );
            (transport, factory)
        }

        fn uri_less_errors(&self) -> usize {
            self.sink
                .events()
                .iter()
                .filter(|e| matches!(e, SyncEvent::Error { uri: None, .. }))
                .count()
        }
    }

    fn record() -> CacheSpec {
        CacheSpec::record("news").unwrap()
    }

    #[test]
    fn test_update_now_ignores_missing_stats() {
        let h = Harness::new();
        h.register("/a", 0);
        h.register("/b", 0);
        let (transport, proxies) = h.proxies(vec![Ok((200, b"A".to_vec())), Ok((200, b"B".to_vec()))]);

        let report = h.coordinator.update_now("news", &record(), &proxies).unwrap();

        assert_eq!(report.mode, UpdateMode::Now);
        assert_eq!((report.considered, report.selected, report.updated), (2, 2, 2));
        assert_eq!(transport.requests.lock().len(), 2);
        assert_eq!(h.sink.terminal_events().len(), 2);

        let cache = record().open(&h.coordinator.context().layout, h.clock.clone()).unwrap();
        assert_eq!(cache.timestamp(&ResourceUri::new("/a").unwrap()).unwrap(), NOW);
    }

    #[test]
    fn test_smart_fails_on_incomplete_stats() {
        let h = Harness::new();
        h.register("/a", 0);
        let (transport, proxies) = h.proxies(vec![]);

        let err = h
            .coordinator
            .update_smart("news", &record(), &proxies)
            .unwrap_err();

        assert!(matches!(err, SyncError::Incomplete(_)));
        assert!(err.to_string().contains("do not have sufficient data"));
        assert!(transport.requests.lock().is_empty());
        assert_eq!(h.uri_less_errors(), 1);
    }

    #[test]
    fn test_smart_fails_on_low_battery() {
        let h = Harness::new();
        h.fill_stats();
        h.register("/a", 0);
        h.power.set(PowerState {
            connected: false,
            low: true,
        });
        let (transport, proxies) = h.proxies(vec![]);

        let err = h
            .coordinator
            .update_smart("news", &record(), &proxies)
            .unwrap_err();

        assert!(matches!(err, SyncError::Engine(EngineError::PowerLow)));
        assert!(transport.requests.lock().is_empty());
        assert_eq!(h.sink.events().len(), 1);
        assert_eq!(h.uri_less_errors(), 1);
    }

    #[test]
    fn test_smart_fails_without_link() {
        let h = Harness::new();
        h.fill_stats();
        h.register("/a", 0);
        h.link.set(LinkClass::None);
        let (_, proxies) = h.proxies(vec![]);

        let err = h
            .coordinator
            .update_smart("news", &record(), &proxies)
            .unwrap_err();
        assert!(matches!(err, SyncError::Engine(EngineError::NoConnection)));
        assert_eq!(h.uri_less_errors(), 1);
    }

    #[test]
    fn test_smart_fetches_in_priority_order() {
        let h = Harness::new();
        h.fill_stats();
        h.register("/late", 5);
        h.register("/early", 1);
        let (transport, proxies) = h.proxies(vec![Ok((200, b"1".to_vec())), Ok((200, b"2".to_vec()))]);

        let report = h
            .coordinator
            .update_smart("news", &record(), &proxies)
            .unwrap();

        assert_eq!(report.selected, 2);
        assert_eq!(report.updated, 2);
        let paths: Vec<String> = transport
            .requests
            .lock()
            .iter()
            .map(|r| r.url.path().to_string())
            .collect();
        assert_eq!(paths, vec!["/early", "/late"]);
        assert_eq!(h.uri_less_errors(), 0);
    }

    #[test]
    fn test_unknown_manager_is_a_no_op() {
        let h = Harness::new();
        let (_, proxies) = h.proxies(vec![]);
        let report = h.coordinator.update_now("weather", &record(), &proxies).unwrap();
        assert_eq!(report.considered, 0);
        assert!(h.sink.events().is_empty());
        assert!(report.to_string().starts_with("now update of 'weather'"));
    }
}
