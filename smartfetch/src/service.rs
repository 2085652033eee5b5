//! Host-facing facade.
//!
//! [`SyncService`] opens the stores under the configured data directory,
//! wires sensors and the event sink into a [`SyncContext`] and exposes
//! the control inputs:
//!
//! - `update_now(manager, cache_spec, proxy_spec)`
//! - `activate_smart(manager, period, cache_spec, proxy_spec)`
//! - `deactivate_smart(manager)`
//!
//! # Example
//!
//! ```ignore
//! let config = ConfigFile::load().unwrap_or_default();
//! let service = SyncService::open(&config, Sensors::default(), Arc::new(LogSink), handle)?;
//! service.registry().register("news", &uri, &ResourceConfig::default(), false)?;
//! let report = service.update_now("news", &CacheSpec::record("news")?, &proxy)?;
//! println!("{report}");
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tracing::info;

use crate::cache::{CacheProvider, CacheSpec};
use crate::clock::{Clock, SystemClock};
use crate::config::{ConfigFile, StorageLayout};
use crate::coordinator::{SyncContext, SyncError, UpdateCoordinator, UpdateReport};
use crate::events::EventSink;
use crate::link::LinkClass;
use crate::proxy::{HttpProxyFactory, ProxySpec};
use crate::registry::ResourceRegistry;
use crate::scheduler::SmartScheduler;
use crate::sensors::{
    LinkSensor, PowerSensor, PowerState, ScreenSensor, StaticLinkSensor, StaticPowerSensor,
    StaticScreenSensor,
};
use crate::stats::{StatsStore, TelemetryCollector};

/// Clock and device sensors supplied by the host.
#[derive(Clone)]
pub struct Sensors {
    pub clock: Arc<dyn Clock>,
    pub link: Arc<dyn LinkSensor>,
    pub power: Arc<dyn PowerSensor>,
    pub screen: Arc<dyn ScreenSensor>,
}

impl Sensors {
    /// System clock with explicitly supplied device state.
    pub fn fixed(link: LinkClass, power: PowerState, screen_on: bool) -> Self {
        Self {
            clock: Arc::new(SystemClock::new()),
            link: Arc::new(StaticLinkSensor::new(link)),
            power: Arc::new(StaticPowerSensor::new(power)),
            screen: Arc::new(StaticScreenSensor::new(screen_on)),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

impl Default for Sensors {
    /// Unknown link, charger connected, screen on.
    fn default() -> Self {
        Self::fixed(
            LinkClass::Unknown,
            PowerState {
                connected: true,
                low: false,
            },
            true,
        )
    }
}

pub struct SyncService {
    ctx: SyncContext,
    timeout_secs: u64,
    smart_period: Duration,
    telemetry_period: Duration,
    collector: Arc<TelemetryCollector>,
    scheduler: SmartScheduler,
}

impl SyncService {
    /// Open the stores under `config.storage.data_dir`.
    pub fn open(
        config: &ConfigFile,
        sensors: Sensors,
        events: Arc<dyn EventSink>,
        runtime: Handle,
    ) -> Result<Self, SyncError> {
        let layout = config.storage_layout();
        let stats = Arc::new(StatsStore::open(layout.stats_db(), sensors.clock.clone())?);
        let registry = Arc::new(ResourceRegistry::open(layout.registry_db())?);
        info!(data_dir = %layout.root().display(), "Sync service opened");
        Ok(Self::with_stores(config, sensors, events, runtime, layout, stats, registry))
    }

    /// Build on already opened stores.
    pub fn with_stores(
        config: &ConfigFile,
        sensors: Sensors,
        events: Arc<dyn EventSink>,
        runtime: Handle,
        layout: StorageLayout,
        stats: Arc<StatsStore>,
        registry: Arc<ResourceRegistry>,
    ) -> Self {
        let collector = Arc::new(TelemetryCollector::new(
            stats.clone(),
            sensors.link.clone(),
            sensors.screen.clone(),
        ));
        let ctx = SyncContext {
            clock: sensors.clock,
            link: sensors.link,
            power: sensors.power,
            stats,
            registry,
            layout,
            engine: config.engine,
            update: config.update.clone(),
            events,
        };
        Self {
            scheduler: SmartScheduler::new(ctx.clone(), runtime),
            ctx,
            timeout_secs: config.network.timeout_secs,
            smart_period: config.update.smart_period(),
            telemetry_period: config.telemetry.interval(),
            collector,
        }
    }

    /// One now-mode wakeup. Blocks until every resource was processed.
    pub fn update_now(
        &self,
        manager: &str,
        cache: &CacheSpec,
        proxy: &ProxySpec,
    ) -> Result<UpdateReport, SyncError> {
        let proxies = self.proxies(proxy)?;
        UpdateCoordinator::new(self.ctx.clone()).update_now(manager, cache, &proxies)
    }

    /// One smart-mode wakeup, outside any schedule.
    pub fn update_smart_once(
        &self,
        manager: &str,
        cache: &CacheSpec,
        proxy: &ProxySpec,
    ) -> Result<UpdateReport, SyncError> {
        let proxies = self.proxies(proxy)?;
        UpdateCoordinator::new(self.ctx.clone()).update_smart(manager, cache, &proxies)
    }

    /// Schedule smart wakeups; `period` defaults to the configured one.
    pub fn activate_smart(
        &self,
        manager: &str,
        period: Option<Duration>,
        cache: CacheSpec,
        proxy: &ProxySpec,
    ) -> Result<(), SyncError> {
        let proxies = Arc::new(self.proxies(proxy)?);
        self.scheduler.activate_smart(
            manager,
            period.unwrap_or(self.smart_period),
            cache,
            proxies,
        );
        Ok(())
    }

    pub fn deactivate_smart(&self, manager: &str) -> bool {
        self.scheduler.deactivate_smart(manager)
    }

    /// Start periodic telemetry sampling at the configured interval.
    pub fn start_telemetry(&self) {
        self.scheduler
            .start_telemetry(self.telemetry_period, self.collector.clone());
    }

    /// Stop all schedules.
    pub fn shutdown(&self) {
        self.scheduler.shutdown();
    }

    /// Open a cache for inspection or maintenance.
    pub fn open_cache(&self, cache: &CacheSpec) -> Result<Box<dyn CacheProvider>, SyncError> {
        Ok(cache.open(&self.ctx.layout, self.ctx.clock.clone())?)
    }

    pub fn context(&self) -> &SyncContext {
        &self.ctx
    }

    pub fn registry(&self) -> &ResourceRegistry {
        &self.ctx.registry
    }

    pub fn stats(&self) -> &Arc<StatsStore> {
        &self.ctx.stats
    }

    pub fn collector(&self) -> &TelemetryCollector {
        &self.collector
    }

    pub fn scheduler(&self) -> &SmartScheduler {
        &self.scheduler
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.ctx.layout
    }

    fn proxies(&self, proxy: &ProxySpec) -> Result<HttpProxyFactory, SyncError> {
        Ok(proxy.factory(self.timeout_secs, self.ctx.clock.clone())?)
    }
}
