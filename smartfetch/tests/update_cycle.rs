//! End-to-end wakeups: registry, statistics, decision engine, workers,
//! HTTP proxy and cache wired together with a scripted origin.
//!
//! Run with: `cargo test --test update_cycle`

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;

use parking_lot::Mutex;
use tempfile::TempDir;

use smartfetch::cache::{CacheProvider, CacheSpec};
use smartfetch::clock::{Clock, FixedClock, SECOND_MS};
use smartfetch::config::{ConfigFile, StorageLayout};
use smartfetch::coordinator::{SyncContext, SyncError, UpdateCoordinator};
use smartfetch::engine::{EngineConfig, EngineError};
use smartfetch::events::{RecordingSink, SyncEvent};
use smartfetch::link::LinkClass;
use smartfetch::proxy::{
    FetchError, HttpProxyFactory, HttpRequest, HttpResponse, HttpTransport, ProxySpec,
};
use smartfetch::registry::ResourceRegistry;
use smartfetch::resource::{Resource, ResourceConfig, ResourceUri, Status};
use smartfetch::sensors::{PowerState, StaticLinkSensor, StaticPowerSensor};
use smartfetch::stats::{StatsAggregator, StatsRow, StatsStore};

// ============================================================================
// Helper Functions
// ============================================================================

// Wednesday 2024-01-10 14:00 UTC.
const NOW: i64 = 1_704_895_200_000;
const MANAGER: &str = "news";

/// Origin serving fixed bodies by path; `None` answers 304.
#[derive(Default)]
struct ScriptedOrigin {
    routes: HashMap<String, Option<Vec<u8>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedOrigin {
    fn serve(mut self, path: &str, body: Option<&[u8]>) -> Self {
        self.routes.insert(path.to_string(), body.map(|b| b.to_vec()));
        self
    }

    fn paths(&self) -> Vec<String> {
        self.requests
            .lock()
            .iter()
            .map(|r| r.url.path().to_string())
            .collect()
    }
}

impl HttpTransport for ScriptedOrigin {
    fn get(&self, request: &HttpRequest) -> Result<HttpResponse, FetchError> {
        self.requests.lock().push(request.clone());
        let (status, reason, body) = match self.routes.get(request.url.path()) {
            Some(Some(body)) => (200, "OK", body.clone()),
            Some(None) => (304, "Not Modified", Vec::new()),
            None => (404, "Not Found", Vec::new()),
        };
        Ok(HttpResponse {
            status,
            reason: reason.to_string(),
            content_length: Some(body.len() as u64),
            body: Box::new(Cursor::new(body)),
        })
    }
}

struct World {
    dir: TempDir,
    clock: Arc<FixedClock>,
    link: Arc<StaticLinkSensor>,
    power: Arc<StaticPowerSensor>,
    stats: Arc<StatsStore>,
    registry: Arc<ResourceRegistry>,
    sink: Arc<RecordingSink>,
}

impl World {
    fn new() -> Self {
        let clock = Arc::new(FixedClock::new(NOW));
        Self {
            dir: TempDir::new().unwrap(),
            link: Arc::new(StaticLinkSensor::new(LinkClass::Wifi)),
            power: Arc::new(StaticPowerSensor::new(PowerState {
                connected: true,
                low: false,
            })),
            stats: Arc::new(StatsStore::open_in_memory(clock.clone()).unwrap()),
            registry: Arc::new(ResourceRegistry::open_in_memory().unwrap()),
            sink: Arc::new(RecordingSink::new()),
            clock,
        }
    }

    fn layout(&self) -> StorageLayout {
        StorageLayout::new(self.dir.path())
    }

    fn coordinator(&self) -> UpdateCoordinator {
        let mut update = ConfigFile::default().update;
        update.post_fetch_pause_ms = 0;
        UpdateCoordinator::new(SyncContext {
            clock: self.clock.clone(),
            link: self.link.clone(),
            power: self.power.clone(),
            stats: self.stats.clone(),
            registry: self.registry.clone(),
            layout: self.layout(),
            engine: EngineConfig::default(),
            update,
            events: self.sink.clone(),
        })
    }

    fn populate_stats(&self) {
        StatsAggregator::new(self.stats.clone()).rebuild().unwrap();
    }

    fn register(&self, path: &str, big: bool) {
        let config = ResourceConfig::new(0, 60 * SECOND_MS, 3600 * SECOND_MS, false);
        self.registry
            .register(MANAGER, &ResourceUri::new(path).unwrap(), &config, big)
            .unwrap();
    }

    fn open_cache(&self, spec: &CacheSpec) -> Box<dyn CacheProvider> {
        spec.open(&self.layout(), self.clock.clone()).unwrap()
    }

    /// Store a candidate `age_secs` before now.
    fn seed(&self, spec: &CacheSpec, path: &str, status: Status, age_secs: i64) {
        self.clock.set(NOW - age_secs * SECOND_MS);
        let mut cache = self.open_cache(spec);
        let mut r = Resource::small(path)
            .unwrap()
            .with_config(ResourceConfig::new(0, 60 * SECOND_MS, 3600 * SECOND_MS, false))
            .with_status(status);
        r.set_data(b"seeded".to_vec()).unwrap();
        assert!(cache.cache(&r).unwrap());
        cache.close().unwrap();
        self.clock.set(NOW);
    }

    fn proxies(&self, origin: Arc<ScriptedOrigin>) -> HttpProxyFactory {
        HttpProxyFactory::new(
            ProxySpec::http("http://origin.example").unwrap(),
            origin,
            self.clock.clone(),
        )
    }
}

fn record() -> CacheSpec {
    CacheSpec::record(MANAGER).unwrap()
}

fn terminal_uris(sink: &RecordingSink) -> Vec<Option<String>> {
    let mut uris: Vec<Option<String>> = sink
        .terminal_events()
        .iter()
        .map(|e| e.uri().map(str::to_string))
        .collect();
    uris.sort();
    uris
}

// ============================================================================
// Smart Mode
// ============================================================================

#[test]
fn outdated_resource_on_wifi_is_refreshed() {
    let world = World::new();
    world.populate_stats();
    world.register("/u", false);
    world.seed(&record(), "/u", Status::Good, 120);
    let origin = Arc::new(ScriptedOrigin::default().serve("/u", Some(b"fresh")));

    let report = world
        .coordinator()
        .update_smart(MANAGER, &record(), &world.proxies(origin.clone()))
        .unwrap();

    assert_eq!((report.selected, report.updated), (1, 1));
    assert_eq!(origin.paths(), vec!["/u"]);
    let request = &origin.requests.lock()[0];
    assert!(request.if_modified_since.is_some());
    assert!(request.url.query().unwrap().contains("q=300"));

    let cache = world.open_cache(&record());
    let uri = ResourceUri::new("/u").unwrap();
    assert_eq!(cache.caching_status(&uri).unwrap(), Status::Best);
    assert_eq!(cache.timestamp(&uri).unwrap(), NOW);
}

#[test]
fn fresh_resource_on_slow_link_is_left_alone() {
    let world = World::new();
    world.populate_stats();
    world.register("/u", false);
    world.seed(&record(), "/u", Status::Best, 10);
    world.link.set(LinkClass::MobileSlow);
    world.power.set(PowerState {
        connected: false,
        low: false,
    });
    let origin = Arc::new(ScriptedOrigin::default().serve("/u", Some(b"fresh")));

    let report = world
        .coordinator()
        .update_smart(MANAGER, &record(), &world.proxies(origin.clone()))
        .unwrap();

    assert_eq!((report.considered, report.selected), (1, 0));
    assert!(origin.paths().is_empty());
    assert!(world.sink.events().is_empty());
}

#[test]
fn low_battery_aborts_with_one_error() {
    let world = World::new();
    world.populate_stats();
    world.register("/u", false);
    world.power.set(PowerState {
        connected: false,
        low: true,
    });
    let origin = Arc::new(ScriptedOrigin::default());

    let err = world
        .coordinator()
        .update_smart(MANAGER, &record(), &world.proxies(origin.clone()))
        .unwrap_err();

    assert!(matches!(err, SyncError::Engine(EngineError::PowerLow)));
    assert!(origin.paths().is_empty());
    assert_eq!(terminal_uris(&world.sink), vec![None]);
}

#[test]
fn missing_link_aborts_with_one_error() {
    let world = World::new();
    world.populate_stats();
    world.register("/u", false);
    world.link.set(LinkClass::None);

    let err = world
        .coordinator()
        .update_smart(MANAGER, &record(), &world.proxies(Arc::new(ScriptedOrigin::default())))
        .unwrap_err();

    assert!(matches!(err, SyncError::Engine(EngineError::NoConnection)));
    assert_eq!(terminal_uris(&world.sink), vec![None]);
}

#[test]
fn partial_statistics_abort_smart_mode() {
    let world = World::new();
    world.register("/u", false);
    for day in 1..=7 {
        for hour in 0..24 {
            if (day * 24 + hour) % 5 == 0 {
                continue;
            }
            world
                .stats
                .insert_result(&StatsRow {
                    time: NOW,
                    day,
                    hour,
                    conn_speed: 1.0,
                    display: 0.0,
                    activity: 0,
                })
                .unwrap();
        }
    }

    let err = world
        .coordinator()
        .update_smart(MANAGER, &record(), &world.proxies(Arc::new(ScriptedOrigin::default())))
        .unwrap_err();

    assert!(matches!(err, SyncError::Incomplete(_)));
    let events = world.sink.events();
    assert_eq!(events.len(), 1);
    match &events[0] {
        SyncEvent::Error { message, uri, .. } => {
            assert!(uri.is_none());
            assert!(message.contains("do not have sufficient data"));
        }
        other => panic!("unexpected event {:?}", other),
    }
}

// ============================================================================
// Now Mode
// ============================================================================

#[test]
fn not_modified_keeps_timestamp_and_still_reports_updated() {
    let world = World::new();
    world.register("/u", false);
    world.seed(&record(), "/u", Status::Good, 300);
    let origin = Arc::new(ScriptedOrigin::default().serve("/u", None));

    let report = world
        .coordinator()
        .update_now(MANAGER, &record(), &world.proxies(origin.clone()))
        .unwrap();

    assert_eq!(report.not_modified, 1);
    let events = world.sink.terminal_events();
    assert_eq!(events.len(), 1);
    assert!(matches!(&events[0], SyncEvent::Updated { uri, .. } if uri == "/u"));

    let request = &origin.requests.lock()[0];
    let since = NOW - 300 * SECOND_MS;
    assert!(request.url.query().unwrap().ends_with(&format!("ts={}", since)));

    let cache = world.open_cache(&record());
    assert_eq!(cache.timestamp(&ResourceUri::new("/u").unwrap()).unwrap(), since);
}

#[test]
fn every_resource_gets_exactly_one_terminal_event() {
    let world = World::new();
    for path in ["/a", "/b", "/c", "/gone", "/d"] {
        world.register(path, false);
    }
    let origin = Arc::new(
        ScriptedOrigin::default()
            .serve("/a", Some(b"a"))
            .serve("/b", None)
            .serve("/c", Some(b"c"))
            .serve("/d", Some(b"d")),
    );

    let report = world
        .coordinator()
        .update_now(MANAGER, &record(), &world.proxies(origin))
        .unwrap();

    assert_eq!(report.selected, 5);
    assert_eq!(report.updated + report.not_modified + report.failed, 5);
    assert_eq!(report.failed, 1);
    assert_eq!(
        terminal_uris(&world.sink),
        ["/a", "/b", "/c", "/d", "/gone"]
            .iter()
            .map(|p| Some(p.to_string()))
            .collect::<Vec<_>>()
    );
}

#[test]
fn big_resource_lands_in_file_cache() {
    let world = World::new();
    world.register("/maps/tile.bin", true);
    let body = vec![7u8; 10_000];
    let origin = Arc::new(ScriptedOrigin::default().serve("/maps/tile.bin", Some(&body)));
    let files = CacheSpec::file(MANAGER).unwrap();

    world
        .coordinator()
        .update_now(MANAGER, &files, &world.proxies(origin))
        .unwrap();

    let progress = world
        .sink
        .events()
        .iter()
        .filter(|e| matches!(e, SyncEvent::Progress { .. }))
        .count();
    assert!(progress >= 1);

    let target = world.dir.path().join("tile.bin");
    let mut r = Resource::big("/maps/tile.bin", &target).unwrap();
    assert!(world.open_cache(&files).fill_resource(&mut r).unwrap());
    assert_eq!(std::fs::read(&target).unwrap(), body);
    assert_eq!(r.status(), LinkClass::Wifi.expected_quality());

    // Staged bodies are gone once the wakeup ends.
    let staging = world.layout().staging_dir().join(MANAGER);
    let leftovers = std::fs::read_dir(&staging)
        .map(|entries| entries.count())
        .unwrap_or(0);
    assert_eq!(leftovers, 0);
    assert_eq!(world.clock.now_ms(), NOW);
}
