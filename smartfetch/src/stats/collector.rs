//! Periodic telemetry sampling.

use std::sync::Arc;

use tracing::debug;

use super::aggregator::{RebuildReport, StatsAggregator};
use super::store::{StatsError, StatsStore};
use crate::sensors::{LinkSensor, ScreenSensor};

/// Records telemetry samples and keeps the profiles fresh.
pub struct TelemetryCollector {
    store: Arc<StatsStore>,
    aggregator: StatsAggregator,
    link: Arc<dyn LinkSensor>,
    screen: Arc<dyn ScreenSensor>,
}

impl TelemetryCollector {
    pub fn new(
        store: Arc<StatsStore>,
        link: Arc<dyn LinkSensor>,
        screen: Arc<dyn ScreenSensor>,
    ) -> Self {
        Self {
            aggregator: StatsAggregator::new(store.clone()),
            store,
            link,
            screen,
        }
    }

    pub fn store(&self) -> &Arc<StatsStore> {
        &self.store
    }

    /// Record one link/screen sample, then rebuild the profiles if stale.
    pub fn tick(&self) -> Result<Option<RebuildReport>, StatsError> {
        let link = self.link.current_link();
        let screen_on = self.screen.is_screen_on();
        self.store.insert_link_sample(link, screen_on)?;
        let rebuilt = self.aggregator.process()?;
        debug!(link = %link, screen_on, rebuilt = rebuilt.is_some(), "Telemetry tick");
        Ok(rebuilt)
    }

    /// Record that the hosting application is in use.
    pub fn mark_app_in_use(&self) -> Result<(), StatsError> {
        self.store.insert_app_in_use()
    }

    /// Rebuild the profiles regardless of their age.
    pub fn force_rebuild(&self) -> Result<RebuildReport, StatsError> {
        self.aggregator.rebuild()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{FixedClock, HOUR_MS};
    use crate::link::LinkClass;
    use crate::sensors::{StaticLinkSensor, StaticScreenSensor};

    #[test]
    fn test_tick_records_and_rebuilds_once() {
        let clock = Arc::new(FixedClock::new(1_704_585_600_000));
        let store = Arc::new(StatsStore::open_in_memory(clock.clone()).unwrap());
        let link = Arc::new(StaticLinkSensor::new(LinkClass::Wifi));
        let collector = TelemetryCollector::new(
            store.clone(),
            link.clone(),
            Arc::new(StaticScreenSensor::new(true)),
        );

        assert!(collector.tick().unwrap().is_some());
        link.set(LinkClass::MobileFast);
        clock.advance(HOUR_MS / 4);
        assert!(collector.tick().unwrap().is_none());
        collector.mark_app_in_use().unwrap();

        assert_eq!(store.raw_counts().unwrap(), (2, 1));
        let samples = store.link_samples(1, 0).unwrap();
        assert_eq!(samples[1].link, LinkClass::MobileFast);
    }
}
