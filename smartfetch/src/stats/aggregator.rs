//! Rolls the raw telemetry log into day x hour profiles.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use super::store::{self, StatsError, StatsRow, StatsStore};
use crate::clock::{DAY_MS, HOUR_MS};

/// Day value of the any-day rows.
pub const DAY_ANY: i32 = -1;

/// Results older than this trigger a rebuild.
pub const REBUILD_AFTER_MS: i64 = 6 * HOUR_MS;

/// Raw rows older than this are purged on rebuild.
pub const RAW_RETENTION_MS: i64 = 14 * DAY_MS;

/// Outcome of one rebuild.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebuildReport {
    pub rows_written: usize,
    pub raw_purged: usize,
    pub duration_ms: u64,
}

pub struct StatsAggregator {
    store: Arc<StatsStore>,
}

impl StatsAggregator {
    pub fn new(store: Arc<StatsStore>) -> Self {
        Self { store }
    }

    /// True if there are no results or the newest is older than 6 hours.
    pub fn should_rebuild(&self) -> Result<bool, StatsError> {
        let now = self.store.clock().now_ms();
        Ok(match self.store.newest_result_time()? {
            None => true,
            Some(time) => time < now - REBUILD_AFTER_MS,
        })
    }

    /// Rebuild if stale. Returns the report when a rebuild ran.
    pub fn process(&self) -> Result<Option<RebuildReport>, StatsError> {
        if self.should_rebuild()? {
            self.rebuild().map(Some)
        } else {
            Ok(None)
        }
    }

    /// Replace the whole results table and purge old raw rows, atomically.
    pub fn rebuild(&self) -> Result<RebuildReport, StatsError> {
        let start = Instant::now();
        let now = self.store.clock().now_ms();
        debug!("Rebuilding statistics from raw telemetry");

        let mut report = self.store.transaction(|tx| {
            let mut report = RebuildReport::default();
            store::clear_results(tx)?;

            for hour in 0..24 {
                let mut speed_total = 0.0;
                let mut display_total = 0.0;
                let mut activity_total = 0i64;

                for day in 1..=7 {
                    let samples = store::link_samples(tx, day, hour)?;
                    let n = samples.len() as f64;
                    let (speed, display) = if samples.is_empty() {
                        (1.0, 0.0)
                    } else {
                        let speed: f64 = samples.iter().map(|s| s.link.speed_factor()).sum();
                        let shown = samples.iter().filter(|s| s.screen_on).count() as f64;
                        (speed / n, shown / n)
                    };
                    let activity = store::app_in_use_count(tx, day, hour)?;

                    store::insert_result(
                        tx,
                        &StatsRow {
                            time: now,
                            day,
                            hour,
                            conn_speed: speed,
                            display,
                            activity,
                        },
                    )?;
                    report.rows_written += 1;

                    speed_total += speed;
                    display_total += display;
                    activity_total += activity;
                }

                store::insert_result(
                    tx,
                    &StatsRow {
                        time: now,
                        day: DAY_ANY,
                        hour,
                        conn_speed: speed_total / 7.0,
                        display: display_total / 7.0,
                        activity: activity_total / 7,
                    },
                )?;
                report.rows_written += 1;
            }

            let (raw1, raw2) = store::purge_raw(tx, now - RAW_RETENTION_MS)?;
            report.raw_purged = raw1 + raw2;
            Ok(report)
        })?;

        report.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            rows = report.rows_written,
            purged = report.raw_purged,
            duration_ms = report.duration_ms,
            "Statistics rebuilt"
        );
        Ok(report)
    }
}
