//! Point-in-time snapshot of the aggregated profiles.

use std::collections::HashMap;

use thiserror::Error;

use super::aggregator::DAY_ANY;
use super::store::{StatsError, StatsStore};

/// Entries each map must hold before smart mode may run (7 x 24).
pub const REQUIRED_ENTRIES: usize = 7 * 24;

/// Key of a profile slot: `(day, hour)` with day in 1..=7 or -1.
pub type Slot = (i32, i32);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("do not have sufficient data! ({map}: {entries} of {required} entries)")]
pub struct IncompleteStats {
    pub map: &'static str,
    pub entries: usize,
    pub required: usize,
}

/// Speed and usage profiles keyed by `(day, hour)`.
///
/// Speeds are truncated to integers when loaded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsMatrix {
    speed: HashMap<Slot, i32>,
    usage: HashMap<Slot, i32>,
}

impl StatsMatrix {
    pub fn new(speed: HashMap<Slot, i32>, usage: HashMap<Slot, i32>) -> Self {
        Self { speed, usage }
    }

    /// Snapshot the current results table.
    pub fn load(store: &StatsStore) -> Result<Self, StatsError> {
        let mut matrix = Self::default();
        for row in store.dump()? {
            matrix
                .speed
                .insert((row.day, row.hour), row.conn_speed as i32);
            matrix.usage.insert((row.day, row.hour), row.activity as i32);
        }
        Ok(matrix)
    }

    /// A matrix with the same speed and usage in every slot, any-day included.
    pub fn uniform(speed: i32, usage: i32) -> Self {
        let mut matrix = Self::default();
        for hour in 0..24 {
            for day in (1..=7).chain(std::iter::once(DAY_ANY)) {
                matrix.speed.insert((day, hour), speed);
                matrix.usage.insert((day, hour), usage);
            }
        }
        matrix
    }

    pub fn set_speed(&mut self, day: i32, hour: i32, speed: i32) {
        self.speed.insert((day, hour), speed);
    }

    pub fn set_usage(&mut self, day: i32, hour: i32, usage: i32) {
        self.usage.insert((day, hour), usage);
    }

    pub fn speed(&self, day: i32, hour: i32) -> Option<i32> {
        self.speed.get(&(day, hour)).copied()
    }

    pub fn usage(&self, day: i32, hour: i32) -> Option<i32> {
        self.usage.get(&(day, hour)).copied()
    }

    pub fn speed_entries(&self) -> usize {
        self.speed.len()
    }

    pub fn usage_entries(&self) -> usize {
        self.usage.len()
    }

    /// Fail unless both maps hold at least 7 x 24 entries.
    pub fn require_complete(&self) -> Result<(), IncompleteStats> {
        for (map, entries) in [
            ("statsConnection", self.speed.len()),
            ("statsUsage", self.usage.len()),
        ] {
            if entries < REQUIRED_ENTRIES {
                return Err(IncompleteStats {
                    map,
                    entries,
                    required: REQUIRED_ENTRIES,
                });
            }
        }
        Ok(())
    }
}
