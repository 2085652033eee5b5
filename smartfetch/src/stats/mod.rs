//! Telemetry log and hour-of-week profiles.
//!
//! # Architecture
//!
//! ```text
//! TelemetryCollector --tick--> StatsStore (raw tables)
//!                                  |
//!                     StatsAggregator::rebuild (one transaction)
//!                                  v
//!                      StatsStore (results table)
//!                                  |
//!                       StatsMatrix::load (snapshot)
//!                                  v
//!                           decision engine
//! ```
//!
//! The results table is rebuilt in full whenever its newest row is older
//! than six hours; readers see either the previous or the new matrix.

mod aggregator;
mod collector;
mod matrix;
mod store;

pub use aggregator::{RebuildReport, StatsAggregator, DAY_ANY, RAW_RETENTION_MS, REBUILD_AFTER_MS};
pub use collector::TelemetryCollector;
pub use matrix::{IncompleteStats, Slot, StatsMatrix, REQUIRED_ENTRIES};
pub use store::{LinkSample, StatsError, StatsRow, StatsStore};
