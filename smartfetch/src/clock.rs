//! Wall-clock and calendar access.
//!
//! Every component that needs "now" takes an `Arc<dyn Clock>` instead of
//! reading the system time directly. This keeps the decision engine, the
//! caches and the statistics aggregator deterministic under test and lets
//! a host replay recorded telemetry at an arbitrary point in time.
//!
//! # Calendar
//!
//! Day of week and hour of day are derived from `now_ms()` on every call,
//! so switching a fixed time on or off is reflected immediately.
//! Days are numbered `1 = Sunday ..= 7 = Saturday`.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Datelike, FixedOffset, Local, Offset, TimeZone, Timelike, Utc};

/// One second in milliseconds.
pub const SECOND_MS: i64 = 1000;

/// One minute in milliseconds.
pub const MINUTE_MS: i64 = 60 * SECOND_MS;

/// One hour in milliseconds.
pub const HOUR_MS: i64 = 60 * MINUTE_MS;

/// One day in milliseconds.
pub const DAY_MS: i64 = 24 * HOUR_MS;

/// Sentinel stored while no fixed time is active.
const NO_FIXED_TIME: i64 = i64::MIN;

/// Source of wall-clock time and the calendar derived from it.
pub trait Clock: Send + Sync {
    /// Milliseconds since the UNIX epoch.
    fn now_ms(&self) -> i64;

    /// Offset used to derive the local calendar.
    fn utc_offset(&self) -> FixedOffset;

    /// Day of week for `now_ms()`, from 1 (Sunday) to 7 (Saturday).
    fn day_of_week(&self) -> u8 {
        calendar_slot(self.now_ms(), self.utc_offset()).0
    }

    /// Hour of day for `now_ms()`, from 0 to 23.
    fn hour_of_day(&self) -> u8 {
        calendar_slot(self.now_ms(), self.utc_offset()).1
    }
}

/// Derive `(day_of_week, hour_of_day)` for an epoch timestamp.
pub fn calendar_slot(epoch_ms: i64, offset: FixedOffset) -> (u8, u8) {
    let utc = DateTime::<Utc>::from_timestamp_millis(epoch_ms).unwrap_or_default();
    let local = utc.with_timezone(&offset);
    (
        local.weekday().number_from_sunday() as u8,
        local.hour() as u8,
    )
}

/// Local offset in effect at `epoch_ms`, following DST changes.
pub fn local_offset_at(epoch_ms: i64) -> FixedOffset {
    let utc = DateTime::<Utc>::from_timestamp_millis(epoch_ms).unwrap_or_default();
    Local.offset_from_utc_datetime(&utc.naive_utc()).fix()
}

/// System clock with an optional fixed-time override.
///
/// While a fixed time is set, `now_ms()` returns it verbatim; clearing it
/// returns to the real system time.
#[derive(Debug)]
pub struct SystemClock {
    fixed: AtomicI64,
    /// `None` follows the host's local timezone.
    offset: Option<FixedOffset>,
}

impl SystemClock {
    /// System time in the host's local timezone.
    pub fn new() -> Self {
        Self {
            fixed: AtomicI64::new(NO_FIXED_TIME),
            offset: None,
        }
    }

    /// System time interpreted in the given timezone.
    pub fn with_offset(offset: FixedOffset) -> Self {
        Self {
            fixed: AtomicI64::new(NO_FIXED_TIME),
            offset: Some(offset),
        }
    }

    /// A clock frozen at `epoch_ms`, calendar in UTC.
    pub fn fixed_utc(epoch_ms: i64) -> Self {
        let clock = Self::with_offset(Utc.fix());
        clock.set_fixed_time(epoch_ms);
        clock
    }

    /// Freeze the clock at `epoch_ms`.
    pub fn set_fixed_time(&self, epoch_ms: i64) {
        self.fixed.store(epoch_ms, Ordering::SeqCst);
    }

    /// Return to the real system time.
    pub fn clear_fixed_time(&self) {
        self.fixed.store(NO_FIXED_TIME, Ordering::SeqCst);
    }

    /// The active fixed time, if any.
    pub fn fixed_time(&self) -> Option<i64> {
        match self.fixed.load(Ordering::SeqCst) {
            NO_FIXED_TIME => None,
            t => Some(t),
        }
    }

    /// Move a fixed clock forward by `delta_ms`. No-op on a running clock.
    pub fn advance(&self, delta_ms: i64) {
        let _ = self
            .fixed
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |t| {
                (t != NO_FIXED_TIME).then(|| t + delta_ms)
            });
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        match self.fixed_time() {
            Some(t) => t,
            None => Utc::now().timestamp_millis(),
        }
    }

    fn utc_offset(&self) -> FixedOffset {
        self.offset
            .unwrap_or_else(|| local_offset_at(self.now_ms()))
    }
}

/// Frozen clock for tests and replay.
#[derive(Debug)]
pub struct FixedClock {
    now: AtomicI64,
    offset: FixedOffset,
}

impl FixedClock {
    /// A clock frozen at `epoch_ms`, calendar in UTC.
    pub fn new(epoch_ms: i64) -> Self {
        Self::with_offset(epoch_ms, Utc.fix())
    }

    pub fn with_offset(epoch_ms: i64, offset: FixedOffset) -> Self {
        Self {
            now: AtomicI64::new(epoch_ms),
            offset,
        }
    }

    pub fn set(&self, epoch_ms: i64) {
        self.now.store(epoch_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, delta_ms: i64) {
        self.now.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now_ms(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }

    fn utc_offset(&self) -> FixedOffset {
        self.offset
    }
}
