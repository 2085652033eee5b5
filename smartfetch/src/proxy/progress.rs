//! Rate-limited progress reporting for a single fetch.

use std::sync::Arc;

use super::types::ProgressListener;
use crate::clock::Clock;
use crate::resource::ResourceUri;

/// Minimum spacing between two progress emissions.
pub const PROGRESS_INTERVAL_MS: i64 = 250;

/// Throttles progress updates and derives the transfer rate.
///
/// The rate is computed from the bytes and time elapsed since the last
/// emitted update, and is -1 for the first one.
pub struct ProgressTracker<'a> {
    uri: &'a ResourceUri,
    listener: &'a dyn ProgressListener,
    clock: Arc<dyn Clock>,
    bytes_total: i64,
    no_update_before: i64,
    last_emit: Option<(i64, u64)>,
}

impl<'a> ProgressTracker<'a> {
    pub fn new(
        uri: &'a ResourceUri,
        listener: &'a dyn ProgressListener,
        clock: Arc<dyn Clock>,
        bytes_total: Option<u64>,
    ) -> Self {
        Self {
            uri,
            listener,
            clock,
            bytes_total: bytes_total.map_or(-1, |n| i64::try_from(n).unwrap_or(-1)),
            no_update_before: i64::MIN,
            last_emit: None,
        }
    }

    /// Report `bytes_read`; dropped if the last emission was too recent
    /// unless `force` is set.
    pub fn report(&mut self, bytes_read: u64, force: bool) {
        let now = self.clock.now_ms();
        if !force && now < self.no_update_before {
            return;
        }
        self.no_update_before = now + PROGRESS_INTERVAL_MS;

        let rate = match self.last_emit {
            Some((at, bytes)) if now > at => {
                (1000 * (bytes_read as i64 - bytes as i64)) / (now - at)
            }
            Some(_) => 0,
            None => -1,
        };
        self.last_emit = Some((now, bytes_read));
        self.listener
            .on_progress(self.uri, bytes_read, self.bytes_total, rate);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<(u64, i64, i64)>>);

    impl ProgressListener for Recorder {
        fn on_progress(&self, _: &ResourceUri, read: u64, total: i64, rate: i64) {
            self.0.lock().push((read, total, rate));
        }
    }

    #[test]
    fn test_updates_are_throttled() {
        let clock = Arc::new(FixedClock::new(10_000));
        let uri = ResourceUri::new("/a").unwrap();
        let recorder = Recorder::default();
        let mut tracker = ProgressTracker::new(&uri, &recorder, clock.clone(), Some(8192));

        tracker.report(0, false);
        tracker.report(4096, false);
        clock.advance(PROGRESS_INTERVAL_MS);
        tracker.report(8192, false);

        let seen = recorder.0.lock().clone();
        assert_eq!(seen, vec![(0, 8192, -1), (8192, 8192, 32768)]);
    }

    #[test]
    fn test_forced_update_is_always_emitted() {
        let clock = Arc::new(FixedClock::new(10_000));
        let uri = ResourceUri::new("/a").unwrap();
        let recorder = Recorder::default();
        let mut tracker = ProgressTracker::new(&uri, &recorder, clock, None);

        tracker.report(0, false);
        tracker.report(100, true);

        let seen = recorder.0.lock().clone();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1], (100, -1, 0));
    }
}
