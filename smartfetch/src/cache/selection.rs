//! Candidate selection rules shared by both backends.
//!
//! Backends load the metadata of every candidate for a URI and delegate
//! the decisions here, so that admission, best-candidate selection and
//! maintenance behave identically regardless of where the bytes live.

use crate::resource::{ResourceConfig, Status};

/// Metadata of one stored candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CandidateMeta {
    pub status: Status,
    pub timestamp: i64,
    pub expire: i64,
    pub config: ResourceConfig,
}

impl CandidateMeta {
    pub fn new(status: Status, timestamp: i64, config: ResourceConfig) -> Self {
        Self {
            status,
            timestamp,
            expire: timestamp.saturating_add(config.cache_lifespan_ms()),
            config,
        }
    }

    /// Visible to queries at `now`.
    pub fn is_live(&self, now: i64) -> bool {
        self.expire >= now
    }

    /// Still inside its update interval at `now`.
    pub fn is_fresh(&self, now: i64) -> bool {
        now - self.timestamp < self.config.update_interval_ms()
    }

    /// True if `self` should be preferred over `other`.
    fn beats(&self, other: &CandidateMeta) -> bool {
        (self.status, self.timestamp) > (other.status, other.timestamp)
    }
}

/// Whether a new candidate with `incoming` status may be written at `now`.
pub fn admits(candidates: &[CandidateMeta], incoming: Status, now: i64) -> bool {
    candidates
        .iter()
        .filter(|c| c.is_live(now))
        .all(|c| c.timestamp <= now && c.status <= incoming)
}

/// Index of the best live candidate: highest status, then newest timestamp.
///
/// On a full tie the earliest stored candidate wins.
pub fn best(candidates: &[CandidateMeta], now: i64) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, c) in candidates.iter().enumerate() {
        if !c.is_live(now) {
            continue;
        }
        match best {
            Some(b) if !c.beats(&candidates[b]) => {}
            _ => best = Some(i),
        }
    }
    best
}

pub fn best_status(candidates: &[CandidateMeta], now: i64) -> Status {
    best(candidates, now)
        .map(|i| candidates[i].status)
        .unwrap_or(Status::NotAvailable)
}

pub fn best_timestamp(candidates: &[CandidateMeta], now: i64) -> i64 {
    best(candidates, now)
        .map(|i| candidates[i].timestamp)
        .unwrap_or(0)
}

/// True iff no live candidate is fresh (vacuously true when empty).
pub fn is_outdated(candidates: &[CandidateMeta], now: i64) -> bool {
    !candidates
        .iter()
        .any(|c| c.is_live(now) && c.is_fresh(now))
}

/// Indices to delete in a maintenance pass: every expired candidate plus
/// every live candidate other than the best one.
pub fn superseded(candidates: &[CandidateMeta], now: i64) -> Vec<usize> {
    let keep = best(candidates, now);
    (0..candidates.len())
        .filter(|&i| Some(i) != keep)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_000_000;

    fn config() -> ResourceConfig {
        ResourceConfig::new(0, 60_000, 3_600_000, false)
    }

    fn cand(status: Status, age: i64) -> CandidateMeta {
        CandidateMeta::new(status, NOW - age, config())
    }

    #[test]
    fn test_admits_skips_future_timestamp() {
        let stored = [cand(Status::Worst, -1)];
        assert!(!admits(&stored, Status::Best, NOW));
    }

    #[test]
    fn test_admits_skips_downgrade() {
        let stored = [cand(Status::Good, 10)];
        assert!(!admits(&stored, Status::Fair, NOW));
        assert!(admits(&stored, Status::Good, NOW));
        assert!(admits(&stored, Status::Best, NOW));
    }

    #[test]
    fn test_admits_ignores_expired() {
        let stored = [cand(Status::Best, 3_600_001)];
        assert!(!stored[0].is_live(NOW));
        assert!(admits(&stored, Status::Worst, NOW));
    }

    #[test]
    fn test_best_prefers_status_then_timestamp() {
        let stored = [
            cand(Status::Good, 100),
            cand(Status::Best, 500),
            cand(Status::Best, 200),
            cand(Status::Fair, 1),
        ];
        assert_eq!(best(&stored, NOW), Some(2));
        assert_eq!(best_status(&stored, NOW), Status::Best);
        assert_eq!(best_timestamp(&stored, NOW), NOW - 200);
    }

    #[test]
    fn test_best_on_empty_or_expired() {
        assert_eq!(best(&[], NOW), None);
        assert_eq!(best_status(&[], NOW), Status::NotAvailable);
        assert_eq!(best_timestamp(&[cand(Status::Best, 4_000_000)], NOW), 0);
    }

    #[test]
    fn test_is_outdated_requires_all_stale() {
        assert!(is_outdated(&[], NOW));
        assert!(is_outdated(&[cand(Status::Good, 60_000)], NOW));
        assert!(!is_outdated(
            &[cand(Status::Good, 60_000), cand(Status::Worst, 59_999)],
            NOW
        ));
    }

    #[test]
    fn test_superseded_keeps_only_best() {
        let stored = [
            cand(Status::Good, 100),
            cand(Status::Best, 4_000_000),
            cand(Status::Best, 200),
        ];
        assert_eq!(superseded(&stored, NOW), vec![0, 1]);
    }
}
