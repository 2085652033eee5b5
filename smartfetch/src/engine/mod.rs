//! Rule-based refresh decision.
//!
//! The engine is a pure function of the decision context, a stats
//! snapshot and a cache snapshot per candidate. Every candidate starts at
//! [`SCORE_START`]; each rule adds a contribution and candidates reaching
//! [`SCORE_THRESHOLD`] are accepted. The accepted set is returned sorted
//! by ascending `priority` (stable, so equal priorities keep input order).
//!
//! | Rule            | Contribution                                        |
//! |-----------------|-----------------------------------------------------|
//! | power connected | `+500` if charging, else `-10`                      |
//! | link speed      | `+20 * speed(link)`                                 |
//! | outdated        | `+1000` if no candidate is inside its interval      |
//! | relative age    | `+150 * age / interval`, 0 if nothing is cached     |
//! | power low       | `-1000` if the battery is low                       |
//! | forecast        | `+100 * (speed(link) - forecast speed next hour)`   |
//! | usage           | `+80 * (calls next hour + 2 * calls this hour)`     |
//! | quality gain    | `+15 * max(0, expected quality - cached quality)`   |

use std::fmt;

use thiserror::Error;
use tracing::debug;

use crate::clock::Clock;
use crate::link::LinkClass;
use crate::resource::{Resource, Status};
use crate::sensors::PowerState;
use crate::stats::{StatsMatrix, DAY_ANY};

pub const SCORE_START: f64 = 200.0;
pub const SCORE_THRESHOLD: f64 = 1000.0;

const POWER_CONNECTED_BONUS: f64 = 500.0;
const POWER_CONNECTED_PENALTY: f64 = -10.0;
const CONNECTION_FACTOR: f64 = 20.0;
const OUTDATED_BONUS: f64 = 1000.0;
const RELATIVE_AGE_FACTOR: f64 = 150.0;
const POWER_LOW_PENALTY: f64 = -1000.0;
const FORECAST_FACTOR: f64 = 100.0;
const USAGE_FACTOR: f64 = 80.0;
const QUALITY_GAIN_FACTOR: f64 = 15.0;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("PRE-CHECK fail: No connection")]
    NoConnection,

    #[error("PRE-CHECK fail: Power low")]
    PowerLow,

    #[error("no {map} statistics for day {day}, hour {hour}")]
    MissingStats {
        map: &'static str,
        day: i32,
        hour: i32,
    },
}

/// Reference point of the relative-age rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RelativeAgeBasis {
    /// `age = now - stored timestamp`.
    #[default]
    SinceStored,
    /// `age = now - (stored timestamp - lifespan)`.
    LifespanShifted,
}

impl fmt::Display for RelativeAgeBasis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelativeAgeBasis::SinceStored => f.write_str("since_stored"),
            RelativeAgeBasis::LifespanShifted => f.write_str("lifespan_shifted"),
        }
    }
}

impl std::str::FromStr for RelativeAgeBasis {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "since_stored" => Ok(RelativeAgeBasis::SinceStored),
            "lifespan_shifted" => Ok(RelativeAgeBasis::LifespanShifted),
            other => Err(format!("unknown relative age basis '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EngineConfig {
    pub relative_age: RelativeAgeBasis,
}

/// Live context of one wakeup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecisionContext {
    pub link: LinkClass,
    pub power: PowerState,
    pub now_ms: i64,
    /// 1 (Sunday) ..= 7 (Saturday).
    pub day: i32,
    /// 0 ..= 23.
    pub hour: i32,
}

impl DecisionContext {
    pub fn new(link: LinkClass, power: PowerState, clock: &dyn Clock) -> Self {
        Self {
            link,
            power,
            now_ms: clock.now_ms(),
            day: clock.day_of_week() as i32,
            hour: clock.hour_of_day() as i32,
        }
    }

    /// The slot after this one; hour 23 of day 7 wraps to hour 0 of day 1.
    pub fn next_slot(&self) -> (i32, i32) {
        if self.hour >= 23 {
            (if self.day >= 7 { 1 } else { self.day + 1 }, 0)
        } else {
            (self.day, self.hour + 1)
        }
    }
}

/// What the cache knows about one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheSnapshot {
    pub status: Status,
    pub timestamp: i64,
    pub outdated: bool,
}

impl CacheSnapshot {
    pub const EMPTY: CacheSnapshot = CacheSnapshot {
        status: Status::NotAvailable,
        timestamp: 0,
        outdated: true,
    };
}

/// Per-rule contributions for one candidate.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScoreBreakdown {
    pub power_connected: f64,
    pub connection: f64,
    pub outdated: f64,
    pub relative_age: f64,
    pub power_low: f64,
    pub forecast: f64,
    pub usage: f64,
    /// Scored for every resource, whatever its `connection_decisive` flag.
    pub quality_gain: f64,
}

impl ScoreBreakdown {
    pub fn total(&self) -> f64 {
        SCORE_START
            + self.power_connected
            + self.connection
            + self.outdated
            + self.relative_age
            + self.power_low
            + self.forecast
            + self.usage
            + self.quality_gain
    }

    pub fn accepted(&self) -> bool {
        self.total() >= SCORE_THRESHOLD
    }
}

impl fmt::Display for ScoreBreakdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.1} (power {:+.0}, link {:+.1}, outdated {:+.0}, age {:+.1}, low {:+.0}, forecast {:+.1}, usage {:+.1}, quality {:+.0})",
            self.total(),
            self.power_connected,
            self.connection,
            self.outdated,
            self.relative_age,
            self.power_low,
            self.forecast,
            self.usage,
            self.quality_gain
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct DecisionEngine {
    config: EngineConfig,
}

impl DecisionEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Fail for no link, or for a low battery without a charger.
    pub fn precheck(&self, ctx: &DecisionContext) -> Result<(), EngineError> {
        if ctx.link == LinkClass::None {
            return Err(EngineError::NoConnection);
        }
        if ctx.power.connected {
            return Ok(());
        }
        if ctx.power.low {
            return Err(EngineError::PowerLow);
        }
        Ok(())
    }

    /// Filter and order the refresh set.
    pub fn evaluate(
        &self,
        ctx: &DecisionContext,
        stats: &StatsMatrix,
        candidates: Vec<(Resource, CacheSnapshot)>,
    ) -> Result<Vec<Resource>, EngineError> {
        self.precheck(ctx)?;

        let mut accepted = Vec::new();
        for (resource, snapshot) in candidates {
            let score = self.score(ctx, stats, &resource, &snapshot)?;
            debug!(
                uri = %resource.uri(),
                score = %score,
                accepted = score.accepted(),
                "Scored resource"
            );
            if score.accepted() {
                accepted.push(resource);
            }
        }
        accepted.sort_by_key(|r| r.config().priority());
        Ok(accepted)
    }

    pub fn score(
        &self,
        ctx: &DecisionContext,
        stats: &StatsMatrix,
        resource: &Resource,
        snapshot: &CacheSnapshot,
    ) -> Result<ScoreBreakdown, EngineError> {
        let current_speed = ctx.link.speed_factor();
        let config = resource.config();

        let relative_age = if snapshot.status > Status::NotAvailable {
            let reference = match self.config.relative_age {
                RelativeAgeBasis::SinceStored => snapshot.timestamp,
                RelativeAgeBasis::LifespanShifted => {
                    snapshot.timestamp - config.cache_lifespan_ms()
                }
            };
            let age = (ctx.now_ms - reference) as f64;
            RELATIVE_AGE_FACTOR * age / config.update_interval_ms() as f64
        } else {
            0.0
        };

        let gain = (ctx.link.expected_quality().as_i32() - snapshot.status.as_i32()) as f64;

        Ok(ScoreBreakdown {
            power_connected: if ctx.power.connected {
                POWER_CONNECTED_BONUS
            } else {
                POWER_CONNECTED_PENALTY
            },
            connection: CONNECTION_FACTOR * current_speed,
            outdated: if snapshot.outdated { OUTDATED_BONUS } else { 0.0 },
            relative_age,
            power_low: if ctx.power.low { POWER_LOW_PENALTY } else { 0.0 },
            forecast: FORECAST_FACTOR * (current_speed - forecast_speed(ctx, stats)?),
            usage: USAGE_FACTOR
                * (calls_next_hour(ctx, stats)? + 2.0 * calls_this_hour(ctx, stats)?),
            quality_gain: (QUALITY_GAIN_FACTOR * gain).max(0.0),
        })
    }
}

/// `(3 * value(day, hour) + value(ANY, hour)) / 4`.
fn blend(
    map: &'static str,
    lookup: impl Fn(i32, i32) -> Option<i32>,
    day: i32,
    hour: i32,
) -> Result<f64, EngineError> {
    let specific = lookup(day, hour).ok_or(EngineError::MissingStats { map, day, hour })?;
    let any = lookup(DAY_ANY, hour).ok_or(EngineError::MissingStats {
        map,
        day: DAY_ANY,
        hour,
    })?;
    Ok((3.0 * specific as f64 + any as f64) / 4.0)
}

fn calls_this_hour(ctx: &DecisionContext, stats: &StatsMatrix) -> Result<f64, EngineError> {
    blend("usage", |d, h| stats.usage(d, h), ctx.day, ctx.hour)
}

fn calls_next_hour(ctx: &DecisionContext, stats: &StatsMatrix) -> Result<f64, EngineError> {
    let (day, hour) = ctx.next_slot();
    blend("usage", |d, h| stats.usage(d, h), day, hour)
}

/// Speed factor of the link class expected next hour.
fn forecast_speed(ctx: &DecisionContext, stats: &StatsMatrix) -> Result<f64, EngineError> {
    let (day, hour) = ctx.next_slot();
    let average = blend("speed", |d, h| stats.speed(d, h), day, hour)?;
    Ok(LinkClass::nearest_real(average).speed_factor())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SECOND_MS;
    use crate::resource::ResourceConfig;

    const NOW: i64 = 1_704_585_600_000;

    fn ctx(link: LinkClass, connected: bool, low: bool) -> DecisionContext {
        DecisionContext {
            link,
            power: PowerState { connected, low },
            now_ms: NOW,
            day: 3,
            hour: 14,
        }
    }

    fn resource(path: &str, priority: i32) -> Resource {
        Resource::small(path).unwrap().with_config(ResourceConfig::new(
            priority,
            60 * SECOND_MS,
            3600 * SECOND_MS,
            false,
        ))
    }

    fn stored(status: Status, age_secs: i64, outdated: bool) -> CacheSnapshot {
        CacheSnapshot {
            status,
            timestamp: NOW - age_secs * SECOND_MS,
            outdated,
        }
    }

    #[test]
    fn test_precheck_order() {
        let engine = DecisionEngine::default();
        assert_eq!(
            engine.precheck(&ctx(LinkClass::None, true, false)),
            Err(EngineError::NoConnection)
        );
        assert_eq!(
            engine.precheck(&ctx(LinkClass::Wifi, false, true)),
            Err(EngineError::PowerLow)
        );
        assert!(engine.precheck(&ctx(LinkClass::Wifi, true, true)).is_ok());
        assert!(engine.precheck(&ctx(LinkClass::Unknown, false, false)).is_ok());
    }

    #[test]
    fn test_outdated_wifi_plugged_in_is_accepted() {
        let engine = DecisionEngine::default();
        let stats = StatsMatrix::uniform(1, 1);
        let score = engine
            .score(
                &ctx(LinkClass::Wifi, true, false),
                &stats,
                &resource("/u", 0),
                &stored(Status::Good, 120, true),
            )
            .unwrap();

        assert_eq!(score.power_connected, 500.0);
        assert_eq!(score.connection, 200.0);
        assert_eq!(score.outdated, 1000.0);
        assert_eq!(score.relative_age, 300.0);
        assert_eq!(score.forecast, 900.0);
        assert_eq!(score.usage, 240.0);
        assert_eq!(score.quality_gain, 1500.0);
        assert!(score.accepted());
    }

    #[test]
    fn test_fresh_mobile_slow_unplugged_is_rejected() {
        let engine = DecisionEngine::default();
        let stats = StatsMatrix::uniform(1, 1);
        let score = engine
            .score(
                &ctx(LinkClass::MobileSlow, false, false),
                &stats,
                &resource("/u", 0),
                &stored(Status::Best, 10, false),
            )
            .unwrap();

        assert_eq!(score.power_connected, -10.0);
        assert!((score.connection - 2.0).abs() < 1e-9);
        assert_eq!(score.outdated, 0.0);
        assert!((score.relative_age - 25.0).abs() < 1e-9);
        assert!((score.forecast + 90.0).abs() < 1e-9);
        assert_eq!(score.quality_gain, 0.0);
        assert!(!score.accepted());
    }

    #[test]
    fn test_lifespan_shifted_basis() {
        let engine = DecisionEngine::new(EngineConfig {
            relative_age: RelativeAgeBasis::LifespanShifted,
        });
        let score = engine
            .score(
                &ctx(LinkClass::MobileSlow, false, false),
                &StatsMatrix::uniform(1, 1),
                &resource("/u", 0),
                &stored(Status::Best, 10, false),
            )
            .unwrap();
        assert!((score.relative_age - 150.0 * 3610.0 / 60.0).abs() < 1e-6);
    }

    #[test]
    fn test_nothing_cached_skips_relative_age() {
        let engine = DecisionEngine::default();
        let score = engine
            .score(
                &ctx(LinkClass::MobileFast, false, false),
                &StatsMatrix::uniform(1, 0),
                &resource("/u", 0),
                &CacheSnapshot::EMPTY,
            )
            .unwrap();
        assert_eq!(score.relative_age, 0.0);
        assert_eq!(score.quality_gain, 15.0 * 300.0);
    }

    #[test]
    fn test_quality_gain_ignores_connection_decisive() {
        let engine = DecisionEngine::default();
        let stats = StatsMatrix::uniform(1, 1);
        let context = ctx(LinkClass::Wifi, true, false);
        let snapshot = stored(Status::Worst, 30, false);
        let decisive = Resource::small("/d").unwrap().with_config(ResourceConfig::new(
            0,
            60 * SECOND_MS,
            3600 * SECOND_MS,
            true,
        ));

        let plain = engine
            .score(&context, &stats, &resource("/p", 0), &snapshot)
            .unwrap();
        let flagged = engine.score(&context, &stats, &decisive, &snapshot).unwrap();

        assert_eq!(plain.quality_gain, 15.0 * 299.0);
        assert_eq!(plain, flagged);
    }

    #[test]
    fn test_evaluate_sorts_by_priority_stably() {
        let engine = DecisionEngine::default();
        let stats = StatsMatrix::uniform(1, 1);
        let candidates = vec![
            (resource("/c", 5), CacheSnapshot::EMPTY),
            (resource("/a", 1), CacheSnapshot::EMPTY),
            (resource("/fresh", 0), stored(Status::Best, 1, false)),
            (resource("/b", 1), CacheSnapshot::EMPTY),
        ];
        let accepted = engine
            .evaluate(&ctx(LinkClass::MobileSlow, false, false), &stats, candidates)
            .unwrap();
        let uris: Vec<&str> = accepted.iter().map(|r| r.uri().as_str()).collect();
        assert_eq!(uris, vec!["/a", "/b", "/c"]);
    }

    #[test]
    fn test_evaluate_fails_precheck_before_scoring() {
        let engine = DecisionEngine::default();
        let result = engine.evaluate(
            &ctx(LinkClass::Wifi, false, true),
            &StatsMatrix::default(),
            vec![(resource("/a", 0), CacheSnapshot::EMPTY)],
        );
        assert_eq!(result.unwrap_err(), EngineError::PowerLow);
    }

    #[test]
    fn test_missing_stats_is_reported() {
        let engine = DecisionEngine::default();
        let mut sparse = StatsMatrix::default();
        sparse.set_speed(3, 15, 1);
        let err = engine
            .score(
                &ctx(LinkClass::Wifi, true, false),
                &sparse,
                &resource("/a", 0),
                &CacheSnapshot::EMPTY,
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::MissingStats { map: "speed", .. }));
    }

    #[test]
    fn test_next_slot_wraps_week() {
        let mut c = ctx(LinkClass::Wifi, true, false);
        assert_eq!(c.next_slot(), (3, 15));
        c.hour = 23;
        assert_eq!(c.next_slot(), (4, 0));
        c.day = 7;
        assert_eq!(c.next_slot(), (1, 0));
    }

    #[test]
    fn test_usage_blends_day_and_any() {
        let engine = DecisionEngine::default();
        let mut stats = StatsMatrix::uniform(1, 0);
        stats.set_usage(3, 14, 4);
        stats.set_usage(DAY_ANY, 14, 4);
        stats.set_usage(3, 15, 2);
        let score = engine
            .score(
                &ctx(LinkClass::Wifi, true, false),
                &stats,
                &resource("/a", 0),
                &CacheSnapshot::EMPTY,
            )
            .unwrap();
        // next = (3*2 + 0) / 4 = 1.5, this = (3*4 + 4) / 4 = 4
        assert!((score.usage - 80.0 * (1.5 + 8.0)).abs() < 1e-9);
    }
}
