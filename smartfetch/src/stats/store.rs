//! SQLite storage for raw telemetry and aggregated profiles.
//!
//! All three tables live in one database so that an aggregation pass can
//! rebuild the results and purge old raw rows in a single transaction:
//!
//! ```text
//! statistic_raw    (id, time, day, hour, conn INTEGER, display INTEGER)
//! statistic_raw_2  (id, time, day, hour, app INTEGER)
//! statistic_result (id, time, day, hour, conn_speed REAL, display REAL, activity INTEGER)
//! ```

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::clock::Clock;
use crate::link::LinkClass;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum StatsError {
    #[error("statistics database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One aggregated row of the results table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsRow {
    pub time: i64,
    /// 1..=7, or -1 for the any-day row.
    pub day: i32,
    pub hour: i32,
    pub conn_speed: f64,
    pub display: f64,
    pub activity: i64,
}

/// One type-1 raw sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkSample {
    pub link: LinkClass,
    pub screen_on: bool,
}

/// Raw and aggregated telemetry tables.
pub struct StatsStore {
    conn: Mutex<Connection>,
    clock: Arc<dyn Clock>,
}

impl StatsStore {
    pub fn open(path: impl AsRef<Path>, clock: Arc<dyn Clock>) -> Result<Self, StatsError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })?;
        Self::with_connection(conn, clock)
    }

    pub fn open_in_memory(clock: Arc<dyn Clock>) -> Result<Self, StatsError> {
        Self::with_connection(Connection::open_in_memory()?, clock)
    }

    fn with_connection(conn: Connection, clock: Arc<dyn Clock>) -> Result<Self, StatsError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS statistic_raw (
                 id INTEGER PRIMARY KEY,
                 time INTEGER NOT NULL,
                 day INTEGER NOT NULL,
                 hour INTEGER NOT NULL,
                 conn INTEGER NOT NULL,
                 display INTEGER NOT NULL
             );
             CREATE INDEX IF NOT EXISTS statistic_raw_slot ON statistic_raw(day, hour);
             CREATE TABLE IF NOT EXISTS statistic_raw_2 (
                 id INTEGER PRIMARY KEY,
                 time INTEGER NOT NULL,
                 day INTEGER NOT NULL,
                 hour INTEGER NOT NULL,
                 app INTEGER NOT NULL
             );
             CREATE INDEX IF NOT EXISTS statistic_raw_2_slot ON statistic_raw_2(day, hour);
             CREATE TABLE IF NOT EXISTS statistic_result (
                 id INTEGER PRIMARY KEY,
                 time INTEGER NOT NULL,
                 day INTEGER NOT NULL,
                 hour INTEGER NOT NULL,
                 conn_speed REAL NOT NULL,
                 display REAL NOT NULL,
                 activity INTEGER NOT NULL
             );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
            clock,
        })
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Append a type-1 sample stamped with the current time slot.
    pub fn insert_link_sample(&self, link: LinkClass, screen_on: bool) -> Result<(), StatsError> {
        let (now, day, hour) = self.slot();
        self.conn.lock().execute(
            "INSERT INTO statistic_raw (time, day, hour, conn, display) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![now, day, hour, link.wire(), i32::from(screen_on)],
        )?;
        debug!(link = %link, screen_on, day, hour, "Recorded link sample");
        Ok(())
    }

    /// Append a type-2 app-in-use sample stamped with the current time slot.
    pub fn insert_app_in_use(&self) -> Result<(), StatsError> {
        let (now, day, hour) = self.slot();
        self.conn.lock().execute(
            "INSERT INTO statistic_raw_2 (time, day, hour, app) VALUES (?1, ?2, ?3, 1)",
            params![now, day, hour],
        )?;
        debug!(day, hour, "Recorded app-in-use sample");
        Ok(())
    }

    pub fn link_samples(&self, day: i32, hour: i32) -> Result<Vec<LinkSample>, StatsError> {
        link_samples(&self.conn.lock(), day, hour)
    }

    pub fn app_in_use_count(&self, day: i32, hour: i32) -> Result<i64, StatsError> {
        app_in_use_count(&self.conn.lock(), day, hour)
    }

    /// Raw row counts `(type-1, type-2)`.
    pub fn raw_counts(&self) -> Result<(i64, i64), StatsError> {
        let conn = self.conn.lock();
        let raw1 = conn.query_row("SELECT COUNT(*) FROM statistic_raw", [], |row| row.get(0))?;
        let raw2 = conn.query_row("SELECT COUNT(*) FROM statistic_raw_2", [], |row| row.get(0))?;
        Ok((raw1, raw2))
    }

    /// Time of the newest results row.
    pub fn newest_result_time(&self) -> Result<Option<i64>, StatsError> {
        let time = self
            .conn
            .lock()
            .query_row(
                "SELECT time FROM statistic_result ORDER BY time DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(time)
    }

    /// All rows of the results table.
    pub fn dump(&self) -> Result<Vec<StatsRow>, StatsError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT time, day, hour, conn_speed, display, activity FROM statistic_result ORDER BY id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(StatsRow {
                    time: row.get(0)?,
                    day: row.get(1)?,
                    hour: row.get(2)?,
                    conn_speed: row.get(3)?,
                    display: row.get(4)?,
                    activity: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Append one results row, e.g. when importing a profile.
    pub fn insert_result(&self, row: &StatsRow) -> Result<(), StatsError> {
        insert_result(&self.conn.lock(), row)
    }

    /// Run `f` inside one transaction on the store's connection.
    pub(crate) fn transaction<T>(
        &self,
        f: impl FnOnce(&Transaction<'_>) -> Result<T, StatsError>,
    ) -> Result<T, StatsError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    #[cfg(test)]
    pub(crate) fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, StatsError>,
    ) -> Result<T, StatsError> {
        f(&self.conn.lock())
    }

    fn slot(&self) -> (i64, i32, i32) {
        (
            self.clock.now_ms(),
            self.clock.day_of_week() as i32,
            self.clock.hour_of_day() as i32,
        )
    }
}

pub(crate) fn link_samples(
    conn: &Connection,
    day: i32,
    hour: i32,
) -> Result<Vec<LinkSample>, StatsError> {
    let mut stmt =
        conn.prepare_cached("SELECT conn, display FROM statistic_raw WHERE day = ?1 AND hour = ?2")?;
    let rows = stmt
        .query_map(params![day, hour], |row| {
            let conn: i32 = row.get(0)?;
            let display: i32 = row.get(1)?;
            Ok(LinkSample {
                link: LinkClass::from_wire(conn).unwrap_or(LinkClass::Unknown),
                screen_on: display != 0,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub(crate) fn app_in_use_count(conn: &Connection, day: i32, hour: i32) -> Result<i64, StatsError> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM statistic_raw_2 WHERE day = ?1 AND hour = ?2",
        params![day, hour],
        |row| row.get(0),
    )?)
}

pub(crate) fn insert_result(conn: &Connection, row: &StatsRow) -> Result<(), StatsError> {
    conn.execute(
        "INSERT INTO statistic_result (time, day, hour, conn_speed, display, activity)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            row.time,
            row.day,
            row.hour,
            row.conn_speed,
            row.display,
            row.activity
        ],
    )?;
    Ok(())
}

pub(crate) fn clear_results(conn: &Connection) -> Result<usize, StatsError> {
    Ok(conn.execute("DELETE FROM statistic_result", [])?)
}

/// Delete raw rows older than `cutoff`. Returns `(type-1, type-2)` counts.
pub(crate) fn purge_raw(conn: &Connection, cutoff: i64) -> Result<(usize, usize), StatsError> {
    let raw1 = conn.execute("DELETE FROM statistic_raw WHERE time < ?1", [cutoff])?;
    let raw2 = conn.execute("DELETE FROM statistic_raw_2 WHERE time < ?1", [cutoff])?;
    Ok((raw1, raw2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{FixedClock, HOUR_MS};

    // Sunday 2024-01-07 10:00 UTC.
    const SUNDAY_10: i64 = 1_704_585_600_000 + 10 * HOUR_MS;

    fn store() -> (Arc<FixedClock>, StatsStore) {
        let clock = Arc::new(FixedClock::new(SUNDAY_10));
        let store = StatsStore::open_in_memory(clock.clone()).unwrap();
        (clock, store)
    }

    #[test]
    fn test_samples_are_stamped_with_slot() {
        let (clock, store) = store();
        store.insert_link_sample(LinkClass::Wifi, true).unwrap();
        clock.advance(HOUR_MS);
        store.insert_link_sample(LinkClass::MobileSlow, false).unwrap();
        store.insert_app_in_use().unwrap();

        assert_eq!(
            store.link_samples(1, 10).unwrap(),
            vec![LinkSample {
                link: LinkClass::Wifi,
                screen_on: true
            }]
        );
        assert_eq!(store.link_samples(1, 11).unwrap()[0].link, LinkClass::MobileSlow);
        assert_eq!(store.app_in_use_count(1, 11).unwrap(), 1);
        assert_eq!(store.app_in_use_count(1, 10).unwrap(), 0);
        assert_eq!(store.raw_counts().unwrap(), (2, 1));
    }

    #[test]
    fn test_purge_raw_uses_strict_cutoff() {
        let (clock, store) = store();
        store.insert_link_sample(LinkClass::Wifi, true).unwrap();
        clock.advance(1);
        store.insert_app_in_use().unwrap();

        let purged = store
            .with_conn(|conn| purge_raw(conn, SUNDAY_10 + 1))
            .unwrap();
        assert_eq!(purged, (1, 0));
    }

    #[test]
    fn test_empty_results() {
        let (_, store) = store();
        assert_eq!(store.newest_result_time().unwrap(), None);
        assert!(store.dump().unwrap().is_empty());
    }
}
