//! Record-oriented cache backend on SQLite.
//!
//! Each cache name owns one table with one row per candidate:
//!
//! ```text
//! <name>(id INTEGER PRIMARY KEY, uri TEXT, status INTEGER, timestamp INTEGER,
//!        data BLOB, config BLOB, expire INTEGER, priority INTEGER)
//! uri_index_<name>(uri)
//! ```
//!
//! Several caches may share one database file. Suitable for many small
//! payloads; big payloads are read into the `data` column in full.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, warn};

use super::selection::{self, CandidateMeta};
use super::spec::{validate_cache_name, CacheMethod};
use super::traits::{CacheError, CacheProvider, MaintenanceReport};
use crate::clock::Clock;
use crate::codec::CodecError;
use crate::resource::{Resource, ResourceConfig, ResourceUri, Status};

/// How long a writer waits for a lock held by another connection.
const BUSY_TIMEOUT_MS: u64 = 5_000;

type Row = (i64, Result<CandidateMeta, CodecError>);

pub struct RecordCacheProvider {
    name: String,
    conn: Option<Connection>,
    clock: Arc<dyn Clock>,
}

impl RecordCacheProvider {
    /// Open (or create) the table `name` in the database at `path`.
    pub fn open(
        path: impl AsRef<Path>,
        name: &str,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, CacheError> {
        validate_cache_name(name)?;
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CacheError::io(parent, e))?;
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(std::time::Duration::from_millis(BUSY_TIMEOUT_MS))?;
        Self::with_connection(conn, name, clock)
    }

    pub fn open_in_memory(name: &str, clock: Arc<dyn Clock>) -> Result<Self, CacheError> {
        validate_cache_name(name)?;
        Self::with_connection(Connection::open_in_memory()?, name, clock)
    }

    fn with_connection(
        conn: Connection,
        name: &str,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, CacheError> {
        let provider = Self {
            name: name.to_string(),
            conn: Some(conn),
            clock,
        };
        provider.migrate()?;
        Ok(provider)
    }

    fn migrate(&self) -> Result<(), CacheError> {
        let name = &self.name;
        self.conn()?.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS \"{name}\" (
                 id INTEGER PRIMARY KEY AUTOINCREMENT,
                 uri TEXT NOT NULL,
                 status INTEGER NOT NULL,
                 timestamp INTEGER NOT NULL,
                 data BLOB,
                 config BLOB NOT NULL,
                 expire INTEGER NOT NULL,
                 priority INTEGER NOT NULL
             );
             CREATE INDEX IF NOT EXISTS \"uri_index_{name}\" ON \"{name}\"(uri);"
        ))?;
        Ok(())
    }

    fn conn(&self) -> Result<&Connection, CacheError> {
        self.conn
            .as_ref()
            .ok_or_else(|| CacheError::Closed(self.name.clone()))
    }

    /// Every row stored for `uri`, in insertion order.
    fn rows(&self, conn: &Connection, uri: &str) -> Result<Vec<Row>, CacheError> {
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT id, status, timestamp, config, expire FROM \"{}\" WHERE uri = ?1 ORDER BY id",
            self.name
        ))?;
        let rows = stmt
            .query_map([uri], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i32>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, Vec<u8>>(3)?,
                    row.get::<_, i64>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows
            .into_iter()
            .map(|(id, status, timestamp, config, expire)| {
                let meta = Status::from_i32(status).and_then(|status| {
                    Ok(CandidateMeta {
                        status,
                        timestamp,
                        expire,
                        config: ResourceConfig::unmarshal(&config)?,
                    })
                });
                (id, meta)
            })
            .collect())
    }

    /// Readable candidates for `uri`; unreadable rows are skipped.
    fn load(
        &self,
        conn: &Connection,
        uri: &ResourceUri,
    ) -> Result<(Vec<i64>, Vec<CandidateMeta>), CacheError> {
        let mut ids = Vec::new();
        let mut metas = Vec::new();
        for (id, meta) in self.rows(conn, uri.as_str())? {
            match meta {
                Ok(meta) => {
                    ids.push(id);
                    metas.push(meta);
                }
                Err(e) => warn!(
                    cache = %self.name,
                    uri = %uri,
                    id,
                    error = %e,
                    "Skipping unreadable cache row"
                ),
            }
        }
        Ok((ids, metas))
    }
}

impl CacheProvider for RecordCacheProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn method(&self) -> CacheMethod {
        CacheMethod::Record
    }

    fn cache(&self, r: &Resource) -> Result<bool, CacheError> {
        let conn = self.conn()?;
        let now = self.clock.now_ms();
        let (_, stored) = self.load(conn, r.uri())?;

        if !selection::admits(&stored, r.status(), now) {
            debug!(cache = %self.name, uri = %r.uri(), status = %r.status(), "Cache write skipped");
            return Ok(false);
        }

        let config = r.config();
        let data = r.read_payload()?;
        conn.execute(
            &format!(
                "INSERT INTO \"{}\" (uri, status, timestamp, data, config, expire, priority)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                self.name
            ),
            params![
                r.uri().as_str(),
                r.status().as_i32(),
                now,
                data,
                config.marshal(),
                now.saturating_add(config.cache_lifespan_ms()),
                config.priority(),
            ],
        )?;
        debug!(cache = %self.name, uri = %r.uri(), status = %r.status(), bytes = data.len(), "Candidate stored");
        Ok(true)
    }

    fn fill_resource(&self, r: &mut Resource) -> Result<bool, CacheError> {
        let conn = self.conn()?;
        let now = self.clock.now_ms();
        let (ids, stored) = self.load(conn, r.uri())?;
        let Some(best) = selection::best(&stored, now) else {
            return Ok(false);
        };

        let data: Option<Vec<u8>> = conn
            .query_row(
                &format!("SELECT data FROM \"{}\" WHERE id = ?1", self.name),
                [ids[best]],
                |row| row.get(0),
            )
            .optional()?
            .flatten();

        r.set_status(stored[best].status);
        r.set_config(stored[best].config);
        r.set_data(data.unwrap_or_default())?;
        Ok(true)
    }

    fn caching_status(&self, uri: &ResourceUri) -> Result<Status, CacheError> {
        let (_, stored) = self.load(self.conn()?, uri)?;
        Ok(selection::best_status(&stored, self.clock.now_ms()))
    }

    fn timestamp(&self, uri: &ResourceUri) -> Result<i64, CacheError> {
        let (_, stored) = self.load(self.conn()?, uri)?;
        Ok(selection::best_timestamp(&stored, self.clock.now_ms()))
    }

    fn is_outdated(&self, uri: &ResourceUri) -> Result<bool, CacheError> {
        let (_, stored) = self.load(self.conn()?, uri)?;
        Ok(selection::is_outdated(&stored, self.clock.now_ms()))
    }

    fn candidates(&self, uri: &ResourceUri) -> Result<Vec<CandidateMeta>, CacheError> {
        Ok(self.load(self.conn()?, uri)?.1)
    }

    fn remove(&self, uri: &ResourceUri) -> Result<usize, CacheError> {
        let removed = self.conn()?.execute(
            &format!("DELETE FROM \"{}\" WHERE uri = ?1", self.name),
            [uri.as_str()],
        )?;
        Ok(removed)
    }

    fn clear_cache(&self) -> Result<(), CacheError> {
        self.conn()?
            .execute(&format!("DELETE FROM \"{}\"", self.name), [])?;
        Ok(())
    }

    fn do_extensive_work(&self) -> Result<MaintenanceReport, CacheError> {
        let start = Instant::now();
        let conn = self.conn()?;
        let now = self.clock.now_ms();
        let tx = conn.unchecked_transaction()?;
        let mut report = MaintenanceReport::default();

        report.entries_removed += tx.execute(
            &format!("DELETE FROM \"{}\" WHERE expire < ?1", self.name),
            [now],
        )?;

        let duplicated: Vec<String> = {
            let mut stmt = tx.prepare(&format!(
                "SELECT uri FROM \"{}\" GROUP BY uri HAVING COUNT(*) > 1",
                self.name
            ))?;
            let uris = stmt
                .query_map([], |row| row.get(0))?
                .collect::<Result<Vec<_>, _>>()?;
            uris
        };

        let delete = format!("DELETE FROM \"{}\" WHERE id = ?1", self.name);
        for uri in duplicated {
            let mut ids = Vec::new();
            let mut metas = Vec::new();
            for (id, meta) in self.rows(&tx, &uri)? {
                match meta {
                    Ok(meta) => {
                        ids.push(id);
                        metas.push(meta);
                    }
                    Err(_) => {
                        tx.execute(&delete, [id])?;
                        report.corrupt_removed += 1;
                    }
                }
            }
            for index in selection::superseded(&metas, now) {
                tx.execute(&delete, [ids[index]])?;
                report.entries_removed += 1;
            }
        }

        tx.commit()?;
        report.duration_ms = start.elapsed().as_millis() as u64;
        debug!(cache = %self.name, %report, "Record cache maintenance finished");
        Ok(report)
    }

    fn close(&mut self) -> Result<(), CacheError> {
        if let Some(conn) = self.conn.take() {
            conn.close().map_err(|(_, e)| CacheError::Sqlite(e))?;
        }
        Ok(())
    }
}
