//! Managed-resources registry.
//!
//! Records which URIs each manager keeps up to date, with the config and
//! payload kind to use for them:
//!
//! ```text
//! managed_resources(manager TEXT, uri TEXT, big INTEGER, config BLOB,
//!                   PRIMARY KEY(manager, uri))
//! ```
//!
//! Listing order is registration order; re-registering a URI updates it
//! in place.

use std::path::{Path, PathBuf};
use std::time::Duration;

use parking_lot::Mutex;
use rand::distr::Alphanumeric;
use rand::Rng;
use rusqlite::{params, Connection};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::cache::is_valid_name;
use crate::codec::CodecError;
use crate::resource::{EmptyUri, FileBody, Payload, Resource, ResourceConfig, ResourceUri};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("registry database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid manager name '{0}': only letters, digits and '_' are allowed")]
    InvalidManager(String),

    #[error(transparent)]
    InvalidUri(#[from] EmptyUri),
}

/// One registered resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManagedResource {
    pub manager: String,
    #[serde(serialize_with = "serialize_uri")]
    pub uri: ResourceUri,
    pub big: bool,
    #[serde(skip)]
    pub config: ResourceConfig,
}

fn serialize_uri<S: serde::Serializer>(uri: &ResourceUri, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(uri.as_str())
}

impl ManagedResource {
    /// A fresh resource for one update cycle.
    ///
    /// Big entries get a transient body under `staging_dir` that is
    /// deleted once the resource is dropped.
    pub fn to_resource(&self, staging_dir: &Path) -> Resource {
        let payload = if self.big {
            Payload::File(FileBody::transient(staging_path(
                staging_dir,
                &self.manager,
                &self.uri,
            )))
        } else {
            Payload::Memory(Vec::new())
        };
        Resource::new(self.uri.clone(), payload).with_config(self.config)
    }
}

fn staging_path(staging_dir: &Path, manager: &str, uri: &ResourceUri) -> PathBuf {
    let suffix: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect();
    staging_dir
        .join(manager)
        .join(format!("{}-{}.body", uri.dir_hash(), suffix))
}

/// SQLite-backed registry of managed resources.
pub struct ResourceRegistry {
    conn: Mutex<Connection>,
}

impl ResourceRegistry {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, RegistryError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, RegistryError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS managed_resources (
                 manager TEXT NOT NULL,
                 uri TEXT NOT NULL,
                 big INTEGER NOT NULL,
                 config BLOB NOT NULL,
                 PRIMARY KEY (manager, uri)
             );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Add `uri` to `manager`, or update its config and kind.
    pub fn register(
        &self,
        manager: &str,
        uri: &ResourceUri,
        config: &ResourceConfig,
        big: bool,
    ) -> Result<(), RegistryError> {
        check_manager(manager)?;
        self.conn.lock().execute(
            "INSERT INTO managed_resources (manager, uri, big, config)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(manager, uri) DO UPDATE SET big = excluded.big, config = excluded.config",
            params![manager, uri.as_str(), big, config.marshal()],
        )?;
        debug!(manager, uri = %uri, big, "Resource registered");
        Ok(())
    }

    /// Returns whether `uri` was registered.
    pub fn unregister(&self, manager: &str, uri: &ResourceUri) -> Result<bool, RegistryError> {
        let removed = self.conn.lock().execute(
            "DELETE FROM managed_resources WHERE manager = ?1 AND uri = ?2",
            params![manager, uri.as_str()],
        )?;
        Ok(removed > 0)
    }

    /// Resources of `manager` in registration order.
    ///
    /// Rows that no longer decode are skipped.
    pub fn resources(&self, manager: &str) -> Result<Vec<ManagedResource>, RegistryError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT uri, big, config FROM managed_resources WHERE manager = ?1 ORDER BY rowid",
        )?;
        let rows = stmt
            .query_map([manager], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, bool>(1)?,
                    row.get::<_, Vec<u8>>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut out = Vec::with_capacity(rows.len());
        for (uri, big, config) in rows {
            match decode_row(&uri, &config) {
                Ok((uri, config)) => out.push(ManagedResource {
                    manager: manager.to_string(),
                    uri,
                    big,
                    config,
                }),
                Err(e) => warn!(manager, uri = %uri, error = %e, "Skipping unreadable registry row"),
            }
        }
        Ok(out)
    }

    /// Managers with at least one resource, sorted by name.
    pub fn managers(&self) -> Result<Vec<String>, RegistryError> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare_cached("SELECT DISTINCT manager FROM managed_resources ORDER BY manager")?;
        let managers = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(managers)
    }
}

fn check_manager(manager: &str) -> Result<(), RegistryError> {
    if is_valid_name(manager) {
        Ok(())
    } else {
        Err(RegistryError::InvalidManager(manager.to_string()))
    }
}

#[derive(Debug, Error)]
enum RowError {
    #[error(transparent)]
    Uri(#[from] EmptyUri),
    #[error(transparent)]
    Config(#[from] CodecError),
}

fn decode_row(uri: &str, config: &[u8]) -> Result<(ResourceUri, ResourceConfig), RowError> {
    Ok((ResourceUri::new(uri)?, ResourceConfig::unmarshal(config)?))
}
