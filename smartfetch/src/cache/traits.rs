//! The cache provider contract shared by both backends.
//!
//! A cache holds zero or more *candidates* per URI. Each candidate carries
//! its own status, timestamp, expiry, config snapshot and payload. A
//! candidate whose `timestamp + lifespan` lies in the past is invisible to
//! every query and is physically removed by [`CacheProvider::do_extensive_work`].
//!
//! # Thread Safety
//!
//! Providers are `Send` but not required to be `Sync`. Concurrent callers
//! share a provider behind a mutex; the file backend relies on that mutex
//! for the atomicity of its `(info, bin)` pair.

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use super::selection::CandidateMeta;
use super::spec::CacheMethod;
use crate::codec::CodecError;
use crate::resource::{Resource, ResourceUri, Status};

/// Result of a maintenance pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    /// Expired or superseded candidates removed.
    pub entries_removed: usize,
    /// Unreadable candidates and orphaned payloads removed.
    pub corrupt_removed: usize,
    /// Duration of the pass in milliseconds.
    pub duration_ms: u64,
}

impl fmt::Display for MaintenanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "maintenance: removed {} entries and {} corrupt files in {}ms",
            self.entries_removed, self.corrupt_removed, self.duration_ms
        )
    }
}

/// Errors that can occur during cache operations.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("payload I/O error: {0}")]
    Payload(#[from] io::Error),

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("corrupt cache record: {0}")]
    Corrupt(#[from] CodecError),

    #[error("invalid cache name '{0}': only letters, digits and '_' are allowed")]
    InvalidName(String),

    #[error("cache '{0}' is closed")]
    Closed(String),
}

impl CacheError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        CacheError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Persistent URI to multi-candidate store.
pub trait CacheProvider: Send {
    /// Cache name (table or directory name).
    fn name(&self) -> &str;

    fn method(&self) -> CacheMethod;

    /// Conditionally persist `r` as a new candidate stamped with the
    /// current time.
    ///
    /// The write is skipped when a live candidate has a timestamp in the
    /// future or a status strictly better than `r.status()`. Returns
    /// whether a candidate was written.
    fn cache(&self, r: &Resource) -> Result<bool, CacheError>;

    /// Copy the best live candidate (highest status, then newest) into
    /// `r`. Returns `false` and leaves `r` untouched if none exists.
    fn fill_resource(&self, r: &mut Resource) -> Result<bool, CacheError>;

    /// Best status among live candidates, or `NotAvailable`.
    fn caching_status(&self, uri: &ResourceUri) -> Result<Status, CacheError>;

    /// Timestamp of the best live candidate, or 0.
    fn timestamp(&self, uri: &ResourceUri) -> Result<i64, CacheError>;

    /// True iff no live candidate is inside its update interval.
    fn is_outdated(&self, uri: &ResourceUri) -> Result<bool, CacheError>;

    /// All stored candidates for `uri`, expired ones included.
    fn candidates(&self, uri: &ResourceUri) -> Result<Vec<CandidateMeta>, CacheError>;

    /// Remove every candidate for `uri`. Returns the number removed.
    fn remove(&self, uri: &ResourceUri) -> Result<usize, CacheError>;

    /// Remove every candidate of this cache.
    fn clear_cache(&self) -> Result<(), CacheError>;

    /// Delete expired candidates and keep only the best per URI.
    fn do_extensive_work(&self) -> Result<MaintenanceReport, CacheError>;

    /// Release the underlying store. Later calls return `CacheError::Closed`.
    fn close(&mut self) -> Result<(), CacheError>;
}
