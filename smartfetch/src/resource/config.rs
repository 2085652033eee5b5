//! Per-resource configuration and its binary form.
//!
//! The marshalled form is a version byte followed by big-endian fields:
//!
//! ```text
//! version   : 1 byte  (= 1)
//! priority  : 4 bytes
//! interval  : 8 bytes (ms)
//! lifespan  : 8 bytes (ms)
//! decisive  : 1 byte  (0 / 1)
//! ```
//!
//! The same blob is stored by the record backend's `config` column, the
//! file backend's info header and the managed-resources registry.

use bytes::BufMut;

use crate::clock::{DAY_MS, HOUR_MS};
use crate::codec::{self, CodecError};

const FORMAT_VERSION: u8 = 1;

/// Marshalled size in bytes.
pub const MARSHALLED_LEN: usize = 1 + 4 + 8 + 8 + 1;

/// Default update interval (1 hour).
pub const DEFAULT_UPDATE_INTERVAL_MS: i64 = HOUR_MS;

/// Default cache lifespan (1 day).
pub const DEFAULT_CACHE_LIFESPAN_MS: i64 = DAY_MS;

/// Characteristics and requirements of a managed resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceConfig {
    priority: i32,
    update_interval_ms: i64,
    cache_lifespan_ms: i64,
    connection_decisive: bool,
}

impl ResourceConfig {
    /// Build a config, clamping so that `0 < interval <= lifespan`.
    pub fn new(
        priority: i32,
        update_interval_ms: i64,
        cache_lifespan_ms: i64,
        connection_decisive: bool,
    ) -> Self {
        let update_interval_ms = update_interval_ms.max(1);
        let cache_lifespan_ms = cache_lifespan_ms.max(update_interval_ms);
        Self {
            priority,
            update_interval_ms,
            cache_lifespan_ms,
            connection_decisive,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_update_interval(self, interval_ms: i64) -> Self {
        Self::new(
            self.priority,
            interval_ms,
            self.cache_lifespan_ms,
            self.connection_decisive,
        )
    }

    pub fn with_cache_lifespan(self, lifespan_ms: i64) -> Self {
        Self::new(
            self.priority,
            self.update_interval_ms,
            lifespan_ms,
            self.connection_decisive,
        )
    }

    pub fn with_connection_decisive(mut self, decisive: bool) -> Self {
        self.connection_decisive = decisive;
        self
    }

    /// Lower value means higher priority.
    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn update_interval_ms(&self) -> i64 {
        self.update_interval_ms
    }

    pub fn cache_lifespan_ms(&self) -> i64 {
        self.cache_lifespan_ms
    }

    pub fn connection_decisive(&self) -> bool {
        self.connection_decisive
    }

    pub fn marshal(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(MARSHALLED_LEN);
        buf.put_u8(FORMAT_VERSION);
        buf.put_i32(self.priority);
        buf.put_i64(self.update_interval_ms);
        buf.put_i64(self.cache_lifespan_ms);
        buf.put_u8(u8::from(self.connection_decisive));
        buf
    }

    pub fn unmarshal(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut cursor = bytes;
        let version = codec::get_u8(&mut cursor)?;
        if version != FORMAT_VERSION {
            return Err(CodecError::UnsupportedVersion(version));
        }
        let priority = codec::get_i32(&mut cursor)?;
        let update_interval_ms = codec::get_i64(&mut cursor)?;
        let cache_lifespan_ms = codec::get_i64(&mut cursor)?;
        let connection_decisive = match codec::get_u8(&mut cursor)? {
            0 => false,
            1 => true,
            other => {
                return Err(CodecError::UnknownValue {
                    kind: "connection_decisive",
                    value: other as i64,
                })
            }
        };
        codec::expect_end(&cursor)?;
        Ok(Self::new(
            priority,
            update_interval_ms,
            cache_lifespan_ms,
            connection_decisive,
        ))
    }
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self::new(
            0,
            DEFAULT_UPDATE_INTERVAL_MS,
            DEFAULT_CACHE_LIFESPAN_MS,
            false,
        )
    }
}
