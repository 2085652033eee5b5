//! `.info` header of the file backend.
//!
//! ```text
//! magic      : 4 bytes = BA BE C0 DE
//! uri_len    : 4 bytes, big-endian int
//! uri_chars  : uri_len x 2 bytes, UTF-16 BE code units
//! status     : 4 bytes, big-endian int
//! timestamp  : 8 bytes, big-endian long
//! cfg_len    : 4 bytes, big-endian int
//! cfg_bytes  : cfg_len bytes
//! ```
//!
//! Trailing bytes after `cfg_bytes` make the header invalid.

use bytes::{Buf, BufMut};

use crate::codec::{self, CodecError};
use crate::resource::{ResourceConfig, Status};

pub const MAGIC: [u8; 4] = [0xBA, 0xBE, 0xC0, 0xDE];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfoHeader {
    pub uri: String,
    pub status: Status,
    pub timestamp: i64,
    pub config: ResourceConfig,
}

impl InfoHeader {
    pub fn encode(&self) -> Vec<u8> {
        let config = self.config.marshal();
        let mut buf = Vec::with_capacity(24 + 2 * self.uri.len() + config.len());
        buf.put_slice(&MAGIC);
        codec::put_utf16(&mut buf, &self.uri);
        buf.put_i32(self.status.as_i32());
        buf.put_i64(self.timestamp);
        codec::put_blob(&mut buf, &config);
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut cursor = bytes;
        if cursor.remaining() < MAGIC.len() {
            return Err(CodecError::UnexpectedEof {
                needed: MAGIC.len(),
                remaining: cursor.remaining(),
            });
        }
        let mut magic = [0u8; 4];
        cursor.copy_to_slice(&mut magic);
        if magic != MAGIC {
            return Err(CodecError::BadMagic(magic));
        }

        let uri = codec::get_utf16(&mut cursor)?;
        let status = Status::from_i32(codec::get_i32(&mut cursor)?)?;
        let timestamp = codec::get_i64(&mut cursor)?;
        let config = ResourceConfig::unmarshal(&codec::get_blob(&mut cursor)?)?;
        codec::expect_end(&cursor)?;

        Ok(Self {
            uri,
            status,
            timestamp,
            config,
        })
    }
}
