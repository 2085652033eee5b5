//! Big-endian binary codec shared by config blobs, proxy blobs and
//! file-backend info headers.
//!
//! Strings are written as a 4-byte signed length (in UTF-16 code units)
//! followed by that many big-endian UTF-16 code units. Readers are
//! bounds-checked and never panic on truncated input.

use bytes::{Buf, BufMut};
use thiserror::Error;

/// Errors raised while decoding a binary blob.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("unexpected end of input: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEof { needed: usize, remaining: usize },

    #[error("negative length prefix: {0}")]
    NegativeLength(i32),

    #[error("invalid UTF-16 string")]
    InvalidUtf16,

    #[error("{0} trailing bytes after record")]
    TrailingBytes(usize),

    #[error("bad magic: {0:02X?}")]
    BadMagic([u8; 4]),

    #[error("unsupported format version {0}")]
    UnsupportedVersion(u8),

    #[error("unknown {kind} value {value}")]
    UnknownValue { kind: &'static str, value: i64 },
}

fn ensure(buf: &impl Buf, needed: usize) -> Result<(), CodecError> {
    if buf.remaining() < needed {
        return Err(CodecError::UnexpectedEof {
            needed,
            remaining: buf.remaining(),
        });
    }
    Ok(())
}

pub fn get_u8(buf: &mut impl Buf) -> Result<u8, CodecError> {
    ensure(buf, 1)?;
    Ok(buf.get_u8())
}

pub fn get_i32(buf: &mut impl Buf) -> Result<i32, CodecError> {
    ensure(buf, 4)?;
    Ok(buf.get_i32())
}

pub fn get_i64(buf: &mut impl Buf) -> Result<i64, CodecError> {
    ensure(buf, 8)?;
    Ok(buf.get_i64())
}

/// Read a length prefix and check it against the remaining input.
fn get_len(buf: &mut impl Buf, unit: usize) -> Result<usize, CodecError> {
    let len = get_i32(buf)?;
    if len < 0 {
        return Err(CodecError::NegativeLength(len));
    }
    let len = len as usize;
    ensure(buf, len.saturating_mul(unit))?;
    Ok(len)
}

/// Write `s` as a length-prefixed UTF-16 BE string.
pub fn put_utf16(buf: &mut impl BufMut, s: &str) {
    let units: Vec<u16> = s.encode_utf16().collect();
    buf.put_i32(units.len() as i32);
    for unit in units {
        buf.put_u16(unit);
    }
}

/// Read a length-prefixed UTF-16 BE string.
pub fn get_utf16(buf: &mut impl Buf) -> Result<String, CodecError> {
    let len = get_len(buf, 2)?;
    let units: Vec<u16> = (0..len).map(|_| buf.get_u16()).collect();
    String::from_utf16(&units).map_err(|_| CodecError::InvalidUtf16)
}

/// Write a length-prefixed opaque byte blob.
pub fn put_blob(buf: &mut impl BufMut, blob: &[u8]) {
    buf.put_i32(blob.len() as i32);
    buf.put_slice(blob);
}

/// Read a length-prefixed opaque byte blob.
pub fn get_blob(buf: &mut impl Buf) -> Result<Vec<u8>, CodecError> {
    let len = get_len(buf, 1)?;
    let mut out = vec![0u8; len];
    buf.copy_to_slice(&mut out);
    Ok(out)
}

/// Fail if any input is left over.
pub fn expect_end(buf: &impl Buf) -> Result<(), CodecError> {
    match buf.remaining() {
        0 => Ok(()),
        n => Err(CodecError::TrailingBytes(n)),
    }
}
