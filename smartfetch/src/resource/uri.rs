//! Resource identity.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("resource path must not be empty")]
pub struct EmptyUri;

/// Normalized resource path.
///
/// Surrounding whitespace is trimmed and a leading `/` is added when
/// missing, so `"news/today"` and `"/news/today"` name the same resource.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceUri(String);

impl ResourceUri {
    pub fn new(path: &str) -> Result<Self, EmptyUri> {
        let trimmed = path.trim();
        if trimmed.is_empty() || trimmed == "/" {
            return Err(EmptyUri);
        }
        if trimmed.starts_with('/') {
            Ok(Self(trimmed.to_string()))
        } else {
            Ok(Self(format!("/{}", trimmed)))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Directory name used by the file backend: `|hash|` in base 36.
    pub fn dir_hash(&self) -> String {
        let hash = string_hash(&self.0);
        // i32::MIN has no positive counterpart and stays negative.
        let abs = hash.wrapping_abs();
        to_base36(abs as i64)
    }
}

impl fmt::Display for ResourceUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ResourceUri {
    type Err = EmptyUri;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for ResourceUri {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Polynomial string hash over UTF-16 code units (`h = 31·h + c`).
pub fn string_hash(s: &str) -> i32 {
    s.encode_utf16()
        .fold(0i32, |h, unit| h.wrapping_mul(31).wrapping_add(unit as i32))
}

fn to_base36(mut value: i64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let negative = value < 0;
    let mut out = Vec::new();
    while value != 0 {
        let digit = (value % 36).unsigned_abs() as usize;
        out.push(DIGITS[digit]);
        value /= 36;
    }
    if negative {
        out.push(b'-');
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}
