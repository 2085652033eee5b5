//! Cache selection by method and name.

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

use regex::Regex;

use super::file::FileCacheProvider;
use super::record::RecordCacheProvider;
use super::traits::{CacheError, CacheProvider};
use crate::clock::Clock;
use crate::codec::CodecError;
use crate::config::StorageLayout;

/// Storage backend of a cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheMethod {
    /// One SQLite row per candidate.
    Record,
    /// One `.info`/`.bin` file pair per candidate.
    File,
}

impl CacheMethod {
    pub const fn wire(self) -> i32 {
        match self {
            CacheMethod::Record => 0x1,
            CacheMethod::File => 0x2,
        }
    }

    pub fn from_wire(value: i32) -> Result<Self, CodecError> {
        match value {
            0x1 => Ok(CacheMethod::Record),
            0x2 => Ok(CacheMethod::File),
            other => Err(CodecError::UnknownValue {
                kind: "cache method",
                value: other as i64,
            }),
        }
    }
}

impl fmt::Display for CacheMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheMethod::Record => f.write_str("record"),
            CacheMethod::File => f.write_str("file"),
        }
    }
}

impl FromStr for CacheMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "record" | "sql" => Ok(CacheMethod::Record),
            "file" => Ok(CacheMethod::File),
            other => Err(format!("unknown cache method '{}'", other)),
        }
    }
}

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    // Literal pattern, always valid.
    PATTERN.get_or_init(|| Regex::new(r"^\w+$").unwrap())
}

pub(crate) fn is_valid_name(name: &str) -> bool {
    name_pattern().is_match(name)
}

/// Check that `name` can be used as a table or directory name.
pub fn validate_cache_name(name: &str) -> Result<(), CacheError> {
    if is_valid_name(name) {
        Ok(())
    } else {
        Err(CacheError::InvalidName(name.to_string()))
    }
}

/// Which cache a manager uses: backend plus name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheSpec {
    pub method: CacheMethod,
    pub name: String,
}

impl CacheSpec {
    pub fn new(method: CacheMethod, name: impl Into<String>) -> Result<Self, CacheError> {
        let name = name.into();
        validate_cache_name(&name)?;
        Ok(Self { method, name })
    }

    pub fn record(name: impl Into<String>) -> Result<Self, CacheError> {
        Self::new(CacheMethod::Record, name)
    }

    pub fn file(name: impl Into<String>) -> Result<Self, CacheError> {
        Self::new(CacheMethod::File, name)
    }

    /// Open the described cache under `layout`.
    pub fn open(
        &self,
        layout: &StorageLayout,
        clock: Arc<dyn Clock>,
    ) -> Result<Box<dyn CacheProvider>, CacheError> {
        match self.method {
            CacheMethod::Record => Ok(Box::new(RecordCacheProvider::open(
                layout.cache_db(),
                &self.name,
                clock,
            )?)),
            CacheMethod::File => Ok(Box::new(FileCacheProvider::open(
                layout.files_dir(),
                &self.name,
                clock,
            )?)),
        }
    }
}

impl fmt::Display for CacheSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.method, self.name)
    }
}

/// Parses `method:name`, e.g. `file:images`.
impl FromStr for CacheSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (method, name) = s
            .split_once(':')
            .ok_or_else(|| format!("expected <method>:<name>, got '{}'", s))?;
        Self::new(method.parse()?, name.trim()).map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_name_validation() {
        assert!(validate_cache_name("news_cache1").is_ok());
        assert!(matches!(
            validate_cache_name("bad name"),
            Err(CacheError::InvalidName(_))
        ));
        assert!(validate_cache_name("").is_err());
        assert!(validate_cache_name("../etc").is_err());
    }

    #[test]
    fn test_method_wire_values() {
        assert_eq!(CacheMethod::Record.wire(), 0x1);
        assert_eq!(CacheMethod::from_wire(0x2).unwrap(), CacheMethod::File);
        assert!(CacheMethod::from_wire(3).is_err());
    }

    #[test]
    fn test_method_parses_legacy_name() {
        assert_eq!("sql".parse::<CacheMethod>().unwrap(), CacheMethod::Record);
        assert_eq!("File".parse::<CacheMethod>().unwrap(), CacheMethod::File);
    }

    #[test]
    fn test_spec_display() {
        let spec = CacheSpec::file("images").unwrap();
        assert_eq!(spec.to_string(), "file:images");
        assert_eq!("file:images".parse::<CacheSpec>().unwrap(), spec);
        assert!("record".parse::<CacheSpec>().is_err());
        assert!("record:bad name".parse::<CacheSpec>().is_err());
    }
}
