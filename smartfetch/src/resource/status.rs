//! Resource status ordinals.

use std::fmt;

use crate::codec::CodecError;

/// Status of a resource or cache candidate.
///
/// Ordering is numeric: a higher status is strictly better. The integer
/// values are persisted by both cache backends and sent on the wire as the
/// `q` query parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(i32)]
pub enum Status {
    #[default]
    NotAvailable = -100,
    Updating = 0,
    Worst = 1,
    Fair = 100,
    Good = 200,
    Best = 300,
}

impl Status {
    pub const fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn from_i32(value: i32) -> Result<Self, CodecError> {
        match value {
            -100 => Ok(Status::NotAvailable),
            0 => Ok(Status::Updating),
            1 => Ok(Status::Worst),
            100 => Ok(Status::Fair),
            200 => Ok(Status::Good),
            300 => Ok(Status::Best),
            other => Err(CodecError::UnknownValue {
                kind: "status",
                value: other as i64,
            }),
        }
    }

    /// True for the four quality levels.
    pub fn is_quality(self) -> bool {
        self >= Status::Worst
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Status::NotAvailable => "not_available",
            Status::Updating => "updating",
            Status::Worst => "worst",
            Status::Fair => "fair",
            Status::Good => "good",
            Status::Best => "best",
        };
        f.write_str(name)
    }
}
