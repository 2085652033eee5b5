//! Network link classification.
//!
//! The core only reasons about a coarse [`LinkClass`]. Each class carries a
//! speed factor, a delay factor and the [`Status`] a fetch over that link
//! is expected to yield. Stats averages are mapped back to a class with
//! [`LinkClass::nearest_real`].

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

use crate::codec::CodecError;
use crate::resource::Status;

/// Coarse class of the current network link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkClass {
    Unknown,
    None,
    MobileSlow,
    MobileFast,
    Wifi,
}

impl LinkClass {
    pub const ALL: [LinkClass; 5] = [
        LinkClass::Unknown,
        LinkClass::None,
        LinkClass::MobileSlow,
        LinkClass::MobileFast,
        LinkClass::Wifi,
    ];

    /// Integer persisted in the raw log and sent as the `c` parameter.
    pub const fn wire(self) -> i32 {
        match self {
            LinkClass::Unknown => 0x00,
            LinkClass::None => 0x10,
            LinkClass::MobileSlow => 0x20,
            LinkClass::MobileFast => 0x30,
            LinkClass::Wifi => 0x40,
        }
    }

    pub fn from_wire(value: i32) -> Result<Self, CodecError> {
        match value {
            0x00 => Ok(LinkClass::Unknown),
            0x10 => Ok(LinkClass::None),
            0x20 => Ok(LinkClass::MobileSlow),
            0x30 => Ok(LinkClass::MobileFast),
            0x40 => Ok(LinkClass::Wifi),
            other => Err(CodecError::UnknownValue {
                kind: "link class",
                value: other as i64,
            }),
        }
    }

    pub fn speed_factor(self) -> f64 {
        match self {
            LinkClass::None => 0.0,
            LinkClass::MobileSlow => 0.1,
            LinkClass::MobileFast => 1.0,
            LinkClass::Wifi => 10.0,
            LinkClass::Unknown => 1.0,
        }
    }

    pub fn delay_factor(self) -> f64 {
        match self {
            LinkClass::None => 1.0,
            LinkClass::MobileSlow => 10.0,
            LinkClass::MobileFast => 10.0,
            LinkClass::Wifi => 0.1,
            LinkClass::Unknown => 1.0,
        }
    }

    /// Quality assigned to a candidate fetched over this link.
    pub fn expected_quality(self) -> Status {
        match self {
            LinkClass::None => Status::NotAvailable,
            LinkClass::MobileSlow => Status::Worst,
            LinkClass::MobileFast => Status::Good,
            LinkClass::Wifi => Status::Best,
            LinkClass::Unknown => Status::Fair,
        }
    }

    /// Map an averaged speed factor back to the closest real class.
    pub fn nearest_real(speed: f64) -> Self {
        if speed > 2.0 {
            LinkClass::Wifi
        } else if speed > 0.2 {
            LinkClass::MobileFast
        } else if speed > 0.02 {
            LinkClass::MobileSlow
        } else {
            LinkClass::None
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            LinkClass::MobileSlow => "mobile_slow",
            LinkClass::MobileFast => "mobile_fast",
            LinkClass::Wifi => "wifi",
            LinkClass::None => "none",
            LinkClass::Unknown => "unknown",
        }
    }
}

impl fmt::Display for LinkClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown link class '{0}' (expected none, mobile_slow, mobile_fast, wifi or unknown)")]
pub struct ParseLinkClassError(String);

impl FromStr for LinkClass {
    type Err = ParseLinkClassError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "none" => Ok(LinkClass::None),
            "mobile_slow" | "slow" => Ok(LinkClass::MobileSlow),
            "mobile_fast" | "fast" => Ok(LinkClass::MobileFast),
            "wifi" => Ok(LinkClass::Wifi),
            "unknown" => Ok(LinkClass::Unknown),
            _ => Err(ParseLinkClassError(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factor_tables() {
        assert_eq!(LinkClass::None.speed_factor(), 0.0);
        assert_eq!(LinkClass::MobileSlow.speed_factor(), 0.1);
        assert_eq!(LinkClass::Wifi.speed_factor(), 10.0);
        assert_eq!(LinkClass::Unknown.speed_factor(), 1.0);
        assert_eq!(LinkClass::Wifi.delay_factor(), 0.1);
        assert_eq!(LinkClass::MobileFast.delay_factor(), 10.0);
    }

    #[test]
    fn test_expected_quality() {
        assert_eq!(LinkClass::None.expected_quality(), Status::NotAvailable);
        assert_eq!(LinkClass::MobileSlow.expected_quality(), Status::Worst);
        assert_eq!(LinkClass::MobileFast.expected_quality(), Status::Good);
        assert_eq!(LinkClass::Wifi.expected_quality(), Status::Best);
        assert_eq!(LinkClass::Unknown.expected_quality(), Status::Fair);
    }

    #[test]
    fn test_nearest_real_thresholds() {
        assert_eq!(LinkClass::nearest_real(10.0), LinkClass::Wifi);
        assert_eq!(LinkClass::nearest_real(2.0), LinkClass::MobileFast);
        assert_eq!(LinkClass::nearest_real(0.2), LinkClass::MobileSlow);
        assert_eq!(LinkClass::nearest_real(0.02), LinkClass::None);
        assert_eq!(LinkClass::nearest_real(0.0), LinkClass::None);
    }

    #[test]
    fn test_wire_values_round_trip() {
        for class in LinkClass::ALL {
            assert_eq!(LinkClass::from_wire(class.wire()).unwrap(), class);
        }
        assert_eq!(LinkClass::Wifi.wire(), 0x40);
        assert!(LinkClass::from_wire(0x50).is_err());
    }

    #[test]
    fn test_parse_from_cli_names() {
        assert_eq!("wifi".parse::<LinkClass>().unwrap(), LinkClass::Wifi);
        assert_eq!("mobile-fast".parse::<LinkClass>().unwrap(), LinkClass::MobileFast);
        assert!("lte".parse::<LinkClass>().is_err());
    }
}
