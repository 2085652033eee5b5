//! Host capability interfaces for link, power and screen state.
//!
//! The core never queries the platform directly. Hosts implement these
//! traits; the static variants hold values set explicitly by the caller
//! (CLI flags, tests, replay).

use parking_lot::RwLock;

use crate::link::LinkClass;

/// Battery and charger state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PowerState {
    /// A charger is connected.
    pub connected: bool,
    /// The battery is reported low.
    pub low: bool,
}

pub trait LinkSensor: Send + Sync {
    fn current_link(&self) -> LinkClass;
}

pub trait PowerSensor: Send + Sync {
    fn power_state(&self) -> PowerState;
}

pub trait ScreenSensor: Send + Sync {
    fn is_screen_on(&self) -> bool;
}

#[derive(Debug)]
pub struct StaticLinkSensor(RwLock<LinkClass>);

impl StaticLinkSensor {
    pub fn new(link: LinkClass) -> Self {
        Self(RwLock::new(link))
    }

    pub fn set(&self, link: LinkClass) {
        *self.0.write() = link;
    }
}

impl LinkSensor for StaticLinkSensor {
    fn current_link(&self) -> LinkClass {
        *self.0.read()
    }
}

#[derive(Debug, Default)]
pub struct StaticPowerSensor(RwLock<PowerState>);

impl StaticPowerSensor {
    pub fn new(state: PowerState) -> Self {
        Self(RwLock::new(state))
    }

    pub fn set(&self, state: PowerState) {
        *self.0.write() = state;
    }
}

impl PowerSensor for StaticPowerSensor {
    fn power_state(&self) -> PowerState {
        *self.0.read()
    }
}

#[derive(Debug, Default)]
pub struct StaticScreenSensor(RwLock<bool>);

impl StaticScreenSensor {
    pub fn new(on: bool) -> Self {
        Self(RwLock::new(on))
    }

    pub fn set(&self, on: bool) {
        *self.0.write() = on;
    }
}

impl ScreenSensor for StaticScreenSensor {
    fn is_screen_on(&self) -> bool {
        *self.0.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_sensors_report_latest_value() {
        let link = StaticLinkSensor::new(LinkClass::Wifi);
        link.set(LinkClass::MobileSlow);
        assert_eq!(link.current_link(), LinkClass::MobileSlow);

        let power = StaticPowerSensor::default();
        assert_eq!(power.power_state(), PowerState::default());
        power.set(PowerState {
            connected: true,
            low: true,
        });
        assert!(power.power_state().connected);

        let screen = StaticScreenSensor::new(true);
        screen.set(false);
        assert!(!screen.is_screen_on());
    }
}
