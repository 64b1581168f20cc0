//! Vehicle physical state, read-only to the agent's precondition gate.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Transmission gear position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gear {
    P,
    R,
    N,
    D,
}

impl fmt::Display for Gear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::P => "P",
            Self::R => "R",
            Self::N => "N",
            Self::D => "D",
        };
        f.write_str(s)
    }
}

/// Ignition switch position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Ignition {
    On,
    Off,
    Acc,
}

impl fmt::Display for Ignition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::On => "ON",
            Self::Off => "OFF",
            Self::Acc => "ACC",
        };
        f.write_str(s)
    }
}

/// Snapshot of vehicle physical state, mutated only by an external actor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleState {
    /// Battery state of charge, percent.
    pub battery_soc: u8,
    pub gear: Gear,
    pub parking_brake: bool,
    pub ignition: Ignition,
    /// Vehicle speed in km/h.
    pub speed: u16,
}

impl Default for VehicleState {
    fn default() -> Self {
        Self {
            battery_soc: 50,
            gear: Gear::P,
            parking_brake: true,
            ignition: Ignition::On,
            speed: 0,
        }
    }
}

/// Partial update to the vehicle state; absent fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VehicleStatePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub battery_soc: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gear: Option<Gear>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parking_brake: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ignition: Option<Ignition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<u16>,
}

impl VehicleState {
    /// Apply a partial update in place.
    pub fn apply(&mut self, patch: &VehicleStatePatch) {
        if let Some(soc) = patch.battery_soc {
            self.battery_soc = soc;
        }
        if let Some(gear) = patch.gear {
            self.gear = gear;
        }
        if let Some(brake) = patch.parking_brake {
            self.parking_brake = brake;
        }
        if let Some(ignition) = patch.ignition {
            self.ignition = ignition;
        }
        if let Some(speed) = patch.speed {
            self.speed = speed;
        }
    }
}
