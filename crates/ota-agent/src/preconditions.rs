//! Policy-driven precondition gate.
//!
//! Read-only over the vehicle physical state; an absent policy field is
//! unconstrained.

use std::fmt;

use ota_core::{Gear, Ignition, VehicleState};
use ota_manifest::InstallPolicy;

/// The specific unmet condition blocking an approval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreconditionFailure {
    BatteryTooLow { soc: u8, min: u8 },
    WrongGear { required: Gear, current: Gear },
    ParkingBrakeDisengaged,
    WrongIgnition { required: Ignition, current: Ignition },
}

impl fmt::Display for PreconditionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BatteryTooLow { soc, min } => {
                write!(f, "battery too low ({soc}% < {min}%)")
            }
            Self::WrongGear { required, current } => {
                write!(f, "gear must be in {required} (current: {current})")
            }
            Self::ParkingBrakeDisengaged => f.write_str("parking brake must be engaged"),
            Self::WrongIgnition { required, current } => {
                write!(f, "ignition must be {required} (current: {current})")
            }
        }
    }
}

/// Check the vehicle state against an install policy.
///
/// # Errors
/// Returns the first unmet condition, checked in policy order: battery,
/// gear, parking brake, ignition.
pub fn check_preconditions(
    policy: &InstallPolicy,
    vehicle: &VehicleState,
) -> Result<(), PreconditionFailure> {
    if let Some(min) = policy.min_battery_soc {
        if vehicle.battery_soc < min {
            return Err(PreconditionFailure::BatteryTooLow {
                soc: vehicle.battery_soc,
                min,
            });
        }
    }
    if let Some(required) = policy.required_gear {
        if vehicle.gear != required {
            return Err(PreconditionFailure::WrongGear {
                required,
                current: vehicle.gear,
            });
        }
    }
    if policy.requires_parking_brake == Some(true) && !vehicle.parking_brake {
        return Err(PreconditionFailure::ParkingBrakeDisengaged);
    }
    if let Some(required) = policy.requires_ignition_state {
        if vehicle.ignition != required {
            return Err(PreconditionFailure::WrongIgnition {
                required,
                current: vehicle.ignition,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strict_policy() -> InstallPolicy {
        InstallPolicy {
            requires_driver_approval: Some(true),
            requires_parked: None,
            min_battery_soc: Some(30),
            required_gear: Some(Gear::P),
            requires_parking_brake: Some(true),
            requires_ignition_state: Some(Ignition::On),
        }
    }

    #[test]
    fn default_vehicle_passes_strict_policy() {
        check_preconditions(&strict_policy(), &VehicleState::default()).unwrap();
    }

    #[test]
    fn low_battery_names_the_constraint() {
        let mut vehicle = VehicleState::default();
        vehicle.battery_soc = 12;
        let failure = check_preconditions(&strict_policy(), &vehicle).unwrap_err();
        assert_eq!(failure, PreconditionFailure::BatteryTooLow { soc: 12, min: 30 });
        assert_eq!(failure.to_string(), "battery too low (12% < 30%)");
    }

    #[test]
    fn wrong_gear_is_reported() {
        let mut vehicle = VehicleState::default();
        vehicle.gear = Gear::D;
        let failure = check_preconditions(&strict_policy(), &vehicle).unwrap_err();
        assert!(matches!(failure, PreconditionFailure::WrongGear { .. }));
    }

    #[test]
    fn disengaged_brake_is_reported() {
        let mut vehicle = VehicleState::default();
        vehicle.parking_brake = false;
        let failure = check_preconditions(&strict_policy(), &vehicle).unwrap_err();
        assert_eq!(failure, PreconditionFailure::ParkingBrakeDisengaged);
    }

    #[test]
    fn wrong_ignition_is_reported() {
        let mut vehicle = VehicleState::default();
        vehicle.ignition = Ignition::Off;
        let failure = check_preconditions(&strict_policy(), &vehicle).unwrap_err();
        assert!(matches!(failure, PreconditionFailure::WrongIgnition { .. }));
    }

    #[test]
    fn empty_policy_is_unconstrained() {
        let mut vehicle = VehicleState::default();
        vehicle.battery_soc = 1;
        vehicle.gear = Gear::D;
        vehicle.parking_brake = false;
        vehicle.ignition = Ignition::Off;
        check_preconditions(&InstallPolicy::default(), &vehicle).unwrap();
    }
}
