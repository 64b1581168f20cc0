//! Lifecycle state enums for the vehicle agent and the ECU programmer.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Vehicle OTA agent lifecycle state.
///
/// The agent's control loop dispatches purely on this value; external events
/// only set shared fields that the next tick observes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentState {
    Idle,
    Notified,
    Confirming,
    WaitingForApproval,
    Downloading,
    Staged,
    Installing,
    Validating,
    Succeeded,
    Failed,
    Stopped,
    RolledBack,
}

impl AgentState {
    /// Stable wire name, as reported to the fleet authority.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Notified => "NOTIFIED",
            Self::Confirming => "CONFIRMING",
            Self::WaitingForApproval => "WAITING_FOR_APPROVAL",
            Self::Downloading => "DOWNLOADING",
            Self::Staged => "STAGED",
            Self::Installing => "INSTALLING",
            Self::Validating => "VALIDATING",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
            Self::Stopped => "STOPPED",
            Self::RolledBack => "ROLLED_BACK",
        }
    }

    /// States from which a new campaign notification is accepted.
    #[must_use]
    pub const fn accepts_notification(&self) -> bool {
        matches!(self, Self::Idle | Self::Succeeded | Self::Failed)
    }

    /// Terminal states: the campaign is finished one way or another.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::Failed | Self::Stopped | Self::RolledBack
        )
    }
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// ECU firmware-programming mode.
///
/// `Programming` is reachable from any mode via `enter_programming` (a
/// reset); failure paths return to `Idle`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EcuMode {
    #[default]
    Idle,
    Programming,
    Verified,
    Activated,
    Confirmed,
}

impl EcuMode {
    /// Stable wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Programming => "PROGRAMMING",
            Self::Verified => "VERIFIED",
            Self::Activated => "ACTIVATED",
            Self::Confirmed => "CONFIRMED",
        }
    }
}

impl fmt::Display for EcuMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One of the two A/B firmware storage slots per ECU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Slot {
    A,
    B,
}

impl Slot {
    /// The opposite slot.
    #[must_use]
    pub const fn other(&self) -> Self {
        match self {
            Self::A => Self::B,
            Self::B => Self::A,
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::A => f.write_str("A"),
            Self::B => f.write_str("B"),
        }
    }
}
