//! Notification-bus payload shapes.
//!
//! Topics: per-vehicle `ota/notify` and `ota/wake`, fleet-wide
//! `ota/emergency_stop`, and the outbound `ota/heartbeat`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AgentState, CampaignId, JobId};

/// Campaign announcement delivered to one vehicle on `ota/notify`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyPayload {
    pub campaign_id: CampaignId,
    pub manifest_ref: String,
    /// Scheduling priority, higher is sooner.
    #[serde(default)]
    pub priority: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_before: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    /// Replay discriminator.
    pub nonce: String,
}

/// Fleet-wide emergency-stop signal.
///
/// Advisory only: an agent must round-trip it through the fleet authority
/// before acting on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmergencyStopSignal {
    /// Scope of the stop, e.g. `"fleet"` or a campaign id.
    pub stop_scope: String,
    pub nonce: String,
}

/// Liveness summary broadcast by the agent on every state transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Heartbeat {
    pub state: AgentState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<JobId>,
    /// Campaign progress, percent.
    pub progress: u8,
}

/// Event delivered on a vehicle's notification subscription.
#[derive(Debug, Clone)]
pub enum VehicleEvent {
    Notify(NotifyPayload),
    Wake,
}

/// Event delivered on the fleet-wide subscription.
#[derive(Debug, Clone)]
pub enum FleetEvent {
    EmergencyStop(EmergencyStopSignal),
}
