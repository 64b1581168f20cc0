//! Update job record, authoritative at the fleet authority.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CampaignId, JobId, VehicleId};

/// One per-vehicle update job.
///
/// Owned by the fleet authority; the vehicle agent only reports against it
/// and mirrors the `job_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: JobId,
    pub vehicle_id: VehicleId,
    pub campaign_id: CampaignId,
    /// Last status the vehicle reported (agent state wire name).
    pub status: String,
    /// Free-form structured details attached to the last status report.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_round_trips_through_json() {
        let job = JobRecord {
            job_id: JobId::from("job-1234abcd"),
            vehicle_id: VehicleId::from("veh-001"),
            campaign_id: CampaignId::from("camp-1"),
            status: "CREATED".to_owned(),
            details: None,
            created_at: Utc::now(),
        };
        let json = serde_json::to_string(&job).unwrap();
        let back: JobRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.job_id, job.job_id);
        assert_eq!(back.status, "CREATED");
    }
}
