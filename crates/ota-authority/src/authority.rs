//! Fleet authority RPC surface.
//!
//! Tagged request/response types per method, validated at the boundary.
//! Storage is keyed by opaque identifiers with no cross-key transactions.

use async_trait::async_trait;
use ota_core::{CampaignId, JobId, JobRecord, VehicleId};
use ota_crypto::Signature;
use serde::{Deserialize, Serialize};

use crate::error::AuthorityResult;

/// Stored manifest JSON plus its detached signature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestRecord {
    pub manifest_json: String,
    pub signature: Signature,
}

/// Reply to `create_job`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobTicket {
    pub job_id: JobId,
    pub created: bool,
}

/// Reply to `confirm_emergency_stop`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StopDecision {
    pub acknowledged: bool,
    /// Whether the stop is actually in force. Agents act only on `true`.
    pub active: bool,
}

/// The fleet authority's RPC surface, as consumed by vehicle agents and the
/// campaign issuer.
#[async_trait]
pub trait FleetAuthority: Send + Sync {
    /// Record a vehicle's liveness check-in.
    ///
    /// # Errors
    /// Returns an error if the authority is unavailable.
    async fn check_in(&self, vehicle_id: &VehicleId) -> AuthorityResult<()>;

    /// Store a signed manifest under its reference.
    ///
    /// # Errors
    /// Returns an error if the manifest is rejected.
    async fn register_manifest(
        &self,
        manifest_ref: &str,
        record: ManifestRecord,
    ) -> AuthorityResult<()>;

    /// Fetch a stored manifest by reference.
    ///
    /// # Errors
    /// Returns an error if the authority is unavailable; an unknown
    /// reference is `Ok(None)`.
    async fn get_manifest(&self, manifest_ref: &str) -> AuthorityResult<Option<ManifestRecord>>;

    /// Create (or resume) the update job for a vehicle within a campaign.
    ///
    /// # Errors
    /// Returns an error if the authority is unavailable.
    async fn create_job(
        &self,
        campaign_id: &CampaignId,
        vehicle_id: &VehicleId,
    ) -> AuthorityResult<JobTicket>;

    /// Record a status report against a job.
    ///
    /// # Errors
    /// Returns an error if the authority is unavailable.
    async fn update_job_status(
        &self,
        job_id: &JobId,
        status: &str,
        details: Option<String>,
    ) -> AuthorityResult<()>;

    /// Confirm (or deny) an emergency stop for a vehicle.
    ///
    /// The agent must round-trip every stop signal through this call and
    /// act only on an `active` decision; stops are never self-granted.
    ///
    /// # Errors
    /// Returns an error if the authority is unavailable.
    async fn confirm_emergency_stop(
        &self,
        request_id: &str,
        vehicle_id: &VehicleId,
    ) -> AuthorityResult<StopDecision>;

    /// Inspect a job record, if it exists.
    ///
    /// # Errors
    /// Returns an error if the authority is unavailable.
    async fn get_job(&self, job_id: &JobId) -> AuthorityResult<Option<JobRecord>>;
}
