//! In-memory fleet authority.
//!
//! Concurrent keyed maps behind coarse per-map locks; suitable for the
//! simulation and for tests. Multiple vehicles check in, register, and query
//! simultaneously.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ota_core::{CampaignId, JobId, JobRecord, TraceLog, Uuid, VehicleId};
use parking_lot::RwLock;
use serde_json::json;
use tracing::{info, warn};

use crate::authority::{FleetAuthority, JobTicket, ManifestRecord, StopDecision};
use crate::error::AuthorityResult;

/// In-memory authority implementation.
pub struct InMemoryAuthority {
    jobs: RwLock<HashMap<JobId, JobRecord>>,
    manifests: RwLock<HashMap<String, ManifestRecord>>,
    vehicles: RwLock<HashMap<VehicleId, DateTime<Utc>>>,
    stop_active: AtomicBool,
    trace: TraceLog,
}

impl InMemoryAuthority {
    /// Create an empty authority.
    #[must_use]
    pub fn new(trace: TraceLog) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            manifests: RwLock::new(HashMap::new()),
            vehicles: RwLock::new(HashMap::new()),
            stop_active: AtomicBool::new(false),
            trace,
        }
    }

    /// Arm or disarm the fleet-wide emergency stop.
    ///
    /// Agents only learn about this via `confirm_emergency_stop`.
    pub fn set_emergency_stop(&self, active: bool) {
        self.stop_active.store(active, Ordering::SeqCst);
    }

    /// Vehicles seen by `check_in`, with their last check-in time.
    #[must_use]
    pub fn known_vehicles(&self) -> Vec<(VehicleId, DateTime<Utc>)> {
        self.vehicles
            .read()
            .iter()
            .map(|(id, at)| (id.clone(), *at))
            .collect()
    }

    /// All job records, for inspection.
    #[must_use]
    pub fn jobs(&self) -> Vec<JobRecord> {
        self.jobs.read().values().cloned().collect()
    }
}

impl Default for InMemoryAuthority {
    fn default() -> Self {
        Self::new(TraceLog::disabled("control-plane"))
    }
}

#[async_trait]
impl FleetAuthority for InMemoryAuthority {
    async fn check_in(&self, vehicle_id: &VehicleId) -> AuthorityResult<()> {
        self.vehicles.write().insert(vehicle_id.clone(), Utc::now());
        info!(vehicle = %vehicle_id, "vehicle check-in");
        self.trace
            .log("VEHICLE_CHECKIN", json!({"vehicle_id": vehicle_id.as_str()}));
        Ok(())
    }

    async fn register_manifest(
        &self,
        manifest_ref: &str,
        record: ManifestRecord,
    ) -> AuthorityResult<()> {
        self.manifests
            .write()
            .insert(manifest_ref.to_owned(), record);
        info!(manifest_ref, "manifest registered");
        Ok(())
    }

    async fn get_manifest(&self, manifest_ref: &str) -> AuthorityResult<Option<ManifestRecord>> {
        Ok(self.manifests.read().get(manifest_ref).cloned())
    }

    async fn create_job(
        &self,
        campaign_id: &CampaignId,
        vehicle_id: &VehicleId,
    ) -> AuthorityResult<JobTicket> {
        // Resume: one open job per vehicle+campaign.
        if let Some(existing) = self
            .jobs
            .read()
            .values()
            .find(|j| &j.vehicle_id == vehicle_id && &j.campaign_id == campaign_id)
        {
            info!(job = %existing.job_id, vehicle = %vehicle_id, "resuming existing job");
            return Ok(JobTicket {
                job_id: existing.job_id.clone(),
                created: false,
            });
        }

        let job_id = JobId::new(format!("job-{}", &Uuid::new_v4().simple().to_string()[..8]));
        let record = JobRecord {
            job_id: job_id.clone(),
            vehicle_id: vehicle_id.clone(),
            campaign_id: campaign_id.clone(),
            status: "CREATED".to_owned(),
            details: None,
            created_at: Utc::now(),
        };
        self.jobs.write().insert(job_id.clone(), record);
        info!(job = %job_id, vehicle = %vehicle_id, campaign = %campaign_id, "job created");
        self.trace.log(
            "JOB_CREATED",
            json!({
                "job_id": job_id.as_str(),
                "vehicle_id": vehicle_id.as_str(),
                "campaign_id": campaign_id.as_str(),
            }),
        );
        Ok(JobTicket {
            job_id,
            created: true,
        })
    }

    async fn update_job_status(
        &self,
        job_id: &JobId,
        status: &str,
        details: Option<String>,
    ) -> AuthorityResult<()> {
        let mut jobs = self.jobs.write();
        match jobs.get_mut(job_id) {
            Some(job) => {
                job.status = status.to_owned();
                job.details = details.clone();
            }
            None => {
                // Status for a job this authority never issued: store a
                // shell record rather than dropping the report.
                warn!(job = %job_id, status, "status report for unknown job");
                jobs.insert(
                    job_id.clone(),
                    JobRecord {
                        job_id: job_id.clone(),
                        vehicle_id: VehicleId::from(""),
                        campaign_id: CampaignId::from(""),
                        status: status.to_owned(),
                        details: details.clone(),
                        created_at: Utc::now(),
                    },
                );
            }
        }
        drop(jobs);
        info!(job = %job_id, status, "job status updated");
        self.trace.log(
            "JOB_STATUS_UPDATE",
            json!({"job_id": job_id.as_str(), "status": status, "details": details}),
        );
        Ok(())
    }

    async fn confirm_emergency_stop(
        &self,
        request_id: &str,
        vehicle_id: &VehicleId,
    ) -> AuthorityResult<StopDecision> {
        let active = self.stop_active.load(Ordering::SeqCst);
        if active {
            warn!(vehicle = %vehicle_id, request_id, "emergency stop confirmed");
            self.trace.log(
                "EMERGENCY_STOP_CONFIRMED",
                json!({"vehicle_id": vehicle_id.as_str(), "request_id": request_id}),
            );
        } else {
            info!(vehicle = %vehicle_id, request_id, "emergency stop not in force");
        }
        Ok(StopDecision {
            acknowledged: true,
            active,
        })
    }

    async fn get_job(&self, job_id: &JobId) -> AuthorityResult<Option<JobRecord>> {
        Ok(self.jobs.read().get(job_id).cloned())
    }
}
