//! The vehicle OTA agent: a cooperative control loop plus listener tasks.
//!
//! The loop ticks at a fixed interval and dispatches purely on the current
//! state. External events (campaign notification, emergency-stop
//! confirmation, approval, vehicle-state updates) arrive on independent
//! tasks and only set shared signal fields observed on the next tick; a
//! handler running within a tick may block, so responsiveness is bounded by
//! the handler's duration.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use ota_authority::{ArtifactFetcher, FleetAuthority, NotificationBus};
use ota_bus::BusRpc;
use ota_core::{
    AgentState, CampaignId, EcuId, FailureReason, FleetEvent, Heartbeat, JobId, TraceLog, Utc,
    VehicleEvent, VehicleState, VehicleStatePatch,
};
use ota_manifest::{Manifest, UpdateTarget};
use parking_lot::Mutex;
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::base_images::BaseImageStore;
use crate::config::AgentConfig;
use crate::error::{ApprovalError, FailureDetail};
use crate::flash::flash_ecu;
use crate::persist::{PersistedState, StateStore};
use crate::preconditions::check_preconditions;
use crate::staging::stage_targets;

/// Shared fields mutated by concurrent input paths and observed by the
/// control loop. One mutex is sufficient at this contention level.
#[derive(Debug)]
pub(crate) struct Signals {
    pub(crate) approved: bool,
    pub(crate) simulate_failure: bool,
    pub(crate) campaign_candidate: Option<CampaignId>,
    pub(crate) stop_requested: bool,
    pub(crate) vehicle: VehicleState,
}

impl Default for Signals {
    fn default() -> Self {
        Self {
            approved: false,
            simulate_failure: false,
            campaign_candidate: None,
            stop_requested: false,
            vehicle: VehicleState::default(),
        }
    }
}

/// Campaign progress as exposed to the operator surface.
#[derive(Debug, Clone)]
pub struct Progress {
    pub percent: u8,
    /// Current state wire name.
    pub status: String,
}

/// Status snapshot answered by the query entry point.
#[derive(Debug, Clone)]
pub struct AgentStatus {
    pub state: AgentState,
    pub job_id: Option<JobId>,
    pub campaign_id: Option<CampaignId>,
    pub approved: bool,
    pub last_failure: Option<FailureDetail>,
}

struct AgentCore {
    config: AgentConfig,
    authority: Arc<dyn FleetAuthority>,
    notifier: NotificationBus,
    fetcher: Arc<dyn ArtifactFetcher>,
    base_images: BaseImageStore,
    rpc: BusRpc,
    store: StateStore,
    trace: TraceLog,
    signals: Arc<Mutex<Signals>>,

    state: AgentState,
    job_id: Option<JobId>,
    campaign_id: Option<CampaignId>,
    manifest: Option<Manifest>,
    images: HashMap<EcuId, Bytes>,
    progress_percent: u8,
    last_failure: Option<FailureDetail>,
}

impl AgentCore {
    async fn set_state(&mut self, new_state: AgentState, failure: Option<FailureDetail>) {
        info!(from = %self.state, to = %new_state, "state transition");
        self.trace.log(
            "STATE_TRANSITION",
            json!({
                "from": self.state.as_str(),
                "to": new_state.as_str(),
                "details": failure.as_ref().map(FailureDetail::to_report),
            }),
        );
        self.state = new_state;
        self.last_failure = failure;

        let persisted = PersistedState {
            state: self.state,
            job_id: self.job_id.clone(),
            campaign_id: self.campaign_id.clone(),
        };
        if let Err(e) = self.store.save(&persisted) {
            error!(error = %e, "failed to persist agent state");
        }

        if let Some(job_id) = self.job_id.clone() {
            let details = self.last_failure.as_ref().map(FailureDetail::to_report);
            if let Err(e) = self
                .authority
                .update_job_status(&job_id, self.state.as_str(), details)
                .await
            {
                warn!(error = %e, "failed to report status to authority");
            }
        }

        self.notifier.publish_heartbeat(
            &self.config.vehicle_id,
            Heartbeat {
                state: self.state,
                job_id: self.job_id.clone(),
                progress: self.progress_percent,
            },
        );
    }

    async fn tick(&mut self) {
        // Safety override first: a confirmed stop preempts any phase.
        let stop = {
            let mut signals = self.signals.lock();
            if signals.stop_requested && self.state != AgentState::Stopped {
                signals.stop_requested = false;
                true
            } else {
                false
            }
        };
        if stop {
            self.set_state(
                AgentState::Stopped,
                Some(FailureDetail::new(
                    FailureReason::EmergencyStop,
                    "confirmed emergency stop",
                )),
            )
            .await;
            return;
        }

        match self.state {
            AgentState::Notified => self.handle_notified().await,
            AgentState::Confirming => self.handle_confirming().await,
            AgentState::WaitingForApproval => self.handle_waiting_for_approval().await,
            AgentState::Downloading => self.handle_downloading().await,
            AgentState::Staged => self.handle_installing().await,
            _ => {}
        }
    }

    async fn handle_notified(&mut self) {
        let candidate = self.signals.lock().campaign_candidate.clone();
        let Some(candidate) = candidate else {
            warn!("notified without a campaign candidate");
            self.set_state(AgentState::Idle, None).await;
            return;
        };

        match self
            .authority
            .create_job(&candidate, &self.config.vehicle_id)
            .await
        {
            Ok(ticket) => {
                info!(job = %ticket.job_id, created = ticket.created, "job ready");
                self.job_id = Some(ticket.job_id);
                self.campaign_id = Some(candidate);
                self.set_state(AgentState::Confirming, None).await;
            }
            Err(e) => {
                // Recoverable: the next notification retriggers the flow.
                warn!(error = %e, "failed to create job, returning to idle");
                self.set_state(AgentState::Idle, None).await;
            }
        }
    }

    async fn handle_confirming(&mut self) {
        let Some(campaign_id) = self.campaign_id.clone() else {
            self.set_state(
                AgentState::Failed,
                Some(FailureDetail::new(
                    FailureReason::ManifestUnavailable,
                    "no campaign in progress",
                )),
            )
            .await;
            return;
        };

        let manifest_ref = campaign_id.manifest_ref();
        let record = match self.authority.get_manifest(&manifest_ref).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                self.set_state(
                    AgentState::Failed,
                    Some(FailureDetail::new(
                        FailureReason::ManifestUnavailable,
                        format!("{manifest_ref} not found"),
                    )),
                )
                .await;
                return;
            }
            Err(e) => {
                self.set_state(
                    AgentState::Failed,
                    Some(FailureDetail::new(
                        FailureReason::ManifestUnavailable,
                        e.to_string(),
                    )),
                )
                .await;
                return;
            }
        };

        let manifest = match Manifest::parse_str(&record.manifest_json) {
            Ok(manifest) => manifest,
            Err(e) => {
                self.set_state(
                    AgentState::Failed,
                    Some(FailureDetail::new(
                        FailureReason::ManifestUnavailable,
                        e.to_string(),
                    )),
                )
                .await;
                return;
            }
        };

        // Nothing about the manifest is trusted before this check passes.
        if manifest
            .verify(&self.config.authority_public_key, &record.signature)
            .is_err()
        {
            error!(%manifest_ref, "manifest signature verification failed");
            self.set_state(
                AgentState::Failed,
                Some(FailureDetail::new(
                    FailureReason::ManifestSignatureInvalid,
                    "detached signature did not verify over canonical JSON",
                )),
            )
            .await;
            return;
        }

        if let Err(e) = manifest.check_expiry(Utc::now()) {
            self.set_state(
                AgentState::Failed,
                Some(FailureDetail::new(FailureReason::ManifestExpired, e.to_string())),
            )
            .await;
            return;
        }

        info!(%manifest_ref, targets = manifest.targets.len(), "manifest verified");
        self.manifest = Some(manifest);
        self.set_state(AgentState::WaitingForApproval, None).await;
    }

    async fn handle_waiting_for_approval(&mut self) {
        let Some(policy) = self.manifest.as_ref().map(|m| m.policy.clone()) else {
            return;
        };
        let approval_required = policy.requires_driver_approval.unwrap_or(false);
        let ready = {
            let signals = self.signals.lock();
            (signals.approved || !approval_required)
                && check_preconditions(&policy, &signals.vehicle).is_ok()
        };
        if ready {
            self.set_state(AgentState::Downloading, None).await;
        }
    }

    async fn handle_downloading(&mut self) {
        let Some(manifest) = self.manifest.clone() else {
            self.set_state(
                AgentState::Failed,
                Some(FailureDetail::new(
                    FailureReason::ManifestUnavailable,
                    "no verified manifest held",
                )),
            )
            .await;
            return;
        };
        let campaign_id = self
            .campaign_id
            .clone()
            .unwrap_or_else(|| manifest.campaign_id.clone());

        self.progress_percent = 10;
        self.trace.log(
            "DOWNLOAD_STARTED",
            json!({"campaign_id": campaign_id.as_str()}),
        );

        match stage_targets(
            &manifest,
            &campaign_id,
            self.fetcher.as_ref(),
            &self.base_images,
            &self.config.download_dir,
            &self.trace,
        )
        .await
        {
            Ok(images) => {
                self.images = images;
                self.progress_percent = 50;
                self.set_state(AgentState::Staged, None).await;
            }
            Err(detail) => {
                self.set_state(AgentState::Failed, Some(detail)).await;
            }
        }
    }

    async fn handle_installing(&mut self) {
        self.set_state(AgentState::Installing, None).await;
        self.progress_percent = 60;

        let Some(manifest) = self.manifest.clone() else {
            self.set_state(
                AgentState::Failed,
                Some(FailureDetail::new(
                    FailureReason::ManifestUnavailable,
                    "no verified manifest held",
                )),
            )
            .await;
            return;
        };
        let simulate_failure = self.signals.lock().simulate_failure;

        let targets: Vec<UpdateTarget> = manifest
            .targets_in_install_order()
            .into_iter()
            .cloned()
            .collect();
        let total = targets.len();

        for (done, target) in targets.iter().enumerate() {
            let ecu_id = target.ecu_id.clone();
            let Some(channels) = self.config.ecus.get(&ecu_id).copied() else {
                self.set_state(
                    AgentState::RolledBack,
                    Some(FailureDetail::for_ecu(
                        FailureReason::FlashRejected,
                        ecu_id,
                        "no bus channel configured",
                    )),
                )
                .await;
                return;
            };
            let Some(image) = self.images.get(&ecu_id).cloned() else {
                self.set_state(
                    AgentState::RolledBack,
                    Some(FailureDetail::for_ecu(
                        FailureReason::FlashRejected,
                        ecu_id,
                        "image not staged",
                    )),
                )
                .await;
                return;
            };

            let outcome = flash_ecu(
                &mut self.rpc,
                &self.config,
                &self.signals,
                channels,
                &ecu_id,
                &image,
                target,
                simulate_failure,
            )
            .await;

            match outcome {
                Ok(()) => {
                    #[allow(clippy::cast_possible_truncation)]
                    let percent = 60 + ((39 * (done + 1)) / total) as u8;
                    self.progress_percent = percent;
                }
                Err(abort) if abort.is_emergency_stop() => {
                    // The stop already round-tripped through the authority;
                    // it wins over the rollback outcome.
                    self.signals.lock().stop_requested = false;
                    self.set_state(AgentState::Stopped, Some(abort.into_detail(ecu_id)))
                        .await;
                    return;
                }
                Err(abort) => {
                    // Already-flashed ECUs keep their new image; the reason
                    // names the ECU that failed.
                    self.set_state(AgentState::RolledBack, Some(abort.into_detail(ecu_id)))
                        .await;
                    return;
                }
            }
        }

        self.set_state(AgentState::Validating, None).await;
        self.progress_percent = 100;
        self.set_state(AgentState::Succeeded, None).await;
    }
}

/// The running agent: control loop plus listener tasks.
pub struct OtaAgent;

impl OtaAgent {
    /// Start the agent and return the operator handle.
    ///
    /// Loads any persisted `{state, job_id, campaign_id}` record, checks in
    /// with the fleet authority, and spawns the control loop and the
    /// notification/emergency-stop listeners.
    #[must_use]
    pub fn start(
        config: AgentConfig,
        authority: Arc<dyn FleetAuthority>,
        notifier: NotificationBus,
        fetcher: Arc<dyn ArtifactFetcher>,
        base_images: BaseImageStore,
        rpc: BusRpc,
        trace: TraceLog,
    ) -> AgentHandle {
        let vehicle_id = config.vehicle_id.clone();
        let tick_interval = config.tick_interval;
        let store = StateStore::new(config.state_path.clone());
        let persisted = store.load();

        let signals = Arc::new(Mutex::new(Signals::default()));
        let core = AgentCore {
            state: persisted.as_ref().map_or(AgentState::Idle, |p| p.state),
            job_id: persisted.as_ref().and_then(|p| p.job_id.clone()),
            campaign_id: persisted.and_then(|p| p.campaign_id),
            manifest: None,
            images: HashMap::new(),
            progress_percent: 0,
            last_failure: None,
            signals: Arc::clone(&signals),
            store,
            rpc,
            base_images,
            fetcher,
            notifier: notifier.clone(),
            authority: Arc::clone(&authority),
            trace,
            config,
        };
        let core = Arc::new(tokio::sync::Mutex::new(core));

        let mut tasks = Vec::new();

        // Control loop.
        {
            let core = Arc::clone(&core);
            let authority = Arc::clone(&authority);
            let vehicle_id = vehicle_id.clone();
            tasks.push(tokio::spawn(async move {
                if let Err(e) = authority.check_in(&vehicle_id).await {
                    warn!(error = %e, "initial check-in failed");
                }
                let mut interval = tokio::time::interval(tick_interval);
                interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                loop {
                    interval.tick().await;
                    core.lock().await.tick().await;
                }
            }));
        }

        // Campaign notification listener.
        {
            let core = Arc::clone(&core);
            let signals = Arc::clone(&signals);
            let mut events = notifier.subscribe_vehicle(&vehicle_id);
            tasks.push(tokio::spawn(async move {
                loop {
                    let event = match events.recv().await {
                        Ok(event) => event,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    };
                    match event {
                        VehicleEvent::Notify(payload) => {
                            let mut core = core.lock().await;
                            if !core.state.accepts_notification() {
                                info!(state = %core.state, "ignoring notification");
                                continue;
                            }
                            {
                                let mut signals = signals.lock();
                                signals.campaign_candidate = Some(payload.campaign_id.clone());
                                signals.approved = false;
                                signals.simulate_failure = false;
                            }
                            info!(campaign = %payload.campaign_id, "campaign notification received");
                            core.set_state(AgentState::Notified, None).await;
                        }
                        VehicleEvent::Wake => {
                            info!("wake ping received");
                        }
                    }
                }
            }));
        }

        // Emergency-stop listener: never self-granted, always round-tripped
        // through the authority. Only sets the shared flag; the control loop
        // (or a mid-stream flash check) observes it.
        {
            let signals = Arc::clone(&signals);
            let authority = Arc::clone(&authority);
            let mut events = notifier.subscribe_fleet();
            tasks.push(tokio::spawn(async move {
                loop {
                    let FleetEvent::EmergencyStop(signal) = match events.recv().await {
                        Ok(event) => event,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    };
                    warn!(scope = %signal.stop_scope, "emergency stop signal received");
                    match authority
                        .confirm_emergency_stop(&signal.nonce, &vehicle_id)
                        .await
                    {
                        Ok(decision) if decision.active => {
                            signals.lock().stop_requested = true;
                        }
                        Ok(_) => {
                            info!("emergency stop not confirmed by authority, ignoring");
                        }
                        Err(e) => {
                            warn!(error = %e, "failed to confirm emergency stop");
                        }
                    }
                }
            }));
        }

        AgentHandle {
            core,
            signals,
            tasks,
        }
    }
}

/// Operator-facing handle: query/command entry points plus task ownership.
pub struct AgentHandle {
    core: Arc<tokio::sync::Mutex<AgentCore>>,
    signals: Arc<Mutex<Signals>>,
    tasks: Vec<JoinHandle<()>>,
}

impl AgentHandle {
    /// Grant driver approval for the pending campaign.
    ///
    /// Honored only in `WAITING_FOR_APPROVAL`, and only when the
    /// precondition gate passes; otherwise the rejection names the specific
    /// unmet condition and the state does not change.
    ///
    /// # Errors
    /// Returns [`ApprovalError`] when the agent is not awaiting approval or
    /// a precondition fails.
    pub async fn approve_update(&self, simulate_failure: bool) -> Result<(), ApprovalError> {
        let core = self.core.lock().await;
        if core.state != AgentState::WaitingForApproval {
            return Err(ApprovalError::NotAwaitingApproval(core.state));
        }
        let policy = core
            .manifest
            .as_ref()
            .map(|m| m.policy.clone())
            .unwrap_or_default();

        let mut signals = self.signals.lock();
        check_preconditions(&policy, &signals.vehicle)
            .map_err(ApprovalError::PreconditionFailed)?;
        signals.approved = true;
        signals.simulate_failure = simulate_failure;
        info!(simulate_failure, "driver approved update");
        Ok(())
    }

    /// Current status snapshot.
    pub async fn status(&self) -> AgentStatus {
        let core = self.core.lock().await;
        AgentStatus {
            state: core.state,
            job_id: core.job_id.clone(),
            campaign_id: core.campaign_id.clone(),
            approved: self.signals.lock().approved,
            last_failure: core.last_failure.clone(),
        }
    }

    /// Current campaign progress.
    pub async fn progress(&self) -> Progress {
        let core = self.core.lock().await;
        Progress {
            percent: core.progress_percent,
            status: core.state.as_str().to_owned(),
        }
    }

    /// Apply an external vehicle-state update (simulation input).
    pub fn set_vehicle_state(&self, patch: &VehicleStatePatch) {
        let mut signals = self.signals.lock();
        signals.vehicle.apply(patch);
        info!(vehicle = ?signals.vehicle, "vehicle state updated");
    }

    /// Current vehicle physical state.
    #[must_use]
    pub fn vehicle_state(&self) -> VehicleState {
        self.signals.lock().vehicle.clone()
    }

    /// Stop all agent tasks.
    pub fn shutdown(self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}
