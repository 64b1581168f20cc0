//! End-to-end campaign scenarios: issuer, authority, notification bus,
//! vehicle agent, and two bus-attached ECUs in one process.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use ota_agent::{AgentConfig, AgentHandle, BaseImageStore, OtaAgent};
use ota_authority::{
    ArtifactFetcher, CampaignIssuer, FleetAuthority, InMemoryAuthority, MemoryArtifactStore,
    NotificationBus,
};
use ota_bus::{BusRpc, ChannelPair, SharedBus};
use ota_core::{
    AgentState, EcuId, EcuMode, EmergencyStopSignal, FailureReason, Gear, Heartbeat, Slot,
    TraceLog, VehicleId, VehicleStatePatch,
};
use ota_ecu::{EcuService, FirmwareProgrammer, Slots};
use ota_manifest::{InstallPolicy, Manifest};
use ota_testkit::{authority_key, base_image, init_test_tracing, target_image, ManifestBuilder};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::time::{sleep, timeout};

const FAST_PACING: Duration = Duration::from_micros(5);
const TICK: Duration = Duration::from_millis(20);

struct Fleet {
    bus: SharedBus,
    authority: Arc<InMemoryAuthority>,
    notifier: NotificationBus,
    artifacts: MemoryArtifactStore,
    base_images: BaseImageStore,
    ecus: HashMap<EcuId, ChannelPair>,
    programmers: HashMap<EcuId, Arc<Mutex<FirmwareProgrammer>>>,
    services: Vec<tokio::task::JoinHandle<()>>,
    dir: tempfile::TempDir,
}

impl Fleet {
    fn new(ecu_names: &[(&str, u32)]) -> Self {
        init_test_tracing();
        let bus = SharedBus::new(256 * 1024);
        let mut ecus = HashMap::new();
        let mut programmers = HashMap::new();
        let mut services = Vec::new();

        for &(name, listen) in ecu_names {
            let ecu_id = EcuId::from(name);
            let channels = ChannelPair::from_command(listen);
            let programmer = Arc::new(Mutex::new(FirmwareProgrammer::new(
                ecu_id.clone(),
                authority_key().public_key(),
                Slots::new("1.0.0"),
            )));
            services.push(
                EcuService::new(
                    ecu_id.clone(),
                    channels,
                    BusRpc::new(bus.attach()).with_pacing(FAST_PACING),
                    Arc::clone(&programmer),
                    TraceLog::disabled("ecu"),
                )
                .spawn(),
            );
            ecus.insert(ecu_id.clone(), channels);
            programmers.insert(ecu_id, programmer);
        }

        Self {
            bus,
            authority: Arc::new(InMemoryAuthority::default()),
            notifier: NotificationBus::new(),
            artifacts: MemoryArtifactStore::new(),
            base_images: BaseImageStore::new(),
            ecus,
            programmers,
            services,
            dir: tempfile::tempdir().expect("tempdir"),
        }
    }

    fn start_agent(&self, block_size: usize) -> AgentHandle {
        let mut config = AgentConfig::new(
            VehicleId::from("veh-1"),
            self.dir.path().join("state/ota_state.json"),
            self.dir.path().join("downloads"),
            self.ecus.clone(),
            authority_key().public_key(),
        )
        .with_tick_interval(TICK);
        config.block_size = block_size;

        OtaAgent::start(
            config,
            Arc::clone(&self.authority) as Arc<dyn FleetAuthority>,
            self.notifier.clone(),
            Arc::new(self.artifacts.clone()) as Arc<dyn ArtifactFetcher>,
            self.base_images.clone(),
            BusRpc::new(self.bus.attach()).with_pacing(FAST_PACING),
            TraceLog::disabled("gateway"),
        )
    }

    /// Host delta artifacts for each (ecu, target image) pair and issue a
    /// signed campaign announcing them to `veh-1`.
    async fn issue_campaign(
        &self,
        campaign: &str,
        images: &[(&str, Vec<u8>)],
        policy: InstallPolicy,
    ) -> Manifest {
        let mut builder = ManifestBuilder::new(campaign).policy(policy);
        for (order, (ecu, image)) in images.iter().enumerate() {
            let url = format!("mem://{ecu}-{campaign}.patch");
            let patch = ota_delta::diff(&base_image(), image).expect("diff");
            self.artifacts.put(url.clone(), patch);
            self.base_images
                .insert(EcuId::from(*ecu), base_image().into());
            builder = builder.delta_target(ecu, &url, image, order as u32);
        }
        let (manifest, _signature) = builder.build_signed();

        let issuer = CampaignIssuer::new(
            Arc::clone(&self.authority) as Arc<dyn FleetAuthority>,
            self.notifier.clone(),
            authority_key(),
            TraceLog::disabled("backend"),
        );
        issuer
            .issue(&manifest, &[VehicleId::from("veh-1")])
            .await
            .expect("issue");
        manifest
    }

    fn programmer(&self, ecu: &str) -> &Arc<Mutex<FirmwareProgrammer>> {
        &self.programmers[&EcuId::from(ecu)]
    }

    fn shutdown(self) {
        for service in &self.services {
            service.abort();
        }
    }
}

async fn wait_for_state(handle: &AgentHandle, state: AgentState, budget: Duration) {
    let deadline = tokio::time::Instant::now() + budget;
    loop {
        let current = handle.status().await.state;
        if current == state {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {state}, still {current}"
        );
        sleep(Duration::from_millis(10)).await;
    }
}

async fn wait_for_heartbeat(
    rx: &mut broadcast::Receiver<(VehicleId, Heartbeat)>,
    state: AgentState,
    budget: Duration,
) -> Heartbeat {
    timeout(budget, async {
        loop {
            match rx.recv().await {
                Ok((_, heartbeat)) if heartbeat.state == state => return heartbeat,
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => panic!("heartbeat topic closed"),
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {state} heartbeat"))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn campaign_succeeds_across_two_ecus() {
    let fleet = Fleet::new(&[("engine", 0x100), ("adas", 0x200)]);
    let agent = fleet.start_agent(512);

    let engine_image = target_image(1);
    let adas_image = target_image(2);
    fleet
        .issue_campaign(
            "camp-ok",
            &[("engine", engine_image.clone()), ("adas", adas_image.clone())],
            InstallPolicy {
                requires_driver_approval: Some(true),
                min_battery_soc: Some(30),
                required_gear: Some(Gear::P),
                requires_parking_brake: Some(true),
                ..InstallPolicy::default()
            },
        )
        .await;

    wait_for_state(&agent, AgentState::WaitingForApproval, Duration::from_secs(5)).await;
    agent.approve_update(false).await.expect("approval should pass the gate");
    wait_for_state(&agent, AgentState::Succeeded, Duration::from_secs(30)).await;

    // ECUs confirmed, slots swapped, buffers hold the reconstructed images.
    for (ecu, image) in [("engine", &engine_image), ("adas", &adas_image)] {
        let programmer = fleet.programmer(ecu).lock();
        assert_eq!(programmer.mode(), EcuMode::Confirmed, "{ecu}");
        assert_eq!(programmer.slots().current(), Slot::B, "{ecu}");
        assert_eq!(programmer.buffer(), &image[..], "{ecu}");
    }

    // The authority's job record agrees with the local status.
    let status = agent.status().await;
    let job = fleet
        .authority
        .get_job(status.job_id.as_ref().expect("job id"))
        .await
        .unwrap()
        .expect("job record");
    assert_eq!(job.status, "SUCCEEDED");
    assert_eq!(agent.progress().await.percent, 100);

    agent.shutdown();
    fleet.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn simulated_boot_loop_rolls_back_and_names_the_ecu() {
    let fleet = Fleet::new(&[("engine", 0x100)]);
    let agent = fleet.start_agent(512);

    fleet
        .issue_campaign(
            "camp-bad",
            &[("engine", target_image(3))],
            InstallPolicy {
                requires_driver_approval: Some(true),
                ..InstallPolicy::default()
            },
        )
        .await;

    wait_for_state(&agent, AgentState::WaitingForApproval, Duration::from_secs(5)).await;
    agent.approve_update(true).await.expect("approval");
    wait_for_state(&agent, AgentState::RolledBack, Duration::from_secs(30)).await;

    let status = agent.status().await;
    let failure = status.last_failure.expect("failure detail");
    assert_eq!(failure.reason, FailureReason::FlashRejected);
    assert_eq!(failure.ecu_id.unwrap().as_str(), "engine");
    assert!(failure.message.contains("boot_loop"));

    // No slot change on the unit; it fell back to idle.
    let programmer = fleet.programmer("engine").lock();
    assert_eq!(programmer.mode(), EcuMode::Idle);
    assert_eq!(programmer.slots().current(), Slot::A);
    drop(programmer);

    let job = fleet
        .authority
        .get_job(status.job_id.as_ref().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(job.status, "ROLLED_BACK");
    assert!(job.details.unwrap().contains("flash_rejected"));

    agent.shutdown();
    fleet.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn emergency_stop_preempts_installation() {
    let fleet = Fleet::new(&[("engine", 0x100)]);
    // Tiny blocks so the install is long enough to interrupt.
    let agent = fleet.start_agent(16);
    let mut heartbeats = fleet.notifier.subscribe_heartbeats();

    fleet
        .issue_campaign(
            "camp-stop",
            &[("engine", target_image(4))],
            InstallPolicy {
                requires_driver_approval: Some(true),
                ..InstallPolicy::default()
            },
        )
        .await;

    wait_for_state(&agent, AgentState::WaitingForApproval, Duration::from_secs(5)).await;
    agent.approve_update(false).await.expect("approval");

    // The install holds the agent busy; observe entry via heartbeat.
    wait_for_heartbeat(&mut heartbeats, AgentState::Installing, Duration::from_secs(10)).await;

    fleet.authority.set_emergency_stop(true);
    fleet.notifier.publish_emergency_stop(EmergencyStopSignal {
        stop_scope: "fleet".into(),
        nonce: "stop-1".into(),
    });

    wait_for_heartbeat(&mut heartbeats, AgentState::Stopped, Duration::from_secs(10)).await;
    let status = agent.status().await;
    assert_eq!(status.state, AgentState::Stopped);
    assert_eq!(
        status.last_failure.expect("failure detail").reason,
        FailureReason::EmergencyStop
    );

    // The ECU stays wherever its last acknowledged call left it: still
    // buffering blocks, no verify/activate ever issued.
    let programmer = fleet.programmer("engine").lock();
    assert_eq!(programmer.mode(), EcuMode::Programming);
    assert_eq!(programmer.slots().current(), Slot::A);
    drop(programmer);

    agent.shutdown();
    fleet.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn approval_is_rejected_while_battery_is_low() {
    let fleet = Fleet::new(&[("engine", 0x100)]);
    let agent = fleet.start_agent(512);

    fleet
        .issue_campaign(
            "camp-gate",
            &[("engine", target_image(5))],
            InstallPolicy {
                requires_driver_approval: Some(true),
                min_battery_soc: Some(30),
                ..InstallPolicy::default()
            },
        )
        .await;

    wait_for_state(&agent, AgentState::WaitingForApproval, Duration::from_secs(5)).await;

    agent.set_vehicle_state(&VehicleStatePatch {
        battery_soc: Some(10),
        ..VehicleStatePatch::default()
    });

    let err = agent.approve_update(false).await.expect_err("gate should block");
    assert!(err.to_string().contains("battery too low (10% < 30%)"));

    // State unchanged; a few ticks later it still waits.
    sleep(TICK * 3).await;
    assert_eq!(agent.status().await.state, AgentState::WaitingForApproval);

    // Charge back up; the same approval now succeeds.
    agent.set_vehicle_state(&VehicleStatePatch {
        battery_soc: Some(80),
        ..VehicleStatePatch::default()
    });
    agent.approve_update(false).await.expect("approval after recharge");
    wait_for_state(&agent, AgentState::Succeeded, Duration::from_secs(30)).await;

    agent.shutdown();
    fleet.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn tampered_manifest_fails_the_campaign() {
    let fleet = Fleet::new(&[("engine", 0x100)]);
    let agent = fleet.start_agent(512);

    // Register a manifest signed by an unknown key, bypassing the issuer,
    // then announce it.
    let (manifest, _good_signature) = ManifestBuilder::new("camp-evil")
        .delta_target("engine", "mem://evil.patch", &target_image(6), 0)
        .build_signed();
    let rogue = ota_crypto::SigningKey::from_bytes(&[0xEEu8; 32]);
    let forged = manifest.sign(&rogue).expect("sign");
    fleet
        .authority
        .register_manifest(
            &manifest.manifest_ref,
            ota_authority::ManifestRecord {
                manifest_json: serde_json::to_string(&manifest).unwrap(),
                signature: forged,
            },
        )
        .await
        .unwrap();

    fleet.notifier.publish_notify(
        &VehicleId::from("veh-1"),
        ota_core::NotifyPayload {
            campaign_id: manifest.campaign_id.clone(),
            manifest_ref: manifest.manifest_ref.clone(),
            priority: 0,
            not_before: None,
            expires_at: None,
            nonce: "n-forged".into(),
        },
    );

    wait_for_state(&agent, AgentState::Failed, Duration::from_secs(10)).await;
    let failure = agent.status().await.last_failure.expect("failure detail");
    assert_eq!(failure.reason, FailureReason::ManifestSignatureInvalid);

    agent.shutdown();
    fleet.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn unconstrained_policy_installs_without_driver_approval() {
    let fleet = Fleet::new(&[("engine", 0x100)]);
    let agent = fleet.start_agent(512);

    fleet
        .issue_campaign(
            "camp-auto",
            &[("engine", target_image(7))],
            InstallPolicy::default(),
        )
        .await;

    // No approve_update call at all: an absent policy field is unconstrained.
    wait_for_state(&agent, AgentState::Succeeded, Duration::from_secs(30)).await;

    agent.shutdown();
    fleet.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn state_survives_restart() {
    let fleet = Fleet::new(&[("engine", 0x100)]);
    let agent = fleet.start_agent(512);

    fleet
        .issue_campaign(
            "camp-persist",
            &[("engine", target_image(8))],
            InstallPolicy::default(),
        )
        .await;
    wait_for_state(&agent, AgentState::Succeeded, Duration::from_secs(30)).await;
    let job_id = agent.status().await.job_id.expect("job id");
    agent.shutdown();

    // A fresh agent over the same state path resumes the terminal record.
    let resumed = fleet.start_agent(512);
    sleep(TICK * 3).await;
    let status = resumed.status().await;
    assert_eq!(status.state, AgentState::Succeeded);
    assert_eq!(status.job_id.as_ref(), Some(&job_id));

    resumed.shutdown();
    fleet.shutdown();
}
