//! In-process notification bus.
//!
//! Per-vehicle topics (`ota/notify`, `ota/wake`), the fleet-wide
//! `ota/emergency_stop`, and the outbound `ota/heartbeat` stream. Delivery
//! is best-effort broadcast; a subscriber that is not listening misses the
//! message, as with any pub/sub transport.

use std::collections::HashMap;
use std::sync::Arc;

use ota_core::{EmergencyStopSignal, FleetEvent, Heartbeat, NotifyPayload, VehicleEvent, VehicleId};
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::debug;

const TOPIC_CAPACITY: usize = 64;

struct Inner {
    vehicle_topics: RwLock<HashMap<VehicleId, broadcast::Sender<VehicleEvent>>>,
    fleet: broadcast::Sender<FleetEvent>,
    heartbeats: broadcast::Sender<(VehicleId, Heartbeat)>,
}

/// Handle to the notification bus. Cloning is cheap and shares the bus.
#[derive(Clone)]
pub struct NotificationBus {
    inner: Arc<Inner>,
}

impl NotificationBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        let (fleet, _) = broadcast::channel(TOPIC_CAPACITY);
        let (heartbeats, _) = broadcast::channel(TOPIC_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                vehicle_topics: RwLock::new(HashMap::new()),
                fleet,
                heartbeats,
            }),
        }
    }

    fn vehicle_topic(&self, vehicle_id: &VehicleId) -> broadcast::Sender<VehicleEvent> {
        let mut topics = self.inner.vehicle_topics.write();
        topics
            .entry(vehicle_id.clone())
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .clone()
    }

    /// Subscribe to one vehicle's `ota/notify` and `ota/wake` topics.
    #[must_use]
    pub fn subscribe_vehicle(&self, vehicle_id: &VehicleId) -> broadcast::Receiver<VehicleEvent> {
        self.vehicle_topic(vehicle_id).subscribe()
    }

    /// Subscribe to the fleet-wide `ota/emergency_stop` topic.
    #[must_use]
    pub fn subscribe_fleet(&self) -> broadcast::Receiver<FleetEvent> {
        self.inner.fleet.subscribe()
    }

    /// Subscribe to `ota/heartbeat` from all vehicles.
    #[must_use]
    pub fn subscribe_heartbeats(&self) -> broadcast::Receiver<(VehicleId, Heartbeat)> {
        self.inner.heartbeats.subscribe()
    }

    /// Publish a campaign announcement to one vehicle.
    pub fn publish_notify(&self, vehicle_id: &VehicleId, payload: NotifyPayload) {
        debug!(vehicle = %vehicle_id, campaign = %payload.campaign_id, "ota/notify");
        let _ = self.vehicle_topic(vehicle_id).send(VehicleEvent::Notify(payload));
    }

    /// Publish a wake ping to one vehicle.
    pub fn publish_wake(&self, vehicle_id: &VehicleId) {
        let _ = self.vehicle_topic(vehicle_id).send(VehicleEvent::Wake);
    }

    /// Publish a fleet-wide emergency-stop signal.
    pub fn publish_emergency_stop(&self, signal: EmergencyStopSignal) {
        debug!(scope = %signal.stop_scope, "ota/emergency_stop");
        let _ = self.inner.fleet.send(FleetEvent::EmergencyStop(signal));
    }

    /// Publish one vehicle's heartbeat.
    pub fn publish_heartbeat(&self, vehicle_id: &VehicleId, heartbeat: Heartbeat) {
        let _ = self
            .inner
            .heartbeats
            .send((vehicle_id.clone(), heartbeat));
    }
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ota_core::{AgentState, CampaignId};

    fn notify_payload() -> NotifyPayload {
        NotifyPayload {
            campaign_id: CampaignId::from("c1"),
            manifest_ref: "manifest-c1".into(),
            priority: 1,
            not_before: None,
            expires_at: None,
            nonce: "n-1".into(),
        }
    }

    #[tokio::test]
    async fn notify_reaches_only_the_addressed_vehicle() {
        let bus = NotificationBus::new();
        let mut target = bus.subscribe_vehicle(&VehicleId::from("veh-1"));
        let mut other = bus.subscribe_vehicle(&VehicleId::from("veh-2"));

        bus.publish_notify(&VehicleId::from("veh-1"), notify_payload());

        match target.recv().await.unwrap() {
            VehicleEvent::Notify(payload) => assert_eq!(payload.campaign_id.as_str(), "c1"),
            VehicleEvent::Wake => panic!("unexpected wake"),
        }
        assert!(other.try_recv().is_err());
    }

    #[tokio::test]
    async fn emergency_stop_is_fleet_wide() {
        let bus = NotificationBus::new();
        let mut a = bus.subscribe_fleet();
        let mut b = bus.subscribe_fleet();

        bus.publish_emergency_stop(EmergencyStopSignal {
            stop_scope: "fleet".into(),
            nonce: "n-99".into(),
        });

        for rx in [&mut a, &mut b] {
            let FleetEvent::EmergencyStop(signal) = rx.recv().await.unwrap();
            assert_eq!(signal.nonce, "n-99");
        }
    }

    #[tokio::test]
    async fn heartbeats_fan_out() {
        let bus = NotificationBus::new();
        let mut hb = bus.subscribe_heartbeats();
        bus.publish_heartbeat(
            &VehicleId::from("veh-1"),
            Heartbeat {
                state: AgentState::Downloading,
                job_id: None,
                progress: 10,
            },
        );
        let (vehicle, heartbeat) = hb.recv().await.unwrap();
        assert_eq!(vehicle.as_str(), "veh-1");
        assert_eq!(heartbeat.state, AgentState::Downloading);
    }
}
