//! Campaign issue flow: sign, register, announce.

use std::sync::Arc;

use ota_core::{NotifyPayload, TraceLog, Uuid, VehicleId};
use ota_crypto::SigningKey;
use ota_manifest::{Manifest, ManifestError};
use serde_json::json;
use thiserror::Error;
use tracing::info;

use crate::authority::{FleetAuthority, ManifestRecord};
use crate::error::AuthorityError;
use crate::notify::NotificationBus;

/// Campaign issue errors.
#[derive(Debug, Error)]
pub enum CampaignError {
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Authority(#[from] AuthorityError),
}

/// Issues campaigns on behalf of the fleet operator.
///
/// Holds the authority signing key; vehicles hold only the public half.
pub struct CampaignIssuer {
    authority: Arc<dyn FleetAuthority>,
    notifier: NotificationBus,
    signing_key: SigningKey,
    trace: TraceLog,
}

impl CampaignIssuer {
    /// Create an issuer.
    #[must_use]
    pub fn new(
        authority: Arc<dyn FleetAuthority>,
        notifier: NotificationBus,
        signing_key: SigningKey,
        trace: TraceLog,
    ) -> Self {
        Self {
            authority,
            notifier,
            signing_key,
            trace,
        }
    }

    /// Validate and sign a manifest, register it with the authority, and
    /// announce the campaign to the given vehicles.
    ///
    /// # Errors
    /// Returns an error if validation, signing, or registration fails.
    pub async fn issue(
        &self,
        manifest: &Manifest,
        vehicles: &[VehicleId],
    ) -> Result<(), CampaignError> {
        manifest.validate()?;
        let signature = manifest.sign(&self.signing_key)?;
        let manifest_json = serde_json::to_string(manifest)
            .map_err(ManifestError::Json)?;

        self.authority
            .register_manifest(
                &manifest.manifest_ref,
                ManifestRecord {
                    manifest_json,
                    signature,
                },
            )
            .await?;

        info!(campaign = %manifest.campaign_id, vehicles = vehicles.len(), "campaign issued");
        self.trace.log(
            "CAMPAIGN_STARTED",
            json!({
                "campaign_id": manifest.campaign_id.as_str(),
                "manifest_ref": manifest.manifest_ref,
                "targets": manifest.targets.len(),
            }),
        );

        for vehicle in vehicles {
            self.notifier.publish_notify(
                vehicle,
                NotifyPayload {
                    campaign_id: manifest.campaign_id.clone(),
                    manifest_ref: manifest.manifest_ref.clone(),
                    priority: 0,
                    not_before: None,
                    expires_at: Some(manifest.expires_at),
                    nonce: Uuid::new_v4().to_string(),
                },
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use ota_core::{CampaignId, EcuId, VehicleEvent};
    use ota_crypto::sha256_hex;
    use ota_manifest::{ArtifactType, InstallPolicy, UpdateTarget, SCHEMA_VERSION};

    use crate::memory::InMemoryAuthority;

    fn manifest(key: &SigningKey) -> Manifest {
        let campaign_id = CampaignId::from("camp-issue");
        let hash = sha256_hex(b"image");
        Manifest {
            schema_version: SCHEMA_VERSION,
            manifest_ref: campaign_id.manifest_ref(),
            campaign_id,
            created_at: Utc::now(),
            expires_at: Utc::now() + Duration::days(1),
            targets: vec![UpdateTarget {
                ecu_id: EcuId::from("engine"),
                component_name: "engine-fw".into(),
                base_version: "1.0.0".into(),
                target_version: "2.0.0".into(),
                artifact_type: ArtifactType::Delta,
                artifact_url: "mem://engine.patch".into(),
                artifact_size: 4096,
                artifact_signature: key.sign(hash.as_bytes()),
                artifact_hash: hash,
                install_order: 0,
            }],
            policy: InstallPolicy::default(),
        }
    }

    #[tokio::test]
    async fn issue_registers_and_notifies() {
        let authority = Arc::new(InMemoryAuthority::default());
        let notifier = NotificationBus::new();
        let key = SigningKey::from_bytes(&[13u8; 32]);
        let vehicle = VehicleId::from("veh-1");
        let mut events = notifier.subscribe_vehicle(&vehicle);

        let issuer = CampaignIssuer::new(
            Arc::clone(&authority) as Arc<dyn FleetAuthority>,
            notifier.clone(),
            SigningKey::from_bytes(&key.to_bytes()),
            TraceLog::disabled("backend"),
        );
        let manifest = manifest(&key);
        issuer.issue(&manifest, &[vehicle]).await.unwrap();

        // Registered, and the stored signature verifies over the canonical JSON.
        let record = authority
            .get_manifest(&manifest.manifest_ref)
            .await
            .unwrap()
            .expect("manifest should be stored");
        let parsed = Manifest::parse_str(&record.manifest_json).unwrap();
        parsed.verify(&key.public_key(), &record.signature).unwrap();

        // Announced.
        match events.recv().await.unwrap() {
            VehicleEvent::Notify(payload) => {
                assert_eq!(payload.manifest_ref, manifest.manifest_ref);
            }
            VehicleEvent::Wake => panic!("unexpected wake"),
        }
    }
}
