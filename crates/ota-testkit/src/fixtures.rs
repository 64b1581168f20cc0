//! Deterministic fixtures: keys, firmware images, signed manifests.

use chrono::{Duration, Utc};
use ota_core::{CampaignId, EcuId};
use ota_crypto::{sha256_hex, Signature, SigningKey};
use ota_manifest::{ArtifactType, InstallPolicy, Manifest, UpdateTarget, SCHEMA_VERSION};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

/// Deterministic authority signing key for tests.
#[must_use]
pub fn authority_key() -> SigningKey {
    SigningKey::from_bytes(&[0xA5u8; 32])
}

/// The conventional 4 KiB base image: `0x41` repeated.
#[must_use]
pub fn base_image() -> Vec<u8> {
    vec![0x41u8; 4096]
}

/// A deterministic pseudo-random 4 KiB target image.
#[must_use]
pub fn target_image(seed: u64) -> Vec<u8> {
    let mut image = vec![0u8; 4096];
    StdRng::seed_from_u64(seed).fill_bytes(&mut image);
    image
}

/// Builder for signed campaign manifests.
pub struct ManifestBuilder {
    campaign_id: CampaignId,
    targets: Vec<UpdateTarget>,
    policy: InstallPolicy,
    key: SigningKey,
}

impl ManifestBuilder {
    /// Start a manifest for a campaign, signed by [`authority_key`].
    #[must_use]
    pub fn new(campaign_id: impl Into<CampaignId>) -> Self {
        Self {
            campaign_id: campaign_id.into(),
            targets: Vec::new(),
            policy: InstallPolicy {
                requires_driver_approval: Some(true),
                ..InstallPolicy::default()
            },
            key: authority_key(),
        }
    }

    /// Add a delta target whose artifact lives at `url` and reconstructs to
    /// `image`. The per-target signature covers the image's hex digest.
    #[must_use]
    pub fn delta_target(mut self, ecu: &str, url: &str, image: &[u8], order: u32) -> Self {
        let hash = sha256_hex(image);
        let signature = self.key.sign(hash.as_bytes());
        self.targets.push(UpdateTarget {
            ecu_id: EcuId::from(ecu),
            component_name: format!("{ecu}-fw"),
            base_version: "1.0.0".into(),
            target_version: "2.0.0".into(),
            artifact_type: ArtifactType::Delta,
            artifact_url: url.into(),
            artifact_size: image.len() as u64,
            artifact_hash: hash,
            artifact_signature: signature,
            install_order: order,
        });
        self
    }

    /// Override the install policy.
    #[must_use]
    pub fn policy(mut self, policy: InstallPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Build the manifest and its detached signature.
    ///
    /// # Panics
    /// Panics if the assembled manifest fails validation or signing; tests
    /// want that loudly.
    #[must_use]
    pub fn build_signed(self) -> (Manifest, Signature) {
        let manifest = Manifest {
            schema_version: SCHEMA_VERSION,
            manifest_ref: self.campaign_id.manifest_ref(),
            campaign_id: self.campaign_id,
            created_at: Utc::now(),
            expires_at: Utc::now() + Duration::days(7),
            targets: self.targets,
            policy: self.policy,
        };
        manifest.validate().expect("fixture manifest should validate");
        let signature = manifest.sign(&self.key).expect("fixture signing should succeed");
        (manifest, signature)
    }
}
