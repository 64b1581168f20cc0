//! OTA Manifest - campaign manifest parsing, validation, and trust checks.
//!
//! A manifest is immutable once signed. Its authenticity is exactly the
//! validity of a detached Ed25519 signature over its canonical (sorted-key)
//! JSON serialization; nothing about a manifest may be trusted before that
//! check passes.

#![forbid(unsafe_code)]

use std::fmt;

use chrono::{DateTime, Utc};
use ota_core::{CampaignId, EcuId, Gear, Ignition};
use ota_crypto::{
    sign_canonical, verify_canonical, CryptoError, PublicKey, Signature, SigningKey,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Manifest schema version understood by this implementation.
pub const SCHEMA_VERSION: u32 = 1;

/// Manifest parsing/validation/trust errors.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("invalid manifest field `{field}`: {message}")]
    Invalid {
        field: &'static str,
        message: String,
    },

    #[error("unsupported schema version {version}")]
    UnsupportedSchemaVersion { version: u32 },

    #[error("manifest expired at {expires_at}")]
    Expired { expires_at: DateTime<Utc> },

    #[error("manifest JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// How an artifact relates to the firmware already on the ECU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactType {
    /// The artifact is the complete target image.
    Full,
    /// The artifact is a binary delta against the ECU's base image.
    Delta,
}

impl fmt::Display for ArtifactType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => f.write_str("full"),
            Self::Delta => f.write_str("delta"),
        }
    }
}

/// One per-ECU update target within a campaign.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateTarget {
    pub ecu_id: EcuId,
    pub component_name: String,
    pub base_version: String,
    pub target_version: String,
    pub artifact_type: ArtifactType,
    pub artifact_url: String,
    pub artifact_size: u64,
    /// Lowercase-hex SHA-256 of the **target image** (after reconstruction
    /// for delta artifacts).
    pub artifact_hash: String,
    /// Base64 Ed25519 signature over the UTF-8 bytes of `artifact_hash`.
    pub artifact_signature: Signature,
    pub install_order: u32,
}

/// Policy gating installation on driver approval and vehicle physical state.
///
/// An absent field means "unconstrained".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InstallPolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires_driver_approval: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires_parked: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_battery_soc: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_gear: Option<Gear>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires_parking_brake: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires_ignition_state: Option<Ignition>,
}

/// Signed description of a campaign's per-ECU update targets and policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    pub schema_version: u32,
    pub campaign_id: CampaignId,
    pub manifest_ref: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub targets: Vec<UpdateTarget>,
    #[serde(default)]
    pub policy: InstallPolicy,
}

impl Manifest {
    /// Parse a manifest from its JSON encoding and validate it.
    ///
    /// Parsing does NOT establish trust; callers must still check the
    /// detached signature with [`Manifest::verify`].
    ///
    /// # Errors
    /// Returns an error if JSON parsing or validation fails.
    pub fn parse_str(input: &str) -> Result<Self, ManifestError> {
        let manifest: Self = serde_json::from_str(input)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Validate the manifest for internal consistency.
    ///
    /// # Errors
    /// Returns an error if any requirement is violated.
    pub fn validate(&self) -> Result<(), ManifestError> {
        if self.schema_version != SCHEMA_VERSION {
            return Err(ManifestError::UnsupportedSchemaVersion {
                version: self.schema_version,
            });
        }
        if self.manifest_ref != self.campaign_id.manifest_ref() {
            return Err(ManifestError::Invalid {
                field: "manifest_ref",
                message: format!(
                    "expected {}, got {}",
                    self.campaign_id.manifest_ref(),
                    self.manifest_ref
                ),
            });
        }
        if self.expires_at <= self.created_at {
            return Err(ManifestError::Invalid {
                field: "expires_at",
                message: "must be after created_at".into(),
            });
        }
        if self.targets.is_empty() {
            return Err(ManifestError::Invalid {
                field: "targets",
                message: "at least one target required".into(),
            });
        }
        for target in &self.targets {
            target.validate()?;
        }
        Ok(())
    }

    /// Check wall-clock expiry.
    ///
    /// # Errors
    /// Returns `Expired` if `now` is past `expires_at`.
    pub fn check_expiry(&self, now: DateTime<Utc>) -> Result<(), ManifestError> {
        if now > self.expires_at {
            return Err(ManifestError::Expired {
                expires_at: self.expires_at,
            });
        }
        Ok(())
    }

    /// Targets in installation order: ascending `install_order`, ties
    /// resolved by list position (stable).
    #[must_use]
    pub fn targets_in_install_order(&self) -> Vec<&UpdateTarget> {
        let mut ordered: Vec<&UpdateTarget> = self.targets.iter().collect();
        ordered.sort_by_key(|t| t.install_order);
        ordered
    }

    /// Find the target for a given ECU, if any.
    #[must_use]
    pub fn target_for(&self, ecu_id: &EcuId) -> Option<&UpdateTarget> {
        self.targets.iter().find(|t| &t.ecu_id == ecu_id)
    }

    /// Sign the canonical JSON serialization of this manifest.
    ///
    /// # Errors
    /// Returns an error if canonical serialization fails.
    pub fn sign(&self, key: &SigningKey) -> Result<Signature, ManifestError> {
        Ok(sign_canonical(key, self)?)
    }

    /// Verify a detached signature over this manifest's canonical JSON.
    ///
    /// # Errors
    /// Returns an error if serialization fails or the signature is invalid.
    pub fn verify(&self, key: &PublicKey, signature: &Signature) -> Result<(), ManifestError> {
        Ok(verify_canonical(key, self, signature)?)
    }
}

impl UpdateTarget {
    fn validate(&self) -> Result<(), ManifestError> {
        if self.artifact_hash.len() != 64
            || !self.artifact_hash.chars().all(|c| c.is_ascii_hexdigit())
            || self.artifact_hash.chars().any(|c| c.is_ascii_uppercase())
        {
            return Err(ManifestError::Invalid {
                field: "artifact_hash",
                message: format!(
                    "expected 64 lowercase hex chars for {}",
                    self.ecu_id
                ),
            });
        }
        if self.artifact_url.is_empty() {
            return Err(ManifestError::Invalid {
                field: "artifact_url",
                message: format!("empty for {}", self.ecu_id),
            });
        }
        if self.artifact_size == 0 {
            return Err(ManifestError::Invalid {
                field: "artifact_size",
                message: format!("zero for {}", self.ecu_id),
            });
        }
        Ok(())
    }
}
