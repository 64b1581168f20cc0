//! Stable failure reason tags.
//!
//! A reason tag is surfaced identically through local status queries and
//! through the authority status report; the two must never disagree, so the
//! wire string lives here and nowhere else.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable, machine-readable reason attached to every failure outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// RPC invoked outside its required predecessor state.
    BadState,
    /// Firmware buffer digest does not match the expected SHA-256.
    ShaMismatch,
    /// Ed25519 signature over the firmware digest did not verify.
    SignatureInvalid,
    /// Simulated boot loop during activation; slot swap was not performed.
    BootLoop,
    /// RPC method not recognized by the receiver.
    MethodNotFound,
    /// RPC parameters missing or malformed.
    InvalidParams,
    /// Manifest could not be fetched from the fleet authority.
    ManifestUnavailable,
    /// Detached signature over the canonical manifest JSON did not verify.
    ManifestSignatureInvalid,
    /// Manifest is past its expiry time.
    ManifestExpired,
    /// Artifact transfer failed.
    DownloadFailed,
    /// Delta patch could not be applied to the base image.
    PatchFailed,
    /// An ECU acknowledgment timed out while streaming blocks.
    FlashWriteTimeout,
    /// An ECU explicitly rejected a programming step.
    FlashRejected,
    /// Confirmed fleet-authority emergency stop.
    EmergencyStop,
    /// The fleet authority was unreachable or returned an error.
    AuthorityUnavailable,
}

impl FailureReason {
    /// The stable wire tag.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::BadState => "bad_state",
            Self::ShaMismatch => "sha_mismatch",
            Self::SignatureInvalid => "signature_invalid",
            Self::BootLoop => "boot_loop",
            Self::MethodNotFound => "method_not_found",
            Self::InvalidParams => "invalid_params",
            Self::ManifestUnavailable => "manifest_unavailable",
            Self::ManifestSignatureInvalid => "manifest_signature_invalid",
            Self::ManifestExpired => "manifest_expired",
            Self::DownloadFailed => "download_failed",
            Self::PatchFailed => "patch_failed",
            Self::FlashWriteTimeout => "flash_write_timeout",
            Self::FlashRejected => "flash_rejected",
            Self::EmergencyStop => "emergency_stop",
            Self::AuthorityUnavailable => "authority_unavailable",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
