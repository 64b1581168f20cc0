//! Opaque identifiers used across the update pipeline.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new identifier from an owned string.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Get the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

string_id! {
    /// Identifies one vehicle in the fleet.
    VehicleId
}

string_id! {
    /// Identifies one flashable electronic control unit within a vehicle.
    EcuId
}

string_id! {
    /// Identifies one fleet-wide rollout campaign.
    CampaignId
}

string_id! {
    /// Identifies one per-vehicle update job, owned by the fleet authority.
    JobId
}

impl CampaignId {
    /// Derive the deterministic manifest reference for this campaign.
    #[must_use]
    pub fn manifest_ref(&self) -> String {
        format!("manifest-{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_ref_derivation() {
        let campaign = CampaignId::from("camp-2024-11");
        assert_eq!(campaign.manifest_ref(), "manifest-camp-2024-11");
    }

    #[test]
    fn id_serde_transparent() {
        let ecu = EcuId::from("engine");
        let json = serde_json::to_string(&ecu).unwrap();
        assert_eq!(json, "\"engine\"");
        let back: EcuId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ecu);
    }
}
