//! Agent-surface errors.

use ota_core::{AgentState, EcuId, FailureReason};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::preconditions::PreconditionFailure;

/// Why an approval attempt was rejected.
#[derive(Debug, Error)]
pub enum ApprovalError {
    #[error("not awaiting approval (state {0})")]
    NotAwaitingApproval(AgentState),

    #[error("precondition failed: {0}")]
    PreconditionFailed(PreconditionFailure),
}

/// Structured failure attached to a terminal transition.
///
/// The same value feeds the local status query and the authority status
/// report; the two must never disagree.
#[derive(Debug, Clone, Serialize)]
pub struct FailureDetail {
    pub reason: FailureReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ecu_id: Option<EcuId>,
    pub message: String,
}

impl FailureDetail {
    /// Detail with no ECU attribution.
    #[must_use]
    pub fn new(reason: FailureReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            ecu_id: None,
            message: message.into(),
        }
    }

    /// Detail naming the failing ECU.
    #[must_use]
    pub fn for_ecu(reason: FailureReason, ecu_id: EcuId, message: impl Into<String>) -> Self {
        Self {
            reason,
            ecu_id: Some(ecu_id),
            message: message.into(),
        }
    }

    /// JSON string form reported to the authority.
    #[must_use]
    pub fn to_report(&self) -> String {
        serde_json::to_value(self)
            .unwrap_or_else(|_| json!({"reason": self.reason.as_str()}))
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_carries_reason_tag_and_ecu() {
        let detail = FailureDetail::for_ecu(
            FailureReason::FlashWriteTimeout,
            EcuId::from("adas"),
            "no ack at offset 1024",
        );
        let report: serde_json::Value = serde_json::from_str(&detail.to_report()).unwrap();
        assert_eq!(report["reason"], "flash_write_timeout");
        assert_eq!(report["ecu_id"], "adas");
    }
}
