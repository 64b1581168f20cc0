//! ECU programming errors.

use ota_core::{EcuMode, FailureReason};
use thiserror::Error;

/// Failures of the firmware-programming state machine and its RPC boundary.
#[derive(Debug, Error)]
pub enum EcuError {
    /// Operation invoked outside its required predecessor state.
    #[error("bad state: {operation} not valid in {mode}")]
    BadState {
        operation: &'static str,
        mode: EcuMode,
    },

    /// Buffer digest does not match the expectation recorded at
    /// `enter_programming`.
    #[error("sha mismatch: expected {expected}, got {actual}")]
    ShaMismatch { expected: String, actual: String },

    /// Signature over the expected digest string did not verify.
    #[error("signature invalid")]
    SignatureInvalid,

    /// Simulated boot loop during activation; the slot swap was rolled back.
    #[error("boot loop detected, rolled back")]
    BootLoop,

    /// Unknown RPC method.
    #[error("method not found: {0}")]
    MethodNotFound(String),

    /// RPC parameters missing or malformed.
    #[error("invalid params: {0}")]
    InvalidParams(String),
}

impl EcuError {
    /// The stable reason tag reported in the RPC response envelope.
    #[must_use]
    pub const fn reason(&self) -> FailureReason {
        match self {
            Self::BadState { .. } => FailureReason::BadState,
            Self::ShaMismatch { .. } => FailureReason::ShaMismatch,
            Self::SignatureInvalid => FailureReason::SignatureInvalid,
            Self::BootLoop => FailureReason::BootLoop,
            Self::MethodNotFound(_) => FailureReason::MethodNotFound,
            Self::InvalidParams(_) => FailureReason::InvalidParams,
        }
    }
}

/// Result type alias for ECU operations.
pub type EcuResult<T> = Result<T, EcuError>;
