//! Tagged request/response union for the programming RPCs.
//!
//! Requests are validated at the boundary: unknown methods and malformed or
//! unexpected fields are rejected explicitly instead of being looked up with
//! defaults.

use ota_bus::RpcEnvelope;
use ota_core::{FailureReason, VehicleId};
use ota_crypto::Signature;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::EcuError;

/// Wire method name used for all reply envelopes.
pub const RESPONSE_METHOD: &str = "response";

/// Parameters of `enter_programming`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnterProgrammingParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vehicle_id: Option<VehicleId>,
    pub expected_size: u64,
    /// Lowercase-hex SHA-256 the buffered image must hash to.
    pub expected_sha256: String,
    /// Signature over the UTF-8 bytes of `expected_sha256`.
    pub expected_signature: Signature,
}

/// Parameters of `write_block`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WriteBlockParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vehicle_id: Option<VehicleId>,
    pub offset: u64,
    #[serde(rename = "block_b64", with = "ota_crypto::base64_bytes")]
    pub block: Vec<u8>,
}

/// Parameters of `verify` and `confirm`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StepParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vehicle_id: Option<VehicleId>,
}

/// Parameters of `activate`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActivateParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vehicle_id: Option<VehicleId>,
    #[serde(default)]
    pub simulate_failure: bool,
}

/// One programming RPC, dispatched by method name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "m", content = "p", rename_all = "snake_case")]
pub enum EcuRequest {
    EnterProgramming(EnterProgrammingParams),
    WriteBlock(WriteBlockParams),
    Verify(StepParams),
    Activate(ActivateParams),
    Confirm(StepParams),
}

impl EcuRequest {
    /// Known method names.
    pub const METHODS: [&'static str; 5] = [
        "enter_programming",
        "write_block",
        "verify",
        "activate",
        "confirm",
    ];

    /// Parse a bus envelope into a validated request.
    ///
    /// # Errors
    /// `MethodNotFound` for unknown methods, `InvalidParams` when the
    /// parameter object does not match the method's shape.
    pub fn from_envelope(envelope: &RpcEnvelope) -> Result<Self, EcuError> {
        if !Self::METHODS.contains(&envelope.method.as_str()) {
            return Err(EcuError::MethodNotFound(envelope.method.clone()));
        }
        let tagged = json!({"m": envelope.method, "p": envelope.params});
        serde_json::from_value(tagged).map_err(|e| EcuError::InvalidParams(e.to_string()))
    }

    /// Wire method name of this request.
    #[must_use]
    pub const fn method(&self) -> &'static str {
        match self {
            Self::EnterProgramming(_) => "enter_programming",
            Self::WriteBlock(_) => "write_block",
            Self::Verify(_) => "verify",
            Self::Activate(_) => "activate",
            Self::Confirm(_) => "confirm",
        }
    }
}

/// Synchronous `{ok, error?}` reply to every programming RPC.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EcuResponse {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EcuResponse {
    /// Success reply.
    #[must_use]
    pub const fn success() -> Self {
        Self {
            ok: true,
            error: None,
        }
    }

    /// Failure reply carrying a stable reason tag.
    #[must_use]
    pub fn fail(reason: FailureReason) -> Self {
        Self {
            ok: false,
            error: Some(reason.as_str().to_owned()),
        }
    }
}

impl From<&EcuError> for EcuResponse {
    fn from(err: &EcuError) -> Self {
        Self::fail(err.reason())
    }
}
