//! Sequential ECU flashing over the bus.
//!
//! Per ECU: `enter_programming` with metadata derived from the reconstructed
//! image, stream fixed-size blocks each awaiting acknowledgment, then
//! `verify`, `activate`, `confirm`. Any acknowledgment timeout, rejection,
//! or emergency stop observed mid-stream aborts the whole install.

use std::sync::Arc;

use bytes::Bytes;
use ota_bus::{BusRpc, ChannelPair, RpcEnvelope};
use ota_core::{EcuId, FailureReason, VehicleId};
use ota_crypto::sha256_hex;
use ota_manifest::UpdateTarget;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::agent::Signals;
use crate::config::AgentConfig;
use crate::error::FailureDetail;

/// Why a flash run was abandoned.
#[derive(Debug)]
pub(crate) enum FlashAbort {
    /// No acknowledgment within the step's timeout.
    Timeout { step: &'static str, offset: Option<usize> },
    /// The ECU answered `{ok: false}`.
    Rejected { step: &'static str, error: String },
    /// A confirmed emergency stop was observed between blocks.
    EmergencyStop,
}

impl FlashAbort {
    pub(crate) fn into_detail(self, ecu_id: EcuId) -> FailureDetail {
        match self {
            Self::Timeout { step, offset } => {
                let message = match offset {
                    Some(offset) => format!("no ack for {step} at offset {offset}"),
                    None => format!("no ack for {step}"),
                };
                let reason = if step == "write_block" {
                    FailureReason::FlashWriteTimeout
                } else {
                    FailureReason::FlashRejected
                };
                FailureDetail::for_ecu(reason, ecu_id, message)
            }
            Self::Rejected { step, error } => FailureDetail::for_ecu(
                FailureReason::FlashRejected,
                ecu_id,
                format!("{step} rejected: {error}"),
            ),
            Self::EmergencyStop => {
                FailureDetail::for_ecu(FailureReason::EmergencyStop, ecu_id, "install interrupted")
            }
        }
    }

    pub(crate) const fn is_emergency_stop(&self) -> bool {
        matches!(self, Self::EmergencyStop)
    }
}

/// Flash one ECU to completion.
pub(crate) async fn flash_ecu(
    rpc: &mut BusRpc,
    config: &AgentConfig,
    signals: &Arc<Mutex<Signals>>,
    channels: ChannelPair,
    ecu_id: &EcuId,
    image: &Bytes,
    target: &UpdateTarget,
    simulate_failure: bool,
) -> Result<(), FlashAbort> {
    info!(ecu = %ecu_id, size = image.len(), "flashing ECU");

    let meta = json!({
        "vehicle_id": config.vehicle_id.as_str(),
        "expected_size": image.len(),
        "expected_sha256": sha256_hex(image),
        "expected_signature": target.artifact_signature.to_base64(),
    });
    call(rpc, channels, "enter_programming", meta, config.enter_timeout, None).await?;

    let mut offset = 0usize;
    while offset < image.len() {
        if signals.lock().stop_requested {
            warn!(ecu = %ecu_id, offset, "installation interrupted by emergency stop");
            return Err(FlashAbort::EmergencyStop);
        }

        let end = (offset + config.block_size).min(image.len());
        let params = write_block_params(&config.vehicle_id, offset, &image[offset..end]);
        call(rpc, channels, "write_block", params, config.write_timeout, Some(offset)).await?;
        offset = end;
    }

    let vid = json!({"vehicle_id": config.vehicle_id.as_str()});
    call(rpc, channels, "verify", vid.clone(), config.step_timeout, None).await?;
    call(
        rpc,
        channels,
        "activate",
        json!({"vehicle_id": config.vehicle_id.as_str(), "simulate_failure": simulate_failure}),
        config.step_timeout,
        None,
    )
    .await?;
    call(rpc, channels, "confirm", vid, config.step_timeout, None).await?;

    info!(ecu = %ecu_id, "ECU flash complete");
    Ok(())
}

fn write_block_params(vehicle_id: &VehicleId, offset: usize, block: &[u8]) -> Value {
    #[derive(serde::Serialize)]
    struct Params<'a> {
        vehicle_id: &'a str,
        offset: usize,
        #[serde(rename = "block_b64", with = "ota_crypto::base64_bytes")]
        block: &'a [u8],
    }
    serde_json::to_value(Params {
        vehicle_id: vehicle_id.as_str(),
        offset,
        block,
    })
    .unwrap_or_else(|_| json!({}))
}

async fn call(
    rpc: &mut BusRpc,
    channels: ChannelPair,
    step: &'static str,
    params: Value,
    timeout: std::time::Duration,
    offset: Option<usize>,
) -> Result<(), FlashAbort> {
    if rpc.send(channels.command, step, params).await.is_err() {
        return Err(FlashAbort::Rejected {
            step,
            error: "unencodable request".into(),
        });
    }
    let Some(reply) = rpc.receive(channels.reply, timeout).await else {
        warn!(step, ?offset, "no acknowledgment from ECU");
        return Err(FlashAbort::Timeout { step, offset });
    };
    match ack_error(&reply) {
        None => Ok(()),
        Some(error) => {
            warn!(step, error, "ECU rejected step");
            Err(FlashAbort::Rejected { step, error })
        }
    }
}

fn ack_error(reply: &RpcEnvelope) -> Option<String> {
    if reply.params.get("ok").and_then(Value::as_bool) == Some(true) {
        return None;
    }
    Some(
        reply
            .params
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("malformed reply")
            .to_owned(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abort_details_carry_stable_reasons() {
        let timeout = FlashAbort::Timeout {
            step: "write_block",
            offset: Some(1024),
        }
        .into_detail(EcuId::from("engine"));
        assert_eq!(timeout.reason, FailureReason::FlashWriteTimeout);
        assert!(timeout.message.contains("1024"));

        let rejected = FlashAbort::Rejected {
            step: "activate",
            error: "boot_loop".into(),
        }
        .into_detail(EcuId::from("adas"));
        assert_eq!(rejected.reason, FailureReason::FlashRejected);
        assert!(rejected.message.contains("boot_loop"));

        assert!(FlashAbort::EmergencyStop.is_emergency_stop());
    }

    #[test]
    fn write_block_params_shape() {
        let params = write_block_params(&VehicleId::from("veh-1"), 512, b"\x01\x02");
        assert_eq!(params["offset"], 512);
        assert_eq!(params["block_b64"], "AQI=");
    }
}
