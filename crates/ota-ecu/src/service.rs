//! Bus service task answering programming RPCs for one ECU.

use std::sync::Arc;
use std::time::Duration;

use ota_bus::{BusRpc, ChannelPair};
use ota_core::{EcuId, TraceLog};
use parking_lot::Mutex;
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::programmer::FirmwareProgrammer;
use crate::rpc::{EcuRequest, EcuResponse, RESPONSE_METHOD};

/// How long one `receive` poll waits before looping again.
const RECEIVE_POLL: Duration = Duration::from_millis(500);

/// Owns the RPC loop for one ECU.
///
/// The programmer is shared so status queries (and tests) can observe the
/// unit's mode and slots while the service runs.
pub struct EcuService {
    ecu_id: EcuId,
    channels: ChannelPair,
    rpc: BusRpc,
    programmer: Arc<Mutex<FirmwareProgrammer>>,
    trace: TraceLog,
}

impl EcuService {
    /// Create a service answering on `channels.command` and replying on
    /// `channels.reply`.
    #[must_use]
    pub fn new(
        ecu_id: EcuId,
        channels: ChannelPair,
        rpc: BusRpc,
        programmer: Arc<Mutex<FirmwareProgrammer>>,
        trace: TraceLog,
    ) -> Self {
        Self {
            ecu_id,
            channels,
            rpc,
            programmer,
            trace,
        }
    }

    /// Spawn the service loop as an owned task.
    #[must_use]
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Answer programming RPCs until the task is aborted or the medium
    /// closes.
    pub async fn run(mut self) {
        debug!(ecu = %self.ecu_id, listen = self.channels.command, "ECU service started");
        loop {
            let Some(envelope) = self.rpc.receive(self.channels.command, RECEIVE_POLL).await
            else {
                continue;
            };

            let response = self.handle(&envelope.method, &envelope);
            let params = match serde_json::to_value(&response) {
                Ok(params) => params,
                Err(e) => {
                    warn!(ecu = %self.ecu_id, error = %e, "failed to encode reply");
                    json!({"ok": false})
                }
            };
            if let Err(e) = self.rpc.send(self.channels.reply, RESPONSE_METHOD, params).await {
                warn!(ecu = %self.ecu_id, error = %e, "failed to send reply");
            }
        }
    }

    fn handle(&self, method: &str, envelope: &ota_bus::RpcEnvelope) -> EcuResponse {
        debug!(ecu = %self.ecu_id, method, "RPC received");
        self.trace.log("ECU_RPC", json!({"ecu_id": self.ecu_id.as_str(), "method": method}));

        let request = match EcuRequest::from_envelope(envelope) {
            Ok(request) => request,
            Err(e) => {
                warn!(ecu = %self.ecu_id, method, error = %e, "rejecting RPC");
                return EcuResponse::from(&e);
            }
        };

        let mut programmer = self.programmer.lock();
        let outcome = match request {
            EcuRequest::EnterProgramming(params) => {
                programmer.enter_programming(
                    params.expected_size,
                    params.expected_sha256,
                    params.expected_signature,
                );
                Ok(())
            }
            EcuRequest::WriteBlock(params) => {
                programmer.write_block(params.offset, &params.block)
            }
            EcuRequest::Verify(_) => programmer.verify(),
            EcuRequest::Activate(params) => programmer.activate(params.simulate_failure),
            EcuRequest::Confirm(_) => programmer.confirm(),
        };

        match outcome {
            Ok(()) => EcuResponse::success(),
            Err(e) => {
                warn!(ecu = %self.ecu_id, error = %e, "RPC failed");
                EcuResponse::from(&e)
            }
        }
    }
}
