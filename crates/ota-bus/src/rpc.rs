//! Chunked JSON RPC over the frame medium.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{sleep, timeout_at, Instant};
use tracing::trace;

use crate::error::{BusError, BusResult};
use crate::frame::encode_message;
use crate::medium::BusEndpoint;

/// Default inter-frame pacing delay.
///
/// The medium is lossy under bursty load; pacing is a mitigation, not a
/// guarantee.
pub const DEFAULT_PACING: Duration = Duration::from_micros(200);

/// Command/reply channel pair for one RPC peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelPair {
    /// Channel the peer listens on.
    pub command: u32,
    /// Channel the peer replies on.
    pub reply: u32,
}

impl ChannelPair {
    /// Conventional pairing: replies travel on `command + 1`.
    #[must_use]
    pub const fn from_command(command: u32) -> Self {
        Self {
            command,
            reply: command + 1,
        }
    }
}

/// The JSON envelope carried by a logical bus message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcEnvelope {
    #[serde(rename = "m")]
    pub method: String,
    #[serde(rename = "p")]
    pub params: Value,
}

impl RpcEnvelope {
    /// Build an envelope.
    #[must_use]
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            method: method.into(),
            params,
        }
    }
}

/// RPC sender/receiver bound to one bus endpoint.
///
/// `send` provides no acknowledgment; request/response semantics and their
/// timeouts belong to each call site. No two concurrent `receive` calls
/// should watch the same channel from the same caller.
#[derive(Debug)]
pub struct BusRpc {
    endpoint: BusEndpoint,
    pacing: Duration,
}

impl BusRpc {
    /// Wrap an endpoint with default pacing.
    #[must_use]
    pub fn new(endpoint: BusEndpoint) -> Self {
        Self {
            endpoint,
            pacing: DEFAULT_PACING,
        }
    }

    /// Override the inter-frame pacing delay.
    #[must_use]
    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    /// Serialize `{method, params}` and emit it as paced frames on the
    /// addressed channel.
    ///
    /// # Errors
    /// Returns an error only if the envelope cannot be serialized.
    pub async fn send(&self, channel_id: u32, method: &str, params: Value) -> BusResult<()> {
        let envelope = RpcEnvelope::new(method, params);
        let payload =
            serde_json::to_vec(&envelope).map_err(|e| BusError::Serialize(e.to_string()))?;
        let frames = encode_message(channel_id, &payload);
        trace!(channel_id, method, frames = frames.len(), "bus send");
        for frame in frames {
            self.endpoint.emit(frame);
            sleep(self.pacing).await;
        }
        Ok(())
    }

    /// Block until a complete envelope arrives on `channel_id` or the
    /// timeout elapses.
    ///
    /// Frames for other channels are skipped. A reassembled buffer that
    /// fails to parse is silently discarded and accumulation resumes; the
    /// caller observes that only as latency or an eventual `None`.
    pub async fn receive(&mut self, channel_id: u32, timeout: Duration) -> Option<RpcEnvelope> {
        let deadline = Instant::now() + timeout;
        let mut buffer: Vec<u8> = Vec::new();

        loop {
            let frame = match timeout_at(deadline, self.endpoint.rx.recv()).await {
                Err(_elapsed) => return None,
                Ok(Err(RecvError::Closed)) => return None,
                Ok(Err(RecvError::Lagged(skipped))) => {
                    trace!(channel_id, skipped, "bus receiver lagged, frames lost");
                    continue;
                }
                Ok(Ok(frame)) => frame,
            };

            if frame.arbitration_id != channel_id {
                continue;
            }

            buffer.extend_from_slice(frame.chunk());
            if frame.more() {
                continue;
            }

            match serde_json::from_slice::<RpcEnvelope>(&buffer) {
                Ok(envelope) => return Some(envelope),
                Err(e) => {
                    trace!(channel_id, error = %e, "discarding unparseable bus message");
                    buffer.clear();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::BusFrame;
    use crate::medium::SharedBus;
    use serde_json::json;

    fn fast(rpc: BusRpc) -> BusRpc {
        rpc.with_pacing(Duration::from_micros(10))
    }

    #[tokio::test]
    async fn send_receive_round_trip() {
        let bus = SharedBus::default();
        let sender = fast(BusRpc::new(bus.attach()));
        let mut receiver = fast(BusRpc::new(bus.attach()));

        let receive = tokio::spawn(async move {
            receiver.receive(0x100, Duration::from_secs(2)).await
        });
        sender
            .send(0x100, "enter_programming", json!({"expected_size": 4096}))
            .await
            .unwrap();

        let envelope = receive.await.unwrap().expect("envelope should arrive");
        assert_eq!(envelope.method, "enter_programming");
        assert_eq!(envelope.params["expected_size"], 4096);
    }

    #[tokio::test]
    async fn large_message_spanning_sequence_wrap() {
        let bus = SharedBus::new(16 * 1024);
        let sender = fast(BusRpc::new(bus.attach()));
        let mut receiver = fast(BusRpc::new(bus.attach()));

        // > 256 chunks of 6 bytes so sequence numbers wrap at least once.
        let blob = "z".repeat(2000);
        let receive = tokio::spawn(async move {
            receiver.receive(0x300, Duration::from_secs(5)).await
        });
        sender.send(0x300, "write_block", json!({"blob": blob})).await.unwrap();

        let envelope = receive.await.unwrap().expect("envelope should arrive");
        assert_eq!(envelope.params["blob"].as_str().unwrap().len(), 2000);
    }

    #[tokio::test]
    async fn other_channels_are_ignored() {
        let bus = SharedBus::default();
        let sender = fast(BusRpc::new(bus.attach()));
        let mut receiver = fast(BusRpc::new(bus.attach()));

        let receive = tokio::spawn(async move {
            receiver.receive(0x101, Duration::from_secs(2)).await
        });
        sender.send(0x200, "noise", json!({})).await.unwrap();
        sender.send(0x101, "response", json!({"ok": true})).await.unwrap();

        let envelope = receive.await.unwrap().expect("envelope should arrive");
        assert_eq!(envelope.method, "response");
        assert_eq!(envelope.params["ok"], true);
    }

    #[tokio::test]
    async fn garbage_is_discarded_and_accumulation_resumes() {
        let bus = SharedBus::default();
        let endpoint = bus.attach();
        let sender = fast(BusRpc::new(bus.attach()));
        let mut receiver = fast(BusRpc::new(bus.attach()));

        let receive = tokio::spawn(async move {
            receiver.receive(0x100, Duration::from_secs(2)).await
        });

        // A terminated frame run that is not valid JSON.
        endpoint.emit(BusFrame::new(0x100, 0, false, b"{oops").unwrap());
        sender.send(0x100, "verify", json!({})).await.unwrap();

        let envelope = receive.await.unwrap().expect("real message should follow garbage");
        assert_eq!(envelope.method, "verify");
    }

    #[tokio::test]
    async fn timeout_returns_none() {
        let bus = SharedBus::default();
        let mut receiver = fast(BusRpc::new(bus.attach()));
        let got = receiver.receive(0x100, Duration::from_millis(50)).await;
        assert!(got.is_none());
    }
}
