//! OTA Bus - a simulated bandwidth-limited, frame-oriented in-vehicle bus.
//!
//! JSON-encoded RPC envelopes are split into 8-byte frames on a shared,
//! lossy, broadcast medium addressed by numeric channel identifiers. There
//! is no acknowledgment, retransmission, or duplicate suppression at this
//! layer; reliability is entirely the RPC caller's responsibility via
//! per-call timeouts.

#![forbid(unsafe_code)]

mod error;
mod frame;
mod medium;
mod rpc;

pub use error::*;
pub use frame::*;
pub use medium::*;
pub use rpc::*;
