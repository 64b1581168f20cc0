//! OTA Authority - the fleet side of the update pipeline.
//!
//! Provides the fleet authority RPC surface (manifest/job storage and
//! emergency-stop confirmation), the campaign notification bus, and the
//! artifact transfer used by vehicles to fetch update payloads.

#![forbid(unsafe_code)]

mod artifact;
mod authority;
mod campaign;
mod error;
mod memory;
mod notify;

pub use artifact::*;
pub use authority::*;
pub use campaign::*;
pub use error::*;
pub use memory::*;
pub use notify::*;
