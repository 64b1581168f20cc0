//! OTA Core - shared types for the fleet OTA update simulator.
//!
//! This crate provides the identifiers, lifecycle state enums, failure
//! reason tags, and structured trace sink used by every other crate in the
//! workspace.

#![forbid(unsafe_code)]

mod id;
mod job;
mod notify;
mod reason;
mod state;
mod trace;
mod vehicle;

pub use id::*;
pub use job::*;
pub use notify::*;
pub use reason::*;
pub use state::*;
pub use trace::*;
pub use vehicle::*;

// Re-export commonly used external types
pub use chrono::{DateTime, Utc};
pub use uuid::Uuid;
