//! OTA Testkit - tracing setup and fixtures shared by tests.

#![forbid(unsafe_code)]

mod fixtures;
mod tracing_config;

pub use fixtures::*;
pub use tracing_config::*;
