//! Agent configuration.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use ota_bus::ChannelPair;
use ota_core::{EcuId, VehicleId};
use ota_crypto::PublicKey;

/// Configuration for one vehicle agent.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub vehicle_id: VehicleId,
    /// Path of the durable `{state, job_id, campaign_id}` record.
    pub state_path: PathBuf,
    /// Directory artifacts are downloaded into.
    pub download_dir: PathBuf,
    /// Control-loop tick interval.
    pub tick_interval: Duration,
    /// Firmware streaming block size in bytes.
    pub block_size: usize,
    /// Ack timeout for `enter_programming`.
    pub enter_timeout: Duration,
    /// Ack timeout for each `write_block`.
    pub write_timeout: Duration,
    /// Ack timeout for `verify`/`activate`/`confirm`.
    pub step_timeout: Duration,
    /// Bus channel pair per targeted ECU.
    pub ecus: HashMap<EcuId, ChannelPair>,
    /// Authority public key trusted for manifest verification.
    pub authority_public_key: PublicKey,
}

impl AgentConfig {
    /// Configuration with conventional timeouts and block size.
    #[must_use]
    pub fn new(
        vehicle_id: VehicleId,
        state_path: PathBuf,
        download_dir: PathBuf,
        ecus: HashMap<EcuId, ChannelPair>,
        authority_public_key: PublicKey,
    ) -> Self {
        Self {
            vehicle_id,
            state_path,
            download_dir,
            tick_interval: Duration::from_secs(1),
            block_size: 512,
            enter_timeout: Duration::from_secs(2),
            write_timeout: Duration::from_secs(3),
            step_timeout: Duration::from_secs(5),
            ecus,
            authority_public_key,
        }
    }

    /// Override the tick interval (tests run much faster than a vehicle).
    #[must_use]
    pub fn with_tick_interval(mut self, tick_interval: Duration) -> Self {
        self.tick_interval = tick_interval;
        self
    }
}
