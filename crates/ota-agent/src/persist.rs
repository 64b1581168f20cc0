//! Durable agent state.
//!
//! The minimal record required to resume a campaign after restart, written
//! synchronously on every state transition.

use std::fs;
use std::io;
use std::path::PathBuf;

use ota_core::{AgentState, CampaignId, JobId};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// The persisted record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedState {
    pub state: AgentState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<JobId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub campaign_id: Option<CampaignId>,
}

/// Synchronous file-backed store for [`PersistedState`].
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    /// Create a store at the given path.
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Load the persisted record, tolerating a missing or corrupt file.
    #[must_use]
    pub fn load(&self) -> Option<PersistedState> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to read persisted state");
                return None;
            }
        };
        match serde_json::from_str::<PersistedState>(&contents) {
            Ok(state) => {
                info!(state = %state.state, "resumed persisted state");
                Some(state)
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "corrupt persisted state ignored");
                None
            }
        }
    }

    /// Write the record synchronously.
    ///
    /// # Errors
    /// Returns an error if the write fails.
    pub fn save(&self, state: &PersistedState) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string(state)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(&self.path, json)
    }
}
