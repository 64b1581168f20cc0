//! Structured JSONL event sink.
//!
//! Each service appends UPPER_SNAKE_CASE lifecycle events with metadata to a
//! per-service trace file. Write failures are logged, never propagated: the
//! trace is observability, not state.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use chrono::Utc;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tracing::warn;

/// Append-only JSONL trace sink for one service.
#[derive(Debug)]
pub struct TraceLog {
    service: String,
    path: Option<PathBuf>,
    lock: Mutex<()>,
}

impl TraceLog {
    /// Create a sink writing to `path`.
    #[must_use]
    pub fn new(service: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            service: service.into(),
            path: Some(path.into()),
            lock: Mutex::new(()),
        }
    }

    /// Create a sink that only emits `tracing` events, with no file backing.
    #[must_use]
    pub fn disabled(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            path: None,
            lock: Mutex::new(()),
        }
    }

    /// Record one event with metadata.
    pub fn log(&self, event: &str, metadata: Value) {
        let entry = json!({
            "timestamp": Utc::now().to_rfc3339(),
            "service": self.service,
            "event": event,
            "metadata": metadata,
        });
        tracing::debug!(service = %self.service, event, "trace event");

        let Some(path) = &self.path else { return };
        let line = entry.to_string();

        let _guard = self.lock.lock();
        if let Err(e) = append_line(path, &line) {
            warn!(service = %self.service, error = %e, "failed to write trace event");
        }
    }
}

fn append_line(path: &PathBuf, line: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{line}")
}
