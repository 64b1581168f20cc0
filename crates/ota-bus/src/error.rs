//! Bus transport errors.
//!
//! Receive-side failures (timeout, malformed envelope) are deliberately NOT
//! errors: the caller observes them only as a `None` result, per the
//! transport contract.

use thiserror::Error;

/// Send-side bus errors.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("envelope serialization failed: {0}")]
    Serialize(String),

    #[error("frame chunk too large (len {len}, max {max})")]
    ChunkTooLarge { len: usize, max: usize },
}

/// Result type alias for bus operations.
pub type BusResult<T> = Result<T, BusError>;
