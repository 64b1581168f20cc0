//! Fleet authority and artifact transfer errors.

use thiserror::Error;

/// Errors from the authority RPC surface.
#[derive(Debug, Error)]
pub enum AuthorityError {
    #[error("job {0} not found")]
    JobNotFound(String),

    #[error("authority unavailable: {0}")]
    Unavailable(String),

    #[error("manifest rejected: {0}")]
    ManifestRejected(String),
}

/// Result type alias for authority operations.
pub type AuthorityResult<T> = Result<T, AuthorityError>;

/// Errors from artifact transfer.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("transfer failed for {url}: {message}")]
    Transfer { url: String, message: String },

    #[error("artifact not found: {0}")]
    NotFound(String),

    #[error("hash mismatch for {path}: expected {expected}, got {actual}")]
    HashMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type alias for artifact operations.
pub type ArtifactResult<T> = Result<T, ArtifactError>;
