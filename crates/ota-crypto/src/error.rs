//! Error types for cryptographic operations.

use thiserror::Error;

/// Errors from digest, signature, and canonicalization operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Key or signature material had the wrong length.
    #[error("invalid length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// Public key bytes do not form a valid Ed25519 point.
    #[error("invalid public key")]
    InvalidPublicKey,

    /// Signature verification failed.
    #[error("signature verification failed")]
    SignatureVerificationFailed,

    /// Base64 or hex decoding failed.
    #[error("invalid encoding: {0}")]
    InvalidEncoding(String),

    /// Canonical serialization failed.
    #[error("serialization error: {0}")]
    SerializationError(String),
}

/// Result type alias for cryptographic operations.
pub type CryptoResult<T> = Result<T, CryptoError>;
