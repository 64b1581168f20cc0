//! SHA-256 digest helpers.

use sha2::{Digest, Sha256};

/// SHA-256 digest size in bytes.
pub const DIGEST_SIZE: usize = 32;

/// Compute the SHA-256 digest of a byte slice.
#[must_use]
pub fn sha256(data: &[u8]) -> [u8; DIGEST_SIZE] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Compute the lowercase-hex SHA-256 digest of a byte slice.
///
/// This exact string (UTF-8 encoded) is the object signed in the firmware
/// trust chain; producers and verifiers must use it byte-identically.
#[must_use]
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256(data))
}
