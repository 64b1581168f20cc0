//! Ed25519 signing and verification.
//!
//! Thin type-safe wrappers around ed25519-dalek. Keys and signatures travel
//! inside JSON payloads, so their serde form is standard base64.

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use ed25519_dalek::{Signer, Verifier};
use serde::{Deserialize, Serialize};

use crate::error::{CryptoError, CryptoResult};

/// Ed25519 secret key size in bytes.
pub const SECRET_KEY_SIZE: usize = 32;

/// Ed25519 public key size in bytes.
pub const PUBLIC_KEY_SIZE: usize = 32;

/// Ed25519 signature size in bytes.
pub const SIGNATURE_SIZE: usize = 64;

/// Ed25519 signing key held by the fleet authority (issuer side).
pub struct SigningKey {
    inner: ed25519_dalek::SigningKey,
}

impl SigningKey {
    /// Generate a new random signing key.
    #[must_use]
    pub fn generate() -> Self {
        Self {
            inner: ed25519_dalek::SigningKey::generate(&mut rand::rngs::OsRng),
        }
    }

    /// Create from raw secret key bytes.
    #[must_use]
    pub fn from_bytes(bytes: &[u8; SECRET_KEY_SIZE]) -> Self {
        Self {
            inner: ed25519_dalek::SigningKey::from_bytes(bytes),
        }
    }

    /// Export the secret key bytes.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; SECRET_KEY_SIZE] {
        self.inner.to_bytes()
    }

    /// Get the corresponding public key.
    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            inner: self.inner.verifying_key(),
        }
    }

    /// Sign a message.
    #[must_use]
    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature {
            inner: self.inner.sign(message),
        }
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey").finish_non_exhaustive()
    }
}

/// Ed25519 public key distributed to vehicles and ECUs.
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey {
    inner: ed25519_dalek::VerifyingKey,
}

impl PublicKey {
    /// Create from raw public key bytes.
    ///
    /// # Errors
    /// Returns an error if the bytes are not a valid Ed25519 public key.
    pub fn from_bytes(bytes: &[u8; PUBLIC_KEY_SIZE]) -> CryptoResult<Self> {
        let inner = ed25519_dalek::VerifyingKey::from_bytes(bytes)
            .map_err(|_| CryptoError::InvalidPublicKey)?;
        Ok(Self { inner })
    }

    /// Decode from standard base64, the distribution encoding.
    ///
    /// # Errors
    /// Returns an error if decoding fails or the key is invalid.
    pub fn from_base64(encoded: &str) -> CryptoResult<Self> {
        let bytes = BASE64_STANDARD
            .decode(encoded)
            .map_err(|e| CryptoError::InvalidEncoding(e.to_string()))?;
        let arr: [u8; PUBLIC_KEY_SIZE] =
            bytes
                .as_slice()
                .try_into()
                .map_err(|_| CryptoError::InvalidLength {
                    expected: PUBLIC_KEY_SIZE,
                    actual: bytes.len(),
                })?;
        Self::from_bytes(&arr)
    }

    /// Export the public key bytes.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        self.inner.to_bytes()
    }

    /// Encode as standard base64.
    #[must_use]
    pub fn to_base64(&self) -> String {
        BASE64_STANDARD.encode(self.to_bytes())
    }

    /// Verify a signature over a message.
    ///
    /// # Errors
    /// Returns an error if the signature does not verify.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> CryptoResult<()> {
        self.inner
            .verify(message, &signature.inner)
            .map_err(|_| CryptoError::SignatureVerificationFailed)
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PublicKey({})", self.to_base64())
    }
}

impl Serialize for PublicKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        Self::from_base64(&encoded).map_err(serde::de::Error::custom)
    }
}

/// Detached Ed25519 signature.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    inner: ed25519_dalek::Signature,
}

impl Signature {
    /// Create from raw signature bytes.
    #[must_use]
    pub fn from_bytes(bytes: &[u8; SIGNATURE_SIZE]) -> Self {
        Self {
            inner: ed25519_dalek::Signature::from_bytes(bytes),
        }
    }

    /// Decode from standard base64, the transport encoding inside manifests
    /// and RPC payloads.
    ///
    /// # Errors
    /// Returns an error if decoding fails or the length is wrong.
    pub fn from_base64(encoded: &str) -> CryptoResult<Self> {
        let bytes = BASE64_STANDARD
            .decode(encoded)
            .map_err(|e| CryptoError::InvalidEncoding(e.to_string()))?;
        let arr: [u8; SIGNATURE_SIZE] =
            bytes
                .as_slice()
                .try_into()
                .map_err(|_| CryptoError::InvalidLength {
                    expected: SIGNATURE_SIZE,
                    actual: bytes.len(),
                })?;
        Ok(Self::from_bytes(&arr))
    }

    /// Export the signature bytes.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; SIGNATURE_SIZE] {
        self.inner.to_bytes()
    }

    /// Encode as standard base64.
    #[must_use]
    pub fn to_base64(&self) -> String {
        BASE64_STANDARD.encode(self.to_bytes())
    }
}

impl std::fmt::Debug for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Signature({})", self.to_base64())
    }
}

impl Serialize for Signature {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        Self::from_base64(&encoded).map_err(serde::de::Error::custom)
    }
}
