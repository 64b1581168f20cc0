//! Canonical JSON serialization for signing.
//!
//! The canonical form is compact JSON with lexicographically sorted object
//! keys. It is part of the wire contract: signer and verifier must reproduce
//! the identical byte string or verification spuriously fails.

use serde::Serialize;

use crate::error::{CryptoError, CryptoResult};
use crate::keys::{PublicKey, Signature, SigningKey};

/// Serialize a value to its canonical JSON bytes.
///
/// Object keys are sorted because `serde_json`'s default map representation
/// is ordered; nested maps inherit the same ordering. Compact separators (no
/// whitespace) complete the canonical form.
///
/// # Errors
/// Returns an error if the value cannot be represented as JSON.
pub fn canonical_json_bytes<T: Serialize>(value: &T) -> CryptoResult<Vec<u8>> {
    let json = serde_json::to_value(value)
        .map_err(|e| CryptoError::SerializationError(e.to_string()))?;
    serde_json::to_vec(&json).map_err(|e| CryptoError::SerializationError(e.to_string()))
}

/// Sign the canonical JSON serialization of a value.
///
/// # Errors
/// Returns an error if canonical serialization fails.
pub fn sign_canonical<T: Serialize>(key: &SigningKey, value: &T) -> CryptoResult<Signature> {
    let bytes = canonical_json_bytes(value)?;
    Ok(key.sign(&bytes))
}

/// Verify a detached signature over the canonical JSON serialization of a
/// value.
///
/// # Errors
/// Returns an error if serialization fails or the signature does not verify.
pub fn verify_canonical<T: Serialize>(
    key: &PublicKey,
    value: &T,
    signature: &Signature,
) -> CryptoResult<()> {
    let bytes = canonical_json_bytes(value)?;
    key.verify(&bytes, signature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn keys_are_sorted() {
        let value = json!({"zeta": 1, "alpha": {"nested_z": 2, "nested_a": 3}});
        let bytes = canonical_json_bytes(&value).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"alpha":{"nested_a":3,"nested_z":2},"zeta":1}"#
        );
    }

    #[test]
    fn canonical_form_is_stable_across_struct_field_order() {
        #[derive(Serialize)]
        struct Forward {
            b: u32,
            a: u32,
        }
        let bytes = canonical_json_bytes(&Forward { b: 2, a: 1 }).unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), r#"{"a":1,"b":2}"#);
    }

    #[test]
    fn sign_verify_round_trip() {
        let sk = SigningKey::from_bytes(&[5u8; 32]);
        let value = json!({"campaign_id": "c1", "targets": ["engine", "adas"]});
        let sig = sign_canonical(&sk, &value).unwrap();
        assert!(verify_canonical(&sk.public_key(), &value, &sig).is_ok());
    }

    #[test]
    fn any_byte_flip_invalidates() {
        let sk = SigningKey::from_bytes(&[5u8; 32]);
        let value = json!({"campaign_id": "c1", "schema_version": 1});
        let sig = sign_canonical(&sk, &value).unwrap();
        let pk = sk.public_key();

        let bytes = canonical_json_bytes(&value).unwrap();
        for i in 0..bytes.len() {
            let mut tampered = bytes.clone();
            tampered[i] ^= 0x01;
            assert!(
                pk.verify(&tampered, &sig).is_err(),
                "flip at byte {i} should invalidate the signature"
            );
        }
    }
}
