//! Firmware-programming state machine.
//!
//! Modes: `IDLE -> PROGRAMMING -> VERIFIED -> ACTIVATED -> CONFIRMED`, with
//! `enter_programming` reachable from any mode (a reset) and failure paths
//! returning to `IDLE`. Rejected calls never mutate the buffer or the slots.

use ota_core::{EcuId, EcuMode, Slot};
use ota_crypto::{sha256_hex, PublicKey, Signature};
use tracing::{info, warn};

use crate::error::{EcuError, EcuResult};

/// A/B image slot store. Only activation swaps which slot is current.
#[derive(Debug, Clone)]
pub struct Slots {
    current: Slot,
    target: Slot,
    version_a: Option<String>,
    version_b: Option<String>,
}

impl Slots {
    /// Fresh store: slot A current and holding `base_version`, slot B empty.
    #[must_use]
    pub fn new(base_version: impl Into<String>) -> Self {
        Self {
            current: Slot::A,
            target: Slot::B,
            version_a: Some(base_version.into()),
            version_b: None,
        }
    }

    /// Currently booted slot.
    #[must_use]
    pub const fn current(&self) -> Slot {
        self.current
    }

    /// Slot that the next activation will boot.
    #[must_use]
    pub const fn target(&self) -> Slot {
        self.target
    }

    /// Version stored in a slot, if any.
    #[must_use]
    pub fn version(&self, slot: Slot) -> Option<&str> {
        match slot {
            Slot::A => self.version_a.as_deref(),
            Slot::B => self.version_b.as_deref(),
        }
    }

    fn swap(&mut self) {
        std::mem::swap(&mut self.current, &mut self.target);
    }
}

/// Expectations recorded at `enter_programming`, consumed by `verify`.
#[derive(Debug, Clone)]
struct Expectations {
    size: u64,
    sha256: String,
    signature: Signature,
}

/// Read-only view of the programmer for status queries and tests.
#[derive(Debug, Clone)]
pub struct ProgrammerSnapshot {
    pub mode: EcuMode,
    pub buffer_len: usize,
    pub slot_current: Slot,
    pub slot_target: Slot,
}

/// Per-unit firmware-programming state machine.
#[derive(Debug)]
pub struct FirmwareProgrammer {
    ecu_id: EcuId,
    authority_key: PublicKey,
    mode: EcuMode,
    buffer: Vec<u8>,
    expectations: Option<Expectations>,
    slots: Slots,
}

impl FirmwareProgrammer {
    /// Create an idle programmer trusting `authority_key`.
    #[must_use]
    pub fn new(ecu_id: EcuId, authority_key: PublicKey, slots: Slots) -> Self {
        Self {
            ecu_id,
            authority_key,
            mode: EcuMode::Idle,
            buffer: Vec::new(),
            expectations: None,
            slots,
        }
    }

    /// Current mode.
    #[must_use]
    pub const fn mode(&self) -> EcuMode {
        self.mode
    }

    /// Reassembly buffer contents.
    #[must_use]
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    /// Slot store.
    #[must_use]
    pub const fn slots(&self) -> &Slots {
        &self.slots
    }

    /// Snapshot for status queries.
    #[must_use]
    pub fn snapshot(&self) -> ProgrammerSnapshot {
        ProgrammerSnapshot {
            mode: self.mode,
            buffer_len: self.buffer.len(),
            slot_current: self.slots.current(),
            slot_target: self.slots.target(),
        }
    }

    /// Enter programming mode, clearing the buffer and recording the
    /// expectations `verify` will check. Valid from any mode.
    pub fn enter_programming(&mut self, size: u64, sha256: String, signature: Signature) {
        info!(ecu = %self.ecu_id, size, "entering programming mode");
        self.mode = EcuMode::Programming;
        self.buffer.clear();
        self.expectations = Some(Expectations {
            size,
            sha256,
            signature,
        });
    }

    /// Write a block at an absolute offset, zero-extending the buffer as
    /// needed. Writes may arrive out of order and may overlap.
    ///
    /// # Errors
    /// Returns `BadState` outside `PROGRAMMING`.
    pub fn write_block(&mut self, offset: u64, block: &[u8]) -> EcuResult<()> {
        if self.mode != EcuMode::Programming {
            return Err(EcuError::BadState {
                operation: "write_block",
                mode: self.mode,
            });
        }
        let offset = usize::try_from(offset)
            .map_err(|_| EcuError::InvalidParams(format!("offset {offset} out of range")))?;
        let end = offset + block.len();
        if self.buffer.len() < end {
            self.buffer.resize(end, 0);
        }
        self.buffer[offset..end].copy_from_slice(block);
        Ok(())
    }

    /// Check the buffered image against the recorded expectations.
    ///
    /// The SHA-256 of the buffer must equal the expected digest, and the
    /// expected signature must verify over the UTF-8 bytes of that digest
    /// string using the authority public key. Either failure resets to
    /// `IDLE`.
    ///
    /// # Errors
    /// Returns `BadState`, `ShaMismatch`, or `SignatureInvalid`.
    pub fn verify(&mut self) -> EcuResult<()> {
        if self.mode != EcuMode::Programming {
            return Err(EcuError::BadState {
                operation: "verify",
                mode: self.mode,
            });
        }
        let expectations = self.expectations.as_ref().ok_or(EcuError::BadState {
            operation: "verify",
            mode: self.mode,
        })?;

        let actual = sha256_hex(&self.buffer);
        if actual != expectations.sha256 {
            warn!(ecu = %self.ecu_id, expected = %expectations.sha256, %actual, "firmware digest mismatch");
            self.mode = EcuMode::Idle;
            return Err(EcuError::ShaMismatch {
                expected: expectations.sha256.clone(),
                actual,
            });
        }

        if self
            .authority_key
            .verify(expectations.sha256.as_bytes(), &expectations.signature)
            .is_err()
        {
            warn!(ecu = %self.ecu_id, "firmware signature rejected");
            self.mode = EcuMode::Idle;
            return Err(EcuError::SignatureInvalid);
        }

        info!(ecu = %self.ecu_id, size = self.buffer.len(), "firmware verified");
        self.mode = EcuMode::Verified;
        Ok(())
    }

    /// Swap the A/B slots and mark the unit activated.
    ///
    /// With `simulate_failure` the unit reports a boot loop instead: mode
    /// returns to `IDLE` and the slots are left untouched.
    ///
    /// # Errors
    /// Returns `BadState` outside `VERIFIED`, or `BootLoop` when the
    /// simulated failure is requested.
    pub fn activate(&mut self, simulate_failure: bool) -> EcuResult<()> {
        if self.mode != EcuMode::Verified {
            return Err(EcuError::BadState {
                operation: "activate",
                mode: self.mode,
            });
        }
        if simulate_failure {
            warn!(ecu = %self.ecu_id, "boot loop detected, rolling back");
            self.mode = EcuMode::Idle;
            return Err(EcuError::BootLoop);
        }
        self.slots.swap();
        info!(ecu = %self.ecu_id, current = %self.slots.current(), "activated new firmware slot");
        self.mode = EcuMode::Activated;
        Ok(())
    }

    /// Confirm the activated image.
    ///
    /// # Errors
    /// Returns `BadState` outside `ACTIVATED`.
    pub fn confirm(&mut self) -> EcuResult<()> {
        if self.mode != EcuMode::Activated {
            return Err(EcuError::BadState {
                operation: "confirm",
                mode: self.mode,
            });
        }
        self.mode = EcuMode::Confirmed;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ota_crypto::SigningKey;

    fn authority() -> SigningKey {
        SigningKey::from_bytes(&[21u8; 32])
    }

    fn programmer() -> FirmwareProgrammer {
        FirmwareProgrammer::new(
            EcuId::from("engine"),
            authority().public_key(),
            Slots::new("1.0.0"),
        )
    }

    fn load(p: &mut FirmwareProgrammer, image: &[u8]) {
        let digest = sha256_hex(image);
        let signature = authority().sign(digest.as_bytes());
        p.enter_programming(image.len() as u64, digest, signature);
    }

    #[test]
    fn happy_path_reaches_confirmed() {
        let mut p = programmer();
        let image = vec![0xABu8; 1024];
        load(&mut p, &image);
        p.write_block(0, &image).unwrap();
        p.verify().unwrap();
        p.activate(false).unwrap();
        p.confirm().unwrap();
        assert_eq!(p.mode(), EcuMode::Confirmed);
        assert_eq!(p.slots().current(), Slot::B);
    }

    #[test]
    fn out_of_order_writes_are_order_independent() {
        let mut p = programmer();
        let mut image = vec![0u8; 4096];
        for (i, byte) in image.iter_mut().enumerate() {
            *byte = (i % 251) as u8;
        }
        load(&mut p, &image);

        // Offset 512 lands before offset 0; zero-extension then overwrite.
        p.write_block(512, &image[512..]).unwrap();
        p.write_block(0, &image[..512]).unwrap();
        p.verify().unwrap();
        assert_eq!(p.mode(), EcuMode::Verified);
    }

    #[test]
    fn sparse_write_zero_extends() {
        let mut p = programmer();
        load(&mut p, b"whatever");
        p.write_block(10, b"xy").unwrap();
        assert_eq!(p.buffer().len(), 12);
        assert_eq!(&p.buffer()[..10], &[0u8; 10]);
        assert_eq!(&p.buffer()[10..], b"xy");
    }

    #[test]
    fn corrupted_buffer_fails_sha_and_resets() {
        let mut p = programmer();
        let image = vec![0x5Au8; 4096];
        load(&mut p, &image);
        let mut corrupted = image;
        corrupted[100] ^= 0xFF;
        p.write_block(0, &corrupted).unwrap();

        let err = p.verify().unwrap_err();
        assert!(matches!(err, EcuError::ShaMismatch { .. }));
        assert_eq!(p.mode(), EcuMode::Idle);
    }

    #[test]
    fn forged_signature_fails_and_resets() {
        let mut p = programmer();
        let image = vec![0x5Au8; 256];
        let digest = sha256_hex(&image);
        let forged = SigningKey::from_bytes(&[99u8; 32]).sign(digest.as_bytes());
        p.enter_programming(image.len() as u64, digest, forged);
        p.write_block(0, &image).unwrap();

        let err = p.verify().unwrap_err();
        assert!(matches!(err, EcuError::SignatureInvalid));
        assert_eq!(p.mode(), EcuMode::Idle);
    }

    #[test]
    fn bad_state_calls_never_mutate() {
        let mut p = programmer();
        assert!(matches!(
            p.write_block(0, b"data"),
            Err(EcuError::BadState { operation: "write_block", .. })
        ));
        assert!(p.buffer().is_empty());

        assert!(matches!(p.verify(), Err(EcuError::BadState { .. })));
        assert!(matches!(p.activate(false), Err(EcuError::BadState { .. })));
        assert!(matches!(p.confirm(), Err(EcuError::BadState { .. })));
        assert_eq!(p.slots().current(), Slot::A);
        assert_eq!(p.mode(), EcuMode::Idle);
    }

    #[test]
    fn simulated_boot_loop_never_swaps_slots() {
        let mut p = programmer();
        let image = vec![1u8; 128];
        load(&mut p, &image);
        p.write_block(0, &image).unwrap();
        p.verify().unwrap();

        let err = p.activate(true).unwrap_err();
        assert!(matches!(err, EcuError::BootLoop));
        assert_eq!(p.mode(), EcuMode::Idle);
        assert_eq!(p.slots().current(), Slot::A);
        assert_eq!(p.slots().target(), Slot::B);
    }

    #[test]
    fn enter_programming_resets_from_any_mode() {
        let mut p = programmer();
        let image = vec![2u8; 64];
        load(&mut p, &image);
        p.write_block(0, &image).unwrap();
        p.verify().unwrap();
        assert_eq!(p.mode(), EcuMode::Verified);

        load(&mut p, b"fresh start");
        assert_eq!(p.mode(), EcuMode::Programming);
        assert!(p.buffer().is_empty());
    }

    #[test]
    fn overlapping_writes_last_wins() {
        let mut p = programmer();
        load(&mut p, b"irrelevant");
        p.write_block(0, b"aaaa").unwrap();
        p.write_block(2, b"bb").unwrap();
        assert_eq!(p.buffer(), b"aabb");
    }
}
