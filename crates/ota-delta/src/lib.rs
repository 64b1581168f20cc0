//! OTA Delta - binary delta codec for firmware images.
//!
//! A patch is a framed stream of copy/insert instructions against a known
//! base image: `patch(base, diff(base, target)) == target` for any inputs,
//! and applying the same patch to the same base is deterministic.
//!
//! There is no verification that the base used for patching matches the base
//! the diff was generated against; a wrong base silently yields wrong bytes,
//! caught only by the hash check performed after reconstruction.

#![forbid(unsafe_code)]

use std::collections::HashMap;

use thiserror::Error;

/// Patch container magic bytes: "ODLT".
pub const PATCH_MAGIC: [u8; 4] = [0x4F, 0x44, 0x4C, 0x54];

/// Current patch container version.
pub const PATCH_VERSION: u16 = 1;

/// Fixed container header length: magic + version + target length.
pub const PATCH_HEADER_LEN: usize = 10;

/// Granularity of base-image matching during diff.
const MATCH_BLOCK: usize = 64;

const OP_COPY: u8 = 0x00;
const OP_INSERT: u8 = 0x01;

/// Patch parsing/application errors.
#[derive(Debug, Error)]
pub enum DeltaError {
    #[error("invalid magic bytes (expected ODLT, got {got:?})")]
    InvalidMagic { got: [u8; 4] },

    #[error("unsupported patch version {version}")]
    UnsupportedVersion { version: u16 },

    #[error("patch truncated at offset {offset}")]
    Truncated { offset: usize },

    #[error("unknown opcode {opcode:#04x} at offset {offset}")]
    UnknownOpcode { opcode: u8, offset: usize },

    #[error("copy out of range (offset {offset}, len {len}, base len {base_len})")]
    CopyOutOfRange {
        offset: usize,
        len: usize,
        base_len: usize,
    },

    #[error("reconstructed length mismatch (declared {declared}, actual {actual})")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("image too large for patch container (len {len})")]
    ImageTooLarge { len: usize },
}

/// Result type alias for delta operations.
pub type DeltaResult<T> = Result<T, DeltaError>;

/// Produce a patch that transforms `base` into `target`.
///
/// Matching is greedy over aligned base blocks; unmatched target bytes are
/// carried as literals. The output depends only on the two inputs.
///
/// # Errors
/// Returns an error if either image exceeds the container's size field.
pub fn diff(base: &[u8], target: &[u8]) -> DeltaResult<Vec<u8>> {
    let target_len = check_len(target.len())?;
    check_len(base.len())?;

    let mut patch = Vec::with_capacity(PATCH_HEADER_LEN + target.len() / 8);
    patch.extend_from_slice(&PATCH_MAGIC);
    patch.extend_from_slice(&PATCH_VERSION.to_le_bytes());
    patch.extend_from_slice(&target_len.to_le_bytes());

    // Index each aligned base block by content; first occurrence wins so the
    // output is insertion-order independent of map internals.
    let mut index: HashMap<&[u8], usize> = HashMap::new();
    for block_start in (0..base.len().saturating_sub(MATCH_BLOCK - 1)).step_by(MATCH_BLOCK) {
        index
            .entry(&base[block_start..block_start + MATCH_BLOCK])
            .or_insert(block_start);
    }

    let mut literal: Vec<u8> = Vec::new();
    let mut pos = 0;
    while pos < target.len() {
        let matched = if pos + MATCH_BLOCK <= target.len() {
            index
                .get(&target[pos..pos + MATCH_BLOCK])
                .map(|&base_off| {
                    let mut len = MATCH_BLOCK;
                    while base_off + len < base.len()
                        && pos + len < target.len()
                        && base[base_off + len] == target[pos + len]
                    {
                        len += 1;
                    }
                    (base_off, len)
                })
        } else {
            None
        };

        match matched {
            Some((base_off, len)) => {
                flush_literal(&mut patch, &mut literal)?;
                emit_copy(&mut patch, base_off, len)?;
                pos += len;
            }
            None => {
                literal.push(target[pos]);
                pos += 1;
            }
        }
    }
    flush_literal(&mut patch, &mut literal)?;

    Ok(patch)
}

/// Reconstruct a target image by applying `patch` to `base`.
///
/// # Errors
/// Returns an error if the container is malformed, a copy refers outside the
/// base, or the reconstructed length does not match the declared length.
pub fn patch(base: &[u8], patch: &[u8]) -> DeltaResult<Vec<u8>> {
    if patch.len() < PATCH_HEADER_LEN {
        return Err(DeltaError::Truncated { offset: patch.len() });
    }

    let mut magic = [0u8; 4];
    magic.copy_from_slice(&patch[0..4]);
    if magic != PATCH_MAGIC {
        return Err(DeltaError::InvalidMagic { got: magic });
    }

    let version = u16::from_le_bytes([patch[4], patch[5]]);
    if version != PATCH_VERSION {
        return Err(DeltaError::UnsupportedVersion { version });
    }

    let declared = read_u32(patch, 6)? as usize;
    let mut target = Vec::with_capacity(declared);

    let mut offset = PATCH_HEADER_LEN;
    while offset < patch.len() {
        let opcode = patch[offset];
        offset += 1;
        match opcode {
            OP_COPY => {
                let base_off = read_u32(patch, offset)? as usize;
                let len = read_u32(patch, offset + 4)? as usize;
                offset += 8;
                let end = base_off
                    .checked_add(len)
                    .filter(|&end| end <= base.len())
                    .ok_or(DeltaError::CopyOutOfRange {
                        offset: base_off,
                        len,
                        base_len: base.len(),
                    })?;
                target.extend_from_slice(&base[base_off..end]);
            }
            OP_INSERT => {
                let len = read_u32(patch, offset)? as usize;
                offset += 4;
                let end = offset
                    .checked_add(len)
                    .filter(|&end| end <= patch.len())
                    .ok_or(DeltaError::Truncated { offset })?;
                target.extend_from_slice(&patch[offset..end]);
                offset = end;
            }
            opcode => {
                return Err(DeltaError::UnknownOpcode {
                    opcode,
                    offset: offset - 1,
                })
            }
        }
    }

    if target.len() != declared {
        return Err(DeltaError::LengthMismatch {
            declared,
            actual: target.len(),
        });
    }
    Ok(target)
}

fn check_len(len: usize) -> DeltaResult<u32> {
    u32::try_from(len).map_err(|_| DeltaError::ImageTooLarge { len })
}

fn flush_literal(patch: &mut Vec<u8>, literal: &mut Vec<u8>) -> DeltaResult<()> {
    if literal.is_empty() {
        return Ok(());
    }
    let len = check_len(literal.len())?;
    patch.push(OP_INSERT);
    patch.extend_from_slice(&len.to_le_bytes());
    patch.append(literal);
    Ok(())
}

fn emit_copy(patch: &mut Vec<u8>, base_off: usize, len: usize) -> DeltaResult<()> {
    patch.push(OP_COPY);
    patch.extend_from_slice(&check_len(base_off)?.to_le_bytes());
    patch.extend_from_slice(&check_len(len)?.to_le_bytes());
    Ok(())
}

fn read_u32(buf: &[u8], offset: usize) -> DeltaResult<u32> {
    let end = offset.checked_add(4).ok_or(DeltaError::Truncated { offset })?;
    if end > buf.len() {
        return Err(DeltaError::Truncated { offset });
    }
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&buf[offset..end]);
    Ok(u32::from_le_bytes(bytes))
}
