//! 8-byte bus frame codec.
//!
//! Layout: `[sequence (1B)] [more flag (1B)] [payload chunk (<=6B)]`, zero
//! padded to 8 bytes. A logical message is a contiguous run of frames
//! sharing an arbitration id, sequence starting at 0, terminated by
//! `more == 0`. Sequence numbers wrap modulo 256; receivers do not validate
//! them, so messages of 256+ chunks reassemble correctly.
//!
//! Trailing zero bytes of each chunk are stripped on receive. This is safe
//! for JSON payloads, which never contain NUL bytes.

use crate::error::{BusError, BusResult};

/// Total frame length in bytes.
pub const FRAME_LEN: usize = 8;

/// Frame header length: sequence + more flag.
pub const FRAME_HEADER_LEN: usize = 2;

/// Maximum payload chunk per frame.
pub const FRAME_CHUNK_LEN: usize = FRAME_LEN - FRAME_HEADER_LEN;

/// One frame on the shared medium.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusFrame {
    /// Channel address; receivers filter on it.
    pub arbitration_id: u32,
    /// Raw frame body.
    pub data: [u8; FRAME_LEN],
}

impl BusFrame {
    /// Build a frame from a payload chunk.
    ///
    /// # Errors
    /// Returns an error if the chunk exceeds [`FRAME_CHUNK_LEN`].
    pub fn new(arbitration_id: u32, seq: u8, more: bool, chunk: &[u8]) -> BusResult<Self> {
        if chunk.len() > FRAME_CHUNK_LEN {
            return Err(BusError::ChunkTooLarge {
                len: chunk.len(),
                max: FRAME_CHUNK_LEN,
            });
        }
        let mut data = [0u8; FRAME_LEN];
        data[0] = seq;
        data[1] = u8::from(more);
        data[FRAME_HEADER_LEN..FRAME_HEADER_LEN + chunk.len()].copy_from_slice(chunk);
        Ok(Self {
            arbitration_id,
            data,
        })
    }

    /// Sequence number of this frame (wrapping).
    #[must_use]
    pub const fn seq(&self) -> u8 {
        self.data[0]
    }

    /// Whether more frames of the same message follow.
    #[must_use]
    pub const fn more(&self) -> bool {
        self.data[1] != 0
    }

    /// Payload chunk with trailing zero padding stripped.
    #[must_use]
    pub fn chunk(&self) -> &[u8] {
        let body = &self.data[FRAME_HEADER_LEN..];
        let end = body
            .iter()
            .rposition(|&b| b != 0)
            .map_or(0, |last| last + 1);
        &body[..end]
    }
}

/// Split a payload into ordered frames for one channel.
///
/// An empty payload still produces one terminating frame so the receiver
/// sees a complete (empty) message.
#[must_use]
pub fn encode_message(arbitration_id: u32, payload: &[u8]) -> Vec<BusFrame> {
    if payload.is_empty() {
        return vec![
            BusFrame::new(arbitration_id, 0, false, &[]).unwrap_or(BusFrame {
                arbitration_id,
                data: [0u8; FRAME_LEN],
            }),
        ];
    }

    let total = payload.len().div_ceil(FRAME_CHUNK_LEN);
    payload
        .chunks(FRAME_CHUNK_LEN)
        .enumerate()
        .map(|(i, chunk)| {
            let seq = (i % 256) as u8;
            let more = i + 1 < total;
            // Chunk length is bounded by construction.
            BusFrame::new(arbitration_id, seq, more, chunk).unwrap_or(BusFrame {
                arbitration_id,
                data: [0u8; FRAME_LEN],
            })
        })
        .collect()
}
