// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Fixed-duration framing of telephony audio.
//!
//! The telephony transport expects mu-law audio in 20 ms slices: 8000 Hz at
//! one byte per sample gives 160 bytes per frame. [`FrameAssembler`] merges
//! variable-sized chunks into such frames.

use std::fmt;
use std::slice::Chunks;

/// Telephony sample rate (8 kHz mu-law).
pub const TELEPHONY_SAMPLE_RATE: u32 = 8000;

/// Duration of one transport frame in milliseconds.
pub const FRAME_DURATION_MS: u64 = 20;

/// Bytes per transport frame (8000 Hz * 20 ms * 1 byte/sample).
pub const TELEPHONY_FRAME_BYTES: usize =
    (TELEPHONY_SAMPLE_RATE as usize) * (FRAME_DURATION_MS as usize) / 1000;

/// One transport-sized slice of companded audio.
///
/// Immutable once built; the final frame of a chunk may be shorter than
/// [`TELEPHONY_FRAME_BYTES`].
#[derive(Clone, PartialEq, Eq)]
pub struct AudioFrame {
    payload: Box<[u8]>,
}

impl AudioFrame {
    /// Wrap mu-law bytes as a frame.
    pub fn new(payload: impl Into<Box<[u8]>>) -> Self {
        Self {
            payload: payload.into(),
        }
    }

    /// The frame's mu-law bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.payload
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

impl fmt::Debug for AudioFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AudioFrame({} bytes)", self.payload.len())
    }
}

/// Split `buffer` into consecutive slices of `frame_size` bytes.
///
/// Every slice is exactly `frame_size` long except possibly the last one.
/// The returned iterator is lazy and can be cloned to restart it. A
/// `frame_size` of zero is treated as one.
pub fn chunk(buffer: &[u8], frame_size: usize) -> Chunks<'_, u8> {
    buffer.chunks(frame_size.max(1))
}

/// Mu-law encoding of digital silence.
pub const MULAW_SILENCE: u8 = 0xFF;

/// Merges a stream of arbitrarily sized mu-law chunks into full frames.
///
/// Bytes that do not fill a frame are held back and prepended to the next
/// chunk, so every frame produced by [`push`](Self::push) is exactly
/// `frame_size` bytes.
#[derive(Debug, Clone)]
pub struct FrameAssembler {
    frame_size: usize,
    pending: Vec<u8>,
}

impl Default for FrameAssembler {
    fn default() -> Self {
        Self::new(TELEPHONY_FRAME_BYTES)
    }
}

impl FrameAssembler {
    /// A `frame_size` of zero is treated as one.
    pub fn new(frame_size: usize) -> Self {
        Self {
            frame_size: frame_size.max(1),
            pending: Vec::new(),
        }
    }

    /// Append `bytes` and return every frame that is now complete.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<AudioFrame> {
        self.pending.extend_from_slice(bytes);
        let full = self.pending.len() / self.frame_size * self.frame_size;
        let frames = chunk(&self.pending[..full], self.frame_size)
            .map(|slice| AudioFrame::new(slice.to_vec()))
            .collect();
        self.pending.drain(..full);
        frames
    }

    /// Emit the held-back tail padded with silence to a full frame.
    pub fn flush_padded(&mut self) -> Option<AudioFrame> {
        if self.pending.is_empty() {
            return None;
        }
        let mut tail = std::mem::take(&mut self.pending);
        tail.resize(self.frame_size, MULAW_SILENCE);
        Some(AudioFrame::new(tail))
    }

    /// Number of bytes held back.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Drop the held-back tail.
    pub fn clear(&mut self) {
        self.pending.clear();
    }
}
