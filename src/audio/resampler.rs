// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Linear-interpolation resampling for mono 16-bit PCM.
//!
//! Provides [`PcmBuffer`], a sample buffer that always carries its sample
//! rate, and [`resample`], an O(n) stateless converter. Linear interpolation
//! attenuates high frequencies slightly, which is fine for voice-band audio,
//! and the output is fully deterministic (round half away from zero).

use std::time::Duration;

/// Mono 16-bit linear PCM samples tagged with their sample rate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcmBuffer {
    /// Signed 16-bit samples.
    pub samples: Vec<i16>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
}

impl PcmBuffer {
    /// Create a buffer from samples at the given rate.
    pub fn new(samples: Vec<i16>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Build a buffer from little-endian PCM16 bytes.
    ///
    /// A trailing odd byte is ignored.
    pub fn from_le_bytes(bytes: &[u8], sample_rate: u32) -> Self {
        let samples = bytes
            .chunks_exact(2)
            .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]))
            .collect();
        Self::new(samples, sample_rate)
    }

    /// Serialize the samples as little-endian PCM16 bytes.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.samples.len().saturating_mul(2));
        for sample in &self.samples {
            bytes.extend_from_slice(&sample.to_le_bytes());
        }
        bytes
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns `true` if the buffer holds no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Playback duration of the buffer.
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_micros(self.samples.len() as u64 * 1_000_000 / self.sample_rate as u64)
    }
}

/// Resample `pcm` to `to_rate` using linear interpolation.
///
/// The input is returned unchanged when the rates match. Any non-empty input
/// yields at least one output sample. A zero rate on either side cannot be
/// interpreted and also returns the input unchanged.
pub fn resample(pcm: PcmBuffer, to_rate: u32) -> PcmBuffer {
    let from_rate = pcm.sample_rate;
    if from_rate == to_rate || pcm.is_empty() {
        return PcmBuffer::new(pcm.samples, to_rate);
    }
    if from_rate == 0 || to_rate == 0 {
        tracing::warn!(from_rate, to_rate, "resample: zero sample rate, passing audio through");
        return pcm;
    }

    let input = &pcm.samples;
    let input_len = input.len();
    let last = input_len - 1;
    // floor(len * to / from) in integer arithmetic, never below one sample.
    let output_len = ((input_len as u64 * to_rate as u64 / from_rate as u64) as usize).max(1);

    let mut output = Vec::with_capacity(output_len);
    for i in 0..output_len {
        let src_pos = i as f64 * from_rate as f64 / to_rate as f64;
        let idx = (src_pos.floor() as usize).min(last);
        let frac = src_pos - idx as f64;
        let s0 = input[idx] as f64;
        let s1 = input[(idx + 1).min(last)] as f64;
        let value = (s0 + (s1 - s0) * frac).round();
        output.push(value.clamp(i16::MIN as f64, i16::MAX as f64) as i16);
    }

    PcmBuffer::new(output, to_rate)
}
