// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Caller audio toward the AI service: mu-law decode, then resample.

use crate::audio::codec::decode_samples;
use crate::audio::{resample, PcmBuffer, TELEPHONY_SAMPLE_RATE};

/// Stateless converter from telephony payloads to AI input PCM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InboundPipeline {
    ai_sample_rate: u32,
}

impl InboundPipeline {
    pub fn new(ai_sample_rate: u32) -> Self {
        Self { ai_sample_rate }
    }

    /// Rate of the PCM this pipeline produces.
    pub fn ai_sample_rate(&self) -> u32 {
        self.ai_sample_rate
    }

    /// Decode one mu-law payload and resample it to the AI input rate.
    pub fn process(&self, mulaw: &[u8]) -> PcmBuffer {
        let pcm = PcmBuffer::new(decode_samples(mulaw), TELEPHONY_SAMPLE_RATE);
        resample(pcm, self.ai_sample_rate)
    }

    /// Same as [`process`](Self::process), serialized as PCM16 little-endian.
    pub fn process_to_bytes(&self, mulaw: &[u8]) -> Vec<u8> {
        self.process(mulaw).to_le_bytes()
    }
}
