// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Audio primitives: mu-law codec, linear resampler, telephony framer.
//!
//! All functions here are pure and safe to call from any task without
//! synchronization.

pub mod codec;
pub mod framer;
pub mod resampler;

pub use framer::{
    AudioFrame, FrameAssembler, FRAME_DURATION_MS, MULAW_SILENCE, TELEPHONY_FRAME_BYTES,
    TELEPHONY_SAMPLE_RATE,
};
pub use resampler::{resample, PcmBuffer};
