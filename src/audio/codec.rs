// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! ITU-T G.711 mu-law codec for telephony audio.
//!
//! Provides encoding and decoding between 16-bit linear PCM and 8-bit mu-law
//! (PCMU). Encoding works in the 14-bit magnitude domain of the standard
//! (bias 33, clip 0x1FFF); decoding reconstructs the standard G.711 levels
//! scaled back to 16 bits.
//!
//! Every function in this module is total: any byte decodes and any `i16`
//! encodes.

/// Bias added to the 14-bit magnitude before segment search.
const MULAW_BIAS: i32 = 33;
/// Largest biased 14-bit magnitude representable in segment 7.
const MULAW_CLIP: i32 = 0x1FFF;
/// Number of segments (exponents) in the companding curve.
const MULAW_SEGMENTS: i32 = 8;

/// Encode a single 16-bit linear PCM sample to mu-law.
pub fn linear_to_mulaw(sample: i16) -> u8 {
    // 16-bit -> 14-bit, arithmetic shift keeps the sign.
    let pcm = (sample as i32) >> 2;
    let sign: i32 = if pcm < 0 { 0x80 } else { 0x00 };
    let magnitude = (pcm.abs() + MULAW_BIAS).min(MULAW_CLIP);

    // Smallest segment whose upper end (0x3F, 0x7F, ... 0x1FFF) holds the magnitude.
    let mut exponent = 0;
    while exponent < MULAW_SEGMENTS - 1 && magnitude > (0x40 << exponent) - 1 {
        exponent += 1;
    }

    let mantissa = (magnitude >> (exponent + 1)) & 0x0F;
    !((sign | (exponent << 4) | mantissa) as u8)
}

/// Decode a single mu-law byte to a 16-bit linear PCM sample.
pub fn mulaw_to_linear(mulaw_byte: u8) -> i16 {
    let complement = !mulaw_byte as i32;
    let sign = complement & 0x80;
    let exponent = (complement >> 4) & 0x07;
    let mantissa = complement & 0x0F;

    let magnitude = ((((mantissa << 1) + MULAW_BIAS) << exponent) - MULAW_BIAS) << 2;

    if sign == 0x80 {
        -magnitude as i16
    } else {
        magnitude as i16
    }
}

/// Decode mu-law bytes to 16-bit linear samples.
pub fn decode_samples(mulaw_data: &[u8]) -> Vec<i16> {
    mulaw_data.iter().map(|&b| mulaw_to_linear(b)).collect()
}

/// Encode 16-bit linear samples to mu-law bytes.
pub fn encode_samples(samples: &[i16]) -> Vec<u8> {
    samples.iter().map(|&s| linear_to_mulaw(s)).collect()
}

/// Decode a buffer of mu-law bytes to 16-bit linear PCM bytes (little-endian).
pub fn mulaw_to_pcm(mulaw_data: &[u8]) -> Vec<u8> {
    let mut pcm = Vec::with_capacity(mulaw_data.len().saturating_mul(2));
    for &byte in mulaw_data {
        pcm.extend_from_slice(&mulaw_to_linear(byte).to_le_bytes());
    }
    pcm
}

/// Encode 16-bit linear PCM bytes (little-endian) to mu-law bytes.
///
/// If `pcm_data` has an odd length, the trailing byte is ignored.
pub fn pcm_to_mulaw(pcm_data: &[u8]) -> Vec<u8> {
    if pcm_data.len() % 2 != 0 {
        tracing::warn!(
            "pcm_to_mulaw: odd-length input ({} bytes), trailing byte ignored",
            pcm_data.len()
        );
    }
    pcm_data
        .chunks_exact(2)
        .map(|chunk| linear_to_mulaw(i16::from_le_bytes([chunk[0], chunk[1]])))
        .collect()
}
