// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Phone bridge - connects Twilio media streams to realtime voice AI.
//!
//! Caller audio arrives as 8 kHz mu-law frames over a Twilio WebSocket, is
//! decoded and resampled for the AI service, and the AI's spoken reply is
//! resampled, re-encoded and paced back to the caller in 20 ms frames.
//! Barge-in from the AI service flushes pending playback immediately.

pub mod audio;
pub mod config;
pub mod error;
pub mod serializers;
pub mod server;
pub mod services;
pub mod session;
#[cfg(any(test, feature = "test-support"))]
pub mod tests;
pub mod utils;

pub use config::{BridgeConfig, ModelConfig};
pub use error::{BridgeError, Result};
