// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Realtime voice-AI session adapters.
//!
//! The bridge talks to a conversational AI service through two traits:
//! [`RealtimeConnector`] opens a session, and [`RealtimeSession`] sends
//! audio and text into it. Responses arrive on the `mpsc` receiver returned
//! alongside the session, as [`RealtimeEvent`]s.

pub mod gemini_live;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::config::ModelConfig;
use crate::error::Result;

/// Capacity of the per-session response event channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// An event streamed back by the AI service.
#[derive(Clone, PartialEq, Eq)]
pub enum RealtimeEvent {
    /// The user started speaking over the AI (barge-in).
    Interrupted,
    /// A chunk of PCM16 little-endian mono audio.
    Audio {
        data: Vec<u8>,
        /// Sample rate announced by the service, if any.
        sample_rate: Option<u32>,
    },
    /// The AI finished its turn.
    TurnComplete,
    /// Anything else the bridge does not act on.
    Other(String),
}

impl fmt::Debug for RealtimeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interrupted => write!(f, "Interrupted"),
            Self::Audio { data, sample_rate } => f
                .debug_struct("Audio")
                .field("bytes", &data.len())
                .field("sample_rate", sample_rate)
                .finish(),
            Self::TurnComplete => write!(f, "TurnComplete"),
            Self::Other(kind) => write!(f, "Other({kind})"),
        }
    }
}

/// A live AI session.
///
/// All methods take `&self` so the session can be shared between the
/// transport receive loop and teardown.
#[async_trait]
pub trait RealtimeSession: Send + Sync {
    /// Send a chunk of PCM16 little-endian audio at `sample_rate`.
    async fn send_audio(&self, pcm: &[u8], sample_rate: u32) -> Result<()>;

    /// Send a text turn.
    async fn send_text(&self, text: &str) -> Result<()>;

    /// Signal that no more input audio will follow.
    async fn send_end_of_input(&self) -> Result<()>;

    /// Close the session. Must be safe to call more than once.
    async fn close(&self) -> Result<()>;
}

/// A freshly opened session together with its response event stream.
pub struct OpenedSession {
    pub session: Arc<dyn RealtimeSession>,
    /// Ends (`recv()` returns `None`) when the service closes the session.
    pub events: mpsc::Receiver<RealtimeEvent>,
}

impl fmt::Debug for OpenedSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenedSession").finish_non_exhaustive()
    }
}

/// Opens AI sessions.
#[async_trait]
pub trait RealtimeConnector: Send + Sync {
    async fn open(&self, config: &ModelConfig) -> Result<OpenedSession>;
}

/// Extract the sample rate from a mime hint such as `audio/pcm;rate=24000`.
pub fn parse_pcm_mime_rate(mime: &str) -> Option<u32> {
    mime.split(';')
        .skip(1)
        .filter_map(|param| param.trim().split_once('='))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("rate"))
        .and_then(|(_, value)| value.trim().parse().ok())
        .filter(|rate| *rate > 0)
}
