// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Testing utilities for the phone bridge.
//!
//! Provides an in-memory [`MockConnector`] whose sessions record everything
//! the bridge sends, plus builders for Twilio transport messages. Compiled
//! only for unit tests or with the `test-support` feature.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::mpsc;

use crate::config::ModelConfig;
use crate::error::{BridgeError, Result};
use crate::services::{
    OpenedSession, RealtimeConnector, RealtimeEvent, RealtimeSession, EVENT_CHANNEL_CAPACITY,
};
use crate::utils::helpers::encode_base64;

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// One call made on a [`MockSession`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AiCall {
    Audio { pcm: Vec<u8>, sample_rate: u32 },
    Text(String),
    EndOfInput,
    Close,
}

/// Records calls instead of talking to a service.
#[derive(Debug, Default)]
pub struct MockSession {
    calls: Mutex<Vec<AiCall>>,
    closed: AtomicBool,
    failures_left: AtomicUsize,
}

impl MockSession {
    pub fn calls(&self) -> Vec<AiCall> {
        lock(&self.calls).clone()
    }

    /// `(byte length, sample rate)` of every audio chunk received.
    pub fn audio_chunks(&self) -> Vec<(usize, u32)> {
        lock(&self.calls)
            .iter()
            .filter_map(|call| match call {
                AiCall::Audio { pcm, sample_rate } => Some((pcm.len(), *sample_rate)),
                _ => None,
            })
            .collect()
    }

    pub fn texts(&self) -> Vec<String> {
        lock(&self.calls)
            .iter()
            .filter_map(|call| match call {
                AiCall::Text(text) => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Make the next `count` sends fail with [`BridgeError::Send`].
    pub fn fail_next_sends(&self, count: usize) {
        self.failures_left.store(count, Ordering::Release);
    }

    fn record(&self, call: AiCall) -> Result<()> {
        if self.is_closed() {
            return Err(BridgeError::Closed);
        }
        let failing = self
            .failures_left
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(BridgeError::Send("mock send failure".to_string()));
        }
        lock(&self.calls).push(call);
        Ok(())
    }
}

#[async_trait]
impl RealtimeSession for MockSession {
    async fn send_audio(&self, pcm: &[u8], sample_rate: u32) -> Result<()> {
        self.record(AiCall::Audio {
            pcm: pcm.to_vec(),
            sample_rate,
        })
    }

    async fn send_text(&self, text: &str) -> Result<()> {
        self.record(AiCall::Text(text.to_string()))
    }

    async fn send_end_of_input(&self) -> Result<()> {
        self.record(AiCall::EndOfInput)
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            lock(&self.calls).push(AiCall::Close);
        }
        Ok(())
    }
}

/// How [`MockConnector::open`] behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenBehavior {
    Succeed,
    Fail,
    /// Never completes; exercises the open timeout.
    Hang,
}

/// Test-side handle to a session opened by the mock connector.
#[derive(Debug, Clone)]
pub struct MockHandle {
    pub session: Arc<MockSession>,
    /// Push AI events into the bridge. Dropping every clone ends the stream.
    pub events: mpsc::Sender<RealtimeEvent>,
}

/// In-memory [`RealtimeConnector`].
#[derive(Debug)]
pub struct MockConnector {
    behavior: OpenBehavior,
    opens: Mutex<Vec<ModelConfig>>,
    handles: mpsc::UnboundedSender<MockHandle>,
}

impl MockConnector {
    /// Returns the connector and a receiver yielding a handle per opened session.
    pub fn new(behavior: OpenBehavior) -> (Arc<Self>, mpsc::UnboundedReceiver<MockHandle>) {
        let (handles, rx) = mpsc::unbounded_channel();
        let connector = Self {
            behavior,
            opens: Mutex::new(Vec::new()),
            handles,
        };
        (Arc::new(connector), rx)
    }

    /// Model configs passed to every `open` call, in order.
    pub fn opens(&self) -> Vec<ModelConfig> {
        lock(&self.opens).clone()
    }
}

#[async_trait]
impl RealtimeConnector for MockConnector {
    async fn open(&self, config: &ModelConfig) -> Result<OpenedSession> {
        lock(&self.opens).push(config.clone());
        match self.behavior {
            OpenBehavior::Fail => return Err(BridgeError::Connect("mock refused".to_string())),
            OpenBehavior::Hang => std::future::pending::<()>().await,
            OpenBehavior::Succeed => {}
        }

        let (events_tx, events) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let session = Arc::new(MockSession::default());
        let _ = self.handles.send(MockHandle {
            session: Arc::clone(&session),
            events: events_tx,
        });
        Ok(OpenedSession { session, events })
    }
}

// ---------------------------------------------------------------------------
// Twilio message builders
// ---------------------------------------------------------------------------

/// A Twilio `start` message with optional `customParameters`.
pub fn start_message(stream_sid: &str, params: &[(&str, &str)]) -> String {
    let custom: serde_json::Map<String, serde_json::Value> = params
        .iter()
        .map(|(k, v)| (k.to_string(), json!(v)))
        .collect();
    json!({
        "event": "start",
        "sequenceNumber": "1",
        "start": {
            "streamSid": stream_sid,
            "accountSid": "AC00000000000000000000000000000000",
            "callSid": "CA00000000000000000000000000000000",
            "tracks": ["inbound"],
            "customParameters": custom,
            "mediaFormat": { "encoding": "audio/x-mulaw", "sampleRate": 8000, "channels": 1 }
        },
        "streamSid": stream_sid
    })
    .to_string()
}

/// A Twilio `media` message carrying `mulaw` bytes.
pub fn media_message(stream_sid: &str, mulaw: &[u8]) -> String {
    json!({
        "event": "media",
        "streamSid": stream_sid,
        "media": { "track": "inbound", "payload": encode_base64(mulaw) }
    })
    .to_string()
}

/// A Twilio `stop` message.
pub fn stop_message(stream_sid: &str) -> String {
    json!({
        "event": "stop",
        "streamSid": stream_sid,
        "stop": { "callSid": "CA00000000000000000000000000000000" }
    })
    .to_string()
}

/// PCM16 little-endian bytes of `ms` milliseconds of a constant level.
pub fn pcm_tone(ms: u32, sample_rate: u32, level: i16) -> Vec<u8> {
    let samples = (sample_rate as u64 * ms as u64 / 1000) as usize;
    level.to_le_bytes().repeat(samples)
}

/// The `event` field of every outbound message.
pub fn event_names(messages: &[String]) -> Vec<String> {
    messages
        .iter()
        .filter_map(|m| serde_json::from_str::<serde_json::Value>(m).ok())
        .map(|v| v["event"].as_str().unwrap_or_default().to_string())
        .collect()
}
