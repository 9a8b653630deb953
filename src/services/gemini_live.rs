// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Gemini Live realtime session adapter.
//!
//! Speaks the `BidiGenerateContent` WebSocket protocol: a `setup` message
//! opens the session, caller audio goes out as `realtimeInput` chunks, and
//! the model's `serverContent` messages are mapped to [`RealtimeEvent`]s by
//! a background reader task.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::config::ModelConfig;
use crate::error::{BridgeError, Result};
use crate::services::{
    parse_pcm_mime_rate, OpenedSession, RealtimeConnector, RealtimeEvent, RealtimeSession,
    EVENT_CHANNEL_CAPACITY,
};
use crate::utils::helpers::{decode_base64, encode_base64};

type WsStream = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;
type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

// ---------------------------------------------------------------------------
// Server message types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerMessage {
    #[serde(default)]
    setup_complete: Option<serde_json::Value>,
    #[serde(default)]
    server_content: Option<ServerContent>,
    #[serde(default)]
    tool_call: Option<serde_json::Value>,
    #[serde(default)]
    go_away: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerContent {
    #[serde(default)]
    interrupted: bool,
    #[serde(default)]
    model_turn: Option<ModelTurn>,
    #[serde(default)]
    turn_complete: bool,
}

#[derive(Debug, Deserialize)]
struct ModelTurn {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default)]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    #[serde(default)]
    mime_type: String,
    data: String,
}

/// Map one server message to the events the bridge cares about.
///
/// `interrupted` is reported before any audio in the same message so stale
/// playback is flushed first.
fn events_from_server_message(text: &str) -> Vec<RealtimeEvent> {
    let msg: ServerMessage = match serde_json::from_str(text) {
        Ok(msg) => msg,
        Err(e) => {
            tracing::warn!("GeminiLive: failed to parse server message: {e}");
            return Vec::new();
        }
    };

    let mut events = Vec::new();
    if msg.setup_complete.is_some() {
        events.push(RealtimeEvent::Other("setupComplete".to_string()));
    }
    if let Some(content) = msg.server_content {
        if content.interrupted {
            events.push(RealtimeEvent::Interrupted);
        }
        for part in content.model_turn.map(|turn| turn.parts).unwrap_or_default() {
            let Some(inline) = part.inline_data else {
                continue;
            };
            if !inline.mime_type.starts_with("audio/") {
                continue;
            }
            match decode_base64(&inline.data) {
                Some(data) => events.push(RealtimeEvent::Audio {
                    data,
                    sample_rate: parse_pcm_mime_rate(&inline.mime_type),
                }),
                None => tracing::warn!("GeminiLive: undecodable audio payload"),
            }
        }
        if content.turn_complete {
            events.push(RealtimeEvent::TurnComplete);
        }
    }
    if msg.tool_call.is_some() {
        events.push(RealtimeEvent::Other("toolCall".to_string()));
    }
    if msg.go_away.is_some() {
        events.push(RealtimeEvent::Other("goAway".to_string()));
    }
    events
}

/// Gemini sends JSON in both text and binary frames.
fn message_text(msg: Message) -> Option<String> {
    match msg {
        Message::Text(text) => Some(text),
        Message::Binary(bytes) => String::from_utf8(bytes).ok(),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Client message builders
// ---------------------------------------------------------------------------

fn setup_message(config: &ModelConfig) -> serde_json::Value {
    let model = if config.model.starts_with("models/") {
        config.model.clone()
    } else {
        format!("models/{}", config.model)
    };

    let mut generation_config = json!({ "responseModalities": ["AUDIO"] });
    if let Some(voice) = &config.voice {
        generation_config["speechConfig"] = json!({
            "voiceConfig": { "prebuiltVoiceConfig": { "voiceName": voice } }
        });
    }

    let mut setup = json!({
        "model": model,
        "generationConfig": generation_config,
    });
    if let Some(instruction) = &config.system_instruction {
        setup["systemInstruction"] = json!({ "parts": [{ "text": instruction }] });
    }
    json!({ "setup": setup })
}

fn audio_message(pcm: &[u8], sample_rate: u32) -> serde_json::Value {
    json!({
        "realtimeInput": {
            "audio": {
                "data": encode_base64(pcm),
                "mimeType": format!("audio/pcm;rate={sample_rate}"),
            }
        }
    })
}

fn text_message(text: &str) -> serde_json::Value {
    json!({ "realtimeInput": { "text": text } })
}

fn end_of_input_message() -> serde_json::Value {
    json!({ "realtimeInput": { "audioStreamEnd": true } })
}

// ---------------------------------------------------------------------------
// GeminiLiveConnector
// ---------------------------------------------------------------------------

/// Opens Gemini Live sessions.
#[derive(Clone)]
pub struct GeminiLiveConnector {
    api_key: String,
    base_url: String,
}

impl fmt::Debug for GeminiLiveConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiLiveConnector")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl GeminiLiveConnector {
    /// Default WebSocket endpoint.
    pub const DEFAULT_BASE_URL: &'static str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: Self::DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Builder method: set a custom endpoint (proxies, test servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Wait for `setupComplete`, discarding anything that arrives before it.
    async fn await_setup_complete(stream: &mut WsStream) -> Result<()> {
        while let Some(msg) = stream.next().await {
            let msg = msg.map_err(|e| BridgeError::Connect(e.to_string()))?;
            if let Message::Close(frame) = &msg {
                return Err(BridgeError::Connect(format!(
                    "closed during setup: {:?}",
                    frame
                )));
            }
            let Some(text) = message_text(msg) else {
                continue;
            };
            let parsed: ServerMessage = serde_json::from_str(&text)
                .map_err(|e| BridgeError::Protocol(format!("bad setup response: {e}")))?;
            if parsed.setup_complete.is_some() {
                return Ok(());
            }
        }
        Err(BridgeError::Closed)
    }

    /// Background task that reads server messages and forwards events.
    async fn ws_reader_loop(mut stream: WsStream, event_tx: mpsc::Sender<RealtimeEvent>) {
        while let Some(msg_result) = stream.next().await {
            let msg = match msg_result {
                Ok(m) => m,
                Err(e) => {
                    tracing::error!("GeminiLive: WebSocket read error: {}", e);
                    break;
                }
            };
            if let Message::Close(frame) = &msg {
                tracing::debug!("GeminiLive: WebSocket closed by server: {:?}", frame);
                break;
            }
            let Some(text) = message_text(msg) else {
                continue;
            };
            for event in events_from_server_message(&text) {
                if event_tx.send(event).await.is_err() {
                    tracing::debug!("GeminiLive: event receiver dropped");
                    return;
                }
            }
        }
        tracing::debug!("GeminiLive: WebSocket reader loop ended");
    }
}

#[async_trait]
impl RealtimeConnector for GeminiLiveConnector {
    async fn open(&self, config: &ModelConfig) -> Result<OpenedSession> {
        let url = format!("{}?key={}", self.base_url, self.api_key);
        tracing::debug!(model = %config.model, "GeminiLive: connecting");

        let (ws_stream, _response) = connect_async(url)
            .await
            .map_err(|e| BridgeError::Connect(e.to_string()))?;
        let (mut sink, mut stream) = ws_stream.split();

        sink.send(Message::Text(setup_message(config).to_string()))
            .await
            .map_err(|e| BridgeError::Connect(e.to_string()))?;
        Self::await_setup_complete(&mut stream).await?;
        tracing::debug!("GeminiLive: setup complete");

        let (event_tx, events) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let reader = tokio::spawn(Self::ws_reader_loop(stream, event_tx));

        let session = GeminiLiveSession {
            sink: Mutex::new(sink),
            closed: AtomicBool::new(false),
            reader: std::sync::Mutex::new(Some(reader)),
        };
        Ok(OpenedSession {
            session: Arc::new(session),
            events,
        })
    }
}

// ---------------------------------------------------------------------------
// GeminiLiveSession
// ---------------------------------------------------------------------------

/// One open Gemini Live WebSocket session.
pub struct GeminiLiveSession {
    sink: Mutex<WsSink>,
    closed: AtomicBool,
    reader: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl GeminiLiveSession {
    async fn send_json(&self, value: serde_json::Value) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BridgeError::Closed);
        }
        self.sink
            .lock()
            .await
            .send(Message::Text(value.to_string()))
            .await
            .map_err(|e| BridgeError::Send(e.to_string()))
    }
}

#[async_trait]
impl RealtimeSession for GeminiLiveSession {
    async fn send_audio(&self, pcm: &[u8], sample_rate: u32) -> Result<()> {
        self.send_json(audio_message(pcm, sample_rate)).await
    }

    async fn send_text(&self, text: &str) -> Result<()> {
        self.send_json(text_message(text)).await
    }

    async fn send_end_of_input(&self) -> Result<()> {
        self.send_json(end_of_input_message()).await
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        if let Err(e) = self.sink.lock().await.close().await {
            tracing::debug!("GeminiLive: close handshake failed: {e}");
        }
        let reader = match self.reader.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = reader {
            handle.abort();
        }
        Ok(())
    }
}

impl Drop for GeminiLiveSession {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.reader.lock() {
            if let Some(handle) = guard.take() {
                handle.abort();
            }
        }
    }
}
