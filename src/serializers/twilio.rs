// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Twilio Media Streams wire format.
//!
//! # Twilio Media Streams Protocol
//!
//! Twilio sends JSON messages over WebSocket with the following event types:
//!
//! - `connected` - Initial connection established
//! - `start` - Stream started, contains `streamSid`, `callSid` and the
//!   `customParameters` set on the `<Stream>` TwiML element
//! - `media` - Audio payload as base64-encoded mu-law at 8kHz mono
//! - `stop` - Stream stopped
//! - `mark` - Playback position marker acknowledgment
//! - `dtmf` - DTMF digit pressed
//!
//! The bridge sends outgoing messages as:
//!
//! - `media` - Base64-encoded mu-law audio, one 20 ms frame per message
//! - `mark` - Playback tracking markers
//! - `clear` - Clear Twilio's playback buffer (for interruptions)

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::audio::AudioFrame;
use crate::utils::helpers::{decode_base64, encode_base64};

// ---------------------------------------------------------------------------
// Twilio wire-format types
// ---------------------------------------------------------------------------

/// Top-level Twilio WebSocket message (incoming).
#[derive(Deserialize, Debug)]
struct TwilioMessage {
    event: String,
    #[serde(default)]
    start: Option<TwilioStartPayload>,
    #[serde(default)]
    media: Option<TwilioMediaPayload>,
    #[serde(default)]
    stop: Option<TwilioStopPayload>,
    #[serde(default)]
    mark: Option<TwilioMarkPayload>,
    #[serde(default)]
    dtmf: Option<TwilioDtmfPayload>,
    #[serde(rename = "streamSid", default)]
    stream_sid: Option<String>,
}

/// Payload for "start" event.
#[derive(Deserialize, Debug)]
struct TwilioStartPayload {
    #[serde(rename = "streamSid")]
    stream_sid: String,
    #[serde(rename = "callSid", default)]
    call_sid: Option<String>,
    #[serde(rename = "accountSid", default)]
    account_sid: Option<String>,
    #[serde(rename = "customParameters", default)]
    custom_parameters: HashMap<String, String>,
    #[serde(rename = "mediaFormat", default)]
    media_format: Option<MediaFormat>,
}

/// Payload for "media" event.
#[derive(Deserialize, Debug)]
struct TwilioMediaPayload {
    payload: String,
}

/// Payload for "stop" event.
#[derive(Deserialize, Debug)]
struct TwilioStopPayload {
    #[serde(rename = "callSid", default)]
    call_sid: Option<String>,
}

/// Payload for "mark" event.
#[derive(Deserialize, Debug)]
struct TwilioMarkPayload {
    name: String,
}

/// Payload for "dtmf" event.
#[derive(Deserialize, Debug)]
struct TwilioDtmfPayload {
    digit: String,
}

/// Outgoing Twilio media message.
#[derive(Serialize)]
struct TwilioMediaOut<'a> {
    event: &'a str,
    #[serde(rename = "streamSid")]
    stream_sid: &'a str,
    media: TwilioMediaPayloadOut,
}

/// Outgoing media payload.
#[derive(Serialize)]
struct TwilioMediaPayloadOut {
    payload: String,
}

/// Outgoing Twilio mark message.
#[derive(Serialize)]
struct TwilioMarkOut<'a> {
    event: &'a str,
    #[serde(rename = "streamSid")]
    stream_sid: &'a str,
    mark: TwilioMarkPayloadOut<'a>,
}

/// Outgoing mark payload.
#[derive(Serialize)]
struct TwilioMarkPayloadOut<'a> {
    name: &'a str,
}

/// Outgoing Twilio clear message.
#[derive(Serialize)]
struct TwilioClearOut<'a> {
    event: &'a str,
    #[serde(rename = "streamSid")]
    stream_sid: &'a str,
}

// ---------------------------------------------------------------------------
// Parsed events
// ---------------------------------------------------------------------------

/// Media format announced in the "start" event.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct MediaFormat {
    pub encoding: Option<String>,
    #[serde(rename = "sampleRate")]
    pub sample_rate: Option<u32>,
    pub channels: Option<u32>,
}

/// Stream metadata from the "start" event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamStart {
    /// Opaque stream identifier, echoed on every outbound message.
    pub stream_sid: String,
    pub call_sid: Option<String>,
    pub account_sid: Option<String>,
    /// `<Parameter>` values from the `<Stream>` TwiML element.
    pub custom_parameters: HashMap<String, String>,
    pub media_format: Option<MediaFormat>,
}

/// A parsed inbound Twilio event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TwilioEvent {
    Connected,
    Start(StreamStart),
    /// Base64-decoded mu-law bytes.
    Media(Vec<u8>),
    Stop {
        stream_sid: Option<String>,
        call_sid: Option<String>,
    },
    Mark(String),
    Dtmf(String),
}

impl fmt::Display for TwilioEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connected => write!(f, "connected"),
            Self::Start(start) => write!(f, "start({})", start.stream_sid),
            Self::Media(payload) => write!(f, "media({} bytes)", payload.len()),
            Self::Stop { .. } => write!(f, "stop"),
            Self::Mark(name) => write!(f, "mark({name})"),
            Self::Dtmf(digit) => write!(f, "dtmf({digit})"),
        }
    }
}

/// Parse one inbound Twilio text message.
///
/// Returns `None` for anything that cannot be used: invalid JSON, unknown
/// events, missing payloads, or undecodable audio.
pub fn parse_message(text: &str) -> Option<TwilioEvent> {
    let msg: TwilioMessage = match serde_json::from_str(text) {
        Ok(msg) => msg,
        Err(e) => {
            warn!("Twilio: ignoring malformed message: {e}");
            return None;
        }
    };

    match msg.event.as_str() {
        "connected" => {
            debug!("Twilio: connected");
            Some(TwilioEvent::Connected)
        }
        "start" => {
            let Some(start) = msg.start else {
                warn!("Twilio: start event missing start payload");
                return None;
            };
            debug!("Twilio: stream started, streamSid={}", start.stream_sid);
            Some(TwilioEvent::Start(StreamStart {
                stream_sid: start.stream_sid,
                call_sid: start.call_sid,
                account_sid: start.account_sid,
                custom_parameters: start.custom_parameters,
                media_format: start.media_format,
            }))
        }
        "media" => {
            let media = msg.media?;
            match decode_base64(&media.payload) {
                Some(mulaw) => Some(TwilioEvent::Media(mulaw)),
                None => {
                    warn!("Twilio: failed to decode base64 audio payload");
                    None
                }
            }
        }
        "stop" => {
            debug!("Twilio: stream stopped");
            Some(TwilioEvent::Stop {
                stream_sid: msg.stream_sid,
                call_sid: msg.stop.and_then(|stop| stop.call_sid),
            })
        }
        "mark" => match msg.mark {
            Some(mark) => Some(TwilioEvent::Mark(mark.name)),
            None => {
                warn!("Twilio: mark event missing mark payload");
                None
            }
        },
        "dtmf" => match msg.dtmf {
            Some(dtmf) => Some(TwilioEvent::Dtmf(dtmf.digit)),
            None => {
                warn!("Twilio: dtmf event missing dtmf payload");
                None
            }
        },
        other => {
            warn!("Twilio: unknown event type '{}'", other);
            None
        }
    }
}

// ---------------------------------------------------------------------------
// TwilioSerializer
// ---------------------------------------------------------------------------

/// Builds outbound Twilio messages for one stream.
#[derive(Debug, Clone)]
pub struct TwilioSerializer {
    stream_sid: String,
}

impl TwilioSerializer {
    pub fn new(stream_sid: impl Into<String>) -> Self {
        Self {
            stream_sid: stream_sid.into(),
        }
    }

    pub fn stream_sid(&self) -> &str {
        &self.stream_sid
    }

    /// `media` message carrying one mu-law frame.
    pub fn media(&self, frame: &AudioFrame) -> Option<String> {
        let msg = TwilioMediaOut {
            event: "media",
            stream_sid: &self.stream_sid,
            media: TwilioMediaPayloadOut {
                payload: encode_base64(frame.as_bytes()),
            },
        };
        tracing::trace!(bytes = frame.len(), "Twilio: serializing audio output");
        serde_json::to_string(&msg).ok()
    }

    /// `clear` message flushing Twilio's own playback buffer.
    pub fn clear(&self) -> Option<String> {
        let msg = TwilioClearOut {
            event: "clear",
            stream_sid: &self.stream_sid,
        };
        serde_json::to_string(&msg).ok()
    }

    /// `mark` message, echoed back by Twilio once playback reaches it.
    pub fn mark(&self, name: &str) -> Option<String> {
        let msg = TwilioMarkOut {
            event: "mark",
            stream_sid: &self.stream_sid,
            mark: TwilioMarkPayloadOut { name },
        };
        serde_json::to_string(&msg).ok()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
