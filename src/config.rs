// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Bridge configuration.
//!
//! Values come from the environment (the binary loads `.env` first via
//! `dotenvy`). Every field has a default except the AI service API key.

use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{BridgeError, Result};

/// Default sample rate the AI service expects for input audio.
pub const DEFAULT_AI_INPUT_SAMPLE_RATE: u32 = 16_000;
/// Rate assumed for AI output audio when an event carries no rate hint.
pub const DEFAULT_AI_OUTPUT_SAMPLE_RATE: u32 = 24_000;
/// Default bound on opening the AI session.
pub const DEFAULT_OPEN_TIMEOUT: Duration = Duration::from_secs(10);
/// Default pacer period, one telephony frame.
pub const DEFAULT_PACER_INTERVAL: Duration = Duration::from_millis(20);

/// Parameters handed to the AI session adapter when a call starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelConfig {
    /// Model identifier.
    pub model: String,
    /// Prebuilt voice name.
    pub voice: Option<String>,
    /// System instruction for the conversation.
    pub system_instruction: Option<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.0-flash-live-001".to_string(),
            voice: None,
            system_instruction: None,
        }
    }
}

/// Process-level configuration for the bridge.
#[derive(Clone)]
pub struct BridgeConfig {
    /// Address the HTTP/WebSocket server binds to.
    pub bind_addr: String,
    /// Port the HTTP/WebSocket server listens on.
    pub port: u16,
    /// API key for the realtime AI service.
    pub api_key: String,
    /// Model parameters for new AI sessions.
    pub model: ModelConfig,
    /// Text sent as the first user turn so the AI speaks first.
    pub opening_line: Option<String>,
    /// Rate of audio forwarded to the AI service.
    pub ai_input_sample_rate: u32,
    /// Rate assumed for AI audio without an explicit rate hint.
    pub ai_output_sample_rate: u32,
    /// Bound on opening the AI session.
    pub open_timeout: Duration,
    /// Pacer period.
    pub pacer_interval: Duration,
}

impl fmt::Debug for BridgeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeConfig")
            .field("bind_addr", &self.bind_addr)
            .field("port", &self.port)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("opening_line", &self.opening_line)
            .field("ai_input_sample_rate", &self.ai_input_sample_rate)
            .field("ai_output_sample_rate", &self.ai_output_sample_rate)
            .field("open_timeout", &self.open_timeout)
            .field("pacer_interval", &self.pacer_interval)
            .finish()
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".to_string(),
            port: 8765,
            api_key: String::new(),
            model: ModelConfig::default(),
            opening_line: None,
            ai_input_sample_rate: DEFAULT_AI_INPUT_SAMPLE_RATE,
            ai_output_sample_rate: DEFAULT_AI_OUTPUT_SAMPLE_RATE,
            open_timeout: DEFAULT_OPEN_TIMEOUT,
            pacer_interval: DEFAULT_PACER_INTERVAL,
        }
    }
}

impl BridgeConfig {
    /// Load configuration from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_key = non_empty("GEMINI_API_KEY")
            .ok_or_else(|| BridgeError::Config("GEMINI_API_KEY must be set".to_string()))?;

        let model = ModelConfig {
            model: non_empty("GEMINI_MODEL").unwrap_or(defaults.model.model),
            voice: non_empty("GEMINI_VOICE"),
            system_instruction: non_empty("SYSTEM_INSTRUCTION"),
        };

        Ok(Self {
            bind_addr: non_empty("BIND_ADDR").unwrap_or(defaults.bind_addr),
            port: parse_or("PORT", non_empty("PORT"), defaults.port)?,
            api_key,
            model,
            opening_line: non_empty("OPENING_LINE"),
            ai_input_sample_rate: parse_rate(
                "AI_INPUT_SAMPLE_RATE",
                non_empty("AI_INPUT_SAMPLE_RATE"),
                defaults.ai_input_sample_rate,
            )?,
            ai_output_sample_rate: parse_rate(
                "AI_OUTPUT_SAMPLE_RATE",
                non_empty("AI_OUTPUT_SAMPLE_RATE"),
                defaults.ai_output_sample_rate,
            )?,
            open_timeout: parse_millis(
                "AI_OPEN_TIMEOUT_MS",
                non_empty("AI_OPEN_TIMEOUT_MS"),
                defaults.open_timeout,
            )?,
            pacer_interval: parse_millis(
                "PACER_INTERVAL_MS",
                non_empty("PACER_INTERVAL_MS"),
                defaults.pacer_interval,
            )?,
        })
    }
}

fn parse_millis(key: &str, value: Option<String>, default: Duration) -> Result<Duration> {
    let millis = parse_or(key, value, default.as_millis() as u64)?;
    if millis == 0 {
        return Err(BridgeError::Config(format!("{key} must be greater than zero")));
    }
    Ok(Duration::from_millis(millis))
}

fn parse_or<T: FromStr>(key: &str, value: Option<String>, default: T) -> Result<T> {
    match value {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| BridgeError::Config(format!("{key} is not a valid number: {raw}"))),
        None => Ok(default),
    }
}

fn parse_rate(key: &str, value: Option<String>, default: u32) -> Result<u32> {
    let rate = parse_or(key, value, default)?;
    if rate == 0 {
        return Err(BridgeError::Config(format!("{key} must be greater than zero")));
    }
    Ok(rate)
}
