// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Error types for the telephony bridge.
//!
//! Audio conversion is total and never fails; these errors come from the
//! realtime AI connection, the telephony transport, and configuration.

use std::time::Duration;

/// Errors raised by the AI session adapter, transport plumbing, or config.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// The AI session could not be established.
    #[error("failed to connect to realtime service: {0}")]
    Connect(String),
    /// Opening the AI session exceeded the configured bound.
    #[error("realtime session open timed out after {0:?}")]
    Timeout(Duration),
    /// A single message could not be delivered.
    #[error("failed to send: {0}")]
    Send(String),
    /// The peer has already closed.
    #[error("connection closed")]
    Closed,
    /// The peer sent something we could not interpret.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// Missing or invalid configuration value.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// Listener or socket I/O failure in the server.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, BridgeError>;
