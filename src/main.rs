// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! `phone-bridge` - serve Twilio media streams backed by Gemini Live.
//!
//! ```bash
//! GEMINI_API_KEY=... PORT=8765 cargo run --bin phone-bridge
//! ```
//!
//! Point a TwiML `<Connect><Stream url="wss://<host>/media-stream"/>` at the
//! server. `<Parameter name="openingLine" .../>` overrides the greeting per call.

use phone_bridge::config::BridgeConfig;
use phone_bridge::server;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,phone_bridge=debug")),
        )
        .init();

    let config = BridgeConfig::from_env()?;
    tracing::debug!(?config, "Loaded configuration");

    server::serve(config).await?;
    Ok(())
}
