// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! HTTP surface: the Twilio media-stream WebSocket and a health check.

use std::sync::Arc;

use axum::extract::ws::{Message as WsMsg, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use crate::config::BridgeConfig;
use crate::error::Result;
use crate::services::gemini_live::GeminiLiveConnector;
use crate::services::RealtimeConnector;
use crate::session::SessionController;

/// Capacity of the controller-to-socket channel for one call.
const OUTBOUND_CHANNEL_CAPACITY: usize = 1024;

#[derive(Clone)]
struct AppState {
    config: Arc<BridgeConfig>,
    connector: Arc<dyn RealtimeConnector>,
}

/// Build the router with the given AI connector.
pub fn router(config: Arc<BridgeConfig>, connector: Arc<dyn RealtimeConnector>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/media-stream", get(handle_media_stream))
        .with_state(AppState { config, connector })
}

/// Serve on an already-bound listener until the server fails.
pub async fn serve_on(
    listener: TcpListener,
    config: Arc<BridgeConfig>,
    connector: Arc<dyn RealtimeConnector>,
) -> Result<()> {
    axum::serve(listener, router(config, connector)).await?;
    Ok(())
}

/// Bind `BIND_ADDR:PORT` and bridge calls to Gemini Live.
pub async fn serve(config: BridgeConfig) -> Result<()> {
    let addr = format!("{}:{}", config.bind_addr, config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, model = %config.model.model, "Phone bridge listening");

    let connector: Arc<dyn RealtimeConnector> =
        Arc::new(GeminiLiveConnector::new(config.api_key.clone()));
    serve_on(listener, Arc::new(config), connector).await
}

/// GET /health
async fn health() -> &'static str {
    "ok"
}

/// GET /media-stream - WebSocket endpoint Twilio streams call audio to.
async fn handle_media_stream(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
}

async fn handle_ws_connection(socket: WebSocket, state: AppState) {
    tracing::info!("Twilio WebSocket connected");
    let (mut ws_sender, ws_receiver) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<String>(OUTBOUND_CHANNEL_CAPACITY);

    // Ends once every sender (controller, outbound pipeline, pacer) is gone.
    let write_handle = tokio::spawn(async move {
        while let Some(text) = out_rx.recv().await {
            if ws_sender.send(WsMsg::Text(text)).await.is_err() {
                tracing::debug!("Twilio WebSocket write failed");
                break;
            }
        }
        let _ = ws_sender.close().await;
    });

    let messages = ws_receiver.filter_map(|msg| async move {
        match msg {
            Ok(WsMsg::Text(text)) => Some(Ok(text)),
            Ok(WsMsg::Binary(bytes)) => String::from_utf8(bytes).ok().map(Ok),
            Ok(WsMsg::Ping(_) | WsMsg::Pong(_) | WsMsg::Close(_)) => None,
            Err(e) => Some(Err(e)),
        }
    });

    let controller = SessionController::new(state.config, state.connector, out_tx);
    let final_state = controller.run(messages).await;

    if let Err(e) = write_handle.await {
        tracing::warn!("Twilio writer task failed: {e}");
    }
    tracing::info!(state = %final_state, "Twilio WebSocket session ended");
}
