// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Per-call session lifecycle.
//!
//! A [`SessionController`] owns one [`CallSession`] and drives it from
//! Twilio events:
//!
//! ```text
//! Idle --start--> Active --stop/close/error/AI closed--> Closing --> Closed
//! ```
//!
//! On `start` the controller opens the AI session (bounded by the configured
//! timeout), sends the opening line and spawns a response task that feeds
//! AI audio into the [`OutboundPipeline`]. Media frames go through the
//! [`InboundPipeline`] to the AI session while the call is active. Failures
//! to open the AI session or to forward one frame are logged and the call
//! continues; only the transport ending closes the session.

use std::fmt;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::config::{BridgeConfig, ModelConfig};
use crate::error::BridgeError;
use crate::serializers::twilio::{parse_message, StreamStart, TwilioEvent, TwilioSerializer};
use crate::services::{OpenedSession, RealtimeConnector, RealtimeEvent, RealtimeSession};
use crate::session::inbound::InboundPipeline;
use crate::session::outbound::{OutboundPipeline, PlaybackQueue};
use crate::utils::helpers::generate_unique_id;

/// `customParameters` key overriding the opening line for one call.
pub const OPENING_LINE_PARAM: &str = "openingLine";
/// `customParameters` key overriding the system instruction for one call.
pub const SYSTEM_INSTRUCTION_PARAM: &str = "systemInstruction";

/// Lifecycle state of a call session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Transport connected, no `start` yet.
    Idle,
    /// Call started; audio is bridged if the AI session opened.
    Active,
    /// Teardown in progress.
    Closing,
    /// Terminal.
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Active => "active",
            Self::Closing => "closing",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// State for one telephony connection.
pub struct CallSession {
    id: String,
    stream_sid: Option<String>,
    call_sid: Option<String>,
    state: SessionState,
    interrupted: Arc<AtomicBool>,
    queue: Arc<PlaybackQueue>,
    ai: Option<Arc<dyn RealtimeSession>>,
    response_task: Option<JoinHandle<()>>,
    /// Cancels the response task and the pacer.
    token: CancellationToken,
    /// Cancelled by the response task when the AI closes the session.
    ai_closed: CancellationToken,
}

impl CallSession {
    fn new() -> Self {
        Self {
            id: generate_unique_id("call"),
            stream_sid: None,
            call_sid: None,
            state: SessionState::Idle,
            interrupted: Arc::new(AtomicBool::new(false)),
            queue: Arc::new(PlaybackQueue::new()),
            ai: None,
            response_task: None,
            token: CancellationToken::new(),
            ai_closed: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn stream_sid(&self) -> Option<&str> {
        self.stream_sid.as_deref()
    }

    pub fn call_sid(&self) -> Option<&str> {
        self.call_sid.as_deref()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether an AI session is attached and still open.
    pub fn is_bridged(&self) -> bool {
        self.ai.is_some() && !self.ai_closed.is_cancelled()
    }

    pub fn queue(&self) -> &Arc<PlaybackQueue> {
        &self.queue
    }
}

impl fmt::Debug for CallSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallSession")
            .field("id", &self.id)
            .field("stream_sid", &self.stream_sid)
            .field("call_sid", &self.call_sid)
            .field("state", &self.state)
            .field("bridged", &self.is_bridged())
            .finish()
    }
}

/// Drives one [`CallSession`] from transport messages.
pub struct SessionController {
    config: Arc<BridgeConfig>,
    connector: Arc<dyn RealtimeConnector>,
    transport: mpsc::Sender<String>,
    inbound: InboundPipeline,
    session: CallSession,
}

impl SessionController {
    /// Create a controller whose outbound Twilio messages go to `transport`.
    pub fn new(
        config: Arc<BridgeConfig>,
        connector: Arc<dyn RealtimeConnector>,
        transport: mpsc::Sender<String>,
    ) -> Self {
        let inbound = InboundPipeline::new(config.ai_input_sample_rate);
        Self {
            config,
            connector,
            transport,
            inbound,
            session: CallSession::new(),
        }
    }

    pub fn session(&self) -> &CallSession {
        &self.session
    }

    pub fn state(&self) -> SessionState {
        self.session.state
    }

    /// Consume transport messages until the call ends, then tear down.
    ///
    /// Stops on `stop`, on end of stream, on a transport error, or when the
    /// AI session closes on its own.
    pub async fn run<S, E>(mut self, messages: S) -> SessionState
    where
        S: Stream<Item = std::result::Result<String, E>>,
        E: fmt::Display,
    {
        let mut messages = std::pin::pin!(messages);
        let ai_closed = self.session.ai_closed.clone();

        loop {
            tokio::select! {
                biased;
                _ = ai_closed.cancelled() => {
                    info!(session = %self.session.id, "AI session closed, ending call");
                    break;
                }
                msg = messages.next() => match msg {
                    Some(Ok(text)) => {
                        self.handle_text(&text).await;
                        if self.session.state == SessionState::Closed {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        warn!(session = %self.session.id, "Transport error: {e}");
                        break;
                    }
                    None => {
                        debug!(session = %self.session.id, "Transport closed");
                        break;
                    }
                },
            }
        }

        self.teardown().await;
        self.session.state
    }

    /// Handle one raw transport message. Malformed messages are ignored.
    pub async fn handle_text(&mut self, text: &str) {
        if let Some(event) = parse_message(text) {
            self.handle_event(event).await;
        }
    }

    pub async fn handle_event(&mut self, event: TwilioEvent) {
        trace!(session = %self.session.id, "Twilio event: {event}");
        match event {
            TwilioEvent::Connected => debug!(session = %self.session.id, "Twilio connected"),
            TwilioEvent::Start(start) => self.start(start).await,
            TwilioEvent::Media(payload) => self.forward_media(&payload).await,
            TwilioEvent::Stop { .. } => {
                info!(session = %self.session.id, "Twilio stream stopped");
                self.teardown().await;
            }
            TwilioEvent::Mark(name) => debug!(session = %self.session.id, mark = %name, "Playback reached mark"),
            TwilioEvent::Dtmf(digit) => debug!(session = %self.session.id, digit = %digit, "DTMF received"),
        }
    }

    async fn start(&mut self, start: StreamStart) {
        if self.session.state != SessionState::Idle {
            warn!(session = %self.session.id, state = %self.session.state, "Ignoring start event");
            return;
        }
        self.session.stream_sid = Some(start.stream_sid.clone());
        self.session.call_sid = start.call_sid.clone();
        self.session.state = SessionState::Active;
        info!(
            session = %self.session.id,
            stream_sid = %start.stream_sid,
            call_sid = ?start.call_sid,
            "Call started"
        );

        let model = self.model_config_for(&start);
        let opened = match tokio::time::timeout(self.config.open_timeout, self.connector.open(&model)).await {
            Ok(Ok(opened)) => opened,
            Ok(Err(e)) => {
                error!(session = %self.session.id, "Failed to open AI session, continuing without bridging: {e}");
                return;
            }
            Err(_) => {
                let e = BridgeError::Timeout(self.config.open_timeout);
                error!(session = %self.session.id, "Failed to open AI session, continuing without bridging: {e}");
                return;
            }
        };
        let OpenedSession { session, events } = opened;

        let opening_line = start
            .custom_parameters
            .get(OPENING_LINE_PARAM)
            .cloned()
            .or_else(|| self.config.opening_line.clone())
            .filter(|line| !line.trim().is_empty());
        if let Some(line) = opening_line {
            debug!(session = %self.session.id, "Sending opening line");
            if let Err(e) = session.send_text(&line).await {
                warn!(session = %self.session.id, "Failed to send opening line: {e}");
            }
        }

        let outbound = OutboundPipeline::new(
            Arc::clone(&self.session.queue),
            Arc::clone(&self.session.interrupted),
            TwilioSerializer::new(start.stream_sid),
            self.transport.clone(),
            self.config.ai_output_sample_rate,
            self.config.pacer_interval,
            self.session.token.child_token(),
        );
        let task = tokio::spawn(response_loop(
            events,
            outbound,
            self.session.token.clone(),
            self.session.ai_closed.clone(),
        ));
        self.session.response_task = Some(task);
        self.session.ai = Some(session);
        info!(session = %self.session.id, "AI session bridged");
    }

    async fn forward_media(&mut self, payload: &[u8]) {
        if self.session.state != SessionState::Active {
            trace!(session = %self.session.id, state = %self.session.state, "Dropping media outside an active call");
            return;
        }
        if !self.session.is_bridged() {
            return;
        }
        let Some(ai) = &self.session.ai else {
            return;
        };
        let pcm = self.inbound.process_to_bytes(payload);
        if let Err(e) = ai.send_audio(&pcm, self.inbound.ai_sample_rate()).await {
            warn!(session = %self.session.id, "Failed to forward caller audio: {e}");
        }
    }

    /// Stop playback, end and close the AI session. Safe to call repeatedly.
    pub async fn teardown(&mut self) {
        match self.session.state {
            SessionState::Closing | SessionState::Closed => return,
            SessionState::Idle | SessionState::Active => {}
        }
        self.session.state = SessionState::Closing;
        debug!(session = %self.session.id, "Tearing down call session");

        self.session.token.cancel();
        if let Some(task) = self.session.response_task.take() {
            if let Err(e) = task.await {
                warn!(session = %self.session.id, "Response task ended abnormally: {e}");
            }
        }
        self.session.queue.clear().await;

        if let Some(ai) = self.session.ai.take() {
            if !self.session.ai_closed.is_cancelled() {
                if let Err(e) = ai.send_end_of_input().await {
                    debug!(session = %self.session.id, "Failed to signal end of input: {e}");
                }
            }
            if let Err(e) = ai.close().await {
                warn!(session = %self.session.id, "Failed to close AI session: {e}");
            }
        }

        self.session.state = SessionState::Closed;
        info!(session = %self.session.id, stream_sid = ?self.session.stream_sid, "Call session closed");
    }

    fn model_config_for(&self, start: &StreamStart) -> ModelConfig {
        let mut model = self.config.model.clone();
        if let Some(instruction) = start
            .custom_parameters
            .get(SYSTEM_INSTRUCTION_PARAM)
            .filter(|v| !v.trim().is_empty())
        {
            model.system_instruction = Some(instruction.clone());
        }
        model
    }
}

impl fmt::Debug for SessionController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionController")
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

/// Consume AI events until the session ends or the call is torn down.
async fn response_loop(
    mut events: mpsc::Receiver<RealtimeEvent>,
    mut outbound: OutboundPipeline,
    token: CancellationToken,
    ai_closed: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            event = events.recv() => event,
        };
        match event {
            Some(RealtimeEvent::Interrupted) => outbound.interrupt().await,
            Some(RealtimeEvent::Audio { data, sample_rate }) => {
                outbound.push_audio(&data, sample_rate).await;
            }
            Some(RealtimeEvent::TurnComplete) => {
                if let Some(mark) = outbound.mark_turn_complete().await {
                    debug!(mark = %mark, "AI turn complete");
                }
            }
            Some(RealtimeEvent::Other(kind)) => trace!("AI event ignored: {kind}"),
            None => {
                info!("AI event stream ended");
                ai_closed.cancel();
                break;
            }
        }
    }
    outbound.shutdown().await;
}
