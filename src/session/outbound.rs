// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! AI audio toward the caller: resample, encode, frame, queue, pace.
//!
//! [`OutboundPipeline`] turns AI response chunks into 160-byte mu-law frames
//! and appends them to a shared [`PlaybackQueue`]. AI chunks rarely divide
//! into whole frames, so the bytes past the last full frame are carried into
//! the next chunk and only padded out with silence when the turn completes.
//! A pacer task drains the queue one frame per tick and sends each frame as a
//! Twilio `media` message.
//!
//! Barge-in goes through [`OutboundPipeline::interrupt`]: it raises the shared
//! interruption flag, stops the pacer, empties the queue and the carried tail,
//! and tells Twilio to drop whatever it has buffered. The next audio chunk
//! lowers the flag and starts a fresh pacer.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::audio::codec::encode_samples;
use crate::audio::{resample, AudioFrame, FrameAssembler, PcmBuffer, TELEPHONY_SAMPLE_RATE};
use crate::serializers::twilio::TwilioSerializer;

// ---------------------------------------------------------------------------
// PlaybackQueue
// ---------------------------------------------------------------------------

/// An entry waiting for paced transmission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackItem {
    Frame(AudioFrame),
    /// Named Twilio mark, emitted once every frame queued before it is sent.
    Mark(String),
}

/// FIFO of pending playback shared by the outbound pipeline and its pacer.
///
/// Enqueue, dequeue and clear all go through one async mutex, so a clear
/// never races an append and a frame is never read mid-append.
#[derive(Debug, Default)]
pub struct PlaybackQueue {
    items: Mutex<VecDeque<PlaybackItem>>,
}

impl PlaybackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append frames in order. Returns the number appended.
    pub async fn push_frames(&self, frames: impl IntoIterator<Item = AudioFrame>) -> usize {
        let mut items = self.items.lock().await;
        let before = items.len();
        items.extend(frames.into_iter().map(PlaybackItem::Frame));
        items.len() - before
    }

    pub async fn push_mark(&self, name: impl Into<String>) {
        self.items.lock().await.push_back(PlaybackItem::Mark(name.into()));
    }

    pub async fn pop_front(&self) -> Option<PlaybackItem> {
        self.items.lock().await.pop_front()
    }

    /// Drop everything pending. Returns how many entries were discarded.
    pub async fn clear(&self) -> usize {
        let mut items = self.items.lock().await;
        let dropped = items.len();
        items.clear();
        dropped
    }

    pub async fn len(&self) -> usize {
        self.items.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.lock().await.is_empty()
    }

    async fn lock(&self) -> MutexGuard<'_, VecDeque<PlaybackItem>> {
        self.items.lock().await
    }
}

// ---------------------------------------------------------------------------
// Transcoding
// ---------------------------------------------------------------------------

/// Convert one AI PCM chunk into 8 kHz mu-law bytes, not yet framed.
pub fn encode_for_telephony(pcm: PcmBuffer) -> Vec<u8> {
    let narrowband = resample(pcm, TELEPHONY_SAMPLE_RATE);
    encode_samples(&narrowband.samples)
}

// ---------------------------------------------------------------------------
// Pacer
// ---------------------------------------------------------------------------

struct Pacer {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl Pacer {
    fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Cancel the tick loop and wait for it to exit.
    async fn stop(self) {
        self.token.cancel();
        if let Err(e) = self.task.await {
            warn!("Pacer task ended abnormally: {e}");
        }
    }
}

/// Everything the pacer loop needs, moved into its task.
struct PacerLoop {
    queue: Arc<PlaybackQueue>,
    serializer: TwilioSerializer,
    transport: mpsc::Sender<String>,
    period: Duration,
    token: CancellationToken,
}

impl PacerLoop {
    async fn run(self) {
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        debug!(stream_sid = %self.serializer.stream_sid(), "Pacer started");

        loop {
            tokio::select! {
                biased;
                _ = self.token.cancelled() => break,
                _ = ticker.tick() => {}
            }
            if !self.tick().await {
                break;
            }
        }

        debug!(stream_sid = %self.serializer.stream_sid(), "Pacer stopped");
    }

    /// Emit at most one frame. Returns `false` once the pacer should exit.
    async fn tick(&self) -> bool {
        // Held until the send completes so a concurrent clear waits for it.
        let mut items = self.queue.lock().await;
        if self.token.is_cancelled() || self.transport.is_closed() {
            return false;
        }

        while let Some(item) = items.pop_front() {
            let (message, is_frame) = match &item {
                PlaybackItem::Frame(frame) => {
                    trace!(bytes = frame.len(), "Pacer: emitting frame");
                    (self.serializer.media(frame), true)
                }
                PlaybackItem::Mark(name) => {
                    debug!(mark = %name, "Pacer: emitting mark");
                    (self.serializer.mark(name), false)
                }
            };
            let Some(message) = message else {
                warn!("Pacer: failed to serialize {item:?}");
                continue;
            };

            let sent = tokio::select! {
                biased;
                _ = self.token.cancelled() => return false,
                result = self.transport.send(message) => result,
            };
            if sent.is_err() {
                debug!("Pacer: transport closed");
                return false;
            }
            if is_frame {
                break;
            }
        }
        true
    }
}

// ---------------------------------------------------------------------------
// OutboundPipeline
// ---------------------------------------------------------------------------

/// Per-call outbound path, driven by the AI response loop.
pub struct OutboundPipeline {
    queue: Arc<PlaybackQueue>,
    interrupted: Arc<AtomicBool>,
    serializer: TwilioSerializer,
    transport: mpsc::Sender<String>,
    default_sample_rate: u32,
    pacer_interval: Duration,
    token: CancellationToken,
    pacer: Option<Pacer>,
    /// Mu-law bytes past the last full frame, carried into the next chunk.
    assembler: FrameAssembler,
    pending_audio: bool,
    marks_sent: u64,
}

impl OutboundPipeline {
    /// Create a pipeline writing to `transport`.
    ///
    /// `default_sample_rate` applies to chunks without a rate hint. Pacer
    /// tokens are children of `token`, so cancelling it stops playback.
    pub fn new(
        queue: Arc<PlaybackQueue>,
        interrupted: Arc<AtomicBool>,
        serializer: TwilioSerializer,
        transport: mpsc::Sender<String>,
        default_sample_rate: u32,
        pacer_interval: Duration,
        token: CancellationToken,
    ) -> Self {
        Self {
            queue,
            interrupted,
            serializer,
            transport,
            default_sample_rate,
            pacer_interval,
            token,
            pacer: None,
            assembler: FrameAssembler::default(),
            pending_audio: false,
            marks_sent: 0,
        }
    }

    pub fn queue(&self) -> &Arc<PlaybackQueue> {
        &self.queue
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::Acquire)
    }

    pub fn is_pacing(&self) -> bool {
        self.pacer.as_ref().is_some_and(Pacer::is_running)
    }

    /// Queue one chunk of PCM16 little-endian AI audio for playback.
    ///
    /// Only whole 160-byte frames are enqueued; a trailing partial frame is
    /// held until the next chunk or the end of the turn. Returns the number
    /// of frames enqueued.
    pub async fn push_audio(&mut self, pcm: &[u8], sample_rate: Option<u32>) -> usize {
        if self.token.is_cancelled() {
            return 0;
        }
        let rate = sample_rate.unwrap_or(self.default_sample_rate);
        let mulaw = encode_for_telephony(PcmBuffer::from_le_bytes(pcm, rate));
        if mulaw.is_empty() {
            return 0;
        }

        self.interrupted.store(false, Ordering::Release);
        self.pending_audio = true;
        let frames = self.assembler.push(&mulaw);
        let held = self.assembler.pending_len();
        if frames.is_empty() {
            trace!(held, rate, "Outbound: holding partial frame");
            return 0;
        }
        let queued = self.queue.push_frames(frames).await;
        trace!(frames = queued, held, rate, "Outbound: queued audio");
        self.ensure_pacer();
        queued
    }

    /// Flush the held partial frame and queue a Twilio mark behind the
    /// current turn's audio.
    ///
    /// The tail is padded with mu-law silence to a full frame. No mark is
    /// queued when nothing was pushed since the previous one.
    pub async fn mark_turn_complete(&mut self) -> Option<String> {
        if let Some(tail) = self.assembler.flush_padded() {
            self.queue.push_frames([tail]).await;
            self.ensure_pacer();
        }
        if !self.pending_audio || self.is_interrupted() {
            return None;
        }
        self.pending_audio = false;
        self.marks_sent += 1;
        let name = format!("turn-{}", self.marks_sent);
        self.queue.push_mark(name.clone()).await;
        self.ensure_pacer();
        Some(name)
    }

    /// Barge-in: stop playback and discard everything not yet sent.
    pub async fn interrupt(&mut self) {
        self.interrupted.store(true, Ordering::Release);
        if let Some(pacer) = self.pacer.take() {
            pacer.stop().await;
        }
        let dropped = self.queue.clear().await;
        self.assembler.clear();
        self.pending_audio = false;
        debug!(
            stream_sid = %self.serializer.stream_sid(),
            dropped,
            "Outbound: interrupted, playback cleared"
        );

        let Some(clear) = self.serializer.clear() else {
            return;
        };
        // A full transport must not hold up teardown.
        tokio::select! {
            biased;
            _ = self.token.cancelled() => {
                debug!("Outbound: call ended before clear was sent");
            }
            result = self.transport.send(clear) => {
                if result.is_err() {
                    debug!("Outbound: transport closed before clear");
                }
            }
        }
    }

    /// Stop the pacer and drop anything still queued or held.
    pub async fn shutdown(&mut self) {
        if let Some(pacer) = self.pacer.take() {
            pacer.stop().await;
        }
        self.queue.clear().await;
        self.assembler.clear();
    }

    fn ensure_pacer(&mut self) {
        if self.is_pacing() || self.token.is_cancelled() {
            return;
        }
        let token = self.token.child_token();
        let pacer_loop = PacerLoop {
            queue: Arc::clone(&self.queue),
            serializer: self.serializer.clone(),
            transport: self.transport.clone(),
            period: self.pacer_interval,
            token: token.clone(),
        };
        let task = tokio::spawn(pacer_loop.run());
        self.pacer = Some(Pacer { token, task });
    }
}
