// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! End-to-end tests of the session controller against a mock AI service.
//!
//! Twilio messages go in through an mpsc-backed stream; outbound Twilio
//! messages are read from the controller's transport channel.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use phone_bridge::config::BridgeConfig;
use phone_bridge::services::RealtimeEvent;
use phone_bridge::session::{SessionController, SessionState};
use phone_bridge::tests::{
    event_names, media_message, pcm_tone, start_message, stop_message, AiCall, MockConnector,
    MockHandle, OpenBehavior,
};

const SID: &str = "SX1";

struct Harness {
    to_bridge: mpsc::UnboundedSender<String>,
    from_bridge: mpsc::Receiver<String>,
    task: JoinHandle<SessionState>,
    connector: Arc<MockConnector>,
    handles: mpsc::UnboundedReceiver<MockHandle>,
}

impl Harness {
    fn spawn(behavior: OpenBehavior, config: BridgeConfig) -> Self {
        let (connector, handles) = MockConnector::new(behavior);
        let (transport_tx, from_bridge) = mpsc::channel(1024);
        let (to_bridge, inbound_rx) = mpsc::unbounded_channel();

        let controller = SessionController::new(Arc::new(config), connector.clone(), transport_tx);
        let task = tokio::spawn(controller.run(transport_stream(inbound_rx)));
        Self {
            to_bridge,
            from_bridge,
            task,
            connector,
            handles,
        }
    }

    fn send(&self, text: String) {
        self.to_bridge.send(text).expect("controller is running");
    }

    async fn next_handle(&mut self) -> MockHandle {
        self.handles.recv().await.expect("AI session opened")
    }

    async fn finish(&mut self) -> SessionState {
        (&mut self.task).await.expect("controller task panicked")
    }

    fn drain(&mut self) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(msg) = self.from_bridge.try_recv() {
            out.push(msg);
        }
        out
    }
}

fn transport_stream(
    mut rx: mpsc::UnboundedReceiver<String>,
) -> impl Stream<Item = Result<String, Infallible>> {
    futures_util::stream::poll_fn(move |cx| rx.poll_recv(cx)).map(Ok)
}

fn config() -> BridgeConfig {
    BridgeConfig {
        opening_line: Some("Hello, how can I help?".to_string()),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_ten_media_frames_become_ten_16k_buffers() {
    let mut h = Harness::spawn(OpenBehavior::Succeed, config());
    h.send(start_message(SID, &[]));
    for _ in 0..10 {
        h.send(media_message(SID, &[0x7F; 160]));
    }
    h.send(stop_message(SID));

    assert_eq!(h.finish().await, SessionState::Closed);
    let handle = h.next_handle().await;
    assert_eq!(
        handle.session.audio_chunks(),
        vec![(640, 16_000); 10],
        "160 mu-law bytes -> 320 samples at 16 kHz -> 640 bytes"
    );

    let calls = handle.session.calls();
    assert_eq!(calls.first(), Some(&AiCall::Text("Hello, how can I help?".to_string())));
    assert_eq!(&calls[calls.len() - 2..], &[AiCall::EndOfInput, AiCall::Close]);
    assert!(handle.session.is_closed());
}

#[tokio::test]
async fn test_media_before_start_is_dropped() {
    let mut h = Harness::spawn(OpenBehavior::Succeed, config());
    h.send(media_message(SID, &[0xFF; 160]));
    h.send(media_message(SID, &[0xFF; 160]));
    h.send(start_message(SID, &[]));
    h.send(media_message(SID, &[0xFF; 160]));
    h.send(stop_message(SID));

    h.finish().await;
    let handle = h.next_handle().await;
    assert_eq!(handle.session.audio_chunks().len(), 1);
}

#[tokio::test]
async fn test_custom_parameters_override_opening_line_and_instruction() {
    let mut h = Harness::spawn(OpenBehavior::Succeed, config());
    h.send(start_message(
        SID,
        &[("openingLine", "Thanks for calling."), ("systemInstruction", "Be terse.")],
    ));
    h.send(stop_message(SID));

    h.finish().await;
    let handle = h.next_handle().await;
    assert_eq!(handle.session.texts(), vec!["Thanks for calling.".to_string()]);
    let opens = h.connector.opens();
    assert_eq!(opens.len(), 1);
    assert_eq!(opens[0].system_instruction.as_deref(), Some("Be terse."));
}

#[tokio::test]
async fn test_no_opening_line_sends_no_text() {
    let mut h = Harness::spawn(OpenBehavior::Succeed, BridgeConfig::default());
    h.send(start_message(SID, &[]));
    h.send(stop_message(SID));

    h.finish().await;
    assert!(h.next_handle().await.session.texts().is_empty());
}

#[tokio::test]
async fn test_forward_failure_does_not_end_call() {
    let mut h = Harness::spawn(OpenBehavior::Succeed, BridgeConfig::default());
    h.send(start_message(SID, &[]));
    let handle = h.next_handle().await;
    handle.session.fail_next_sends(1);

    h.send(media_message(SID, &[0xFF; 160]));
    h.send(media_message(SID, &[0xFF; 160]));
    h.send(stop_message(SID));

    assert_eq!(h.finish().await, SessionState::Closed);
    assert_eq!(handle.session.audio_chunks().len(), 1, "first frame failed, second went through");
}

#[tokio::test]
async fn test_open_failure_continues_without_bridging() {
    let mut h = Harness::spawn(OpenBehavior::Fail, config());
    h.send(start_message(SID, &[]));
    for _ in 0..3 {
        h.send(media_message(SID, &[0xFF; 160]));
    }
    h.send(stop_message(SID));

    assert_eq!(h.finish().await, SessionState::Closed);
    assert_eq!(h.connector.opens().len(), 1);
    assert!(h.handles.try_recv().is_err());
    assert_eq!(h.from_bridge.recv().await, None, "nothing was sent to Twilio");
}

#[tokio::test(start_paused = true)]
async fn test_open_timeout_continues_without_bridging() {
    let config = BridgeConfig {
        open_timeout: Duration::from_millis(100),
        ..config()
    };
    let mut h = Harness::spawn(OpenBehavior::Hang, config);
    h.send(start_message(SID, &[]));
    h.send(media_message(SID, &[0xFF; 160]));
    h.send(stop_message(SID));

    assert_eq!(h.finish().await, SessionState::Closed);
    assert_eq!(h.connector.opens().len(), 1);
    assert!(h.handles.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_ai_audio_is_paced_to_twilio() {
    let mut h = Harness::spawn(OpenBehavior::Succeed, BridgeConfig::default());
    h.send(start_message(SID, &[]));
    let handle = h.next_handle().await;

    // 100 ms at the default 24 kHz output rate -> five 20 ms frames.
    handle
        .events
        .send(RealtimeEvent::Audio {
            data: pcm_tone(100, 24_000, 2000),
            sample_rate: None,
        })
        .await
        .unwrap();
    handle.events.send(RealtimeEvent::TurnComplete).await.unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    let sent = h.drain();
    assert_eq!(
        event_names(&sent),
        vec!["media", "media", "media", "media", "media", "mark"]
    );
    let first: serde_json::Value = serde_json::from_str(&sent[0]).unwrap();
    assert_eq!(first["streamSid"], SID);
    let payload = phone_bridge::utils::helpers::decode_base64(
        first["media"]["payload"].as_str().unwrap(),
    )
    .unwrap();
    assert_eq!(payload.len(), 160);

    h.send(stop_message(SID));
    h.finish().await;
}

#[tokio::test(start_paused = true)]
async fn test_uneven_ai_chunks_reach_twilio_as_full_frames() {
    let mut h = Harness::spawn(OpenBehavior::Succeed, BridgeConfig::default());
    h.send(start_message(SID, &[]));
    let handle = h.next_handle().await;

    // 25 ms chunks at 24 kHz are 200 mu-law bytes each.
    for _ in 0..4 {
        handle
            .events
            .send(RealtimeEvent::Audio {
                data: pcm_tone(25, 24_000, 2000),
                sample_rate: None,
            })
            .await
            .unwrap();
    }
    handle.events.send(RealtimeEvent::TurnComplete).await.unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    let sent = h.drain();
    assert_eq!(
        event_names(&sent),
        vec!["media", "media", "media", "media", "media", "mark"]
    );
    for msg in &sent[..5] {
        let value: serde_json::Value = serde_json::from_str(msg).unwrap();
        let payload = phone_bridge::utils::helpers::decode_base64(
            value["media"]["payload"].as_str().unwrap(),
        )
        .unwrap();
        assert_eq!(payload.len(), 160);
    }

    h.send(stop_message(SID));
    h.finish().await;
}

#[tokio::test(start_paused = true)]
async fn test_barge_in_flushes_queue_before_next_emission() {
    let mut h = Harness::spawn(OpenBehavior::Succeed, BridgeConfig::default());
    h.send(start_message(SID, &[]));
    let handle = h.next_handle().await;

    // 400 ms -> 20 frames queued.
    handle
        .events
        .send(RealtimeEvent::Audio {
            data: pcm_tone(400, 24_000, 2000),
            sample_rate: Some(24_000),
        })
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    handle.events.send(RealtimeEvent::Interrupted).await.unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;

    let events = event_names(&h.drain());
    let clear_at = events
        .iter()
        .position(|e| e == "clear")
        .expect("clear sent on barge-in");
    assert!(clear_at >= 1 && clear_at < 20, "some but not all frames played: {events:?}");
    assert!(events[..clear_at].iter().all(|e| e == "media"));
    assert_eq!(events.len(), clear_at + 1, "no media after the clear: {events:?}");

    // Fresh audio after the barge-in plays normally.
    handle
        .events
        .send(RealtimeEvent::Audio {
            data: pcm_tone(40, 24_000, 2000),
            sample_rate: None,
        })
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(event_names(&h.drain()), vec!["media", "media"]);

    h.send(stop_message(SID));
    h.finish().await;
}

#[tokio::test(start_paused = true)]
async fn test_stop_halts_pacer_with_frames_pending() {
    let mut h = Harness::spawn(OpenBehavior::Succeed, BridgeConfig::default());
    h.send(start_message(SID, &[]));
    let handle = h.next_handle().await;

    handle
        .events
        .send(RealtimeEvent::Audio {
            data: pcm_tone(1000, 24_000, 2000),
            sample_rate: None,
        })
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;

    h.send(stop_message(SID));
    assert_eq!(h.finish().await, SessionState::Closed);
    let played = h.drain().len();
    assert!(played < 50, "teardown happened mid-playback");

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(
        h.from_bridge.recv().await,
        None,
        "all transport senders dropped, nothing emitted after teardown"
    );
}

#[tokio::test]
async fn test_ai_close_ends_session() {
    let mut h = Harness::spawn(OpenBehavior::Succeed, BridgeConfig::default());
    h.send(start_message(SID, &[]));
    let handle = h.next_handle().await;
    let session = Arc::clone(&handle.session);
    drop(handle);

    assert_eq!(h.finish().await, SessionState::Closed);
    assert!(session.is_closed());
    assert!(
        !session.calls().contains(&AiCall::EndOfInput),
        "no end-of-input once the AI has gone away"
    );
}

#[tokio::test]
async fn test_transport_end_tears_down() {
    let Harness {
        to_bridge,
        task,
        mut handles,
        ..
    } = Harness::spawn(OpenBehavior::Succeed, BridgeConfig::default());
    to_bridge.send(start_message(SID, &[])).unwrap();
    let handle = handles.recv().await.unwrap();
    drop(to_bridge);

    assert_eq!(task.await.unwrap(), SessionState::Closed);
    assert!(handle.session.is_closed());
}

#[tokio::test]
async fn test_malformed_messages_are_ignored() {
    let mut h = Harness::spawn(OpenBehavior::Succeed, BridgeConfig::default());
    h.send("{not json".to_string());
    h.send(r#"{"event": "media"}"#.to_string());
    h.send(start_message(SID, &[]));
    h.send(r#"{"event": "media", "media": {"payload": "!!!"}}"#.to_string());
    h.send(media_message(SID, &[0xFF; 160]));
    h.send(stop_message(SID));

    assert_eq!(h.finish().await, SessionState::Closed);
    assert_eq!(h.next_handle().await.session.audio_chunks().len(), 1);
}
