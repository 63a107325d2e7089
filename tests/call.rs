//! Voice call session integration tests
//!
//! Wire a controller to a scripted microphone, a recording sink, and a
//! local WebSocket server, then drive full call lifecycles over the wire.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::timeout;
use tokio_tungstenite::WebSocketStream;
use totem_client::audio::{DEFAULT_SAMPLE_RATE, decode_chunk, window_level};
use totem_client::{
    AudioSink, AudioSource, CallController, CallState, CallStatus, ConnectionState,
    RealtimeClient, Role,
};

mod common;

use common::{
    RecordingSink, ScriptedSource, accept_ws, next_text_frame, realtime_config, send_server_event,
    sine_samples, wav_base64, ws_listener,
};

struct CallHarness {
    client: RealtimeClient,
    source: Arc<ScriptedSource>,
    sink: Arc<RecordingSink>,
    controller: CallController,
    server: WebSocketStream<TcpStream>,
    session: watch::Receiver<CallState>,
}

/// Bring up a connected controller with 10ms capture chunks.
async fn connect_call(source: ScriptedSource) -> CallHarness {
    let (listener, url) = ws_listener().await;
    let client = RealtimeClient::new(realtime_config(&url));
    let source = Arc::new(source);
    let sink = Arc::new(RecordingSink::new());
    let source_dyn: Arc<dyn AudioSource> = source.clone();
    let sink_dyn: Arc<dyn AudioSink> = sink.clone();
    let controller = CallController::new(client.clone(), source_dyn, sink_dyn, 10);
    let session = controller.subscribe();

    let mut connection = client.subscribe_state();
    client.connect().await;
    let server = accept_ws(&listener).await;
    timeout(
        Duration::from_secs(2),
        connection.wait_for(|s| *s == ConnectionState::Connected),
    )
    .await
    .expect("timed out waiting for connect")
    .expect("state channel closed");

    CallHarness {
        client,
        source,
        sink,
        controller,
        server,
        session,
    }
}

/// Start a call and acknowledge it from the server side.
async fn activate(h: &mut CallHarness) {
    h.controller.start_call();
    let frame = next_text_frame(&mut h.server).await;
    assert!(frame.contains("\"type\":\"start_call\""));

    send_server_event(&mut h.server, r#"{"type":"call_started"}"#).await;
    timeout(Duration::from_secs(2), h.session.wait_for(|s| s.active))
        .await
        .expect("timed out waiting for activation")
        .expect("session channel closed");
}

async fn teardown(h: CallHarness) {
    h.controller.shutdown().await;
    h.client.disconnect().await;
}

#[tokio::test]
async fn test_start_call_activates_capture_on_ack() {
    let mut h = connect_call(ScriptedSource::new(DEFAULT_SAMPLE_RATE)).await;

    assert!(!h.source.is_active());
    activate(&mut h).await;

    let snap = h.controller.snapshot();
    assert_eq!(snap.status, CallStatus::CallActive);
    assert!(snap.error.is_none());
    assert!(h.source.is_active());

    teardown(h).await;
}

#[tokio::test]
async fn test_capture_chunks_stream_to_backend() {
    let mut h = connect_call(ScriptedSource::new(DEFAULT_SAMPLE_RATE)).await;
    activate(&mut h).await;

    // 50ms of speech splits into five 10ms chunks
    h.source.feed(sine_samples(440.0, 0.05, 0.5));

    let frame = next_text_frame(&mut h.server).await;
    let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
    assert_eq!(value["type"], "audio_chunk");

    let samples = decode_chunk(value["data"].as_str().unwrap()).unwrap();
    assert_eq!(samples.len(), 160);
    assert!(window_level(&samples) > 0.1);

    teardown(h).await;
}

#[tokio::test]
async fn test_assistant_audio_plays_through_the_sink() {
    let mut h = connect_call(ScriptedSource::new(DEFAULT_SAMPLE_RATE)).await;
    activate(&mut h).await;

    let spoken = sine_samples(440.0, 0.2, 0.5);
    let payload = serde_json::json!({
        "type": "audio",
        "data": wav_base64(&spoken, DEFAULT_SAMPLE_RATE),
    })
    .to_string();
    send_server_event(&mut h.server, &payload).await;

    timeout(
        Duration::from_secs(2),
        h.session.wait_for(|s| s.status == CallStatus::Speaking),
    )
    .await
    .expect("timed out waiting for playback")
    .expect("session channel closed");

    let plays = h.sink.plays();
    assert_eq!(plays.len(), 1);
    assert_eq!(plays[0].1.sample_rate, DEFAULT_SAMPLE_RATE);
    assert_eq!(plays[0].1.samples.len(), spoken.len());

    // Natural end of playback returns the session to the active call
    h.sink.finish_current();
    timeout(
        Duration::from_secs(2),
        h.session.wait_for(|s| s.status == CallStatus::CallActive),
    )
    .await
    .expect("timed out waiting for playback to settle")
    .expect("session channel closed");

    teardown(h).await;
}

#[tokio::test]
async fn test_stop_call_halts_capture_but_not_playback() {
    let mut h = connect_call(ScriptedSource::new(DEFAULT_SAMPLE_RATE)).await;
    activate(&mut h).await;

    let payload = serde_json::json!({
        "type": "audio",
        "data": wav_base64(&sine_samples(440.0, 0.2, 0.5), DEFAULT_SAMPLE_RATE),
    })
    .to_string();
    send_server_event(&mut h.server, &payload).await;
    timeout(
        Duration::from_secs(2),
        h.session.wait_for(|s| s.status == CallStatus::Speaking),
    )
    .await
    .expect("timed out waiting for playback")
    .expect("session channel closed");

    h.controller.stop_call();
    timeout(Duration::from_secs(2), h.session.wait_for(|s| !s.active))
        .await
        .expect("timed out waiting for stop")
        .expect("session channel closed");

    // Microphone released, assistant audio left to finish
    assert!(!h.source.is_active());
    assert_eq!(h.sink.stop_count(), 0);
    assert!(h.sink.current_id().is_some());

    let frame = next_text_frame(&mut h.server).await;
    assert!(frame.contains("\"type\":\"stop_call\""));

    teardown(h).await;
}

#[tokio::test]
async fn test_final_transcriptions_dedup_over_the_wire() {
    let mut h = connect_call(ScriptedSource::new(DEFAULT_SAMPLE_RATE)).await;
    activate(&mut h).await;

    let final_frame = r#"{"type":"transcription","text":"what is totem","isFinal":true}"#;
    send_server_event(&mut h.server, final_frame).await;
    send_server_event(&mut h.server, final_frame).await;
    send_server_event(&mut h.server, r#"{"type":"ai_response","text":"a kiosk"}"#).await;

    timeout(
        Duration::from_secs(2),
        h.session.wait_for(|s| !s.reply.is_empty()),
    )
    .await
    .expect("timed out waiting for the reply")
    .expect("session channel closed");

    let snap = h.controller.snapshot();
    assert_eq!(snap.transcript.len(), 2);
    assert_eq!(snap.transcript[0].role, Role::User);
    assert_eq!(snap.transcript[0].content, "what is totem");
    assert_eq!(snap.transcript[1].role, Role::Assistant);
    assert_eq!(snap.transcript[1].content, "a kiosk");
    assert_eq!(snap.partial, "what is totem");

    teardown(h).await;
}

#[tokio::test]
async fn test_reset_clears_transcript_and_dedup_key() {
    let mut h = connect_call(ScriptedSource::new(DEFAULT_SAMPLE_RATE)).await;
    activate(&mut h).await;

    let final_frame = r#"{"type":"transcription","text":"hello","isFinal":true}"#;
    send_server_event(&mut h.server, final_frame).await;
    timeout(
        Duration::from_secs(2),
        h.session.wait_for(|s| !s.transcript.is_empty()),
    )
    .await
    .expect("timed out waiting for the transcription")
    .expect("session channel closed");

    h.controller.reset_conversation();
    timeout(
        Duration::from_secs(2),
        h.session.wait_for(|s| s.transcript.is_empty()),
    )
    .await
    .expect("timed out waiting for the reset")
    .expect("session channel closed");

    let frame = next_text_frame(&mut h.server).await;
    assert!(frame.contains("\"type\":\"reset_conversation\""));

    // The dedup key went with the transcript: the same final appends again
    send_server_event(&mut h.server, final_frame).await;
    timeout(
        Duration::from_secs(2),
        h.session.wait_for(|s| s.transcript.len() == 1),
    )
    .await
    .expect("timed out waiting for the re-sent final")
    .expect("session channel closed");

    teardown(h).await;
}

#[tokio::test]
async fn test_capture_failure_is_reported_and_the_call_continues() {
    let mut h = connect_call(ScriptedSource::unavailable()).await;

    h.controller.start_call();
    let frame = next_text_frame(&mut h.server).await;
    assert!(frame.contains("\"type\":\"start_call\""));
    send_server_event(&mut h.server, r#"{"type":"call_started"}"#).await;

    timeout(
        Duration::from_secs(2),
        h.session.wait_for(|s| s.error.is_some()),
    )
    .await
    .expect("timed out waiting for the capture error")
    .expect("session channel closed");

    // The call stays up for listening even though the microphone is gone
    let snap = h.controller.snapshot();
    assert!(snap.active);
    assert_eq!(snap.status, CallStatus::CallActive);
    assert!(snap.error.as_deref().unwrap().contains("no input device"));
    assert!(!h.source.is_active());

    teardown(h).await;
}

#[tokio::test]
async fn test_connection_loss_tears_down_the_session() {
    let mut h = connect_call(ScriptedSource::new(DEFAULT_SAMPLE_RATE)).await;
    activate(&mut h).await;

    let payload = serde_json::json!({
        "type": "audio",
        "data": wav_base64(&sine_samples(440.0, 0.2, 0.5), DEFAULT_SAMPLE_RATE),
    })
    .to_string();
    send_server_event(&mut h.server, &payload).await;
    timeout(
        Duration::from_secs(2),
        h.session.wait_for(|s| s.status == CallStatus::Speaking),
    )
    .await
    .expect("timed out waiting for playback")
    .expect("session channel closed");
    assert_eq!(h.sink.stop_count(), 0);

    let CallHarness {
        client,
        source,
        sink,
        controller,
        server,
        mut session,
    } = h;
    drop(server);

    timeout(Duration::from_secs(2), session.wait_for(|s| !s.active))
        .await
        .expect("timed out waiting for the teardown")
        .expect("session channel closed");

    assert!(!source.is_active());
    assert!(sink.stop_count() >= 1);
    assert_eq!(controller.snapshot().status, CallStatus::Ready);

    controller.shutdown().await;
    client.disconnect().await;
}
