//! Shared test utilities
//!
//! Scripted stand-ins for the audio devices and the Q&A backend, plus
//! sample generators, so sessions can be tested without audio hardware or
//! a live backend.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Semaphore, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{WebSocketStream, accept_async};

use totem_client::audio::{DEFAULT_SAMPLE_RATE, wav};
use totem_client::{
    AnswerResponse, AudioSink, AudioSource, Error, PlaybackAudio, PlaybackHandle,
    PlaybackOutcome, PredefinedQuestion, QaBackend, RealtimeConfig, ReconnectPolicy, Result,
};

/// Generate sine wave audio samples at the default capture rate
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
#[allow(clippy::cast_precision_loss)]
pub fn sine_samples(frequency: f32, duration_secs: f32, amplitude: f32) -> Vec<f32> {
    let num_samples = (DEFAULT_SAMPLE_RATE as f32 * duration_secs) as usize;
    (0..num_samples)
        .map(|i| {
            let t = i as f32 / DEFAULT_SAMPLE_RATE as f32;
            amplitude * (2.0 * std::f32::consts::PI * frequency * t).sin()
        })
        .collect()
}

/// Generate silence at the default capture rate
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn silence(duration_secs: f32) -> Vec<f32> {
    let num_samples = (DEFAULT_SAMPLE_RATE as f32 * duration_secs) as usize;
    vec![0.0; num_samples]
}

/// Encode samples as base64 WAV, the `audio` event payload format
pub fn wav_base64(samples: &[f32], sample_rate: u32) -> String {
    let bytes = wav::encode_wav(samples, sample_rate).expect("failed to encode wav");
    BASE64.encode(bytes)
}

/// Encode samples as a `data:audio/wav;base64,` URL
pub fn wav_data_url(samples: &[f32], sample_rate: u32) -> String {
    format!("data:audio/wav;base64,{}", wav_base64(samples, sample_rate))
}

/// Successful answer with text only
pub fn answer(text: &str) -> AnswerResponse {
    AnswerResponse {
        success: true,
        text: Some(text.to_string()),
        audio_url: None,
        search_results: None,
        usage: None,
        warning: None,
        error: None,
    }
}

/// Successful answer with narration audio
pub fn answer_with_audio(text: &str, audio_url: &str) -> AnswerResponse {
    let mut response = answer(text);
    response.audio_url = Some(audio_url.to_string());
    response
}

/// In-band failure (`success: false`)
pub fn failed_answer(error: &str) -> AnswerResponse {
    AnswerResponse {
        success: false,
        text: None,
        audio_url: None,
        search_results: None,
        usage: None,
        warning: None,
        error: Some(error.to_string()),
    }
}

/// Capture device fed from scripted sample batches
pub struct ScriptedSource {
    chunks: Mutex<VecDeque<Vec<f32>>>,
    window: Mutex<Vec<f32>>,
    active: AtomicBool,
    fail_start: bool,
    sample_rate: u32,
}

impl ScriptedSource {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            chunks: Mutex::new(VecDeque::new()),
            window: Mutex::new(Vec::new()),
            active: AtomicBool::new(false),
            fail_start: false,
            sample_rate,
        }
    }

    /// Source whose `start` always fails, as when no device is present
    pub fn unavailable() -> Self {
        Self {
            fail_start: true,
            ..Self::new(DEFAULT_SAMPLE_RATE)
        }
    }

    /// Queue one batch for the next `take` call
    pub fn feed(&self, samples: Vec<f32>) {
        self.window.lock().unwrap().clone_from(&samples);
        self.chunks.lock().unwrap().push_back(samples);
    }
}

impl AudioSource for ScriptedSource {
    fn start(&self) -> Result<()> {
        if self.fail_start {
            return Err(Error::CaptureUnavailable("no input device".to_string()));
        }
        self.active.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) {
        self.active.store(false, Ordering::SeqCst);
        self.chunks.lock().unwrap().clear();
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn take(&self) -> Vec<f32> {
        self.chunks.lock().unwrap().pop_front().unwrap_or_default()
    }

    fn recent(&self) -> Vec<f32> {
        self.window.lock().unwrap().clone()
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

/// Playback device recording every `play` and `stop`
///
/// Mirrors the single-playback contract of the real sink: a new `play`
/// resolves the previous handle as stopped. Playbacks stay pending until
/// `finish_current` resolves them as ended, so tests control when the
/// audio "finishes".
#[derive(Default)]
pub struct RecordingSink {
    next_id: AtomicU64,
    current: Mutex<Option<(u64, oneshot::Sender<PlaybackOutcome>)>>,
    plays: Mutex<Vec<(u64, PlaybackAudio)>>,
    stops: AtomicUsize,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn plays(&self) -> Vec<(u64, PlaybackAudio)> {
        self.plays.lock().unwrap().clone()
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn current_id(&self) -> Option<u64> {
        self.current.lock().unwrap().as_ref().map(|(id, _)| *id)
    }

    /// Resolve the active playback as naturally ended
    pub fn finish_current(&self) {
        if let Some((_, done)) = self.current.lock().unwrap().take() {
            let _ = done.send(PlaybackOutcome::Ended);
        }
    }

    /// Resolve the active playback as failed mid-stream
    pub fn fail_current(&self, message: &str) {
        if let Some((_, done)) = self.current.lock().unwrap().take() {
            let _ = done.send(PlaybackOutcome::Failed(message.to_string()));
        }
    }
}

impl AudioSink for RecordingSink {
    fn play(&self, audio: PlaybackAudio) -> Result<PlaybackHandle> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (done_tx, done_rx) = oneshot::channel();
        if let Some((_, superseded)) = self.current.lock().unwrap().replace((id, done_tx)) {
            let _ = superseded.send(PlaybackOutcome::Stopped);
        }
        self.plays.lock().unwrap().push((id, audio));
        Ok(PlaybackHandle { id, done: done_rx })
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        if let Some((_, done)) = self.current.lock().unwrap().take() {
            let _ = done.send(PlaybackOutcome::Stopped);
        }
    }

    fn pause(&self) {}

    fn resume(&self) {}

    fn is_playing(&self) -> bool {
        self.current.lock().unwrap().is_some()
    }
}

/// Q&A backend answering from a script
///
/// A gated backend blocks each `ask` until the test releases one permit,
/// which keeps requests in flight over a controlled window.
#[derive(Default)]
pub struct ScriptedBackend {
    answers: Mutex<VecDeque<Result<AnswerResponse>>>,
    menu: Mutex<Vec<PredefinedQuestion>>,
    asked: Mutex<Vec<(String, Option<String>)>>,
    gate: Option<std::sync::Arc<Semaphore>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend whose `ask` waits for one gate permit per question
    pub fn gated() -> (Self, std::sync::Arc<Semaphore>) {
        let gate = std::sync::Arc::new(Semaphore::new(0));
        let backend = Self {
            gate: Some(std::sync::Arc::clone(&gate)),
            ..Self::new()
        };
        (backend, gate)
    }

    pub fn push_answer(&self, response: AnswerResponse) {
        self.answers.lock().unwrap().push_back(Ok(response));
    }

    /// Script a transport-level failure for the next `ask`
    pub fn push_failure(&self, message: &str) {
        self.answers
            .lock()
            .unwrap()
            .push_back(Err(Error::Backend(message.to_string())));
    }

    pub fn set_menu(&self, questions: Vec<PredefinedQuestion>) {
        *self.menu.lock().unwrap() = questions;
    }

    /// Every `(question, filter)` pair received so far
    pub fn asked(&self) -> Vec<(String, Option<String>)> {
        self.asked.lock().unwrap().clone()
    }
}

#[async_trait]
impl QaBackend for ScriptedBackend {
    async fn ask(&self, question: &str, filter: Option<&str>) -> Result<AnswerResponse> {
        self.asked
            .lock()
            .unwrap()
            .push((question.to_string(), filter.map(ToString::to_string)));

        if let Some(gate) = &self.gate {
            let permit = gate.acquire().await.expect("gate closed");
            permit.forget();
        }

        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Error::Backend("no scripted answer".to_string())))
    }

    async fn predefined_questions(&self) -> Result<Vec<PredefinedQuestion>> {
        Ok(self.menu.lock().unwrap().clone())
    }

    async fn health(&self) -> Result<serde_json::Value> {
        Ok(serde_json::json!({ "status": "ok" }))
    }

    async fn probe(&self) -> Result<serde_json::Value> {
        Ok(serde_json::json!({ "success": true }))
    }
}

/// Bind a local WebSocket listener and return it with its `ws://` URL
pub async fn ws_listener() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind test listener");
    let url = format!("ws://{}", listener.local_addr().expect("no local addr"));
    (listener, url)
}

/// Accept one client connection and complete the WebSocket handshake
pub async fn accept_ws(listener: &TcpListener) -> WebSocketStream<TcpStream> {
    let (stream, _) = listener.accept().await.expect("accept failed");
    accept_async(stream).await.expect("websocket handshake failed")
}

/// Client configuration pointed at a test server: fast reconnects,
/// heartbeat disabled so tests see only the frames they cause
pub fn realtime_config(url: &str) -> RealtimeConfig {
    RealtimeConfig {
        url: url.to_owned(),
        reconnect: ReconnectPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(20),
            max_delay: Duration::from_millis(100),
        },
        heartbeat_interval: Duration::ZERO,
    }
}

/// Server side: next text frame, skipping control frames
pub async fn next_text_frame(server: &mut WebSocketStream<TcpStream>) -> String {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(2), server.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("connection closed")
            .expect("websocket read failed");
        match message {
            Message::Text(text) => return text.as_str().to_owned(),
            Message::Ping(_) | Message::Pong(_) => {}
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

/// Server side: push one JSON event to the client
pub async fn send_server_event(server: &mut WebSocketStream<TcpStream>, json: &str) {
    server
        .send(Message::Text(json.to_owned().into()))
        .await
        .expect("server send failed");
}
