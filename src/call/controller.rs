//! Voice call session controller.
//!
//! Owns the session task that bridges the realtime channel and the audio
//! devices: server events mutate [`CallState`], call activation starts the
//! capture pump and level meter, and `audio` events are decoded and handed
//! to the sink. State snapshots are published through a watch channel so
//! frontends can render transitions without polling.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::audio::{
    AudioSink, AudioSource, ChunkAssembler, PlaybackOutcome, encode_chunk, wav, window_level,
};
use crate::call::state::CallState;
use crate::protocol::{CallStatus, ClientEvent, ConnectionState, ServerEvent};
use crate::realtime::{ListenerId, RealtimeClient};

/// Local level-meter cadence, roughly animation-frame rate.
const METER_INTERVAL: Duration = Duration::from_millis(16);

enum SessionMsg {
    Server(ServerEvent),
    Command(SessionCommand),
    Playback { id: u64, outcome: PlaybackOutcome },
    Close,
}

enum SessionCommand {
    Start,
    Stop,
    Reset,
}

/// Drives one voice call session over a [`RealtimeClient`].
pub struct CallController {
    client: RealtimeClient,
    updates: Arc<watch::Sender<CallState>>,
    commands: mpsc::UnboundedSender<SessionMsg>,
    listener: ListenerId,
    task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl CallController {
    /// Wire a session onto the client. The controller registers its own
    /// event listener and spawns the session task immediately; the call
    /// itself starts on [`CallController::start_call`].
    #[must_use]
    pub fn new(
        client: RealtimeClient,
        source: Arc<dyn AudioSource>,
        sink: Arc<dyn AudioSink>,
        chunk_ms: u64,
    ) -> Self {
        let (updates, _) = watch::channel(CallState::new());
        let updates = Arc::new(updates);
        let (tx, rx) = mpsc::unbounded_channel();

        let listener = {
            let tx = tx.clone();
            client.add_listener(move |event| {
                let _ = tx.send(SessionMsg::Server(event.clone()));
            })
        };

        let ctx = SessionCtx {
            client: client.clone(),
            source,
            sink,
            chunk_ms,
            updates: Arc::clone(&updates),
            internal: tx.clone(),
            pump: None,
            meter: None,
        };
        let task = tokio::spawn(run_session(ctx, rx));

        Self {
            client,
            updates,
            commands: tx,
            listener,
            task: std::sync::Mutex::new(Some(task)),
        }
    }

    /// Ask the backend to start a call and clear session state, including
    /// the transcription dedup key.
    pub fn start_call(&self) {
        let _ = self.commands.send(SessionMsg::Command(SessionCommand::Start));
    }

    /// Ask the backend to stop the call and force the session inactive
    /// without waiting for the acknowledgement.
    pub fn stop_call(&self) {
        let _ = self.commands.send(SessionMsg::Command(SessionCommand::Stop));
    }

    /// Ask the backend to reset conversation context and clear session
    /// state, including the transcription dedup key.
    pub fn reset_conversation(&self) {
        let _ = self.commands.send(SessionMsg::Command(SessionCommand::Reset));
    }

    #[must_use]
    pub fn snapshot(&self) -> CallState {
        self.updates.borrow().clone()
    }

    /// Watch session state transitions.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CallState> {
        self.updates.subscribe()
    }

    /// Deregister from the client and stop the session task, tearing down
    /// capture and playback.
    pub async fn shutdown(&self) {
        self.client.remove_listener(self.listener);
        let _ = self.commands.send(SessionMsg::Close);

        let handle = self.task.lock().ok().and_then(|mut task| task.take());
        if let Some(handle) = handle
            && let Err(e) = handle.await
            && !e.is_cancelled()
        {
            tracing::warn!(error = %e, "call session task failed");
        }
    }
}

impl Drop for CallController {
    fn drop(&mut self) {
        self.client.remove_listener(self.listener);
        if let Ok(mut task) = self.task.lock()
            && let Some(handle) = task.take()
        {
            handle.abort();
        }
    }
}

struct SessionCtx {
    client: RealtimeClient,
    source: Arc<dyn AudioSource>,
    sink: Arc<dyn AudioSink>,
    chunk_ms: u64,
    updates: Arc<watch::Sender<CallState>>,
    internal: mpsc::UnboundedSender<SessionMsg>,
    pump: Option<JoinHandle<()>>,
    meter: Option<JoinHandle<()>>,
}

async fn run_session(mut ctx: SessionCtx, mut inbox: mpsc::UnboundedReceiver<SessionMsg>) {
    let mut connection = ctx.client.subscribe_state();

    loop {
        tokio::select! {
            msg = inbox.recv() => match msg {
                Some(SessionMsg::Server(event)) => ctx.handle_server_event(&event),
                Some(SessionMsg::Command(cmd)) => ctx.handle_command(&cmd),
                Some(SessionMsg::Playback { id, outcome }) => ctx.handle_playback(id, outcome),
                Some(SessionMsg::Close) | None => break,
            },
            changed = connection.changed() => {
                if changed.is_err() {
                    break;
                }
                if *connection.borrow_and_update() == ConnectionState::Disconnected {
                    ctx.on_connection_down();
                }
            }
        }
    }

    ctx.stop_capture();
    ctx.sink.stop();
    tracing::debug!("call session stopped");
}

impl SessionCtx {
    fn handle_server_event(&mut self, event: &ServerEvent) {
        match event {
            ServerEvent::CallStarted => {
                self.updates.send_modify(|s| s.apply(event));
                self.start_capture();
            }
            ServerEvent::CallStopped => {
                self.updates.send_modify(|s| s.apply(event));
                self.stop_capture();
            }
            ServerEvent::Audio { data } => self.play_assistant_audio(data),
            _ => self.updates.send_modify(|s| s.apply(event)),
        }
    }

    fn handle_command(&mut self, cmd: &SessionCommand) {
        match cmd {
            SessionCommand::Start => {
                self.updates.send_modify(|s| s.clear_for_new_session());
                self.client.send(&ClientEvent::StartCall);
            }
            SessionCommand::Stop => {
                self.client.send(&ClientEvent::StopCall);
                self.stop_capture();
                self.updates.send_modify(|s| {
                    s.active = false;
                    s.status = CallStatus::Ready;
                });
            }
            SessionCommand::Reset => {
                self.updates.send_modify(|s| s.clear_for_new_session());
                self.client.send(&ClientEvent::ResetConversation);
            }
        }
    }

    fn play_assistant_audio(&self, data: &str) {
        let decoded = BASE64
            .decode(data)
            .map_err(crate::error::Error::from)
            .and_then(|bytes| wav::decode_wav(&bytes));

        let audio = match decoded {
            Ok(audio) => audio,
            Err(e) => {
                tracing::warn!(error = %e, "failed to decode assistant audio");
                self.updates.send_modify(|s| {
                    s.error = Some("failed to decode assistant audio".to_string());
                    s.status = CallStatus::Ready;
                });
                return;
            }
        };

        match self.sink.play(audio) {
            Ok(handle) => {
                let id = handle.id;
                self.updates.send_modify(|s| {
                    s.playing = Some(id);
                    s.status = CallStatus::Speaking;
                });

                let internal = self.internal.clone();
                tokio::spawn(async move {
                    let outcome = handle.done.await.unwrap_or(PlaybackOutcome::Stopped);
                    let _ = internal.send(SessionMsg::Playback { id, outcome });
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, "assistant playback unavailable");
                self.updates.send_modify(|s| {
                    s.error = Some(e.to_string());
                    s.status = CallStatus::Ready;
                });
            }
        }
    }

    fn handle_playback(&self, id: u64, outcome: PlaybackOutcome) {
        if let PlaybackOutcome::Failed(msg) = &outcome {
            tracing::warn!(playback = id, error = %msg, "assistant playback failed");
        }

        self.updates.send_if_modified(|s| {
            // a superseded playback's watcher may report after its successor
            if s.playing != Some(id) {
                return false;
            }
            s.playing = None;
            match outcome {
                PlaybackOutcome::Ended => {
                    s.status = if s.active {
                        CallStatus::CallActive
                    } else {
                        CallStatus::Ready
                    };
                }
                PlaybackOutcome::Failed(msg) => {
                    s.error = Some(msg);
                    s.status = CallStatus::Ready;
                }
                PlaybackOutcome::Stopped => {}
            }
            true
        });
    }

    fn start_capture(&mut self) {
        if self.pump.is_some() {
            return;
        }

        if let Err(e) = self.source.start() {
            tracing::warn!(error = %e, "microphone unavailable");
            self.updates.send_modify(|s| s.error = Some(e.to_string()));
            return;
        }

        let pump = {
            let source = Arc::clone(&self.source);
            let client = self.client.clone();
            let chunk_ms = self.chunk_ms;
            tokio::spawn(async move {
                let mut assembler = ChunkAssembler::new(source.sample_rate(), chunk_ms);
                let mut tick = tokio::time::interval(Duration::from_millis(chunk_ms));
                tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    tick.tick().await;
                    for frame in assembler.push(&source.take()) {
                        client.send(&ClientEvent::AudioChunk {
                            data: encode_chunk(&frame),
                        });
                    }
                }
            })
        };

        let meter = {
            let source = Arc::clone(&self.source);
            let updates = Arc::clone(&self.updates);
            tokio::spawn(async move {
                let mut tick = tokio::time::interval(METER_INTERVAL);
                tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    tick.tick().await;
                    let level = window_level(&source.recent());
                    updates.send_if_modified(|s| {
                        if (s.input_level - level).abs() < f32::EPSILON {
                            return false;
                        }
                        s.input_level = level;
                        true
                    });
                }
            })
        };

        self.pump = Some(pump);
        self.meter = Some(meter);
        tracing::debug!(chunk_ms = self.chunk_ms, "capture pump started");
    }

    fn stop_capture(&mut self) {
        let was_pumping = self.pump.is_some();
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        if let Some(meter) = self.meter.take() {
            meter.abort();
        }
        self.source.stop();
        self.updates.send_if_modified(|s| {
            if s.input_level.abs() < f32::EPSILON {
                return false;
            }
            s.input_level = 0.0;
            true
        });
        if was_pumping {
            tracing::debug!("capture pump stopped");
        }
    }

    fn on_connection_down(&mut self) {
        if self.updates.borrow().active {
            tracing::info!("realtime connection lost, tearing down call session");
        }
        self.sink.stop();
        self.stop_capture();
        self.updates.send_if_modified(|s| {
            let mut changed = false;
            if s.active {
                s.active = false;
                s.status = CallStatus::Ready;
                changed = true;
            }
            if s.playing.take().is_some() {
                changed = true;
            }
            changed
        });
    }
}
