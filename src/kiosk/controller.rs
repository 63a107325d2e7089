//! Kiosk Q&A session controller.
//!
//! Each submitted question is one HTTP exchange against the Q&A backend.
//! The controller owns the conversation transcript, plays answer narration
//! through the injected sink, and publishes state over a watch channel the
//! same way the call controller does. Failures become transcript entries,
//! never errors returned to the caller.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::watch;

use crate::audio::{AudioResource, AudioSink, PlaybackHandle, PlaybackOutcome, ResourceLoader};
use crate::error::Result;
use crate::kiosk::api::QaBackend;
use crate::kiosk::questions::PredefinedQuestion;
use crate::transcript::ConversationMessage;

/// Shown when the question request could not reach the backend.
const CONNECTION_ERROR_REPLY: &str = "Sorry, there was a connection error. Please try again.";

/// Shown when the backend answered but reported a failure.
const PROCESSING_ERROR_REPLY: &str =
    "Sorry, something went wrong processing your question. Please try again.";

/// Pause between stopping the current playback and starting a replay, so the
/// device stream is fully torn down first.
const REPLAY_SETTLE: Duration = Duration::from_millis(50);

/// Kiosk behavior knobs, typically read from the config file.
#[derive(Debug, Clone, Default)]
pub struct KioskConfig {
    /// Knowledge-base filter sent with every question.
    pub filter: Option<String>,
    /// Question auto-submitted when the session starts.
    pub greeting: Option<String>,
    /// Static menu. When non-empty it takes precedence over the backend's
    /// `/questions` endpoint.
    pub questions: Vec<PredefinedQuestion>,
}

/// Observable kiosk session state.
#[derive(Debug, Clone, Default)]
pub struct KioskState {
    /// False while the kiosk sits on its start screen.
    pub started: bool,
    /// True while a question is waiting on the backend.
    pub processing: bool,
    pub transcript: Vec<ConversationMessage>,
    /// Menu entries from `load_questions`.
    pub questions: Vec<PredefinedQuestion>,
    pub(crate) playing: Option<u64>,
}

impl KioskState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether answer narration is currently playing.
    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.playing.is_some()
    }
}

/// Drives the kiosk Q&A flow against a [`QaBackend`].
pub struct KioskController {
    backend: Arc<dyn QaBackend>,
    sink: Arc<dyn AudioSink>,
    loader: ResourceLoader,
    filter: Option<String>,
    greeting: Option<String>,
    static_questions: Vec<PredefinedQuestion>,
    /// Bumped by `clear`/`reset`; answers captured under an older value are
    /// discarded instead of being applied to the new session.
    epoch: AtomicU64,
    updates: Arc<watch::Sender<KioskState>>,
}

impl KioskController {
    #[must_use]
    pub fn new(
        backend: Arc<dyn QaBackend>,
        sink: Arc<dyn AudioSink>,
        loader: ResourceLoader,
        config: KioskConfig,
    ) -> Self {
        let (updates, _) = watch::channel(KioskState::new());
        Self {
            backend,
            sink,
            loader,
            filter: config.filter,
            greeting: config.greeting,
            static_questions: config.questions,
            epoch: AtomicU64::new(0),
            updates: Arc::new(updates),
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> KioskState {
        self.updates.borrow().clone()
    }

    /// Watch session state transitions.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<KioskState> {
        self.updates.subscribe()
    }

    /// Mark the session started and submit the configured greeting, if any.
    pub async fn start(&self) {
        self.updates.send_modify(|s| s.started = true);
        if let Some(greeting) = self.greeting.clone() {
            self.submit(&greeting).await;
        }
    }

    /// Submit one question and apply the answer to the transcript.
    ///
    /// Blank input and input arriving while another submission is in flight
    /// are dropped. Backend failures append a synthesized error entry.
    pub async fn submit(&self, question: &str) {
        let question = question.trim();
        if question.is_empty() {
            return;
        }

        let epoch = self.epoch.load(Ordering::SeqCst);
        let mut accepted = false;
        self.updates.send_if_modified(|s| {
            if s.processing {
                return false;
            }
            s.processing = true;
            s.transcript.push(ConversationMessage::user(question));
            accepted = true;
            true
        });
        if !accepted {
            tracing::debug!("question dropped, another submission is in flight");
            return;
        }

        tracing::info!(question = %question, "kiosk question submitted");
        let answer = self.backend.ask(question, self.filter.as_deref()).await;

        if self.epoch.load(Ordering::SeqCst) != epoch {
            tracing::debug!("discarding answer from before a reset");
            return;
        }

        match answer {
            Ok(answer) if answer.success => {
                let audio = answer.audio().map(AudioResource::from);
                let mut message =
                    ConversationMessage::assistant(answer.text.clone().unwrap_or_default());
                if let Some(resource) = &audio {
                    message = message.with_audio(resource.clone());
                }
                self.updates.send_modify(|s| {
                    s.processing = false;
                    s.transcript.push(message);
                });

                if let Some(resource) = &audio {
                    self.play_resource(resource).await;
                }
            }
            Ok(answer) => {
                tracing::warn!(
                    error = answer.error.as_deref().unwrap_or("unknown"),
                    "backend could not answer"
                );
                self.finish_with_error(PROCESSING_ERROR_REPLY);
            }
            Err(e) => {
                tracing::warn!(error = %e, "question request failed");
                self.finish_with_error(CONNECTION_ERROR_REPLY);
            }
        }
    }

    /// Handle a menu selection. Self-answering entries render their canned
    /// answer locally; plain shortcuts go through [`KioskController::submit`].
    pub async fn select_predefined(&self, question: &PredefinedQuestion) {
        if !question.is_self_answering() {
            self.submit(&question.question).await;
            return;
        }

        let audio = question.audio().map(AudioResource::from);
        let mut answer =
            ConversationMessage::assistant(question.answer.clone().unwrap_or_default());
        if let Some(resource) = &audio {
            answer = answer.with_audio(resource.clone());
        }
        if let Some(image) = &question.image {
            answer = answer.with_image(image.clone());
        }

        let mut accepted = false;
        self.updates.send_if_modified(|s| {
            if s.processing {
                return false;
            }
            s.transcript.push(ConversationMessage::user(&question.question));
            s.transcript.push(answer);
            accepted = true;
            true
        });
        if !accepted {
            tracing::debug!("menu selection dropped, a submission is in flight");
            return;
        }

        tracing::info!(id = %question.id, "predefined question answered from menu data");
        if let Some(resource) = &audio {
            self.play_resource(resource).await;
        }
    }

    /// Stop current playback and, after a short settle delay, play a
    /// previously seen answer resource again.
    pub async fn replay(&self, resource: &AudioResource) {
        self.sink.stop();
        tokio::time::sleep(REPLAY_SETTLE).await;
        self.play_resource(resource).await;
    }

    /// Clear the transcript and stop playback; the session keeps running.
    pub fn clear(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.sink.stop();
        self.updates.send_modify(|s| {
            s.transcript.clear();
            s.processing = false;
            s.playing = None;
        });
        tracing::debug!("kiosk transcript cleared");
    }

    /// Full reset: clear the transcript, stop playback, and return to the
    /// start screen.
    pub fn reset(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.sink.stop();
        self.updates.send_modify(|s| {
            s.transcript.clear();
            s.processing = false;
            s.playing = None;
            s.started = false;
        });
        tracing::info!("kiosk session reset");
    }

    /// Load the predefined question menu. A configured static table wins
    /// over the backend's `/questions` endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error when no static table is configured and the backend
    /// request fails.
    pub async fn load_questions(&self) -> Result<Vec<PredefinedQuestion>> {
        let questions = if self.static_questions.is_empty() {
            self.backend.predefined_questions().await?
        } else {
            self.static_questions.clone()
        };

        self.updates.send_modify(|s| s.questions.clone_from(&questions));
        tracing::debug!(count = questions.len(), "predefined questions loaded");
        Ok(questions)
    }

    /// Backend liveness check, JSON returned verbatim.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or a non-success HTTP status.
    pub async fn health(&self) -> Result<serde_json::Value> {
        self.backend.health().await
    }

    /// Backend connectivity self-test, JSON returned verbatim.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or a non-success HTTP status.
    pub async fn probe(&self) -> Result<serde_json::Value> {
        self.backend.probe().await
    }

    async fn play_resource(&self, resource: &AudioResource) {
        let audio = match self.loader.load(resource).await {
            Ok(audio) => audio,
            Err(e) => {
                tracing::warn!(resource = %resource, error = %e, "failed to load answer audio");
                return;
            }
        };

        match self.sink.play(audio) {
            Ok(handle) => {
                let id = handle.id;
                self.updates.send_modify(|s| s.playing = Some(id));
                self.watch_playback(handle);
            }
            Err(e) => tracing::warn!(error = %e, "kiosk playback unavailable"),
        }
    }

    fn watch_playback(&self, handle: PlaybackHandle) {
        let updates = Arc::clone(&self.updates);
        let id = handle.id;
        tokio::spawn(async move {
            let outcome = handle.done.await.unwrap_or(PlaybackOutcome::Stopped);
            if let PlaybackOutcome::Failed(msg) = &outcome {
                tracing::warn!(playback = id, error = %msg, "kiosk playback failed");
            }
            updates.send_if_modified(|s| {
                // a superseded playback's watcher may report after its successor
                if s.playing == Some(id) {
                    s.playing = None;
                    true
                } else {
                    false
                }
            });
        });
    }

    fn finish_with_error(&self, text: &str) {
        self.updates.send_modify(|s| {
            s.processing = false;
            s.transcript.push(ConversationMessage::error(text));
        });
    }
}
