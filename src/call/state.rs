//! Voice call session state.

use crate::protocol::{CallStatus, ServerEvent};
use crate::transcript::ConversationMessage;

/// Snapshot of a voice call session.
///
/// All transitions are driven by [`CallState::apply`] plus the local
/// clears; the session controller owns the only mutable copy and publishes
/// snapshots through a watch channel.
#[derive(Debug, Clone, Default)]
pub struct CallState {
    /// Whether a call is running and the microphone should stream.
    pub active: bool,
    pub status: CallStatus,
    /// Final transcriptions and assistant replies, in arrival order.
    pub transcript: Vec<ConversationMessage>,
    /// Latest transcription, interim or final.
    pub partial: String,
    /// Latest assistant reply text.
    pub reply: String,
    /// Latest backend or local error. Cleared when a new call starts.
    pub error: Option<String>,
    /// Backend-reported input level, 0.0 to 1.0.
    pub level: f32,
    /// Locally metered microphone level, 0.0 to 1.0.
    pub input_level: f32,
    /// Identity of the in-flight assistant playback, if any.
    pub(crate) playing: Option<u64>,
    /// Last final transcription appended, used to drop backend re-sends.
    last_final: String,
}

impl CallState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one server event. This covers the pure transitions; playback
    /// side effects (the `audio` event) are handled by the session task.
    pub fn apply(&mut self, event: &ServerEvent) {
        match event {
            ServerEvent::CallStarted => {
                self.active = true;
                self.status = CallStatus::CallActive;
                self.error = None;
            }
            ServerEvent::CallStopped => {
                self.active = false;
                self.status = CallStatus::Ready;
            }
            ServerEvent::Transcription {
                text,
                is_final,
                timestamp,
            } => self.note_transcription(text, *is_final, *timestamp),
            ServerEvent::AiResponse { text, timestamp } => {
                self.reply = text.clone();
                self.transcript.push(
                    ConversationMessage::assistant(text.clone()).with_timestamp_millis(*timestamp),
                );
                // speaking is entered on the reply itself, not on playback
                self.status = CallStatus::Speaking;
            }
            ServerEvent::Status { status } => match status.parse::<CallStatus>() {
                Ok(parsed) => self.status = parsed,
                Err(_) => tracing::warn!(status = %status, "ignoring unknown call status"),
            },
            ServerEvent::AudioLevel { level } => self.level = level.clamp(0.0, 1.0),
            ServerEvent::Error { message } => {
                self.error = Some(message.clone());
                self.status = CallStatus::Error;
            }
            ServerEvent::ConversationReset => self.clear_conversation(),
            ServerEvent::Audio { .. } | ServerEvent::Pong { .. } => {}
        }
    }

    fn note_transcription(&mut self, text: &str, is_final: bool, timestamp: Option<i64>) {
        self.partial = text.to_string();
        if !is_final {
            return;
        }

        let trimmed = text.trim();
        if trimmed.is_empty() {
            return;
        }

        if self.active {
            self.status = CallStatus::Processing;
        }

        if trimmed == self.last_final {
            tracing::debug!("dropping duplicate final transcription");
            return;
        }

        self.last_final = trimmed.to_string();
        self.transcript
            .push(ConversationMessage::user(trimmed).with_timestamp_millis(timestamp));
    }

    /// Remote reset: clears the conversation but keeps the dedup key, so a
    /// final transcription the backend re-sends afterwards is still
    /// recognized as a duplicate.
    fn clear_conversation(&mut self) {
        self.transcript.clear();
        self.partial.clear();
        self.reply.clear();
        self.error = None;
    }

    /// Local clear for `start_call` and `reset_conversation`. Also drops
    /// the dedup key, unlike a remote reset.
    pub(crate) fn clear_for_new_session(&mut self) {
        self.clear_conversation();
        self.last_final.clear();
    }
}
