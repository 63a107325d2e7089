//! Conversation transcript entries shared by call and kiosk sessions.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::audio::AudioResource;

/// Who produced a transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Spoken or typed by the person at the totem.
    User,
    /// Produced by the assistant backend.
    Assistant,
    /// Synthesized locally when a request fails.
    Error,
}

/// One entry in a session transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    /// Stable identity for UI reconciliation and logs.
    pub id: Uuid,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Playable answer audio, when the backend attached one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<AudioResource>,
    /// Illustration URL for predefined kiosk answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl ConversationMessage {
    /// New entry stamped with the current wall clock.
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            audio: None,
            image: None,
        }
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    #[must_use]
    pub fn error(content: impl Into<String>) -> Self {
        Self::new(Role::Error, content)
    }

    /// Attach a playable audio resource.
    #[must_use]
    pub fn with_audio(mut self, audio: AudioResource) -> Self {
        self.audio = Some(audio);
        self
    }

    /// Attach an illustration URL.
    #[must_use]
    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    /// Override the timestamp from wire epoch milliseconds. Out-of-range or
    /// absent values keep the local clock.
    #[must_use]
    pub fn with_timestamp_millis(mut self, millis: Option<i64>) -> Self {
        if let Some(ms) = millis
            && let Some(ts) = Utc.timestamp_millis_opt(ms).single()
        {
            self.timestamp = ts;
        }
        self
    }
}
