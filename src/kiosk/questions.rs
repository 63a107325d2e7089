//! Predefined kiosk questions.
//!
//! A menu entry is either a plain shortcut (only `question` text, answered by
//! the backend like any typed question) or a self-answering entry that ships
//! its reply text, illustration, and narration audio with the menu itself.

use serde::{Deserialize, Serialize};

/// A canned question offered as a quick-select menu entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredefinedQuestion {
    /// Stable slug identifying the entry.
    pub id: String,
    /// Short display text for the menu.
    pub text: String,
    /// Full question text submitted or echoed into the transcript.
    pub question: String,
    /// Illustration shown with a self-answering entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Narration audio for a self-answering entry. The backend spells this
    /// `audioUrl`; local config tables may use `audio_url`.
    #[serde(
        default,
        rename = "audioUrl",
        alias = "audio_url",
        skip_serializing_if = "Option::is_none"
    )]
    pub audio_url: Option<String>,
    /// Precomputed reply text for a self-answering entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
}

impl PredefinedQuestion {
    /// Plain shortcut entry with no precomputed answer.
    #[must_use]
    pub fn new(id: impl Into<String>, text: impl Into<String>, question: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            question: question.into(),
            image: None,
            audio_url: None,
            answer: None,
        }
    }

    /// Whether the entry carries its own answer and can be rendered without a
    /// backend round trip. Menu tables sometimes ship `audioUrl: ""` as a
    /// placeholder; an empty string does not count.
    #[must_use]
    pub fn is_self_answering(&self) -> bool {
        self.answer.is_some()
            || self.image.is_some()
            || self.audio_url.as_deref().is_some_and(|url| !url.is_empty())
    }

    /// Narration audio, with empty placeholders filtered out.
    #[must_use]
    pub fn audio(&self) -> Option<&str> {
        self.audio_url.as_deref().filter(|url| !url.is_empty())
    }
}
