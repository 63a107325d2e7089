//! Wire protocol for the realtime voice channel.
//!
//! Events are JSON text frames tagged by a `type` field. Client events flow
//! to the backend (call control, audio chunks, heartbeats); server events
//! flow back (transcriptions, replies, status, synthesized audio). Unknown
//! event kinds and malformed payloads are logged and dropped by the
//! connection driver, never surfaced as errors.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Connection lifecycle of the realtime channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No socket, no driver activity.
    #[default]
    Disconnected,
    /// Dial in progress or waiting between reconnect attempts.
    Connecting,
    /// Socket open, events flowing.
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
        }
    }
}

/// Session status reported over the wire and tracked per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    /// Idle, ready to start a call.
    #[default]
    Ready,
    /// Call running, microphone streaming.
    CallActive,
    /// Backend is working on a final transcription.
    Processing,
    /// Assistant audio is playing.
    Speaking,
    /// Something went wrong; details in the session error slot.
    Error,
}

impl CallStatus {
    /// Status string as it appears on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::CallActive => "call_active",
            Self::Processing => "processing",
            Self::Speaking => "speaking",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CallStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ready" => Ok(Self::Ready),
            "call_active" => Ok(Self::CallActive),
            "processing" => Ok(Self::Processing),
            "speaking" => Ok(Self::Speaking),
            "error" => Ok(Self::Error),
            other => Err(Error::Protocol(format!("unknown call status: {other}"))),
        }
    }
}

/// Events sent from this client to the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Begin a voice call session.
    StartCall,
    /// End the current voice call session.
    StopCall,
    /// Clear the server-side conversation context.
    ResetConversation,
    /// One captured microphone chunk, base64 PCM16 little-endian.
    AudioChunk { data: String },
    /// Application-level heartbeat.
    Ping { timestamp: i64 },
}

impl ClientEvent {
    /// Heartbeat event stamped with the current wall clock (milliseconds).
    #[must_use]
    pub fn ping_now() -> Self {
        Self::Ping {
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Event kind as it appears in the wire `type` tag.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::StartCall => "start_call",
            Self::StopCall => "stop_call",
            Self::ResetConversation => "reset_conversation",
            Self::AudioChunk { .. } => "audio_chunk",
            Self::Ping { .. } => "ping",
        }
    }
}

/// Events received from the backend.
///
/// Field names follow the wire format, which mixes snake_case event tags
/// with camelCase payload keys (`isFinal`). Timestamps are epoch
/// milliseconds and optional; absent values mean "now" to consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Backend acknowledged `start_call`.
    CallStarted,
    /// Backend acknowledged `stop_call` or ended the call itself.
    CallStopped,
    /// Speech-to-text output, interim or final.
    Transcription {
        text: String,
        #[serde(rename = "isFinal", default)]
        is_final: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<i64>,
    },
    /// Assistant reply text.
    AiResponse {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<i64>,
    },
    /// Session status pushed by the backend. Unknown status strings are
    /// tolerated here and rejected with a warning at the session layer.
    Status { status: String },
    /// Backend-side input level estimate, 0.0 to 1.0.
    AudioLevel { level: f32 },
    /// Backend-reported error, non-fatal to the connection.
    Error { message: String },
    /// Server-side conversation context was cleared.
    ConversationReset,
    /// Synthesized assistant speech, base64 WAV payload.
    Audio { data: String },
    /// Heartbeat reply.
    Pong {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<i64>,
    },
}

impl ServerEvent {
    /// Event kind as it appears in the wire `type` tag.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::CallStarted => "call_started",
            Self::CallStopped => "call_stopped",
            Self::Transcription { .. } => "transcription",
            Self::AiResponse { .. } => "ai_response",
            Self::Status { .. } => "status",
            Self::AudioLevel { .. } => "audio_level",
            Self::Error { .. } => "error",
            Self::ConversationReset => "conversation_reset",
            Self::Audio { .. } => "audio",
            Self::Pong { .. } => "pong",
        }
    }
}
