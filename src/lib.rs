//! Totem client - headless voice-call and kiosk Q&A client for AI
//! assistant backends
//!
//! This library implements the two client surfaces of a totem installation:
//! - a continuous-call voice session (microphone capture streamed over a
//!   WebSocket, synthesized replies played back)
//! - a kiosk Q&A flow (HTTP question/answer with predefined menus and
//!   replayable narration)
//!
//! All intelligence (STT, LLM, TTS, knowledge search) lives in the backend;
//! this crate owns the connection lifecycle, session state machines, and
//! the audio pipeline.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    Frontends                         │
//! │        CLI (totem call / ask)  │  embedders          │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                 Controllers                          │
//! │   CallController (WS session) │ KioskController      │
//! └──────┬─────────────────┬──────────────────┬─────────┘
//!        │                 │                  │
//! ┌──────▼──────┐   ┌──────▼───────┐   ┌──────▼────────┐
//! │  realtime   │   │    audio     │   │  kiosk::api   │
//! │  WebSocket  │   │ capture/play │   │  HTTP (Q&A)   │
//! └──────┬──────┘   └──────────────┘   └──────┬────────┘
//!        │                                    │
//! ┌──────▼────────────────────────────────────▼─────────┐
//! │           Backend (STT │ LLM │ TTS │ KB)             │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod audio;
pub mod call;
pub mod config;
pub mod error;
pub mod kiosk;
pub mod protocol;
pub mod realtime;
pub mod transcript;

pub use audio::{
    AudioResource, AudioSink, AudioSource, CpalAudioSink, CpalAudioSource, NullAudioSink,
    PlaybackAudio, PlaybackHandle, PlaybackOutcome, ResourceLoader,
};
pub use call::{CallController, CallState};
pub use config::Config;
pub use error::{Error, Result};
pub use kiosk::{
    AnswerResponse, KioskConfig, KioskController, KioskState, PredefinedQuestion, QaBackend,
    TotemApi,
};
pub use protocol::{CallStatus, ClientEvent, ConnectionState, ServerEvent};
pub use realtime::{ListenerId, RealtimeClient, RealtimeConfig, ReconnectPolicy};
pub use transcript::{ConversationMessage, Role};
