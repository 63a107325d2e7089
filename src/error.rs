//! Error types for the Totem client

use thiserror::Error;

/// Result type alias for Totem operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the Totem client
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Realtime connection error
    #[error("connection error: {0}")]
    Connection(String),

    /// Wire protocol error (unparseable or unexpected frames)
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Audio error
    #[error("audio error: {0}")]
    Audio(String),

    /// Microphone capture unavailable (no device, no permission)
    #[error("capture unavailable: {0}")]
    CaptureUnavailable(String),

    /// Speaker playback unavailable (no device, unsupported format)
    #[error("playback unavailable: {0}")]
    PlaybackUnavailable(String),

    /// Q&A backend error
    #[error("backend error: {0}")]
    Backend(String),

    /// Audio resource error (bad URL, undecodable payload)
    #[error("resource error: {0}")]
    Resource(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// WebSocket error
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing error
    #[error("url error: {0}")]
    Url(#[from] url::ParseError),

    /// Base64 decoding error
    #[error("base64 error: {0}")]
    Base64(#[from] base64::DecodeError),
}
