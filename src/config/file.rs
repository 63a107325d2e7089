//! TOML configuration file loading.
//!
//! Supports `~/.config/totem/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of
//! defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::kiosk::PredefinedQuestion;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct TotemConfigFile {
    /// Backend endpoints
    #[serde(default)]
    pub backend: BackendFileConfig,

    /// Realtime connection tuning
    #[serde(default)]
    pub realtime: RealtimeFileConfig,

    /// Audio devices and capture parameters
    #[serde(default)]
    pub audio: AudioFileConfig,

    /// Kiosk behavior
    #[serde(default)]
    pub kiosk: KioskFileConfig,
}

/// Backend endpoint addressing
#[derive(Debug, Default, Deserialize)]
pub struct BackendFileConfig {
    /// Host name or address, no scheme
    pub host: Option<String>,

    /// WebSocket control-plane port
    pub realtime_port: Option<u16>,

    /// HTTP API port; omitted means the scheme default
    pub api_port: Option<u16>,

    /// HTTP API base path (e.g. "/api/totem")
    pub api_base: Option<String>,

    /// Use wss/https instead of ws/http
    pub tls: Option<bool>,
}

/// Realtime connection tuning
#[derive(Debug, Default, Deserialize)]
pub struct RealtimeFileConfig {
    pub max_reconnect_attempts: Option<u32>,
    pub reconnect_base_delay_ms: Option<u64>,
    pub reconnect_max_delay_ms: Option<u64>,
    /// Zero disables the heartbeat
    pub heartbeat_interval_secs: Option<u64>,
}

/// Audio configuration
#[derive(Debug, Default, Deserialize)]
pub struct AudioFileConfig {
    /// Capture sample rate in Hz
    pub sample_rate: Option<u32>,

    /// Capture chunk length in milliseconds
    pub chunk_ms: Option<u64>,

    /// Input device name; omitted selects the system default
    pub input_device: Option<String>,

    /// Output device name; omitted selects the system default
    pub output_device: Option<String>,
}

/// Kiosk behavior
#[derive(Debug, Default, Deserialize)]
pub struct KioskFileConfig {
    /// Knowledge-base filter sent with every question
    pub filter: Option<String>,

    /// Question auto-submitted when the kiosk session starts
    pub greeting: Option<String>,

    /// Static predefined-question menu; takes precedence over the backend's
    /// question list
    #[serde(default)]
    pub questions: Vec<PredefinedQuestion>,
}

/// Load the TOML config file.
///
/// Returns `TotemConfigFile::default()` if the file doesn't exist or can't
/// be parsed. A missing file is only worth a warning when it was named
/// explicitly.
pub fn load_config_file(explicit: Option<&Path>) -> TotemConfigFile {
    let Some(path) = config_file_path(explicit) else {
        return TotemConfigFile::default();
    };

    if !path.exists() {
        if explicit.is_some() {
            tracing::warn!(path = %path.display(), "config file not found, using defaults");
        }
        return TotemConfigFile::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                TotemConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            TotemConfigFile::default()
        }
    }
}

/// Resolve the config file path: explicit flag, then `$TOTEM_CONFIG`, then
/// `~/.config/totem/config.toml`.
pub fn config_file_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Ok(path) = std::env::var("TOTEM_CONFIG") {
        return Some(PathBuf::from(path));
    }
    directories::BaseDirs::new().map(|d| d.config_dir().join("totem").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_file() {
        let toml = r#"
            [backend]
            host = "kiosk.example.org"
            realtime_port = 3001
            api_port = 3000
            api_base = "/api/totem"
            tls = true

            [realtime]
            max_reconnect_attempts = 3
            reconnect_base_delay_ms = 500
            heartbeat_interval_secs = 15

            [audio]
            sample_rate = 16000
            chunk_ms = 100
            input_device = "USB Microphone"

            [kiosk]
            filter = "collection eq 'astronomy'"
            greeting = "Hola"

            [[kiosk.questions]]
            id = "intro"
            text = "Intro"
            question = "Tell me about the product"

            [[kiosk.questions]]
            id = "study-1"
            text = "Study one?"
            question = "What did study one show?"
            audio_url = "/audio/study-1.wav"
            answer = "It showed a clear effect."
        "#;

        let parsed: TotemConfigFile = toml::from_str(toml).unwrap();
        assert_eq!(parsed.backend.host.as_deref(), Some("kiosk.example.org"));
        assert_eq!(parsed.backend.tls, Some(true));
        assert_eq!(parsed.realtime.max_reconnect_attempts, Some(3));
        assert_eq!(parsed.audio.input_device.as_deref(), Some("USB Microphone"));
        assert_eq!(parsed.kiosk.questions.len(), 2);
        assert_eq!(parsed.kiosk.questions[1].audio(), Some("/audio/study-1.wav"));
        assert!(parsed.kiosk.questions[1].is_self_answering());
    }

    #[test]
    fn partial_file_leaves_rest_default() {
        let parsed: TotemConfigFile = toml::from_str("[backend]\nhost = \"10.0.0.5\"\n").unwrap();
        assert_eq!(parsed.backend.host.as_deref(), Some("10.0.0.5"));
        assert!(parsed.backend.realtime_port.is_none());
        assert!(parsed.kiosk.filter.is_none());
        assert!(parsed.kiosk.questions.is_empty());
    }

    #[test]
    fn empty_file_is_all_defaults() {
        let parsed: TotemConfigFile = toml::from_str("").unwrap();
        assert!(parsed.backend.host.is_none());
        assert!(parsed.realtime.heartbeat_interval_secs.is_none());
    }

    #[test]
    fn loads_from_an_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[backend]\nhost = \"box.local\"\nrealtime_port = 4001\n").unwrap();

        let parsed = load_config_file(Some(&path));
        assert_eq!(parsed.backend.host.as_deref(), Some("box.local"));
        assert_eq!(parsed.backend.realtime_port, Some(4001));
    }

    #[test]
    fn missing_or_broken_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();

        let parsed = load_config_file(Some(&dir.path().join("absent.toml")));
        assert!(parsed.backend.host.is_none());

        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "not [valid toml").unwrap();
        let parsed = load_config_file(Some(&path));
        assert!(parsed.backend.host.is_none());
    }
}
