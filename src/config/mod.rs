//! Configuration management for the totem client.
//!
//! Settings merge from three layers, highest precedence first: environment
//! variables, the optional TOML file, and built-in defaults. The resolved
//! [`Config`] derives the endpoint URLs the way the original kiosk derived
//! them from its page origin plus the well-known realtime port.

pub mod file;

use std::path::Path;
use std::time::Duration;

use url::Url;

use crate::audio::{DEFAULT_CHUNK_MS, DEFAULT_SAMPLE_RATE};
use crate::kiosk::KioskConfig;
use crate::realtime::{RealtimeConfig, ReconnectPolicy};

/// Resolved client configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Backend addressing
    pub backend: BackendConfig,

    /// Reconnect backoff for the realtime channel
    pub reconnect: ReconnectPolicy,

    /// Application-level ping cadence; zero disables the heartbeat
    pub heartbeat_interval: Duration,

    /// Audio devices and capture parameters
    pub audio: AudioConfig,

    /// Kiosk behavior
    pub kiosk: KioskConfig,
}

/// Backend endpoint addressing.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Host name or address, no scheme
    pub host: String,

    /// WebSocket control-plane port
    pub realtime_port: u16,

    /// HTTP API port; `None` means the scheme default
    pub api_port: Option<u16>,

    /// HTTP API base path
    pub api_base: String,

    /// Use wss/https schemes
    pub tls: bool,

    /// Full API URL override (`TOTEM_API_URL`); wins over the
    /// host/port/base derivation
    pub api_url_override: Option<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            realtime_port: 3001,
            api_port: None,
            api_base: "/api/totem".to_string(),
            tls: false,
            api_url_override: None,
        }
    }
}

/// Audio capture/playback settings.
#[derive(Debug, Clone)]
pub struct AudioConfig {
    /// Capture sample rate in Hz
    pub sample_rate: u32,

    /// Capture chunk length in milliseconds
    pub chunk_ms: u64,

    /// Input device name; `None` selects the system default
    pub input_device: Option<String>,

    /// Output device name; `None` selects the system default
    pub output_device: Option<String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            chunk_ms: DEFAULT_CHUNK_MS,
            input_device: None,
            output_device: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            reconnect: ReconnectPolicy::default(),
            heartbeat_interval: Duration::from_secs(30),
            audio: AudioConfig::default(),
            kiosk: KioskConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration (env > toml > default).
    #[must_use]
    pub fn load(config_path: Option<&Path>) -> Self {
        let fc = file::load_config_file(config_path);
        Self::from_file(fc)
    }

    /// Merge a parsed config file with environment overrides and defaults.
    #[must_use]
    pub fn from_file(fc: file::TotemConfigFile) -> Self {
        let backend_defaults = BackendConfig::default();
        let backend = BackendConfig {
            host: std::env::var("TOTEM_BACKEND_HOST")
                .ok()
                .or(fc.backend.host)
                .unwrap_or(backend_defaults.host),
            realtime_port: std::env::var("TOTEM_REALTIME_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .or(fc.backend.realtime_port)
                .unwrap_or(backend_defaults.realtime_port),
            api_port: std::env::var("TOTEM_API_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .or(fc.backend.api_port),
            api_base: fc.backend.api_base.unwrap_or(backend_defaults.api_base),
            tls: std::env::var("TOTEM_TLS")
                .ok()
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .or(fc.backend.tls)
                .unwrap_or(backend_defaults.tls),
            api_url_override: std::env::var("TOTEM_API_URL").ok(),
        };

        let reconnect_defaults = ReconnectPolicy::default();
        let reconnect = ReconnectPolicy {
            max_attempts: fc
                .realtime
                .max_reconnect_attempts
                .unwrap_or(reconnect_defaults.max_attempts),
            base_delay: fc
                .realtime
                .reconnect_base_delay_ms
                .map_or(reconnect_defaults.base_delay, Duration::from_millis),
            max_delay: fc
                .realtime
                .reconnect_max_delay_ms
                .map_or(reconnect_defaults.max_delay, Duration::from_millis),
        };

        let heartbeat_interval =
            Duration::from_secs(fc.realtime.heartbeat_interval_secs.unwrap_or(30));

        let audio = AudioConfig {
            sample_rate: fc.audio.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE),
            chunk_ms: fc.audio.chunk_ms.unwrap_or(DEFAULT_CHUNK_MS),
            input_device: std::env::var("TOTEM_INPUT_DEVICE")
                .ok()
                .or(fc.audio.input_device),
            output_device: std::env::var("TOTEM_OUTPUT_DEVICE")
                .ok()
                .or(fc.audio.output_device),
        };

        let kiosk = KioskConfig {
            filter: std::env::var("TOTEM_KIOSK_FILTER").ok().or(fc.kiosk.filter),
            greeting: fc.kiosk.greeting,
            questions: fc.kiosk.questions,
        };

        Self {
            backend,
            reconnect,
            heartbeat_interval,
            audio,
            kiosk,
        }
    }

    /// WebSocket endpoint, `ws[s]://host:realtime_port`.
    #[must_use]
    pub fn ws_url(&self) -> String {
        let scheme = if self.backend.tls { "wss" } else { "ws" };
        format!(
            "{scheme}://{}:{}",
            self.backend.host, self.backend.realtime_port
        )
    }

    /// Q&A API root, `http[s]://host[:api_port]{api_base}`, unless
    /// `TOTEM_API_URL` overrides the whole derivation.
    #[must_use]
    pub fn api_url(&self) -> String {
        if let Some(url) = &self.backend.api_url_override {
            return url.trim_end_matches('/').to_string();
        }

        let scheme = if self.backend.tls { "https" } else { "http" };
        let base = self.backend.api_base.trim_end_matches('/');
        match self.backend.api_port {
            Some(port) => format!("{scheme}://{}:{port}{base}", self.backend.host),
            None => format!("{scheme}://{}{base}", self.backend.host),
        }
    }

    /// HTTP origin used to resolve relative audio resource paths.
    #[must_use]
    pub fn origin_url(&self) -> Option<Url> {
        if let Some(override_url) = &self.backend.api_url_override
            && let Ok(mut url) = Url::parse(override_url)
        {
            url.set_path("/");
            url.set_query(None);
            return Some(url);
        }

        let scheme = if self.backend.tls { "https" } else { "http" };
        let origin = match self.backend.api_port {
            Some(port) => format!("{scheme}://{}:{port}/", self.backend.host),
            None => format!("{scheme}://{}/", self.backend.host),
        };
        Url::parse(&origin).ok()
    }

    /// Realtime client settings derived from this config.
    #[must_use]
    pub fn realtime_config(&self) -> RealtimeConfig {
        RealtimeConfig {
            url: self.ws_url(),
            reconnect: self.reconnect.clone(),
            heartbeat_interval: self.heartbeat_interval,
        }
    }
}
