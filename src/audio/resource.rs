//! Playable audio resources attached to transcript entries.
//!
//! A resource is either a `data:` URL carrying an inline base64 WAV payload
//! or an HTTP(S) URL, absolute or relative to the backend origin. Loading
//! resolves either form to decoded samples.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::audio::PlaybackAudio;
use crate::audio::wav::decode_wav;
use crate::error::{Error, Result};

/// Reference to playable answer audio.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AudioResource(String);

impl AudioResource {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when the payload is carried inline rather than fetched.
    #[must_use]
    pub fn is_data_url(&self) -> bool {
        self.0.starts_with("data:")
    }
}

impl std::fmt::Display for AudioResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // data urls are huge; log a preview only
        if self.is_data_url() {
            let preview: String = self.0.chars().take(32).collect();
            write!(f, "{preview}...")
        } else {
            f.write_str(&self.0)
        }
    }
}

impl From<String> for AudioResource {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for AudioResource {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Resolves [`AudioResource`] values to decoded audio.
#[derive(Debug, Clone)]
pub struct ResourceLoader {
    http: reqwest::Client,
    /// Origin used to resolve relative resource paths.
    base: Option<Url>,
}

impl ResourceLoader {
    #[must_use]
    pub fn new(base: Option<Url>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base,
        }
    }

    /// Fetch and decode a resource to playable samples.
    ///
    /// # Errors
    ///
    /// Returns error if the resource is malformed, unreachable, or not a
    /// decodable WAV payload
    pub async fn load(&self, resource: &AudioResource) -> Result<PlaybackAudio> {
        let value = resource.as_str();

        if resource.is_data_url() {
            let bytes = decode_data_url(value)?;
            return decode_wav(&bytes);
        }

        let url = if value.starts_with("http://") || value.starts_with("https://") {
            Url::parse(value)?
        } else if let Some(base) = &self.base {
            base.join(value)?
        } else {
            return Err(Error::Resource(format!(
                "relative audio url with no backend origin: {value}"
            )));
        };

        let bytes = self
            .http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        decode_wav(&bytes)
    }
}

fn decode_data_url(value: &str) -> Result<Vec<u8>> {
    let rest = value
        .strip_prefix("data:")
        .ok_or_else(|| Error::Resource("not a data url".to_string()))?;
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| Error::Resource("malformed data url".to_string()))?;
    if !meta.ends_with(";base64") {
        return Err(Error::Resource(
            "data url payload is not base64".to_string(),
        ));
    }
    Ok(BASE64.decode(payload)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_url_detection() {
        assert!(AudioResource::new("data:audio/wav;base64,AAAA").is_data_url());
        assert!(!AudioResource::new("https://backend/audio/1.wav").is_data_url());
        assert!(!AudioResource::new("/audio/1.wav").is_data_url());
    }

    #[test]
    fn data_url_payload_decodes() {
        let bytes = decode_data_url("data:audio/wav;base64,AAEC").unwrap();
        assert_eq!(bytes, vec![0, 1, 2]);
    }

    #[test]
    fn data_url_without_base64_marker_is_rejected() {
        assert!(decode_data_url("data:text/plain,hello").is_err());
    }

    #[test]
    fn data_url_without_comma_is_rejected() {
        assert!(decode_data_url("data:audio/wav;base64").is_err());
    }

    #[test]
    fn display_truncates_data_urls() {
        let long = format!("data:audio/wav;base64,{}", "A".repeat(4096));
        let shown = AudioResource::new(long).to_string();
        assert!(shown.len() < 64);
    }

    #[test]
    fn serde_is_transparent() {
        let resource = AudioResource::new("/audio/1.wav");
        let json = serde_json::to_string(&resource).unwrap();
        assert_eq!(json, "\"/audio/1.wav\"");
        let back: AudioResource = serde_json::from_str(&json).unwrap();
        assert_eq!(back, resource);
    }
}
