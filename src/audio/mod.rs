//! Audio capture and playback.
//!
//! Device access goes through the [`AudioSource`] and [`AudioSink`] traits
//! so session logic never touches `cpal` directly. The shipped
//! implementations are [`CpalAudioSource`] and [`CpalAudioSink`], which keep
//! the non-`Send` device streams on dedicated worker threads, plus a
//! [`NullAudioSink`] for audio-less operation. Tests substitute their own
//! scripted implementations.

mod capture;
mod chunker;
mod level;
mod null;
mod playback;
mod resource;
pub mod wav;

pub use capture::CpalAudioSource;
pub use chunker::{ChunkAssembler, decode_chunk, encode_chunk};
pub use level::window_level;
pub use null::NullAudioSink;
pub use playback::CpalAudioSink;
pub use resource::{AudioResource, ResourceLoader};

use tokio::sync::oneshot;

use crate::error::Result;

/// Default capture rate (16kHz for speech).
pub const DEFAULT_SAMPLE_RATE: u32 = 16000;

/// Default capture chunk length in milliseconds.
pub const DEFAULT_CHUNK_MS: u64 = 100;

/// Decoded audio ready to hand to a sink.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackAudio {
    /// Mono samples in the -1.0 to 1.0 range.
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl PlaybackAudio {
    /// Playback length at the nominal rate.
    #[must_use]
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        (self.samples.len() as u64).saturating_mul(1000) / u64::from(self.sample_rate)
    }
}

/// How a playback finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackOutcome {
    /// All samples were rendered.
    Ended,
    /// Torn down by `stop` or superseded by a newer `play`.
    Stopped,
    /// The device stream failed mid-playback or never started.
    Failed(String),
}

/// Completion handle for one playback. The sink resolves `done` exactly once.
#[derive(Debug)]
pub struct PlaybackHandle {
    /// Identity of this playback, unique per sink.
    pub id: u64,
    /// Resolved when the playback ends, is stopped, or fails.
    pub done: oneshot::Receiver<PlaybackOutcome>,
}

/// Microphone-side capture device.
///
/// Implementations buffer samples between [`AudioSource::take`] calls and
/// keep a short trailing window for level metering.
pub trait AudioSource: Send + Sync {
    /// Open the device and begin buffering samples. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error when no usable input device is available; the
    /// session treats that as a non-fatal capture failure.
    fn start(&self) -> Result<()>;

    /// Stop capturing and discard buffered samples. Idempotent.
    fn stop(&self);

    fn is_active(&self) -> bool;

    /// Drain everything captured since the previous call.
    fn take(&self) -> Vec<f32>;

    /// Copy of the most recent samples, for level metering. Does not drain.
    fn recent(&self) -> Vec<f32>;

    fn sample_rate(&self) -> u32;
}

/// Speaker-side playback device.
///
/// At most one playback is active per sink: `play` tears down whatever was
/// playing before starting the new audio, resolving the superseded handle
/// with [`PlaybackOutcome::Stopped`].
pub trait AudioSink: Send + Sync {
    /// Start playing, superseding any current playback.
    ///
    /// # Errors
    ///
    /// Returns an error when the sink has shut down and can no longer
    /// accept work. Device failures are reported through the handle.
    fn play(&self, audio: PlaybackAudio) -> Result<PlaybackHandle>;

    /// Tear down the current playback, if any, and release the device.
    fn stop(&self);

    /// Suspend the current playback, keeping its position.
    fn pause(&self);

    /// Resume a paused playback.
    fn resume(&self);

    fn is_playing(&self) -> bool;
}
