//! Audio-less sink for headless operation and `--no-audio` runs.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::oneshot;

use crate::audio::{AudioSink, PlaybackAudio, PlaybackHandle, PlaybackOutcome};
use crate::error::Result;

/// Discards playback requests, resolving every handle as ended immediately.
#[derive(Debug, Default)]
pub struct NullAudioSink {
    next_id: AtomicU64,
}

impl NullAudioSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl AudioSink for NullAudioSink {
    fn play(&self, audio: PlaybackAudio) -> Result<PlaybackHandle> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(playback = id, samples = audio.samples.len(), "discarding playback");
        let (done_tx, done_rx) = oneshot::channel();
        let _ = done_tx.send(PlaybackOutcome::Ended);
        Ok(PlaybackHandle { id, done: done_rx })
    }

    fn stop(&self) {}

    fn pause(&self) {}

    fn resume(&self) {}

    fn is_playing(&self) -> bool {
        false
    }
}
