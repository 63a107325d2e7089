//! Speaker playback via cpal.
//!
//! Like capture, the output stream lives on a worker thread. The worker
//! enforces the single-playback rule: a new `play` tears down whatever is
//! active and resolves its handle as stopped before the replacement starts.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, Stream, StreamConfig};
use tokio::sync::oneshot;

use crate::audio::{AudioSink, PlaybackAudio, PlaybackHandle, PlaybackOutcome, wav};
use crate::error::{Error, Result};

/// Worker poll interval while audio is rendering.
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Grace period after the last sample so the device drains its buffer.
const DRAIN_DELAY: Duration = Duration::from_millis(100);

enum SinkCmd {
    Play {
        audio: PlaybackAudio,
        id: u64,
        done: oneshot::Sender<PlaybackOutcome>,
    },
    Stop,
    Pause,
    Resume,
    Shutdown,
}

struct ActivePlayback {
    // dropping tears the device stream down
    stream: Stream,
    finished: Arc<AtomicBool>,
    failure: Arc<Mutex<Option<String>>>,
    done: Option<oneshot::Sender<PlaybackOutcome>>,
    id: u64,
}

/// Plays audio on a system output device.
pub struct CpalAudioSink {
    control: mpsc::Sender<SinkCmd>,
    playing: Arc<AtomicBool>,
    next_id: AtomicU64,
}

impl CpalAudioSink {
    /// Playback handle for the named device, or the system default.
    /// The device itself is opened per playback.
    #[must_use]
    pub fn new(device: Option<String>) -> Self {
        let playing = Arc::new(AtomicBool::new(false));

        let (control, commands) = mpsc::channel();
        let worker_playing = Arc::clone(&playing);
        std::thread::spawn(move || {
            playback_worker(&worker_playing, &commands, device.as_deref());
        });

        Self {
            control,
            playing,
            next_id: AtomicU64::new(0),
        }
    }
}

impl AudioSink for CpalAudioSink {
    fn play(&self, audio: PlaybackAudio) -> Result<PlaybackHandle> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (done_tx, done_rx) = oneshot::channel();
        self.control
            .send(SinkCmd::Play {
                audio,
                id,
                done: done_tx,
            })
            .map_err(|_| Error::PlaybackUnavailable("playback worker is gone".to_string()))?;
        Ok(PlaybackHandle { id, done: done_rx })
    }

    fn stop(&self) {
        let _ = self.control.send(SinkCmd::Stop);
    }

    fn pause(&self) {
        let _ = self.control.send(SinkCmd::Pause);
    }

    fn resume(&self) {
        let _ = self.control.send(SinkCmd::Resume);
    }

    fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }
}

impl Drop for CpalAudioSink {
    fn drop(&mut self) {
        let _ = self.control.send(SinkCmd::Shutdown);
    }
}

fn playback_worker(
    playing: &Arc<AtomicBool>,
    commands: &mpsc::Receiver<SinkCmd>,
    device: Option<&str>,
) {
    let mut current: Option<ActivePlayback> = None;

    loop {
        // Poll while rendering so completion is noticed between commands.
        let cmd = if current.is_some() {
            match commands.recv_timeout(POLL_INTERVAL) {
                Ok(cmd) => Some(cmd),
                Err(mpsc::RecvTimeoutError::Timeout) => None,
                Err(mpsc::RecvTimeoutError::Disconnected) => break,
            }
        } else {
            match commands.recv() {
                Ok(cmd) => Some(cmd),
                Err(_) => break,
            }
        };

        match cmd {
            Some(SinkCmd::Play { audio, id, done }) => {
                finish(&mut current, playing, PlaybackOutcome::Stopped);

                if audio.samples.is_empty() {
                    let _ = done.send(PlaybackOutcome::Ended);
                    continue;
                }

                match start_playback(&audio, device) {
                    Ok((stream, finished, failure)) => {
                        playing.store(true, Ordering::SeqCst);
                        tracing::debug!(
                            playback = id,
                            samples = audio.samples.len(),
                            sample_rate = audio.sample_rate,
                            "playback started"
                        );
                        current = Some(ActivePlayback {
                            stream,
                            finished,
                            failure,
                            done: Some(done),
                            id,
                        });
                    }
                    Err(e) => {
                        tracing::warn!(playback = id, error = %e, "failed to start playback");
                        let _ = done.send(PlaybackOutcome::Failed(e.to_string()));
                    }
                }
            }
            Some(SinkCmd::Stop) => finish(&mut current, playing, PlaybackOutcome::Stopped),
            Some(SinkCmd::Pause) => {
                if let Some(active) = &current
                    && let Err(e) = active.stream.pause()
                {
                    tracing::warn!(error = %e, "failed to pause playback");
                }
            }
            Some(SinkCmd::Resume) => {
                if let Some(active) = &current
                    && let Err(e) = active.stream.play()
                {
                    tracing::warn!(error = %e, "failed to resume playback");
                }
            }
            Some(SinkCmd::Shutdown) => break,
            None => {
                let outcome = current.as_ref().and_then(|active| {
                    if let Some(msg) = active.failure.lock().ok().and_then(|mut f| f.take()) {
                        Some(PlaybackOutcome::Failed(msg))
                    } else if active.finished.load(Ordering::Relaxed) {
                        Some(PlaybackOutcome::Ended)
                    } else {
                        None
                    }
                });
                if let Some(outcome) = outcome {
                    if outcome == PlaybackOutcome::Ended {
                        std::thread::sleep(DRAIN_DELAY);
                    }
                    finish(&mut current, playing, outcome);
                }
            }
        }
    }

    finish(&mut current, playing, PlaybackOutcome::Stopped);
}

fn finish(
    current: &mut Option<ActivePlayback>,
    playing: &Arc<AtomicBool>,
    outcome: PlaybackOutcome,
) {
    if let Some(mut active) = current.take() {
        playing.store(false, Ordering::SeqCst);
        tracing::debug!(playback = active.id, outcome = ?outcome, "playback finished");
        if let Some(done) = active.done.take() {
            let _ = done.send(outcome);
        }
    }
}

type StreamParts = (Stream, Arc<AtomicBool>, Arc<Mutex<Option<String>>>);

fn start_playback(audio: &PlaybackAudio, device_name: Option<&str>) -> Result<StreamParts> {
    let host = cpal::default_host();

    let device = match device_name {
        Some(name) => host
            .output_devices()
            .map_err(|e| Error::PlaybackUnavailable(e.to_string()))?
            .find(|d| d.name().is_ok_and(|n| n == name))
            .ok_or_else(|| {
                Error::PlaybackUnavailable(format!("output device not found: {name}"))
            })?,
        None => host
            .default_output_device()
            .ok_or_else(|| Error::PlaybackUnavailable("no output device available".to_string()))?,
    };

    let (config, samples) = negotiate_config(&device, audio)?;
    let channels = usize::from(config.channels);

    tracing::debug!(
        device = device.name().unwrap_or_default(),
        sample_rate = config.sample_rate.0,
        channels = config.channels,
        "audio playback initialized"
    );

    let samples = Arc::new(samples);
    let position = Arc::new(AtomicUsize::new(0));
    let finished = Arc::new(AtomicBool::new(false));
    let failure = Arc::new(Mutex::new(None));

    let cb_samples = Arc::clone(&samples);
    let cb_position = Arc::clone(&position);
    let cb_finished = Arc::clone(&finished);
    let cb_failure = Arc::clone(&failure);

    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let mut pos = cb_position.load(Ordering::Relaxed);
                for frame in data.chunks_mut(channels) {
                    let sample = if pos < cb_samples.len() {
                        cb_samples[pos]
                    } else {
                        cb_finished.store(true, Ordering::Relaxed);
                        0.0
                    };

                    for out in frame.iter_mut() {
                        *out = sample;
                    }

                    if pos < cb_samples.len() {
                        pos += 1;
                    }
                }
                cb_position.store(pos, Ordering::Relaxed);
            },
            move |err| {
                tracing::error!(error = %err, "audio playback error");
                if let Ok(mut failure) = cb_failure.lock() {
                    failure.get_or_insert_with(|| err.to_string());
                }
            },
            None,
        )
        .map_err(|e| Error::PlaybackUnavailable(e.to_string()))?;

    stream
        .play()
        .map_err(|e| Error::PlaybackUnavailable(e.to_string()))?;

    Ok((stream, finished, failure))
}

/// Pick a stream config for the audio's nominal rate, preferring mono and
/// falling back to stereo. When the device supports neither, resample to
/// its default config instead.
fn negotiate_config(device: &Device, audio: &PlaybackAudio) -> Result<(StreamConfig, Vec<f32>)> {
    let rate = SampleRate(audio.sample_rate);

    let at_rate = device
        .supported_output_configs()
        .map_err(|e| Error::PlaybackUnavailable(e.to_string()))?
        .find(|c| c.channels() == 1 && c.min_sample_rate() <= rate && c.max_sample_rate() >= rate)
        .or_else(|| {
            device.supported_output_configs().ok()?.find(|c| {
                c.channels() == 2 && c.min_sample_rate() <= rate && c.max_sample_rate() >= rate
            })
        });

    if let Some(supported) = at_rate {
        return Ok((
            supported.with_sample_rate(rate).config(),
            audio.samples.clone(),
        ));
    }

    let default = device
        .default_output_config()
        .map_err(|e| Error::PlaybackUnavailable(e.to_string()))?;
    let resampled = wav::resample(&audio.samples, audio.sample_rate, default.sample_rate().0);
    tracing::debug!(
        from = audio.sample_rate,
        to = default.sample_rate().0,
        "resampling playback to device default"
    );
    Ok((default.config(), resampled))
}
