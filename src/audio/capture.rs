//! Microphone capture via cpal.
//!
//! The cpal input stream is not `Send`, so it lives on a dedicated worker
//! thread. The handle type talks to the worker over a command channel and
//! shares the sample buffer, which keeps [`CpalAudioSource`] usable from
//! any task.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, mpsc};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, Stream, StreamConfig};

use crate::audio::AudioSource;
use crate::error::{Error, Result};

/// Trailing level-meter window, as a fraction of a second.
const LEVEL_WINDOW_DIVISOR: u32 = 20;

struct CaptureShared {
    buffer: Mutex<Vec<f32>>,
    window: Mutex<VecDeque<f32>>,
    active: AtomicBool,
}

enum CaptureCmd {
    Start(mpsc::Sender<Result<()>>),
    Stop,
    Shutdown,
}

/// Captures audio from a system input device.
pub struct CpalAudioSource {
    shared: Arc<CaptureShared>,
    control: mpsc::Sender<CaptureCmd>,
    sample_rate: u32,
}

impl CpalAudioSource {
    /// Capture handle for the named device, or the system default.
    /// The device itself is opened lazily on [`AudioSource::start`].
    #[must_use]
    pub fn new(sample_rate: u32, device: Option<String>) -> Self {
        let shared = Arc::new(CaptureShared {
            buffer: Mutex::new(Vec::new()),
            window: Mutex::new(VecDeque::new()),
            active: AtomicBool::new(false),
        });

        let (control, commands) = mpsc::channel();
        let worker_shared = Arc::clone(&shared);
        std::thread::spawn(move || {
            capture_worker(&worker_shared, &commands, sample_rate, device.as_deref());
        });

        Self {
            shared,
            control,
            sample_rate,
        }
    }
}

impl AudioSource for CpalAudioSource {
    fn start(&self) -> Result<()> {
        let (reply, result) = mpsc::channel();
        self.control
            .send(CaptureCmd::Start(reply))
            .map_err(|_| Error::CaptureUnavailable("capture worker is gone".to_string()))?;
        result
            .recv()
            .map_err(|_| Error::CaptureUnavailable("capture worker is gone".to_string()))?
    }

    fn stop(&self) {
        let _ = self.control.send(CaptureCmd::Stop);
    }

    fn is_active(&self) -> bool {
        self.shared.active.load(Ordering::SeqCst)
    }

    fn take(&self) -> Vec<f32> {
        self.shared
            .buffer
            .lock()
            .map(|mut buf| std::mem::take(&mut *buf))
            .unwrap_or_default()
    }

    fn recent(&self) -> Vec<f32> {
        self.shared
            .window
            .lock()
            .map(|window| window.iter().copied().collect())
            .unwrap_or_default()
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

impl Drop for CpalAudioSource {
    fn drop(&mut self) {
        let _ = self.control.send(CaptureCmd::Shutdown);
    }
}

fn capture_worker(
    shared: &Arc<CaptureShared>,
    commands: &mpsc::Receiver<CaptureCmd>,
    sample_rate: u32,
    device: Option<&str>,
) {
    let mut stream: Option<Stream> = None;

    while let Ok(cmd) = commands.recv() {
        match cmd {
            CaptureCmd::Start(reply) => {
                if stream.is_some() {
                    let _ = reply.send(Ok(()));
                    continue;
                }
                match open_input_stream(shared, sample_rate, device) {
                    Ok(s) => {
                        stream = Some(s);
                        shared.active.store(true, Ordering::SeqCst);
                        tracing::debug!("audio capture started");
                        let _ = reply.send(Ok(()));
                    }
                    Err(e) => {
                        let _ = reply.send(Err(e));
                    }
                }
            }
            CaptureCmd::Stop => {
                if stream.take().is_some() {
                    tracing::debug!("audio capture stopped");
                }
                shared.active.store(false, Ordering::SeqCst);
                if let Ok(mut buf) = shared.buffer.lock() {
                    buf.clear();
                }
                if let Ok(mut window) = shared.window.lock() {
                    window.clear();
                }
            }
            CaptureCmd::Shutdown => break,
        }
    }
}

fn open_input_stream(
    shared: &Arc<CaptureShared>,
    sample_rate: u32,
    device_name: Option<&str>,
) -> Result<Stream> {
    let host = cpal::default_host();

    let device = match device_name {
        Some(name) => host
            .input_devices()
            .map_err(|e| Error::CaptureUnavailable(e.to_string()))?
            .find(|d| d.name().is_ok_and(|n| n == name))
            .ok_or_else(|| Error::CaptureUnavailable(format!("input device not found: {name}")))?,
        None => host
            .default_input_device()
            .ok_or_else(|| Error::CaptureUnavailable("no input device available".to_string()))?,
    };

    let supported = device
        .supported_input_configs()
        .map_err(|e| Error::CaptureUnavailable(e.to_string()))?
        .find(|c| {
            c.channels() == 1
                && c.min_sample_rate() <= SampleRate(sample_rate)
                && c.max_sample_rate() >= SampleRate(sample_rate)
        })
        .ok_or_else(|| {
            Error::CaptureUnavailable("no mono input config at the requested rate".to_string())
        })?;

    let config: StreamConfig = supported.with_sample_rate(SampleRate(sample_rate)).config();

    tracing::debug!(
        device = device.name().unwrap_or_default(),
        sample_rate,
        channels = config.channels,
        "audio capture initialized"
    );

    let window_cap = (sample_rate / LEVEL_WINDOW_DIVISOR).max(1) as usize;
    let data_shared = Arc::clone(shared);
    let stream = device
        .build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                if let Ok(mut buf) = data_shared.buffer.lock() {
                    buf.extend_from_slice(data);
                }
                if let Ok(mut window) = data_shared.window.lock() {
                    window.extend(data.iter().copied());
                    while window.len() > window_cap {
                        window.pop_front();
                    }
                }
            },
            |err| {
                tracing::error!(error = %err, "audio capture error");
            },
            None,
        )
        .map_err(|e| Error::CaptureUnavailable(e.to_string()))?;

    stream
        .play()
        .map_err(|e| Error::CaptureUnavailable(e.to_string()))?;
    Ok(stream)
}
