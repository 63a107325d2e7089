//! WAV codec and small DSP helpers.

use crate::audio::PlaybackAudio;
use crate::error::{Error, Result};

/// Convert a normalized sample to PCM16.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn sample_to_i16(sample: f32) -> i16 {
    (sample * 32767.0).clamp(-32768.0, 32767.0) as i16
}

/// Encode mono f32 samples as a 16-bit PCM WAV file.
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;
        for &sample in samples {
            writer
                .write_sample(sample_to_i16(sample))
                .map_err(|e| Error::Audio(e.to_string()))?;
        }
        writer
            .finalize()
            .map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}

/// Decode a WAV payload to normalized mono samples at its source rate.
/// Multi-channel input is downmixed by averaging each frame.
///
/// # Errors
///
/// Returns error if the payload is not valid 16-bit PCM or 32-bit float WAV
pub fn decode_wav(bytes: &[u8]) -> Result<PlaybackAudio> {
    let mut reader = hound::WavReader::new(std::io::Cursor::new(bytes))
        .map_err(|e| Error::Audio(e.to_string()))?;
    let spec = reader.spec();

    let interleaved: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (hound::SampleFormat::Int, 16) => reader
            .samples::<i16>()
            .map(|s| s.map(|v| f32::from(v) / 32768.0))
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| Error::Audio(e.to_string()))?,
        (hound::SampleFormat::Float, 32) => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| Error::Audio(e.to_string()))?,
        (format, bits) => {
            return Err(Error::Audio(format!(
                "unsupported wav format: {bits}-bit {format:?}"
            )));
        }
    };

    let channels = usize::from(spec.channels.max(1));
    let samples = if channels == 1 {
        interleaved
    } else {
        downmix(&interleaved, channels)
    };

    Ok(PlaybackAudio {
        samples,
        sample_rate: spec.sample_rate,
    })
}

#[allow(clippy::cast_precision_loss)]
fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

/// Scale samples in place so the peak sits at 0.95 full scale.
/// Silence is left untouched.
pub fn normalize(samples: &mut [f32]) {
    let peak = samples.iter().fold(0.0_f32, |max, s| max.max(s.abs()));
    if peak > 0.0 {
        let scale = 0.95 / peak;
        for sample in samples.iter_mut() {
            *sample *= scale;
        }
    }
}

/// Linear-interpolation resample between nominal rates.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() || to_rate == 0 {
        return samples.to_vec();
    }

    let ratio = f64::from(from_rate) / f64::from(to_rate);
    let out_len = (samples.len() as f64 / ratio).round() as usize;
    let last = samples.len() - 1;

    let mut out = Vec::with_capacity(out_len);
    for i in 0..out_len {
        let src = i as f64 * ratio;
        let idx = (src.floor() as usize).min(last);
        let frac = (src - src.floor()) as f32;
        let a = samples[idx];
        let b = samples[(idx + 1).min(last)];
        out.push(a + (b - a) * frac);
    }
    out
}

/// Root-mean-square level of a sample window.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
}
