//! Fixed-duration chunk framing for the capture stream.
//!
//! The backend expects microphone audio as uniform chunks of base64 PCM16
//! little-endian. The assembler buffers ragged capture reads and emits only
//! complete frames, carrying the remainder into the next push.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::audio::wav::sample_to_i16;
use crate::error::Result;

/// Reframes arbitrary-length sample batches into fixed-size chunks.
pub struct ChunkAssembler {
    frame_len: usize,
    pending: Vec<f32>,
}

impl ChunkAssembler {
    /// Assembler for `chunk_ms` worth of samples at `sample_rate`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn new(sample_rate: u32, chunk_ms: u64) -> Self {
        let frame_len = (u64::from(sample_rate) * chunk_ms / 1000).max(1) as usize;
        Self {
            frame_len,
            pending: Vec::new(),
        }
    }

    /// Samples per emitted chunk.
    #[must_use]
    pub const fn frame_len(&self) -> usize {
        self.frame_len
    }

    /// Feed captured samples, returning every complete frame now available.
    pub fn push(&mut self, samples: &[f32]) -> Vec<Vec<f32>> {
        self.pending.extend_from_slice(samples);

        let mut frames = Vec::new();
        while self.pending.len() >= self.frame_len {
            let rest = self.pending.split_off(self.frame_len);
            frames.push(std::mem::replace(&mut self.pending, rest));
        }
        frames
    }

    /// Drain any trailing partial frame. Used on capture teardown.
    pub fn flush(&mut self) -> Option<Vec<f32>> {
        if self.pending.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.pending))
        }
    }
}

/// Encode one chunk as base64 PCM16 little-endian.
#[must_use]
pub fn encode_chunk(samples: &[f32]) -> String {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        bytes.extend_from_slice(&sample_to_i16(sample).to_le_bytes());
    }
    BASE64.encode(bytes)
}

/// Decode a base64 PCM16 chunk back to normalized samples.
///
/// # Errors
///
/// Returns error if the payload is not valid base64 or has an odd byte count
pub fn decode_chunk(data: &str) -> Result<Vec<f32>> {
    let bytes = BASE64.decode(data)?;
    if bytes.len() % 2 != 0 {
        return Err(crate::error::Error::Audio(
            "pcm16 chunk has odd byte count".to_string(),
        ));
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|pair| f32::from(i16::from_le_bytes([pair[0], pair[1]])) / 32768.0)
        .collect())
}
