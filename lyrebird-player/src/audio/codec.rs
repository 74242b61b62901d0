//! PCM wire codec
//!
//! Stateless conversion between normalized f32 samples and the session's
//! wire representation: 16-bit signed little-endian PCM, base64-encoded.
//!
//! All operations are pure. Malformed input (bad base64, odd byte count,
//! sample count not divisible by the channel count) fails fast with a
//! decode error rather than silently truncating.

use crate::audio::AudioSegment;
use crate::error::{Error, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

/// Encode normalized samples into the wire representation.
///
/// Maps each sample in [-1.0, 1.0] linearly into the i16 range. Clamping
/// is the caller's responsibility: out-of-range input saturates at the
/// integer bounds and must be avoided upstream.
pub fn encode_samples(samples: &[f32]) -> String {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &s in samples {
        let v = (s * 32768.0) as i16;
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    BASE64.encode(bytes)
}

/// Decode a wire chunk into normalized samples.
///
/// Inverse of [`encode_samples`]: each i16 is divided by 32768.0.
pub fn decode_samples(chunk: &str) -> Result<Vec<f32>> {
    let bytes = BASE64
        .decode(chunk)
        .map_err(|e| Error::Decode(format!("invalid base64: {}", e)))?;

    if bytes.len() % 2 != 0 {
        return Err(Error::Decode(format!(
            "odd byte count {} in PCM chunk",
            bytes.len()
        )));
    }

    let samples = bytes
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]) as f32 / 32768.0)
        .collect();

    Ok(samples)
}

/// Decode a wire chunk into a playable segment.
///
/// Samples stay interleaved; sample `i` belongs to channel
/// `i % channels`. A reported channel count of zero is treated as mono.
pub fn decode_segment(chunk: &str, sample_rate: u32, channels: u16) -> Result<AudioSegment> {
    let channels = if channels == 0 { 1 } else { channels };
    let samples = decode_samples(chunk)?;

    if samples.len() % channels as usize != 0 {
        return Err(Error::Decode(format!(
            "{} samples not divisible by {} channels",
            samples.len(),
            channels
        )));
    }

    if samples.is_empty() {
        return Err(Error::Decode("empty PCM chunk".to_string()));
    }

    Ok(AudioSegment::new(samples, channels, sample_rate))
}
