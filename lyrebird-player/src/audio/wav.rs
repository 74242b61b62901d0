//! WAV export
//!
//! Writes captured segments as a standard uncompressed 16-bit PCM WAVE
//! container: 44-byte RIFF/WAVE/fmt/data header (little-endian fields)
//! followed by interleaved samples.
//!
//! Quantization follows the signed-PCM full-scale convention: each
//! sample is clamped to [-1, 1], negative samples scaled by 32768,
//! non-negative by 32767. Output is bit-exact for a given input.

use crate::audio::AudioSegment;
use crate::error::{Error, Result};

/// Serialize captured segments into a complete WAV file.
///
/// All segments must share the session's fixed sample rate and channel
/// count; the caller passes them explicitly since the capture log may
/// only be read as a snapshot.
pub fn write_wav(segments: &[AudioSegment], sample_rate: u32, channels: u16) -> Result<Vec<u8>> {
    if segments.is_empty() {
        return Err(Error::Export("no captured audio to export".to_string()));
    }

    let sample_count: usize = segments.iter().map(|s| s.samples.len()).sum();
    let data_len = sample_count
        .checked_mul(2)
        .ok_or_else(|| Error::Export("capture too large for WAV container".to_string()))?;
    let data_len = u32::try_from(data_len)
        .map_err(|_| Error::Export("capture exceeds 4 GiB WAV limit".to_string()))?;

    let byte_rate = sample_rate * channels as u32 * 2;
    let block_align = channels * 2;

    let mut out = Vec::with_capacity(44 + data_len as usize);

    // RIFF chunk
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");

    // fmt sub-chunk (PCM)
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&channels.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&16u16.to_le_bytes());

    // data sub-chunk
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());

    for segment in segments {
        for &s in &segment.samples {
            out.extend_from_slice(&quantize(s).to_le_bytes());
        }
    }

    Ok(out)
}

/// Quantize one normalized sample to i16 full scale.
fn quantize(sample: f32) -> i16 {
    let s = sample.clamp(-1.0, 1.0);
    if s < 0.0 {
        (s * 32768.0) as i16
    } else {
        (s * 32767.0) as i16
    }
}

/// Build an export file name from the active prompt texts.
///
/// Each prompt component is sanitized and truncated to 30 characters;
/// components are joined with underscores and suffixed with a
/// `YYYYMMDD_HHMMSS` timestamp. With no active prompts the name falls
/// back to `generated_audio_<timestamp>.wav`.
pub fn export_file_name(prompts: &[String], now: chrono::DateTime<chrono::Utc>) -> String {
    let stem: Vec<String> = prompts
        .iter()
        .map(|p| sanitize_component(p))
        .filter(|c| !c.is_empty())
        .collect();

    let timestamp = now.format("%Y%m%d_%H%M%S");

    if stem.is_empty() {
        format!("generated_audio_{}.wav", timestamp)
    } else {
        format!("{}_{}.wav", stem.join("_"), timestamp)
    }
}

/// Replace filesystem-hostile characters and truncate to 30 chars.
fn sanitize_component(text: &str) -> String {
    let cleaned: String = text
        .trim()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect();

    cleaned.chars().take(30).collect()
}
