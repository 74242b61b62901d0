//! Core audio data types
//!
//! **Format:**
//! - Samples are f32 (floating point -1.0 to 1.0)
//! - Interleaved across channels: sample `i` belongs to channel
//!   `i % channels`
//! - Sample rate and channel count are fixed for the lifetime of a
//!   session

/// Sample rate of audio arriving from the generation session (Hz)
pub const PLAYBACK_SAMPLE_RATE: u32 = 48_000;

/// Channel count of audio arriving from the generation session
pub const PLAYBACK_CHANNELS: u16 = 2;

/// One decoded, ready-to-play unit of audio derived from a single
/// inbound network chunk.
///
/// Owned exclusively by the scheduler from creation until its scheduled
/// playback completes, then either discarded or retained in the capture
/// log while recording is active.
#[derive(Debug, Clone)]
pub struct AudioSegment {
    /// PCM audio samples, interleaved across channels
    pub samples: Vec<f32>,

    /// Channel count (2 for session playback audio)
    pub channels: u16,

    /// Sample rate in Hz (48000 for session playback audio)
    pub sample_rate: u32,
}

impl AudioSegment {
    /// Create a new segment from decoded samples
    pub fn new(samples: Vec<f32>, channels: u16, sample_rate: u32) -> Self {
        Self {
            samples,
            channels,
            sample_rate,
        }
    }

    /// Number of frames (one sample per channel)
    pub fn frame_count(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }

    /// Duration in seconds (frame count / sample rate)
    pub fn duration_seconds(&self) -> f64 {
        self.frame_count() as f64 / self.sample_rate as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_frame_count() {
        let seg = AudioSegment::new(vec![0.0; 96_000], 2, 48_000);
        assert_eq!(seg.frame_count(), 48_000);
    }

    #[test]
    fn test_segment_duration() {
        // 48000 stereo frames = 1 second at 48kHz
        let seg = AudioSegment::new(vec![0.0; 96_000], 2, 48_000);
        assert_eq!(seg.duration_seconds(), 1.0);

        let seg = AudioSegment::new(vec![0.0; 24_000], 1, 48_000);
        assert_eq!(seg.duration_seconds(), 0.5);
    }
}
