//! Audio subsystem: wire codec, segment types, WAV export, device output

pub mod codec;
pub mod output;
pub mod types;
pub mod wav;

pub use output::CpalSink;
pub use types::{AudioSegment, PLAYBACK_CHANNELS, PLAYBACK_SAMPLE_RATE};

use crate::error::Result;

/// Output sink seam between the scheduler and the audio device.
///
/// The production implementation is [`output::CpalSink`]; tests drive
/// the scheduler against an in-memory sink. Submissions are start-time
/// addressed so the sink, not the scheduler, owns sample-level delivery.
pub trait OutputSink: Send {
    /// Queue a segment to begin exactly at `start_at` seconds on the
    /// playback clock. Start times arrive in non-decreasing order.
    fn submit(&mut self, segment: &AudioSegment, start_at: f64) -> Result<()>;

    /// Drop any queued-but-unplayed audio, producing a fresh silent
    /// output path.
    fn clear(&mut self);

    /// Ramp gain toward `target` over `ramp_seconds` (0.0 = immediate).
    fn set_gain(&mut self, target: f32, ramp_seconds: f32);

    /// Set master volume (0.0-1.0, clamped by the implementation).
    fn set_volume(&mut self, volume: f32);

    /// Resume the output device stream.
    fn resume(&mut self) -> Result<()>;

    /// Suspend the output device stream.
    fn suspend(&mut self) -> Result<()>;
}
