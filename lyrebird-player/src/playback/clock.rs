//! Playback clock abstraction
//!
//! The scheduler computes segment start times against the monotonic time
//! of the output device, not wall time. The device clock advances with
//! frames actually consumed by the audio callback, so scheduling stays
//! correct across callback jitter and stream suspension.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Monotonic time source of the audio output path, in seconds.
///
/// Read-only to the engine and scheduler.
pub trait PlaybackClock: Send + Sync {
    fn now(&self) -> f64;
}

/// Clock derived from frames consumed by the output callback.
#[derive(Clone)]
pub struct FrameClock {
    frames: Arc<AtomicU64>,
    sample_rate: u32,
}

impl FrameClock {
    pub fn new(frames: Arc<AtomicU64>, sample_rate: u32) -> Self {
        Self {
            frames,
            sample_rate,
        }
    }
}

impl PlaybackClock for FrameClock {
    fn now(&self) -> f64 {
        self.frames.load(Ordering::Acquire) as f64 / self.sample_rate as f64
    }
}

/// Manually advanced clock for scheduler and engine tests.
pub struct ManualClock {
    seconds: std::sync::Mutex<f64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            seconds: std::sync::Mutex::new(0.0),
        }
    }

    pub fn advance(&self, delta: f64) {
        *self.seconds.lock().unwrap() += delta;
    }

    pub fn set(&self, t: f64) {
        *self.seconds.lock().unwrap() = t;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackClock for ManualClock {
    fn now(&self) -> f64 {
        *self.seconds.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_clock_seconds() {
        let frames = Arc::new(AtomicU64::new(0));
        let clock = FrameClock::new(Arc::clone(&frames), 48_000);

        assert_eq!(clock.now(), 0.0);
        frames.store(24_000, Ordering::Release);
        assert_eq!(clock.now(), 0.5);
        frames.store(96_000, Ordering::Release);
        assert_eq!(clock.now(), 2.0);
    }

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new();
        assert_eq!(clock.now(), 0.0);
        clock.advance(1.25);
        assert_eq!(clock.now(), 1.25);
        clock.set(10.0);
        assert_eq!(clock.now(), 10.0);
    }
}
