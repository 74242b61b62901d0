//! Jitter buffer and gapless scheduler
//!
//! Converts the stream of arriving segments into gapless, correctly
//! timed playback. Network jitter is absorbed by a fixed lead applied to
//! the first segment of each play session; after that, every segment is
//! scheduled to begin exactly when the previous one ends.
//!
//! The schedule cursor (`next_start`) is owned exclusively by this type.
//! `0.0` means "nothing scheduled"; otherwise the cursor is monotonically
//! non-decreasing while the stream is active, and a cursor behind the
//! clock's current instant signals underrun.

use crate::audio::{AudioSegment, OutputSink};
use crate::error::Result;
use crate::playback::clock::PlaybackClock;
use std::sync::Arc;
use tracing::{debug, warn};

/// Result of offering one segment to the scheduler.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScheduleOutcome {
    /// First segment since the last reset: the jitter buffer is filling
    /// and playback becomes audible at `audible_at`.
    FirstScheduled { audible_at: f64 },

    /// Segment scheduled gaplessly at `start_at`.
    Scheduled { start_at: f64 },

    /// The cursor fell behind the clock: the output device consumed all
    /// buffered audio before this segment arrived. The late segment is
    /// dropped (drop-and-resync policy) and the cursor is reset so the
    /// next accepted segment starts a fresh lead.
    Underrun,
}

/// Jitter buffer and playback scheduler.
pub struct Scheduler {
    clock: Arc<dyn PlaybackClock>,
    sink: Box<dyn OutputSink>,

    /// Lead applied to the first segment of a play session (seconds)
    lead_seconds: f64,

    /// Schedule cursor: instant the next arriving segment should begin.
    /// 0.0 = nothing scheduled.
    next_start: f64,

    /// Instant audible playback began, for progress reporting
    started_at: Option<f64>,
}

impl Scheduler {
    pub fn new(clock: Arc<dyn PlaybackClock>, sink: Box<dyn OutputSink>, lead_seconds: f64) -> Self {
        Self {
            clock,
            sink,
            lead_seconds,
            next_start: 0.0,
            started_at: None,
        }
    }

    /// Offer a segment for playback.
    ///
    /// The caller (the engine) has already verified the state gate;
    /// this method only implements cursor arithmetic and delivery.
    pub fn accept(&mut self, segment: &AudioSegment) -> Result<ScheduleOutcome> {
        let now = self.clock.now();

        if self.next_start == 0.0 {
            // First segment since last reset: arm the jitter buffer.
            let start = now + self.lead_seconds;
            self.sink.submit(segment, start)?;
            self.next_start = start + segment.duration_seconds();
            self.started_at = Some(start);

            debug!(
                "first segment scheduled at {:.3}s (lead {:.1}s)",
                start, self.lead_seconds
            );
            return Ok(ScheduleOutcome::FirstScheduled { audible_at: start });
        }

        if self.next_start < now {
            // The scheduled slot is already in the past. Playing a late
            // segment would layer audio incorrectly, so drop and resync.
            warn!(
                "underrun: cursor {:.3}s behind clock {:.3}s",
                self.next_start, now
            );
            self.next_start = 0.0;
            self.started_at = None;
            return Ok(ScheduleOutcome::Underrun);
        }

        let start = self.next_start;
        self.sink.submit(segment, start)?;
        self.next_start = start + segment.duration_seconds();

        Ok(ScheduleOutcome::Scheduled { start_at: start })
    }

    /// Explicit reset (pause / stop / context reset).
    ///
    /// Clears the cursor and detaches queued-but-unplayed audio from the
    /// output. Anything already in flight may finish draining audibly but
    /// contributes no further state changes.
    pub fn reset(&mut self) {
        self.next_start = 0.0;
        self.started_at = None;
        self.sink.clear();
    }

    /// Elapsed audible playing time in seconds.
    ///
    /// Zero before the lead has elapsed and after any stop/reset/underrun.
    pub fn elapsed_seconds(&self) -> f64 {
        match self.started_at {
            Some(t) => (self.clock.now() - t).max(0.0),
            None => 0.0,
        }
    }

    /// Whether any segment is currently scheduled.
    pub fn is_scheduled(&self) -> bool {
        self.next_start != 0.0
    }

    /// Configured jitter buffer lead in seconds.
    pub fn lead_seconds(&self) -> f64 {
        self.lead_seconds
    }

    /// Mutable access to the output sink, for gain and stream control.
    pub fn sink_mut(&mut self) -> &mut dyn OutputSink {
        self.sink.as_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::clock::ManualClock;
    use std::sync::Mutex;

    /// Sink that records submissions for assertion.
    struct RecordingSink {
        submissions: Arc<Mutex<Vec<(f64, f64)>>>,
        clears: Arc<Mutex<usize>>,
    }

    impl RecordingSink {
        fn new() -> (Self, Arc<Mutex<Vec<(f64, f64)>>>, Arc<Mutex<usize>>) {
            let submissions = Arc::new(Mutex::new(Vec::new()));
            let clears = Arc::new(Mutex::new(0));
            (
                Self {
                    submissions: Arc::clone(&submissions),
                    clears: Arc::clone(&clears),
                },
                submissions,
                clears,
            )
        }
    }

    impl OutputSink for RecordingSink {
        fn submit(&mut self, segment: &AudioSegment, start_at: f64) -> Result<()> {
            self.submissions
                .lock()
                .unwrap()
                .push((start_at, segment.duration_seconds()));
            Ok(())
        }

        fn clear(&mut self) {
            *self.clears.lock().unwrap() += 1;
        }

        fn set_gain(&mut self, _target: f32, _ramp_seconds: f32) {}
        fn set_volume(&mut self, _volume: f32) {}
        fn resume(&mut self) -> Result<()> {
            Ok(())
        }
        fn suspend(&mut self) -> Result<()> {
            Ok(())
        }
    }

    fn one_second_segment() -> AudioSegment {
        AudioSegment::new(vec![0.0; 96_000], 2, 48_000)
    }

    fn setup(lead: f64) -> (Scheduler, Arc<ManualClock>, Arc<Mutex<Vec<(f64, f64)>>>) {
        let clock = Arc::new(ManualClock::new());
        let (sink, submissions, _) = RecordingSink::new();
        let scheduler = Scheduler::new(clock.clone(), Box::new(sink), lead);
        (scheduler, clock, submissions)
    }

    #[test]
    fn test_first_segment_arms_lead() {
        let (mut scheduler, clock, submissions) = setup(2.0);
        clock.set(5.0);

        let outcome = scheduler.accept(&one_second_segment()).unwrap();
        assert_eq!(
            outcome,
            ScheduleOutcome::FirstScheduled { audible_at: 7.0 }
        );
        assert_eq!(submissions.lock().unwrap()[0], (7.0, 1.0));
    }

    #[test]
    fn test_gapless_monotonic_scheduling() {
        let (mut scheduler, clock, submissions) = setup(2.0);

        for _ in 0..5 {
            scheduler.accept(&one_second_segment()).unwrap();
            // Clock advances slower than audio arrives; no underrun
            clock.advance(0.5);
        }

        let subs = submissions.lock().unwrap();
        assert_eq!(subs.len(), 5);
        // Each start is exactly the previous start plus its duration:
        // zero gap, zero overlap.
        for pair in subs.windows(2) {
            assert_eq!(pair[1].0, pair[0].0 + pair[0].1);
        }
    }

    #[test]
    fn test_underrun_drops_late_segment_and_resets() {
        let (mut scheduler, clock, submissions) = setup(2.0);

        scheduler.accept(&one_second_segment()).unwrap();
        // Device consumed past the cursor (first ends at 3.0)
        clock.set(4.0);

        let outcome = scheduler.accept(&one_second_segment()).unwrap();
        assert_eq!(outcome, ScheduleOutcome::Underrun);
        assert!(!scheduler.is_scheduled());
        assert_eq!(scheduler.elapsed_seconds(), 0.0);
        // The late segment was never submitted
        assert_eq!(submissions.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_recovery_after_underrun_uses_fresh_lead() {
        let (mut scheduler, clock, submissions) = setup(2.0);

        scheduler.accept(&one_second_segment()).unwrap();
        clock.set(10.0);
        assert_eq!(
            scheduler.accept(&one_second_segment()).unwrap(),
            ScheduleOutcome::Underrun
        );

        // Next accepted segment restarts buffering with a full lead
        let outcome = scheduler.accept(&one_second_segment()).unwrap();
        assert_eq!(
            outcome,
            ScheduleOutcome::FirstScheduled { audible_at: 12.0 }
        );
        assert_eq!(*submissions.lock().unwrap().last().unwrap(), (12.0, 1.0));
    }

    #[test]
    fn test_reset_clears_cursor_and_sink() {
        let clock = Arc::new(ManualClock::new());
        let (sink, _submissions, clears) = RecordingSink::new();
        let mut scheduler = Scheduler::new(clock.clone(), Box::new(sink), 2.0);

        scheduler.accept(&one_second_segment()).unwrap();
        assert!(scheduler.is_scheduled());

        scheduler.reset();
        assert!(!scheduler.is_scheduled());
        assert_eq!(scheduler.elapsed_seconds(), 0.0);
        assert_eq!(*clears.lock().unwrap(), 1);
    }

    #[test]
    fn test_elapsed_counts_from_audible_start() {
        let (mut scheduler, clock, _) = setup(2.0);

        scheduler.accept(&one_second_segment()).unwrap();
        // Still pre-buffering
        clock.set(1.0);
        assert_eq!(scheduler.elapsed_seconds(), 0.0);

        // 1.5s after the audible start at 2.0
        clock.set(3.5);
        assert!((scheduler.elapsed_seconds() - 1.5).abs() < 1e-9);
    }
}
