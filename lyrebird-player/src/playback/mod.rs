//! Playback pipeline
//!
//! `engine` owns the lifecycle state machine, `scheduler` the jitter
//! buffer and gapless timing, `clock` the device time source, `state`
//! the shared state handle.

pub mod clock;
pub mod engine;
pub mod scheduler;
pub mod state;

pub use clock::{FrameClock, ManualClock, PlaybackClock};
pub use engine::{EngineConfig, PlayerEngine};
pub use scheduler::{ScheduleOutcome, Scheduler};
pub use state::SharedPlaybackState;
