//! Lyrebird player
//!
//! Interactive client for a realtime generative music stream: decodes
//! base64 PCM segments, schedules them gaplessly behind a jitter buffer,
//! drives the audio device, and exposes an HTTP control surface with an
//! SSE event stream.
//!
//! Crate layout:
//! - `audio`: wire codec, segment types, WAV export, cpal output
//! - `playback`: engine state machine, scheduler, playback clock
//! - `session`: command/message types, inbound router, offline stub
//! - `storage`: preset persistence
//! - `api`: axum control surface

pub mod api;
pub mod audio;
pub mod error;
pub mod playback;
pub mod session;
pub mod storage;

pub use error::{Error, Result};
pub use playback::{EngineConfig, PlayerEngine};
