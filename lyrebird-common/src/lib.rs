//! # Lyrebird Common Library
//!
//! Shared code for the Lyrebird streaming music player:
//! - Event types (PlayerEvent enum) and EventBus
//! - Playback state enum
//! - Configuration loading
//! - Common error types

pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
pub use events::{EventBus, PlaybackState, PlayerEvent};
