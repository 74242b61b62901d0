//! Shared playback state
//!
//! Single authoritative copy of the playback state, owned by the engine
//! and mutated only through it. Other components (router, API handlers)
//! read it or request transitions through engine calls; they never reach
//! into the owner's state directly.

use lyrebird_common::PlaybackState;
use std::sync::{Arc, RwLock};

/// Shared handle to the playback state and connection health.
#[derive(Debug, Clone)]
pub struct SharedPlaybackState {
    inner: Arc<RwLock<StateInner>>,
}

#[derive(Debug)]
struct StateInner {
    state: PlaybackState,
    /// Set on transport error/close; cleared by setup acknowledgement.
    /// While broken, play requests must reconnect first.
    connection_broken: bool,
}

impl SharedPlaybackState {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(StateInner {
                state: PlaybackState::Stopped,
                // Broken until the session acknowledges setup
                connection_broken: true,
            })),
        }
    }

    pub fn get(&self) -> PlaybackState {
        self.inner.read().unwrap().state
    }

    pub fn set(&self, state: PlaybackState) {
        self.inner.write().unwrap().state = state;
    }

    pub fn is_connection_broken(&self) -> bool {
        self.inner.read().unwrap().connection_broken
    }

    pub fn set_connection_broken(&self, broken: bool) {
        self.inner.write().unwrap().connection_broken = broken;
    }

    /// Whether inbound segments may be scheduled and captured.
    pub fn is_accepting(&self) -> bool {
        matches!(
            self.get(),
            PlaybackState::Playing | PlaybackState::Loading
        )
    }
}

impl Default for SharedPlaybackState {
    fn default() -> Self {
        Self::new()
    }
}
