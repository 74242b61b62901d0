//! Event types and EventBus for the Lyrebird player
//!
//! Hybrid communication model:
//! - **EventBus** (tokio::broadcast): one-to-many event broadcasting
//! - **Command channels** (tokio::mpsc): request → single handler
//!
//! All player-wide events use the central `PlayerEvent` enum so that
//! subscribers (SSE clients, capture log, tests) can match exhaustively.
//! Events are serializable for SSE transmission.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Playback lifecycle state
///
/// `Loading` covers both the initial jitter-buffer fill before the first
/// audible sample and recovery after an underrun.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Stopped,
    Loading,
    Playing,
    Paused,
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackState::Stopped => write!(f, "stopped"),
            PlaybackState::Loading => write!(f, "loading"),
            PlaybackState::Playing => write!(f, "playing"),
            PlaybackState::Paused => write!(f, "paused"),
        }
    }
}

/// Lyrebird event types
///
/// Broadcast via EventBus and serialized for the SSE stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PlayerEvent {
    /// Playback state changed
    ///
    /// Triggers:
    /// - SSE: update transport controls
    PlaybackStateChanged {
        /// State before change
        old_state: PlaybackState,
        /// State after change
        new_state: PlaybackState,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// First segment of a play session scheduled; jitter buffer filling
    ///
    /// Playback becomes audible `lead_seconds` after this event.
    BufferingStarted {
        /// Configured jitter buffer lead in seconds
        lead_seconds: f64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Playback outran arriving audio; buffering restarts
    ///
    /// Recoverable. The late segment is dropped and the next accepted
    /// segment begins a fresh lead.
    Underrun {
        /// Elapsed playing time when the underrun was detected
        elapsed_seconds: f64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Playback progress update (emitted periodically while playing)
    PlaybackProgress {
        elapsed_seconds: f64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Remote session rejected a prompt
    ///
    /// Triggers:
    /// - SSE: show user-visible notice, mark the prompt in the UI
    PromptFiltered {
        /// Rejected prompt text
        text: String,
        /// Reason reported by the session
        reason: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Session handshake acknowledged; connection usable
    SetupComplete {
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Transport error or close; playback force-stopped
    ///
    /// Retryable: the next play request must reconnect first.
    ConnectionLost {
        /// Transport error detail
        message: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Inbound audio chunk failed to decode and was dropped
    ///
    /// Not fatal; playback continues with the next segment.
    SegmentDecodeFailed {
        message: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Volume changed
    VolumeChanged {
        /// Previous volume (0.0-1.0)
        old_volume: f32,
        /// New volume (0.0-1.0)
        new_volume: f32,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Captured audio exported as a WAV file
    RecordingExported {
        file_name: String,
        byte_count: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl PlayerEvent {
    /// Get event type as string for SSE event naming and filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            PlayerEvent::PlaybackStateChanged { .. } => "PlaybackStateChanged",
            PlayerEvent::BufferingStarted { .. } => "BufferingStarted",
            PlayerEvent::Underrun { .. } => "Underrun",
            PlayerEvent::PlaybackProgress { .. } => "PlaybackProgress",
            PlayerEvent::PromptFiltered { .. } => "PromptFiltered",
            PlayerEvent::SetupComplete { .. } => "SetupComplete",
            PlayerEvent::ConnectionLost { .. } => "ConnectionLost",
            PlayerEvent::SegmentDecodeFailed { .. } => "SegmentDecodeFailed",
            PlayerEvent::VolumeChanged { .. } => "VolumeChanged",
            PlayerEvent::RecordingExported { .. } => "RecordingExported",
        }
    }
}

/// Central event distribution bus
///
/// Wraps tokio::broadcast:
/// - non-blocking publish (slow subscribers don't block producers)
/// - multiple concurrent subscribers
/// - automatic cleanup when subscribers drop
pub struct EventBus {
    tx: broadcast::Sender<PlayerEvent>,
    capacity: usize,
}

impl EventBus {
    /// Create a new EventBus with the given channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: PlayerEvent,
    ) -> std::result::Result<usize, broadcast::error::SendError<PlayerEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring the absence of subscribers
    ///
    /// Used for non-critical events (progress updates) where it is
    /// acceptable if no component is currently listening.
    pub fn emit_lossy(&self, event: PlayerEvent) {
        let _ = self.tx.send(event);
    }

    /// Current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            capacity: self.capacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_eventbus_new() {
        let bus = EventBus::new(100);
        assert_eq!(bus.capacity(), 100);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_eventbus_subscribe() {
        let bus = EventBus::new(100);
        let _rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        let _rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[test]
    fn test_eventbus_emit_no_subscribers() {
        let bus = EventBus::new(100);
        let event = PlayerEvent::PlaybackStateChanged {
            old_state: PlaybackState::Stopped,
            new_state: PlaybackState::Loading,
            timestamp: chrono::Utc::now(),
        };

        // Should return error when no subscribers
        assert!(bus.emit(event).is_err());
    }

    #[tokio::test]
    async fn test_eventbus_emit_with_subscriber() {
        let bus = Arc::new(EventBus::new(100));
        let mut rx = bus.subscribe();

        let event = PlayerEvent::PlaybackStateChanged {
            old_state: PlaybackState::Loading,
            new_state: PlaybackState::Playing,
            timestamp: chrono::Utc::now(),
        };

        assert!(bus.emit(event).is_ok());

        let received = rx.recv().await.unwrap();
        match received {
            PlayerEvent::PlaybackStateChanged {
                old_state,
                new_state,
                ..
            } => {
                assert_eq!(old_state, PlaybackState::Loading);
                assert_eq!(new_state, PlaybackState::Playing);
            }
            _ => panic!("Wrong event type received"),
        }
    }

    #[test]
    fn test_eventbus_emit_lossy() {
        let bus = EventBus::new(2); // Small capacity
        let mut _rx = bus.subscribe(); // Subscribe but don't receive

        // Fill past capacity; should not panic
        for i in 0..10 {
            bus.emit_lossy(PlayerEvent::PlaybackProgress {
                elapsed_seconds: i as f64,
                timestamp: chrono::Utc::now(),
            });
        }
    }

    #[test]
    fn test_event_serialization_tagged() {
        let event = PlayerEvent::PromptFiltered {
            text: "ambient drone".to_string(),
            reason: "policy".to_string(),
            timestamp: chrono::Utc::now(),
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"PromptFiltered\""));
        assert!(json.contains("\"text\":\"ambient drone\""));

        let back: PlayerEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.event_type(), "PromptFiltered");
    }

    #[test]
    fn test_playback_state_display() {
        assert_eq!(PlaybackState::Stopped.to_string(), "stopped");
        assert_eq!(PlaybackState::Loading.to_string(), "loading");
        assert_eq!(PlaybackState::Playing.to_string(), "playing");
        assert_eq!(PlaybackState::Paused.to_string(), "paused");
    }

    #[test]
    fn test_event_type_method() {
        let events = vec![
            (
                PlayerEvent::BufferingStarted {
                    lead_seconds: 2.0,
                    timestamp: chrono::Utc::now(),
                },
                "BufferingStarted",
            ),
            (
                PlayerEvent::Underrun {
                    elapsed_seconds: 12.5,
                    timestamp: chrono::Utc::now(),
                },
                "Underrun",
            ),
            (
                PlayerEvent::ConnectionLost {
                    message: "socket closed".to_string(),
                    timestamp: chrono::Utc::now(),
                },
                "ConnectionLost",
            ),
        ];

        for (event, expected_type) in events {
            assert_eq!(event.event_type(), expected_type);
        }
    }
}
