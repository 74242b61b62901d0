//! Inbound message router
//!
//! Demultiplexes messages from the session transport into engine calls.
//! Each message carries exactly one meaningful field; checks are
//! mutually exclusive so one message produces at most one action.

use crate::audio::{codec, PLAYBACK_CHANNELS, PLAYBACK_SAMPLE_RATE};
use crate::playback::PlayerEngine;
use crate::session::WireMessage;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Routes inbound wire messages to the playback engine.
pub struct MessageRouter {
    engine: Arc<PlayerEngine>,
}

impl MessageRouter {
    pub fn new(engine: Arc<PlayerEngine>) -> Self {
        Self { engine }
    }

    /// Consume the inbound message stream until the transport drops it.
    pub async fn run(self, mut inbound: mpsc::Receiver<WireMessage>) {
        info!("message router started");
        while let Some(message) = inbound.recv().await {
            self.route(message);
        }
        info!("message router stopped: inbound channel closed");
    }

    /// Dispatch one message.
    pub fn route(&self, message: WireMessage) {
        if message.setup_complete.is_some() {
            self.engine.on_setup_complete();
        } else if let Some(filtered) = message.filtered_prompt {
            self.engine
                .on_prompt_filtered(filtered.text, filtered.filtered_reason);
        } else if let Some(content) = message.server_content {
            self.route_audio(content.audio_chunks);
        } else if let Some(error) = message.error {
            self.engine.on_transport_error(error.to_string());
        } else if let Some(close) = message.close {
            self.engine.on_transport_error(format!("closed: {}", close));
        } else {
            // Unrecognized shapes are ignored so protocol additions
            // don't break older clients, but loudly: a steady stream of
            // these means the transport and client disagree.
            warn!("ignoring unrecognized session message");
        }
    }

    fn route_audio(&self, chunks: Vec<crate::session::AudioChunk>) {
        // Messages carry a single meaningful chunk; anything beyond the
        // first is ignored.
        let Some(chunk) = chunks.into_iter().next() else {
            debug!("audio message with no chunks");
            return;
        };

        match codec::decode_segment(&chunk.data, PLAYBACK_SAMPLE_RATE, PLAYBACK_CHANNELS) {
            Ok(segment) => self.engine.handle_segment(segment),
            Err(e) => {
                warn!("audio chunk decode failed: {}", e);
                self.engine.on_decode_error(e.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{AudioSegment, OutputSink};
    use crate::error::Result;
    use crate::playback::{EngineConfig, ManualClock, PlayerEngine};
    use crate::session::SessionCommand;
    use lyrebird_common::{EventBus, PlaybackState, PlayerEvent};
    use std::sync::Mutex;
    use tokio::sync::broadcast;

    struct RecordingSink {
        submissions: Arc<Mutex<Vec<f64>>>,
    }

    impl OutputSink for RecordingSink {
        fn submit(&mut self, _segment: &AudioSegment, start_at: f64) -> Result<()> {
            self.submissions.lock().unwrap().push(start_at);
            Ok(())
        }

        fn clear(&mut self) {}
        fn set_gain(&mut self, _target: f32, _ramp_seconds: f32) {}
        fn set_volume(&mut self, _volume: f32) {}

        fn resume(&mut self) -> Result<()> {
            Ok(())
        }

        fn suspend(&mut self) -> Result<()> {
            Ok(())
        }
    }

    struct Harness {
        router: MessageRouter,
        engine: Arc<PlayerEngine>,
        events: broadcast::Receiver<PlayerEvent>,
        submissions: Arc<Mutex<Vec<f64>>>,
        // Keeps the command channel open so engine sends don't fail.
        _commands: mpsc::Receiver<SessionCommand>,
    }

    fn build() -> Harness {
        let submissions = Arc::new(Mutex::new(Vec::new()));
        let sink = RecordingSink {
            submissions: Arc::clone(&submissions),
        };

        let (command_tx, commands) = mpsc::channel(64);
        let bus = Arc::new(EventBus::new(64));
        let events = bus.subscribe();

        let engine = Arc::new(PlayerEngine::new(
            Arc::new(ManualClock::new()),
            Box::new(sink),
            command_tx,
            bus,
            EngineConfig {
                buffer_lead_seconds: 2.0,
                coalesce_window_ms: 200,
            },
        ));

        Harness {
            router: MessageRouter::new(Arc::clone(&engine)),
            engine,
            events,
            submissions,
            _commands: commands,
        }
    }

    fn drain_events(rx: &mut broadcast::Receiver<PlayerEvent>) -> Vec<PlayerEvent> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(event);
        }
        out
    }

    /// Handshake then play, so the engine accepts audio.
    fn bring_up(h: &Harness) {
        h.router.route(WireMessage::setup_complete());
        h.engine.play().unwrap();
        assert_eq!(h.engine.state(), PlaybackState::Loading);
    }

    #[tokio::test(start_paused = true)]
    async fn undecodable_chunk_reports_and_playback_continues() {
        let mut h = build();
        bring_up(&h);

        h.router.route(WireMessage::audio("not base64!!!"));

        // Chunk dropped without touching playback state
        assert!(h.submissions.lock().unwrap().is_empty());
        assert_eq!(h.engine.state(), PlaybackState::Loading);
        assert_eq!(h.engine.capture_len(), 0);

        let events = drain_events(&mut h.events);
        assert!(events
            .iter()
            .any(|e| matches!(e, PlayerEvent::SegmentDecodeFailed { .. })));

        // The next well-formed chunk schedules normally
        h.router
            .route(WireMessage::audio(codec::encode_samples(&[0.1, -0.1])));
        assert_eq!(h.submissions.lock().unwrap().as_slice(), &[2.0]);
        assert_eq!(h.engine.capture_len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn error_message_forces_stop() {
        let mut h = build();
        bring_up(&h);

        h.router.route(WireMessage {
            error: Some(serde_json::json!({"code": 13, "message": "backend unavailable"})),
            ..Default::default()
        });

        assert_eq!(h.engine.state(), PlaybackState::Stopped);
        assert!(h.engine.is_connection_broken());
        let events = drain_events(&mut h.events);
        assert!(events
            .iter()
            .any(|e| matches!(e, PlayerEvent::ConnectionLost { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn close_message_forces_stop() {
        let h = build();
        bring_up(&h);

        h.router.route(WireMessage {
            close: Some(serde_json::json!("going away")),
            ..Default::default()
        });

        assert_eq!(h.engine.state(), PlaybackState::Stopped);
        assert!(h.engine.is_connection_broken());
    }

    #[tokio::test(start_paused = true)]
    async fn filtered_prompt_is_recorded() {
        let h = build();

        h.router.route(WireMessage {
            filtered_prompt: Some(crate::session::FilteredPrompt {
                text: "harsh noise".to_string(),
                filtered_reason: "policy".to_string(),
            }),
            ..Default::default()
        });

        assert_eq!(h.engine.filtered_prompts(), vec!["harsh noise"]);
    }

    #[tokio::test(start_paused = true)]
    async fn unrecognized_message_is_ignored() {
        let h = build();
        bring_up(&h);

        h.router.route(WireMessage::default());

        assert_eq!(h.engine.state(), PlaybackState::Loading);
        assert!(h.submissions.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn audio_ignored_before_playback_starts() {
        let h = build();
        h.router.route(WireMessage::setup_complete());

        h.router
            .route(WireMessage::audio(codec::encode_samples(&[0.1, -0.1])));

        assert_eq!(h.engine.state(), PlaybackState::Stopped);
        assert!(h.submissions.lock().unwrap().is_empty());
    }
}
