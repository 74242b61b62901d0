//! Offline stub session
//!
//! Stands in for the remote generation service when no credentials or
//! network are available. Speaks the same command/message channels as a
//! real transport: `Connect` is acknowledged with a setup message and
//! `Play` starts a synthesized tone streamed in two second chunks at
//! slightly faster than realtime, the way a healthy remote stream
//! arrives.

use crate::audio::{codec, PLAYBACK_CHANNELS, PLAYBACK_SAMPLE_RATE};
use crate::session::{FilteredPrompt, SessionCommand, WireMessage};
use std::f32::consts::TAU;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Seconds of audio per synthesized chunk
const CHUNK_SECONDS: f32 = 2.0;

/// Inter-chunk pacing; shorter than the chunk itself so the jitter
/// buffer stays ahead
const CHUNK_INTERVAL: Duration = Duration::from_millis(1800);

/// Offline session backed by a tone generator.
pub struct StubSession {
    inbound: mpsc::Sender<WireMessage>,
    playing: Arc<AtomicBool>,
}

impl StubSession {
    pub fn new(inbound: mpsc::Sender<WireMessage>) -> Self {
        Self {
            inbound,
            playing: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Serve session commands until the command channel closes.
    pub async fn run(self, mut commands: mpsc::Receiver<SessionCommand>) {
        info!("stub session started");
        while let Some(command) = commands.recv().await {
            match command {
                SessionCommand::Connect => {
                    debug!("stub: connect");
                    self.send(WireMessage::setup_complete()).await;
                }
                SessionCommand::Play => {
                    if !self.playing.swap(true, Ordering::AcqRel) {
                        self.spawn_generator();
                    }
                }
                SessionCommand::Pause | SessionCommand::Stop => {
                    self.playing.store(false, Ordering::Release);
                }
                SessionCommand::ResetContext => {
                    debug!("stub: context reset");
                }
                SessionCommand::SetWeightedPrompts { prompts } => {
                    for prompt in prompts {
                        if prompt.text.trim().is_empty() {
                            self.send(WireMessage {
                                filtered_prompt: Some(FilteredPrompt {
                                    text: prompt.text,
                                    filtered_reason: "empty prompt".to_string(),
                                }),
                                ..Default::default()
                            })
                            .await;
                        }
                    }
                }
                SessionCommand::SetMusicGenerationConfig { config } => {
                    debug!("stub: config accepted: {:?}", config);
                }
            }
        }
        self.playing.store(false, Ordering::Release);
        info!("stub session stopped: command channel closed");
    }

    fn spawn_generator(&self) {
        let inbound = self.inbound.clone();
        let playing = Arc::clone(&self.playing);

        tokio::spawn(async move {
            let mut phase: f32 = 0.0;
            let mut ticker = tokio::time::interval(CHUNK_INTERVAL);
            while playing.load(Ordering::Acquire) {
                ticker.tick().await;
                if !playing.load(Ordering::Acquire) {
                    break;
                }

                let encoded = synthesize_chunk(&mut phase);
                if inbound.send(WireMessage::audio(encoded)).await.is_err() {
                    warn!("stub generator: inbound channel closed");
                    playing.store(false, Ordering::Release);
                }
            }
            debug!("stub generator stopped");
        });
    }

    async fn send(&self, message: WireMessage) {
        if self.inbound.send(message).await.is_err() {
            warn!("stub session: inbound channel closed");
        }
    }
}

/// Synthesize one interleaved stereo chunk of a quiet A3 tone,
/// phase-continuous across chunks.
fn synthesize_chunk(phase: &mut f32) -> String {
    let frames = (PLAYBACK_SAMPLE_RATE as f32 * CHUNK_SECONDS) as usize;
    let step = 220.0 * TAU / PLAYBACK_SAMPLE_RATE as f32;

    let mut samples = Vec::with_capacity(frames * PLAYBACK_CHANNELS as usize);
    for _ in 0..frames {
        let value = phase.sin() * 0.2;
        for _ in 0..PLAYBACK_CHANNELS {
            samples.push(value);
        }
        *phase = (*phase + step) % TAU;
    }

    codec::encode_samples(&samples)
}
