//! Playback engine
//!
//! Authoritative owner of the `stopped → loading → playing → paused`
//! lifecycle. Gates whether incoming segments are scheduled or discarded,
//! drives the scheduler, maintains the capture log, and keeps the remote
//! session's `Play`/`Pause`/`Stop` calls in lockstep with its own
//! transitions.
//!
//! All mutable playback state lives behind this type; the router and API
//! handlers only call methods. Session commands go out over a tokio mpsc
//! channel with `try_send` so no engine method blocks.

use crate::audio::{wav, AudioSegment, OutputSink, PLAYBACK_CHANNELS, PLAYBACK_SAMPLE_RATE};
use crate::error::{Error, Result};
use crate::playback::clock::PlaybackClock;
use crate::playback::scheduler::{ScheduleOutcome, Scheduler};
use crate::playback::state::SharedPlaybackState;
use crate::session::{GenerationConfig, SessionCommand, WeightedPrompt};
use lyrebird_common::{EventBus, PlaybackState, PlayerEvent};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Gain ramp applied on play/pause/stop transitions
const GAIN_RAMP_SECONDS: f32 = 0.1;

/// Engine tuning knobs, sourced from [`lyrebird_common::config::Settings`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Jitter buffer lead for the first segment of a play session
    pub buffer_lead_seconds: f64,
    /// Window within which reconfiguration requests coalesce
    pub coalesce_window_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            buffer_lead_seconds: 2.0,
            coalesce_window_ms: 200,
        }
    }
}

/// State behind the engine's single lock. Critical sections are short
/// and never await. Transitions that close the segment gate (pause,
/// stop, transport error) are published while this lock is held; lock
/// order is core, then state.
struct EngineCore {
    scheduler: Scheduler,

    /// Segments collected while playing/loading, for WAV export.
    /// Append-only during playback; export takes a synchronous snapshot.
    capture: Vec<AudioSegment>,

    /// Prompt texts the session has rejected
    filtered_prompts: HashSet<String>,

    /// Last submitted prompts, for export file naming
    prompts: Vec<WeightedPrompt>,

    /// Coalescer payload: only the latest request within the window
    /// survives to submission
    pending_prompts: Option<Vec<WeightedPrompt>>,
    pending_config: Option<GenerationConfig>,
    coalesce_armed: bool,
}

/// Streaming playback engine.
pub struct PlayerEngine {
    state: SharedPlaybackState,
    events: Arc<EventBus>,
    commands: mpsc::Sender<SessionCommand>,
    core: Mutex<EngineCore>,

    /// Bumped on every play/pause/stop/reset/underrun; invalidates
    /// deferred loading→playing timers armed under an older epoch.
    epoch: AtomicU64,

    coalesce_window: Duration,
    volume: Mutex<f32>,
}

impl PlayerEngine {
    pub fn new(
        clock: Arc<dyn PlaybackClock>,
        sink: Box<dyn OutputSink>,
        commands: mpsc::Sender<SessionCommand>,
        events: Arc<EventBus>,
        config: EngineConfig,
    ) -> Self {
        Self {
            state: SharedPlaybackState::new(),
            events,
            commands,
            core: Mutex::new(EngineCore {
                scheduler: Scheduler::new(clock, sink, config.buffer_lead_seconds),
                capture: Vec::new(),
                filtered_prompts: HashSet::new(),
                prompts: Vec::new(),
                pending_prompts: None,
                pending_config: None,
                coalesce_armed: false,
            }),
            epoch: AtomicU64::new(0),
            coalesce_window: Duration::from_millis(config.coalesce_window_ms),
            volume: Mutex::new(1.0),
        }
    }

    // ========================================
    // Transport controls
    // ========================================

    /// Request session connection establishment.
    pub fn connect(&self) -> Result<()> {
        self.send_command(SessionCommand::Connect)
    }

    /// Play request: `stopped/paused → loading`.
    ///
    /// While the connection is broken a reconnect is issued and a
    /// retryable transport error is returned; play succeeds once the
    /// session acknowledges setup.
    pub fn play(&self) -> Result<()> {
        match self.state.get() {
            PlaybackState::Playing | PlaybackState::Loading => return Ok(()),
            _ => {}
        }

        if self.state.is_connection_broken() {
            self.send_command(SessionCommand::Connect)?;
            return Err(Error::Transport(
                "session connection is down; reconnecting, retry play after setup completes"
                    .to_string(),
            ));
        }

        self.bump_epoch();
        {
            let mut core = self.core.lock().unwrap();
            core.scheduler.sink_mut().resume()?;
            core.scheduler.sink_mut().set_gain(1.0, GAIN_RAMP_SECONDS);
        }

        self.send_command(SessionCommand::Play)?;
        self.transition(PlaybackState::Loading);
        Ok(())
    }

    /// Pause request: `any → paused`.
    ///
    /// Ramps gain down, resets the schedule cursor and detaches queued
    /// audio so the output path is silent and fresh for the next play.
    pub fn pause(&self) -> Result<()> {
        if self.state.get() == PlaybackState::Paused {
            return Ok(());
        }

        self.bump_epoch();
        {
            let mut core = self.core.lock().unwrap();
            core.scheduler.sink_mut().set_gain(0.0, GAIN_RAMP_SECONDS);
            core.scheduler.reset();
            // Published under the core lock so the segment gate cannot
            // schedule against the reset cursor with a stale verdict
            self.transition(PlaybackState::Paused);
        }

        self.send_command(SessionCommand::Pause)?;
        Ok(())
    }

    /// Stop request: `any → stopped`.
    ///
    /// Clears scheduling state, elapsed time and the capture log. Gain
    /// stays ramped down until the next play ramps it back up. Stops
    /// locally even if the session command cannot be delivered.
    pub fn stop(&self) -> Result<()> {
        self.bump_epoch();
        {
            let mut core = self.core.lock().unwrap();
            core.scheduler.sink_mut().set_gain(0.0, GAIN_RAMP_SECONDS);
            core.scheduler.reset();
            core.capture.clear();
            if let Err(e) = core.scheduler.sink_mut().suspend() {
                warn!("failed to suspend output on stop: {}", e);
            }
            self.transition(PlaybackState::Stopped);
        }

        if let Err(e) = self.send_command(SessionCommand::Stop) {
            warn!("stop command not delivered: {}", e);
        }
        Ok(())
    }

    /// Reset the generation context without stopping the session.
    ///
    /// Discards all scheduling state and captured audio; a playing
    /// stream drops back to `loading` until fresh audio buffers up.
    pub fn reset_context(&self) -> Result<()> {
        self.bump_epoch();
        {
            let mut core = self.core.lock().unwrap();
            core.scheduler.reset();
            core.capture.clear();
        }

        self.send_command(SessionCommand::ResetContext)?;
        if self.state.get() == PlaybackState::Playing {
            self.transition(PlaybackState::Loading);
        }
        Ok(())
    }

    // ========================================
    // Inbound (router-facing) handlers
    // ========================================

    /// Accept a decoded segment, subject to the state gate.
    ///
    /// Segments arriving while paused/stopped are dropped here: decoded
    /// upstream to keep codec handling uniform, but never scheduled and
    /// never captured.
    pub fn handle_segment(self: &Arc<Self>, segment: AudioSegment) {
        let (outcome, elapsed_before, lead) = {
            let mut core = self.core.lock().unwrap();
            // Gate check and scheduling share one critical section.
            // Pause/stop publish their transition while holding the same
            // lock, so the verdict cannot go stale before scheduling.
            // Lock order is core, then state.
            if !self.state.is_accepting() {
                debug!(
                    "segment dropped: state {} does not accept audio",
                    self.state.get()
                );
                return;
            }
            let elapsed = core.scheduler.elapsed_seconds();
            let lead = core.scheduler.lead_seconds();
            let outcome = match core.scheduler.accept(&segment) {
                Ok(o) => o,
                Err(e) => {
                    warn!("failed to schedule segment: {}", e);
                    return;
                }
            };
            if matches!(
                outcome,
                ScheduleOutcome::FirstScheduled { .. } | ScheduleOutcome::Scheduled { .. }
            ) {
                core.capture.push(segment);
            }
            (outcome, elapsed, lead)
        };

        match outcome {
            ScheduleOutcome::FirstScheduled { .. } => {
                self.events.emit_lossy(PlayerEvent::BufferingStarted {
                    lead_seconds: lead,
                    timestamp: chrono::Utc::now(),
                });
                self.arm_buffering_timer(lead);
            }
            ScheduleOutcome::Scheduled { .. } => {}
            ScheduleOutcome::Underrun => {
                self.bump_epoch();
                self.events.emit_lossy(PlayerEvent::Underrun {
                    elapsed_seconds: elapsed_before,
                    timestamp: chrono::Utc::now(),
                });
                self.transition(PlaybackState::Loading);
            }
        }
    }

    /// Session handshake acknowledged; connection usable again.
    pub fn on_setup_complete(&self) {
        info!("session setup complete");
        self.state.set_connection_broken(false);
        self.events.emit_lossy(PlayerEvent::SetupComplete {
            timestamp: chrono::Utc::now(),
        });
    }

    /// Session rejected a prompt.
    pub fn on_prompt_filtered(&self, text: String, reason: String) {
        warn!("prompt filtered: {:?} ({})", text, reason);
        {
            let mut core = self.core.lock().unwrap();
            core.filtered_prompts.insert(text.clone());
        }
        self.events.emit_lossy(PlayerEvent::PromptFiltered {
            text,
            reason,
            timestamp: chrono::Utc::now(),
        });
    }

    /// A wire chunk failed to decode; segment dropped, playback continues.
    pub fn on_decode_error(&self, message: String) {
        warn!("dropping undecodable segment: {}", message);
        self.events.emit_lossy(PlayerEvent::SegmentDecodeFailed {
            message,
            timestamp: chrono::Utc::now(),
        });
    }

    /// Transport error or close: local audio state can no longer be
    /// trusted, so escalate to a full stop and mark the connection
    /// broken. The next play request must reconnect first.
    pub fn on_transport_error(&self, message: String) {
        warn!("transport error, forcing stop: {}", message);

        self.bump_epoch();
        {
            let mut core = self.core.lock().unwrap();
            core.scheduler.sink_mut().set_gain(0.0, GAIN_RAMP_SECONDS);
            core.scheduler.reset();
            core.capture.clear();
            self.transition(PlaybackState::Stopped);
        }
        self.state.set_connection_broken(true);

        self.events.emit_lossy(PlayerEvent::ConnectionLost {
            message,
            timestamp: chrono::Utc::now(),
        });
    }

    // ========================================
    // Reconfiguration (coalesced)
    // ========================================

    /// Replace the weighted prompt set.
    ///
    /// Rapid repeats within the coalescing window collapse to a single
    /// session submission carrying only the latest payload.
    pub fn set_weighted_prompts(self: &Arc<Self>, prompts: Vec<WeightedPrompt>) {
        let mut core = self.core.lock().unwrap();
        core.prompts = prompts.clone();
        core.pending_prompts = Some(prompts);
        self.arm_coalescer(&mut core);
    }

    /// Replace the generation config. Coalesced like prompt updates.
    pub fn set_generation_config(self: &Arc<Self>, config: GenerationConfig) {
        let mut core = self.core.lock().unwrap();
        core.pending_config = Some(config);
        self.arm_coalescer(&mut core);
    }

    fn arm_coalescer(self: &Arc<Self>, core: &mut EngineCore) {
        if core.coalesce_armed {
            return;
        }
        core.coalesce_armed = true;

        let engine = Arc::clone(self);
        let window = self.coalesce_window;
        tokio::spawn(async move {
            tokio::time::sleep(window).await;
            engine.flush_pending();
        });
    }

    /// Submit whatever reconfiguration survived the window.
    fn flush_pending(&self) {
        let (prompts, config) = {
            let mut core = self.core.lock().unwrap();
            core.coalesce_armed = false;
            (core.pending_prompts.take(), core.pending_config.take())
        };

        if let Some(prompts) = prompts {
            if let Err(e) = self.send_command(SessionCommand::SetWeightedPrompts { prompts }) {
                warn!("prompt submission failed: {}", e);
            }
        }
        if let Some(config) = config {
            if let Err(e) = self.send_command(SessionCommand::SetMusicGenerationConfig { config })
            {
                warn!("config submission failed: {}", e);
            }
        }
    }

    // ========================================
    // Export and accessors
    // ========================================

    /// Export captured audio as a WAV file.
    ///
    /// The capture snapshot is taken synchronously under the core lock,
    /// so it can never interleave with a segment append.
    pub fn export_wav(&self) -> Result<(String, Vec<u8>)> {
        let (segments, prompt_texts) = {
            let core = self.core.lock().unwrap();
            if core.capture.is_empty() {
                return Err(Error::Export("no captured audio to export".to_string()));
            }
            let prompt_texts: Vec<String> =
                core.prompts.iter().map(|p| p.text.clone()).collect();
            (core.capture.clone(), prompt_texts)
        };

        let bytes = wav::write_wav(&segments, PLAYBACK_SAMPLE_RATE, PLAYBACK_CHANNELS)?;
        let file_name = wav::export_file_name(&prompt_texts, chrono::Utc::now());

        info!("exported {} bytes as {}", bytes.len(), file_name);
        self.events.emit_lossy(PlayerEvent::RecordingExported {
            file_name: file_name.clone(),
            byte_count: bytes.len(),
            timestamp: chrono::Utc::now(),
        });

        Ok((file_name, bytes))
    }

    /// Set master volume (clamped to 0.0-1.0).
    pub fn set_volume(&self, volume: f32) {
        let clamped = volume.clamp(0.0, 1.0);
        let old = {
            let mut v = self.volume.lock().unwrap();
            let old = *v;
            *v = clamped;
            old
        };

        self.core
            .lock()
            .unwrap()
            .scheduler
            .sink_mut()
            .set_volume(clamped);

        self.events.emit_lossy(PlayerEvent::VolumeChanged {
            old_volume: old,
            new_volume: clamped,
            timestamp: chrono::Utc::now(),
        });
    }

    pub fn volume(&self) -> f32 {
        *self.volume.lock().unwrap()
    }

    pub fn state(&self) -> PlaybackState {
        self.state.get()
    }

    pub fn is_connection_broken(&self) -> bool {
        self.state.is_connection_broken()
    }

    /// Elapsed audible playing time in seconds.
    pub fn elapsed_seconds(&self) -> f64 {
        self.core.lock().unwrap().scheduler.elapsed_seconds()
    }

    /// Number of segments currently in the capture log.
    pub fn capture_len(&self) -> usize {
        self.core.lock().unwrap().capture.len()
    }

    /// Prompt texts the session has rejected so far.
    pub fn filtered_prompts(&self) -> Vec<String> {
        let core = self.core.lock().unwrap();
        core.filtered_prompts.iter().cloned().collect()
    }

    /// Currently active weighted prompts.
    pub fn active_prompts(&self) -> Vec<WeightedPrompt> {
        self.core.lock().unwrap().prompts.clone()
    }

    /// Emit periodic progress events while playing.
    pub fn spawn_progress_reporter(self: &Arc<Self>, interval: Duration) {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if engine.state() == PlaybackState::Playing {
                    engine.events.emit_lossy(PlayerEvent::PlaybackProgress {
                        elapsed_seconds: engine.elapsed_seconds(),
                        timestamp: chrono::Utc::now(),
                    });
                }
            }
        });
    }

    // ========================================
    // Internals
    // ========================================

    /// Arm the deferred loading→playing transition to fire once the
    /// jitter buffer lead has elapsed. A stale timer (any reset since
    /// arming) is a no-op.
    fn arm_buffering_timer(self: &Arc<Self>, lead_seconds: f64) {
        let engine = Arc::clone(self);
        let armed_epoch = self.epoch.load(Ordering::Acquire);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs_f64(lead_seconds)).await;
            engine.finish_buffering(armed_epoch);
        });
    }

    fn finish_buffering(&self, armed_epoch: u64) {
        if self.epoch.load(Ordering::Acquire) != armed_epoch {
            debug!("stale buffering timer ignored");
            return;
        }
        if self.state.get() == PlaybackState::Loading {
            self.transition(PlaybackState::Playing);
        }
    }

    fn bump_epoch(&self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
    }

    fn transition(&self, new_state: PlaybackState) {
        let old_state = self.state.get();
        if old_state == new_state {
            return;
        }
        self.state.set(new_state);
        info!("playback state: {} -> {}", old_state, new_state);

        self.events.emit_lossy(PlayerEvent::PlaybackStateChanged {
            old_state,
            new_state,
            timestamp: chrono::Utc::now(),
        });
    }

    fn send_command(&self, command: SessionCommand) -> Result<()> {
        self.commands
            .try_send(command)
            .map(|_| ())
            .map_err(|e| Error::Transport(format!("session command not delivered: {}", e)))
    }
}
