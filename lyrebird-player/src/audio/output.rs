//! Audio output using cpal
//!
//! The cpal stream is not `Send`, so it lives on a dedicated thread.
//! [`CpalSink`] is the sendable handle the scheduler drives: sample
//! submission, gain and volume go through shared state read by the audio
//! callback, stream start/stop goes over a control channel to the owning
//! thread.
//!
//! Scheduling is frame addressed. `submit` converts the requested start
//! instant to a frame position and pads the queue with silence up to it;
//! the callback counts frames consumed, which is also the playback clock.

use crate::audio::types::{AudioSegment, PLAYBACK_SAMPLE_RATE};
use crate::audio::OutputSink;
use crate::error::{Error, Result};
use crate::playback::clock::FrameClock;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, StreamConfig};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use tracing::{debug, error, info, warn};

/// Control messages to the stream-owning thread.
enum StreamControl {
    Play,
    Pause,
    Shutdown,
}

/// State shared between the sink handle and the audio callback.
struct SharedAudio {
    /// Queued interleaved stereo samples with their frame origin
    queue: Mutex<SampleQueue>,
    /// Frames consumed by the callback since stream creation
    frames_played: Arc<AtomicU64>,
    /// Master volume (0.0-1.0)
    volume: Mutex<f32>,
    /// Gain ramp state, f32 bit patterns for lock-free callback access
    gain_bits: AtomicU32,
    gain_target_bits: AtomicU32,
    gain_step_bits: AtomicU32,
    /// Negotiated device sample rate
    sample_rate: u32,
}

struct SampleQueue {
    /// Interleaved stereo samples
    samples: VecDeque<f32>,
    /// Frame position of the queue head
    start_frame: u64,
}

impl SampleQueue {
    /// Produce one stereo frame for the given playback position.
    ///
    /// Positions before the queue head (silence pre-roll) and an empty
    /// queue both yield silence without consuming.
    fn take_frame(&mut self, frame_index: u64) -> (f32, f32) {
        if self.samples.len() < 2 || frame_index < self.start_frame {
            return (0.0, 0.0);
        }
        let left = self.samples.pop_front().unwrap_or(0.0);
        let right = self.samples.pop_front().unwrap_or(0.0);
        self.start_frame += 1;
        (left, right)
    }

    fn end_frame(&self) -> u64 {
        self.start_frame + (self.samples.len() / 2) as u64
    }
}

/// Sendable output handle backed by a cpal stream on its own thread.
pub struct CpalSink {
    shared: Arc<SharedAudio>,
    control: mpsc::Sender<StreamControl>,
}

impl CpalSink {
    /// Open the audio device and spawn the stream-owning thread.
    ///
    /// Returns the sink handle and the playback clock derived from
    /// frames actually consumed by the device. The stream starts
    /// suspended; `resume` begins output.
    pub fn spawn(device_name: Option<String>) -> Result<(Self, FrameClock)> {
        let (control_tx, control_rx) = mpsc::channel::<StreamControl>();
        let (init_tx, init_rx) = mpsc::channel::<Result<Arc<SharedAudio>>>();

        std::thread::Builder::new()
            .name("audio-output".to_string())
            .spawn(move || stream_thread(device_name, control_rx, init_tx))
            .map_err(|e| Error::AudioOutput(format!("failed to spawn audio thread: {}", e)))?;

        let shared = init_rx
            .recv()
            .map_err(|_| Error::AudioOutput("audio thread exited during init".to_string()))??;

        let clock = FrameClock::new(Arc::clone(&shared.frames_played), shared.sample_rate);
        Ok((
            Self {
                shared,
                control: control_tx,
            },
            clock,
        ))
    }

    /// List available audio output devices.
    ///
    /// Used by the GET /audio/devices endpoint.
    pub fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();

        let devices: Vec<String> = host
            .output_devices()
            .map_err(|e| Error::AudioOutput(format!("failed to enumerate devices: {}", e)))?
            .filter_map(|device| device.name().ok())
            .collect();

        debug!("found {} output devices", devices.len());
        Ok(devices)
    }

    pub fn sample_rate(&self) -> u32 {
        self.shared.sample_rate
    }
}

impl OutputSink for CpalSink {
    fn submit(&mut self, segment: &AudioSegment, start_at: f64) -> Result<()> {
        let start_frame = (start_at * self.shared.sample_rate as f64).round() as u64;
        let mut queue = self.shared.queue.lock().unwrap();

        if queue.samples.is_empty() {
            let now = self.shared.frames_played.load(Ordering::Acquire);
            queue.start_frame = start_frame.max(now);
        } else {
            let end = queue.end_frame();
            if start_frame > end {
                // Gap between queued audio and the requested start
                let pad = (start_frame - end) as usize * 2;
                queue.samples.extend(std::iter::repeat(0.0).take(pad));
            }
            // A start before the queue end can only be sub-frame rounding
            // from the cursor arithmetic; append without trimming.
        }

        match segment.channels {
            2 => queue.samples.extend(segment.samples.iter().copied()),
            1 => {
                for &sample in &segment.samples {
                    queue.samples.push_back(sample);
                    queue.samples.push_back(sample);
                }
            }
            n => {
                return Err(Error::AudioOutput(format!(
                    "unsupported segment channel count: {}",
                    n
                )))
            }
        }

        Ok(())
    }

    fn clear(&mut self) {
        let mut queue = self.shared.queue.lock().unwrap();
        queue.samples.clear();
        queue.start_frame = 0;
    }

    fn set_gain(&mut self, target: f32, ramp_seconds: f32) {
        let target = target.clamp(0.0, 1.0);
        self.shared
            .gain_target_bits
            .store(target.to_bits(), Ordering::Release);

        if ramp_seconds <= 0.0 {
            self.shared
                .gain_bits
                .store(target.to_bits(), Ordering::Release);
            self.shared.gain_step_bits.store(0, Ordering::Release);
        } else {
            let step = 1.0 / (ramp_seconds * self.shared.sample_rate as f32);
            self.shared
                .gain_step_bits
                .store(step.to_bits(), Ordering::Release);
        }
    }

    fn set_volume(&mut self, volume: f32) {
        let clamped = volume.clamp(0.0, 1.0);
        *self.shared.volume.lock().unwrap() = clamped;
        debug!("volume set to {:.2}", clamped);
    }

    fn resume(&mut self) -> Result<()> {
        self.control
            .send(StreamControl::Play)
            .map_err(|_| Error::AudioOutput("audio thread gone".to_string()))
    }

    fn suspend(&mut self) -> Result<()> {
        self.control
            .send(StreamControl::Pause)
            .map_err(|_| Error::AudioOutput("audio thread gone".to_string()))
    }
}

impl Drop for CpalSink {
    fn drop(&mut self) {
        let _ = self.control.send(StreamControl::Shutdown);
    }
}

/// Body of the stream-owning thread.
fn stream_thread(
    device_name: Option<String>,
    control: mpsc::Receiver<StreamControl>,
    init: mpsc::Sender<Result<Arc<SharedAudio>>>,
) {
    let (device, config, sample_format) = match open_device(device_name) {
        Ok(v) => v,
        Err(e) => {
            let _ = init.send(Err(e));
            return;
        }
    };

    let sample_rate = config.sample_rate.0;
    if sample_rate != PLAYBACK_SAMPLE_RATE {
        warn!(
            "device negotiated {} Hz, stream audio is {} Hz; playback will be pitch-shifted",
            sample_rate, PLAYBACK_SAMPLE_RATE
        );
    }

    let shared = Arc::new(SharedAudio {
        queue: Mutex::new(SampleQueue {
            samples: VecDeque::new(),
            start_frame: 0,
        }),
        frames_played: Arc::new(AtomicU64::new(0)),
        volume: Mutex::new(1.0),
        gain_bits: AtomicU32::new(1.0f32.to_bits()),
        gain_target_bits: AtomicU32::new(1.0f32.to_bits()),
        gain_step_bits: AtomicU32::new(0),
        sample_rate,
    });

    let stream = match build_stream(&device, &config, sample_format, Arc::clone(&shared)) {
        Ok(s) => s,
        Err(e) => {
            let _ = init.send(Err(e));
            return;
        }
    };

    info!(
        "audio stream ready: {} Hz, {} channels, {:?}",
        sample_rate, config.channels, sample_format
    );
    if init.send(Ok(shared)).is_err() {
        return;
    }

    // Stream stays alive for the life of this loop
    while let Ok(message) = control.recv() {
        match message {
            StreamControl::Play => {
                if let Err(e) = stream.play() {
                    error!("failed to start stream: {}", e);
                }
            }
            StreamControl::Pause => {
                if let Err(e) = stream.pause() {
                    error!("failed to pause stream: {}", e);
                }
            }
            StreamControl::Shutdown => break,
        }
    }
    info!("audio output thread exiting");
}

/// Open the requested device, falling back to the default on failure.
fn open_device(device_name: Option<String>) -> Result<(Device, StreamConfig, SampleFormat)> {
    let host = cpal::default_host();

    let device = if let Some(name) = device_name.as_ref() {
        let mut devices = host
            .output_devices()
            .map_err(|e| Error::AudioOutput(format!("failed to enumerate devices: {}", e)))?;

        match devices.find(|d| d.name().ok().as_ref() == Some(name)) {
            Some(dev) => {
                info!("found requested audio device: {}", name);
                dev
            }
            None => {
                warn!(
                    "requested device '{}' not found, falling back to default device",
                    name
                );
                host.default_output_device().ok_or_else(|| {
                    Error::AudioOutput(format!(
                        "device '{}' not found and no default device available",
                        name
                    ))
                })?
            }
        }
    } else {
        host.default_output_device()
            .ok_or_else(|| Error::AudioOutput("no default output device found".to_string()))?
    };

    let (config, sample_format) = best_config(&device)?;
    debug!(
        "audio config: sample_rate={}, channels={}, format={:?}",
        config.sample_rate.0, config.channels, sample_format
    );

    Ok((device, config, sample_format))
}

/// Prefer 48kHz stereo f32 to match the stream format; otherwise take
/// the device default.
fn best_config(device: &Device) -> Result<(StreamConfig, SampleFormat)> {
    let supported = device
        .supported_output_configs()
        .map_err(|e| Error::AudioOutput(format!("failed to get device configs: {}", e)))?;

    let preferred = supported.into_iter().find(|config| {
        config.channels() == 2
            && config.min_sample_rate().0 <= PLAYBACK_SAMPLE_RATE
            && config.max_sample_rate().0 >= PLAYBACK_SAMPLE_RATE
            && config.sample_format() == SampleFormat::F32
    });

    if let Some(supported_config) = preferred {
        let sample_format = supported_config.sample_format();
        let config = supported_config
            .with_sample_rate(cpal::SampleRate(PLAYBACK_SAMPLE_RATE))
            .config();
        return Ok((config, sample_format));
    }

    let supported_config = device
        .default_output_config()
        .map_err(|e| Error::AudioOutput(format!("failed to get default config: {}", e)))?;

    let sample_format = supported_config.sample_format();
    Ok((supported_config.config(), sample_format))
}

fn build_stream(
    device: &Device,
    config: &StreamConfig,
    sample_format: SampleFormat,
    shared: Arc<SharedAudio>,
) -> Result<cpal::Stream> {
    match sample_format {
        SampleFormat::F32 => build_stream_f32(device, config, shared),
        SampleFormat::I16 => build_stream_i16(device, config, shared),
        other => Err(Error::AudioOutput(format!(
            "unsupported sample format: {:?}",
            other
        ))),
    }
}

fn build_stream_f32(
    device: &Device,
    config: &StreamConfig,
    shared: Arc<SharedAudio>,
) -> Result<cpal::Stream> {
    let channels = config.channels as usize;

    device
        .build_output_stream(
            config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                render(&shared, data, channels);
            },
            |err| error!("audio stream error: {}", err),
            None,
        )
        .map_err(|e| Error::AudioOutput(format!("failed to build stream: {}", e)))
}

fn build_stream_i16(
    device: &Device,
    config: &StreamConfig,
    shared: Arc<SharedAudio>,
) -> Result<cpal::Stream> {
    let channels = config.channels as usize;

    device
        .build_output_stream(
            config,
            move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                let mut scratch = vec![0.0f32; data.len()];
                render(&shared, &mut scratch, channels);
                for (out, sample) in data.iter_mut().zip(scratch.iter()) {
                    *out = (sample * i16::MAX as f32) as i16;
                }
            },
            |err| error!("audio stream error: {}", err),
            None,
        )
        .map_err(|e| Error::AudioOutput(format!("failed to build stream: {}", e)))
}

/// Fill one device buffer: queue consumption, gain ramp, volume, clamp.
///
/// Runs on the audio thread; the queue lock is taken once per buffer and
/// contended only briefly by submit/clear.
fn render(shared: &SharedAudio, data: &mut [f32], channels: usize) {
    let mut queue = shared.queue.lock().unwrap();
    let volume = *shared.volume.lock().unwrap();
    let target = f32::from_bits(shared.gain_target_bits.load(Ordering::Acquire));
    let step = f32::from_bits(shared.gain_step_bits.load(Ordering::Acquire));
    let mut gain = f32::from_bits(shared.gain_bits.load(Ordering::Acquire));
    let mut frame_index = shared.frames_played.load(Ordering::Acquire);

    for frame in data.chunks_mut(channels) {
        let (left, right) = queue.take_frame(frame_index);

        if gain < target {
            gain = (gain + step).min(target);
        } else if gain > target {
            gain = (gain - step).max(target);
        }

        let left = (left * gain * volume).clamp(-1.0, 1.0);
        let right = (right * gain * volume).clamp(-1.0, 1.0);

        if channels == 1 {
            frame[0] = (left + right) * 0.5;
        } else {
            frame[0] = left;
            frame[1] = right;
            for extra in frame.iter_mut().skip(2) {
                *extra = 0.0;
            }
        }
        frame_index += 1;
    }

    shared.gain_bits.store(gain.to_bits(), Ordering::Release);
    shared
        .frames_played
        .store(frame_index, Ordering::Release);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_shared(sample_rate: u32) -> Arc<SharedAudio> {
        Arc::new(SharedAudio {
            queue: Mutex::new(SampleQueue {
                samples: VecDeque::new(),
                start_frame: 0,
            }),
            frames_played: Arc::new(AtomicU64::new(0)),
            volume: Mutex::new(1.0),
            gain_bits: AtomicU32::new(1.0f32.to_bits()),
            gain_target_bits: AtomicU32::new(1.0f32.to_bits()),
            gain_step_bits: AtomicU32::new(0),
            sample_rate,
        })
    }

    fn sink_over(shared: Arc<SharedAudio>) -> CpalSink {
        let (control, _rx) = mpsc::channel();
        CpalSink { shared, control }
    }

    #[test]
    fn test_list_devices_does_not_panic() {
        // Requires audio hardware; either result is acceptable
        let result = CpalSink::list_devices();
        assert!(result.is_ok() || result.is_err());
    }

    #[test]
    fn test_submit_pads_silence_to_start_frame() {
        let shared = test_shared(48_000);
        let mut sink = sink_over(Arc::clone(&shared));

        // One second of lead: first sample should land at frame 48000
        let segment = AudioSegment::new(vec![0.5; 4], 2, 48_000);
        sink.submit(&segment, 1.0).unwrap();

        let queue = shared.queue.lock().unwrap();
        assert_eq!(queue.start_frame, 48_000);
        assert_eq!(queue.samples.len(), 4);
    }

    #[test]
    fn test_render_pre_roll_is_silent_then_audio() {
        let shared = test_shared(48_000);
        let mut sink = sink_over(Arc::clone(&shared));

        // Schedule two frames of audio at frame 2
        let segment = AudioSegment::new(vec![0.5, -0.5, 0.25, -0.25], 2, 48_000);
        sink.submit(&segment, 2.0 / 48_000.0).unwrap();

        let mut buffer = [0.0f32; 8];
        render(&shared, &mut buffer, 2);

        assert_eq!(&buffer[0..4], &[0.0, 0.0, 0.0, 0.0]);
        assert_eq!(&buffer[4..8], &[0.5, -0.5, 0.25, -0.25]);
        assert_eq!(shared.frames_played.load(Ordering::Acquire), 4);
    }

    #[test]
    fn test_gapless_submits_queue_contiguously() {
        let shared = test_shared(48_000);
        let mut sink = sink_over(Arc::clone(&shared));

        let one_frame = AudioSegment::new(vec![0.1, 0.1], 2, 48_000);
        sink.submit(&one_frame, 0.0).unwrap();
        // Next segment starts exactly where the first ends
        sink.submit(&one_frame, 1.0 / 48_000.0).unwrap();

        let queue = shared.queue.lock().unwrap();
        assert_eq!(queue.samples.len(), 4);
        assert_eq!(queue.end_frame(), 2);
    }

    #[test]
    fn test_clear_discards_queued_audio() {
        let shared = test_shared(48_000);
        let mut sink = sink_over(Arc::clone(&shared));

        let segment = AudioSegment::new(vec![0.5; 8], 2, 48_000);
        sink.submit(&segment, 1.0).unwrap();
        sink.clear();

        let mut buffer = [1.0f32; 4];
        render(&shared, &mut buffer, 2);
        assert_eq!(buffer, [0.0; 4]);
    }

    #[test]
    fn test_gain_ramp_reaches_target() {
        let shared = test_shared(48_000);
        let mut sink = sink_over(Arc::clone(&shared));

        let segment = AudioSegment::new(vec![1.0; 200], 2, 48_000);
        sink.submit(&segment, 0.0).unwrap();

        // Ramp down over 50 frames
        sink.set_gain(0.0, 50.0 / 48_000.0);

        let mut buffer = vec![0.0f32; 200];
        render(&shared, &mut buffer, 2);

        // Early samples still audible, final samples silent
        assert!(buffer[0] > 0.9);
        assert_eq!(*buffer.last().unwrap(), 0.0);
        // Monotonically non-increasing on the left channel
        for pair in buffer.chunks(2).collect::<Vec<_>>().windows(2) {
            assert!(pair[1][0] <= pair[0][0] + 1e-6);
        }
    }

    #[test]
    fn test_instant_gain_change_skips_ramp() {
        let shared = test_shared(48_000);
        let mut sink = sink_over(Arc::clone(&shared));

        sink.set_gain(0.0, 0.0);
        assert_eq!(
            f32::from_bits(shared.gain_bits.load(Ordering::Acquire)),
            0.0
        );
    }

    #[test]
    fn test_volume_applied_in_render() {
        let shared = test_shared(48_000);
        let mut sink = sink_over(Arc::clone(&shared));

        let segment = AudioSegment::new(vec![1.0, 1.0], 2, 48_000);
        sink.submit(&segment, 0.0).unwrap();
        sink.set_volume(0.5);

        let mut buffer = [0.0f32; 2];
        render(&shared, &mut buffer, 2);
        assert_eq!(buffer, [0.5, 0.5]);
    }

    #[test]
    fn test_mono_segment_upmixed_to_stereo() {
        let shared = test_shared(48_000);
        let mut sink = sink_over(Arc::clone(&shared));

        let mono = AudioSegment::new(vec![0.3, 0.7], 1, 48_000);
        sink.submit(&mono, 0.0).unwrap();

        let queue = shared.queue.lock().unwrap();
        assert_eq!(
            queue.samples.iter().copied().collect::<Vec<_>>(),
            vec![0.3, 0.3, 0.7, 0.7]
        );
    }
}
