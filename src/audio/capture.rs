use anyhow::{Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use hound::{WavSpec, WavWriter};
use ringbuf::{
    traits::{Consumer, Producer, Split},
    HeapCons, HeapRb,
};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Sample rate the recognition engine expects
pub const TARGET_SAMPLE_RATE: u32 = 16_000;

/// Ring buffer headroom in seconds; the worker drains continuously, so this
/// only needs to cover scheduling hiccups
const RING_BUFFER_SECS: usize = 8;

/// Samples retained for the visualizer's frequency snapshot
const TAP_CAPACITY: usize = 2048;

/// Shared copy of the most recent capture audio, read by the visualizer
///
/// The audio callback only ever try-locks, so the meter can never stall
/// capture; a missed update just reuses the previous snapshot.
#[derive(Clone, Default)]
pub struct LevelTap {
    latest: Arc<Mutex<Vec<f32>>>,
}

impl LevelTap {
    fn offer(&self, data: &[f32]) {
        if let Ok(mut buf) = self.latest.try_lock() {
            buf.extend_from_slice(data);
            let excess = buf.len().saturating_sub(TAP_CAPACITY);
            if excess > 0 {
                buf.drain(..excess);
            }
        }
    }

    /// Latest captured samples, oldest first; empty when nothing has been
    /// captured since the last clear
    #[must_use]
    pub fn snapshot(&self) -> Vec<f32> {
        self.latest.lock().map(|buf| buf.clone()).unwrap_or_default()
    }

    /// Drop the retained samples so a stopped meter settles at minimum
    pub fn clear(&self) {
        if let Ok(mut buf) = self.latest.lock() {
            buf.clear();
        }
    }
}

/// Trait for controlling audio stream lifecycle
trait StreamHandle {
    /// Resume the stream (activate the microphone)
    fn play(&self) -> Result<()>;
    /// Pause the stream (deactivate the microphone)
    fn pause(&self) -> Result<()>;
}

struct CpalStreamHandle {
    stream: cpal::Stream,
}

impl StreamHandle for CpalStreamHandle {
    fn play(&self) -> Result<()> {
        self.stream.play().context("failed to resume audio stream")
    }

    fn pause(&self) -> Result<()> {
        self.stream.pause().context("failed to pause audio stream")
    }
}

/// Microphone capture feeding the recognition worker and the level tap
pub struct MicCapture {
    /// Kept alive to prevent stream drop
    #[allow(dead_code)]
    stream: Option<Box<dyn StreamHandle>>,
    consumer: HeapCons<f32>,
    capturing: Arc<AtomicBool>,
    tap: LevelTap,
    device_sample_rate: u32,
    device_channels: u16,
}

impl MicCapture {
    /// Open the default input device with its default configuration
    ///
    /// The stream starts paused; nothing reaches the ring buffer until
    /// [`Self::start`].
    ///
    /// # Errors
    /// Returns error if no input device is available or stream creation fails
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .context("no input device available")?;

        let device_name = device.name().unwrap_or_else(|_| "unknown".to_owned());
        info!("using input device: {}", device_name);

        let supported_config = device
            .default_input_config()
            .context("failed to get default input config")?;
        let device_sample_rate = supported_config.sample_rate().0;
        let device_channels = supported_config.channels();

        info!(
            "device config: {} Hz, {} channels",
            device_sample_rate, device_channels
        );

        let capacity = (device_sample_rate as usize) * (device_channels as usize) * RING_BUFFER_SECS;
        let (mut producer, consumer) = HeapRb::<f32>::new(capacity).split();

        let capturing = Arc::new(AtomicBool::new(false));
        let tap = LevelTap::default();

        let capturing_cb = Arc::clone(&capturing);
        let tap_cb = tap.clone();
        let stream = device
            .build_input_stream(
                &supported_config.into(),
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if capturing_cb.load(Ordering::Relaxed) {
                        let pushed = producer.push_slice(data);
                        if pushed < data.len() {
                            warn!("ring buffer full, dropped {} samples", data.len() - pushed);
                        }
                        tap_cb.offer(data);
                    }
                },
                move |err| {
                    warn!("audio stream error: {}", err);
                },
                None,
            )
            .context("failed to build input stream")?;

        let handle = CpalStreamHandle { stream };
        handle.play()?;
        handle.pause()?;
        info!("audio stream initialized (paused)");

        Ok(Self {
            stream: Some(Box::new(handle)),
            consumer,
            capturing,
            tap,
            device_sample_rate,
            device_channels,
        })
    }

    /// Handle for the visualizer's frequency snapshots
    #[must_use]
    pub fn level_tap(&self) -> LevelTap {
        self.tap.clone()
    }

    /// Begin feeding the ring buffer
    ///
    /// # Errors
    /// Returns error if the stream cannot be resumed
    pub fn start(&mut self) -> Result<()> {
        debug!("starting capture");
        self.consumer.clear();
        // Flag goes up before the stream resumes so the first callback is
        // never dropped.
        self.capturing.store(true, Ordering::Relaxed);
        if let Some(stream) = &self.stream {
            stream.play()?;
        }
        Ok(())
    }

    /// Stop feeding the ring buffer and settle the level tap
    ///
    /// # Errors
    /// Returns error if the stream cannot be paused
    pub fn stop(&mut self) -> Result<()> {
        debug!("stopping capture");
        self.capturing.store(false, Ordering::Relaxed);
        if let Some(stream) = &self.stream {
            stream.pause()?;
        }
        self.tap.clear();
        Ok(())
    }

    /// Drain everything captured since the last drain, converted to 16 kHz
    /// mono
    pub fn drain_chunk(&mut self) -> Vec<f32> {
        let mut raw = Vec::new();
        while let Some(sample) = self.consumer.try_pop() {
            raw.push(sample);
        }
        if raw.is_empty() {
            return raw;
        }
        let mono = downmix_to_mono(&raw, self.device_channels);
        resample_linear(&mono, self.device_sample_rate, TARGET_SAMPLE_RATE)
    }
}

/// Average interleaved channels down to mono
#[must_use]
pub fn downmix_to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    let channels_f64 = f64::from(channels);
    samples
        .chunks(channels as usize)
        .map(|frame| {
            let sum: f64 = frame.iter().map(|&s| f64::from(s)).sum();
            // f64 -> f32: audio samples are stored as f32, precision sufficient
            #[allow(clippy::cast_possible_truncation)]
            {
                (sum / channels_f64) as f32
            }
        })
        .collect()
}

/// Linear-interpolation resampling
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)] // Fractional index arithmetic requires f64 <-> usize conversions
pub fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = f64::from(from_rate) / f64::from(to_rate);
    let output_len = ((samples.len() as f64) / ratio).ceil() as usize;

    let mut resampled = Vec::with_capacity(output_len);
    for i in 0..output_len {
        let src_idx = (i as f64) * ratio;
        let lo = (src_idx.floor() as usize).min(samples.len() - 1);
        let hi = (lo + 1).min(samples.len() - 1);
        let fract = src_idx - src_idx.floor();

        let s1 = f64::from(samples[lo]);
        let s2 = f64::from(samples[hi]);
        resampled.push(s1.mul_add(1.0 - fract, s2 * fract) as f32);
    }
    resampled
}

/// Write an utterance to a WAV file for debugging
///
/// # Errors
/// Returns error if directory creation or the file write fails
pub fn write_debug_wav(samples: &[f32], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).context("failed to create debug directory")?;
    }

    let spec = WavSpec {
        channels: 1,
        sample_rate: TARGET_SAMPLE_RATE,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };

    let mut writer = WavWriter::create(path, spec).context("failed to create WAV file")?;
    for &sample in samples {
        writer
            .write_sample(sample)
            .context("failed to write sample")?;
    }
    writer.finalize().context("failed to finalize WAV file")?;

    debug!(path = %path.display(), samples = samples.len(), "debug WAV written");
    Ok(())
}

#[cfg(test)]
#[allow(clippy::float_cmp)] // Test assertions with known exact values
mod tests {
    use super::*;

    struct MockStreamHandle {
        played: Arc<AtomicBool>,
        paused: Arc<AtomicBool>,
    }

    impl StreamHandle for MockStreamHandle {
        fn play(&self) -> Result<()> {
            self.played.store(true, Ordering::Relaxed);
            Ok(())
        }

        fn pause(&self) -> Result<()> {
            self.paused.store(true, Ordering::Relaxed);
            Ok(())
        }
    }

    fn mock_capture(sample_rate: u32, channels: u16) -> MicCapture {
        MicCapture {
            stream: None,
            consumer: HeapRb::<f32>::new(1024).split().1,
            capturing: Arc::new(AtomicBool::new(false)),
            tap: LevelTap::default(),
            device_sample_rate: sample_rate,
            device_channels: channels,
        }
    }

    #[test]
    fn test_stereo_downmix_averages_channels() {
        let stereo = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let mono = downmix_to_mono(&stereo, 2);
        assert_eq!(mono, vec![1.5, 3.5, 5.5]);
    }

    #[test]
    fn test_mono_downmix_is_passthrough() {
        let samples = vec![0.25, -0.5, 0.75];
        assert_eq!(downmix_to_mono(&samples, 1), samples);
    }

    #[test]
    fn test_four_channel_downmix() {
        let samples = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0];
        assert_eq!(downmix_to_mono(&samples, 4), vec![2.5, 6.5]);
    }

    #[test]
    fn test_resample_same_rate_passthrough() {
        let samples = vec![1.0, 2.0, 3.0];
        assert_eq!(resample_linear(&samples, 16_000, 16_000), samples);
    }

    #[test]
    fn test_downsample_3_to_1() {
        let samples = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0];
        let out = resample_linear(&samples, 48_000, 16_000);
        assert_eq!(out.len(), 3);
        for &s in &out {
            assert!((1.0..=9.0).contains(&s));
        }
    }

    #[test]
    fn test_upsample_doubles_length() {
        let samples = vec![1.0, 2.0, 3.0, 4.0];
        let out = resample_linear(&samples, 8_000, 16_000);
        assert_eq!(out.len(), 8);
        for &s in &out {
            assert!((1.0..=4.0).contains(&s));
        }
    }

    #[test]
    fn test_resample_empty() {
        let out = resample_linear(&[], 48_000, 16_000);
        assert!(out.is_empty());
    }

    #[test]
    fn test_resample_preserves_bounds() {
        let samples = vec![-1.0, -0.5, 0.0, 0.5, 1.0];
        for &s in &resample_linear(&samples, 22_050, 16_000) {
            assert!((-1.0..=1.0).contains(&s));
        }
    }

    #[test]
    fn test_level_tap_keeps_most_recent_samples() {
        let tap = LevelTap::default();
        tap.offer(&[0.1; TAP_CAPACITY]);
        tap.offer(&[0.9; 16]);

        let snap = tap.snapshot();
        assert_eq!(snap.len(), TAP_CAPACITY);
        assert_eq!(snap[snap.len() - 1], 0.9);
        assert_eq!(snap[0], 0.1);
    }

    #[test]
    fn test_level_tap_clear() {
        let tap = LevelTap::default();
        tap.offer(&[0.5; 8]);
        tap.clear();
        assert!(tap.snapshot().is_empty());
    }

    #[test]
    fn test_start_stop_drive_stream_handle() {
        let played = Arc::new(AtomicBool::new(false));
        let paused = Arc::new(AtomicBool::new(false));

        let mut capture = mock_capture(16_000, 1);
        capture.stream = Some(Box::new(MockStreamHandle {
            played: Arc::clone(&played),
            paused: Arc::clone(&paused),
        }));

        capture.start().unwrap();
        assert!(played.load(Ordering::Relaxed));
        assert!(capture.capturing.load(Ordering::Relaxed));

        capture.stop().unwrap();
        assert!(paused.load(Ordering::Relaxed));
        assert!(!capture.capturing.load(Ordering::Relaxed));
    }

    #[test]
    fn test_drain_chunk_empty_when_nothing_captured() {
        let mut capture = mock_capture(48_000, 2);
        assert!(capture.drain_chunk().is_empty());
    }

    #[test]
    fn test_write_debug_wav_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("utterance.wav");
        let samples = vec![0.1, 0.2, 0.3];

        write_debug_wav(&samples, &path).unwrap();

        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.spec().sample_rate, TARGET_SAMPLE_RATE);
        assert_eq!(reader.len() as usize, samples.len());
    }

    #[test]
    #[ignore = "requires audio hardware"]
    fn test_capture_initialization() {
        let capture = MicCapture::new();
        assert!(capture.is_ok());
    }
}
