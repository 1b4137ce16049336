//! Audio playback to speakers

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{SampleFormat, SampleRate, StreamConfig};

use super::audio_file::read_mono;
use super::device::output_device;
use crate::pipeline::AudioPlayer;
use crate::{Error, Result};

/// Plays WAV files on an output device at the file's own sample rate
#[derive(Debug, Clone, Copy, Default)]
pub struct AudioPlayback {
    device_index: Option<usize>,
}

impl AudioPlayback {
    /// Create a player for the given output device, or the host default
    #[must_use]
    pub const fn new(device_index: Option<usize>) -> Self {
        Self { device_index }
    }

    /// Play mono samples and block until they finish
    ///
    /// # Errors
    ///
    /// Returns error if the device has no configuration at `sample_rate` or
    /// the stream cannot be started
    #[allow(clippy::cast_precision_loss)]
    pub fn play_samples(&self, samples: Vec<f32>, sample_rate: u32) -> Result<()> {
        if samples.is_empty() {
            return Ok(());
        }

        let device = output_device(self.device_index)?;
        let config = output_config(&device, sample_rate)?;
        let channels = usize::from(config.channels);

        let sample_count = samples.len();
        let samples = Arc::new(samples);
        let position = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicBool::new(false));

        let callback_samples = Arc::clone(&samples);
        let callback_position = Arc::clone(&position);
        let callback_finished = Arc::clone(&finished);

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let mut pos = callback_position.load(Ordering::Relaxed);
                    for frame in data.chunks_mut(channels) {
                        let sample = callback_samples.get(pos).copied().unwrap_or_else(|| {
                            callback_finished.store(true, Ordering::Release);
                            0.0
                        });
                        frame.fill(sample);
                        if pos < callback_samples.len() {
                            pos += 1;
                        }
                    }
                    callback_position.store(pos, Ordering::Relaxed);
                },
                |err| {
                    tracing::error!(error = %err, "audio playback error");
                },
                None,
            )
            .map_err(|e| Error::Playback(e.to_string()))?;

        stream.play().map_err(|e| Error::Playback(e.to_string()))?;

        let duration = Duration::from_secs_f64(sample_count as f64 / f64::from(sample_rate));
        let timeout = duration + Duration::from_millis(500);
        let start = Instant::now();

        while !finished.load(Ordering::Acquire) {
            if start.elapsed() > timeout {
                tracing::warn!("playback did not drain before timeout");
                break;
            }
            std::thread::sleep(Duration::from_millis(50));
        }

        // Let the device drain its last buffer
        std::thread::sleep(Duration::from_millis(100));

        drop(stream);
        tracing::debug!(samples = sample_count, sample_rate, "playback complete");

        Ok(())
    }

    /// Play a short sine tone, for checking the output device
    ///
    /// # Errors
    ///
    /// Returns error if playback fails
    #[allow(clippy::cast_precision_loss)]
    pub fn play_tone(&self, frequency: f32, duration: Duration, sample_rate: u32) -> Result<()> {
        let rate = sample_rate as f32;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let count = (duration.as_secs_f32() * rate) as usize;
        let samples = (0..count)
            .map(|i| (2.0 * std::f32::consts::PI * frequency * i as f32 / rate).sin() * 0.3)
            .collect();
        self.play_samples(samples, sample_rate)
    }
}

#[async_trait]
impl AudioPlayer for AudioPlayback {
    async fn play(&self, path: &Path) -> Result<()> {
        let player = *self;
        let path = path.to_path_buf();

        tokio::task::spawn_blocking(move || {
            let audio = read_mono(&path).map_err(|e| Error::Playback(e.to_string()))?;
            tracing::debug!(
                path = %path.display(),
                sample_rate = audio.sample_rate,
                "playing audio"
            );
            player.play_samples(audio.samples, audio.sample_rate)
        })
        .await
        .map_err(|e| Error::Playback(format!("playback task failed: {e}")))?
    }
}

/// Pick an f32 output configuration at `sample_rate`, preferring mono
fn output_config(device: &cpal::Device, sample_rate: u32) -> Result<StreamConfig> {
    let supported = device
        .supported_output_configs()
        .map_err(|e| Error::Playback(e.to_string()))?
        .filter(|c| c.sample_format() == SampleFormat::F32)
        .filter(|c| {
            c.min_sample_rate() <= SampleRate(sample_rate)
                && c.max_sample_rate() >= SampleRate(sample_rate)
        })
        .min_by_key(cpal::SupportedStreamConfigRange::channels)
        .ok_or_else(|| {
            Error::Playback(format!("no output config supports {sample_rate} Hz"))
        })?;

    let config = supported.with_sample_rate(SampleRate(sample_rate)).config();

    tracing::debug!(
        device = device.name().unwrap_or_default(),
        sample_rate,
        channels = config.channels,
        "audio playback initialized"
    );

    Ok(config)
}
