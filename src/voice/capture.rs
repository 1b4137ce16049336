//! Audio capture from microphone

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{SampleFormat, SampleRate, StreamConfig};

use super::device::input_device;
use super::utterance::UtteranceDetector;
use crate::error::CaptureError;
use crate::pipeline::{RawUtterance, SpeechCapture};
use crate::{Error, Result};

/// Sample rate for audio capture (16kHz for speech)
pub const SAMPLE_RATE: u32 = 16000;

/// How often the capture buffer is drained
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Give up listening after this long without speech
const LISTEN_TIMEOUT: Duration = Duration::from_secs(30);

/// Cut an utterance off after this long
const MAX_UTTERANCE: Duration = Duration::from_secs(30);

/// Captures one utterance at a time from an input device
///
/// The cpal stream only lives for the duration of a single capture, on a
/// blocking thread, so the capture itself is `Send`.
pub struct AudioCapture {
    device_index: Option<usize>,
    config: StreamConfig,
}

impl AudioCapture {
    /// Create a new audio capture instance
    ///
    /// # Errors
    ///
    /// Returns error if the audio device cannot be opened or has no usable
    /// 16kHz f32 configuration
    pub fn new(device_index: Option<usize>) -> Result<Self> {
        let device = input_device(device_index)?;

        let supported_config = device
            .supported_input_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .filter(|c| c.sample_format() == SampleFormat::F32)
            .filter(|c| {
                c.min_sample_rate() <= SampleRate(SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(SAMPLE_RATE)
            })
            .min_by_key(cpal::SupportedStreamConfigRange::channels)
            .ok_or_else(|| Error::Audio("no suitable audio config found".to_string()))?;

        let config = supported_config
            .with_sample_rate(SampleRate(SAMPLE_RATE))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = SAMPLE_RATE,
            channels = config.channels,
            "audio capture initialized"
        );

        Ok(Self {
            device_index,
            config,
        })
    }

    /// Record until one utterance is complete, the listen timeout passes or
    /// `cancelled` is set
    fn record_utterance(
        device_index: Option<usize>,
        config: &StreamConfig,
        cancelled: &AtomicBool,
    ) -> std::result::Result<RawUtterance, CaptureError> {
        let device =
            input_device(device_index).map_err(|e| CaptureError::Device(e.to_string()))?;
        let channels = usize::from(config.channels);

        let buffer = Arc::new(Mutex::new(Vec::new()));
        let callback_buffer = Arc::clone(&buffer);

        let stream = device
            .build_input_stream(
                config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if let Ok(mut buf) = callback_buffer.lock() {
                        buf.extend_from_slice(data);
                    }
                },
                |err| {
                    tracing::error!(error = %err, "audio capture error");
                },
                None,
            )
            .map_err(|e| CaptureError::Device(e.to_string()))?;

        stream
            .play()
            .map_err(|e| CaptureError::Device(e.to_string()))?;
        tracing::info!("listening...");

        let drain = || {
            let interleaved = buffer
                .lock()
                .map(|mut buf| std::mem::take(&mut *buf))
                .unwrap_or_default();
            downmix(&interleaved, channels)
        };
        let result = wait_for_utterance(drain, cancelled, POLL_INTERVAL);
        drop(stream);

        let samples = result?;
        tracing::debug!(samples = samples.len(), "utterance captured");

        Ok(RawUtterance {
            samples,
            sample_rate: SAMPLE_RATE,
        })
    }
}

#[async_trait]
impl SpeechCapture for AudioCapture {
    async fn capture(&self) -> std::result::Result<RawUtterance, CaptureError> {
        let device_index = self.device_index;
        let config = self.config.clone();

        // Dropping this future (shutdown) stops the recording thread
        let guard = CancelOnDrop::default();
        let cancelled = guard.flag();

        tokio::task::spawn_blocking(move || {
            Self::record_utterance(device_index, &config, &cancelled)
        })
        .await
        .map_err(|e| CaptureError::Device(format!("capture task failed: {e}")))?
    }
}

/// Sets a shared flag when dropped
#[derive(Default)]
struct CancelOnDrop(Arc<AtomicBool>);

impl CancelOnDrop {
    fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.0)
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

/// Poll `drain` for mono samples until the detector completes an utterance
///
/// Gives up with `NoSpeech` when nothing is heard within the listen timeout
/// or when `cancelled` is set.
fn wait_for_utterance(
    mut drain: impl FnMut() -> Vec<f32>,
    cancelled: &AtomicBool,
    poll_interval: Duration,
) -> std::result::Result<Vec<f32>, CaptureError> {
    let mut detector = UtteranceDetector::new();
    let started = Instant::now();

    loop {
        if cancelled.load(Ordering::Relaxed) {
            tracing::debug!("capture cancelled");
            return Err(CaptureError::NoSpeech);
        }

        std::thread::sleep(poll_interval);

        if detector.process(&drain()) {
            break;
        }

        let elapsed = started.elapsed();
        if detector.buffered().is_empty() && elapsed > LISTEN_TIMEOUT {
            return Err(CaptureError::NoSpeech);
        }
        if elapsed > LISTEN_TIMEOUT + MAX_UTTERANCE {
            tracing::debug!("utterance cut off at maximum length");
            break;
        }
    }

    Ok(detector.take_utterance())
}

/// Average interleaved frames down to mono
#[allow(clippy::cast_precision_loss)]
fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

/// Convert f32 samples to WAV bytes for STT APIs
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in samples {
            // Convert f32 [-1.0, 1.0] to i16
            #[allow(clippy::cast_possible_truncation)]
            let sample_i16 = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer
                .write_sample(sample_i16)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downmix_averages_frames() {
        assert_eq!(downmix(&[0.25, 0.75, -1.0, 1.0], 2), vec![0.5, 0.0]);
        assert_eq!(downmix(&[0.1, 0.2], 1), vec![0.1, 0.2]);
        assert!(downmix(&[], 2).is_empty());
    }

    #[test]
    fn cancelled_wait_returns_promptly() {
        let cancelled = AtomicBool::new(true);
        let mut drains = 0;

        let started = Instant::now();
        let result = wait_for_utterance(
            || {
                drains += 1;
                vec![0.0; 1600]
            },
            &cancelled,
            Duration::from_millis(10),
        );

        assert!(matches!(result, Err(CaptureError::NoSpeech)));
        assert_eq!(drains, 0);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn wait_stops_when_cancelled_mid_listen() {
        let cancelled = Arc::new(AtomicBool::new(false));
        let setter = Arc::clone(&cancelled);
        let mut drains = 0;

        let result = wait_for_utterance(
            || {
                drains += 1;
                if drains == 3 {
                    setter.store(true, Ordering::Relaxed);
                }
                vec![0.0; 160]
            },
            &cancelled,
            Duration::from_millis(1),
        );

        assert!(matches!(result, Err(CaptureError::NoSpeech)));
        assert_eq!(drains, 3);
    }

    #[test]
    fn dropping_guard_sets_flag() {
        let guard = CancelOnDrop::default();
        let flag = guard.flag();
        assert!(!flag.load(Ordering::Relaxed));

        drop(guard);
        assert!(flag.load(Ordering::Relaxed));
    }

    #[tokio::test]
    async fn dropped_task_future_cancels_blocking_work() {
        let guard = CancelOnDrop::default();
        let cancelled = guard.flag();
        let (tx, rx) = std::sync::mpsc::channel();

        let waiting = async move {
            let _guard = guard;
            tokio::task::spawn_blocking(move || {
                let result = wait_for_utterance(Vec::new, &cancelled, Duration::from_millis(5));
                let _ = tx.send(result.is_err());
            })
            .await
        };

        // Shutdown wins the race and the capture future is dropped
        tokio::select! {
            _ = waiting => panic!("listening should not finish on silence"),
            () = tokio::time::sleep(Duration::from_millis(50)) => {}
        }

        let stopped = tokio::task::spawn_blocking(move || rx.recv_timeout(Duration::from_secs(2)))
            .await
            .unwrap();
        assert_eq!(stopped, Ok(true));
    }
}
