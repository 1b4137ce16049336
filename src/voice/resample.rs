//! Sample-rate conversion of synthesized speech

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::audio_file::{read_mono, write_wav};
use crate::pipeline::AudioResampler;
use crate::{Error, Result};

/// Input frames fed to the resampler per call
const CHUNK_SIZE: usize = 1024;

/// FFT sub-chunks per input chunk
const SUB_CHUNKS: usize = 2;

/// Resamples an audio file to a mono 16-bit WAV at a target rate
#[derive(Debug, Clone, Copy, Default)]
pub struct WavResampler;

impl WavResampler {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn resample_file(input: &Path, target_rate: u32, output: &Path) -> Result<PathBuf> {
        let audio = read_mono(input)?;
        let resampled = resample_samples(&audio.samples, audio.sample_rate, target_rate)?;

        if let Some(parent) = output.parent() {
            std::fs::create_dir_all(parent)?;
        }
        write_wav(output, &resampled, target_rate)?;

        tracing::debug!(
            input = %input.display(),
            output = %output.display(),
            from = audio.sample_rate,
            to = target_rate,
            "audio resampled"
        );

        Ok(output.to_path_buf())
    }
}

#[async_trait]
impl AudioResampler for WavResampler {
    async fn resample(&self, input: &Path, target_rate: u32, output: &Path) -> Result<PathBuf> {
        let input = input.to_path_buf();
        let output = output.to_path_buf();

        tokio::task::spawn_blocking(move || Self::resample_file(&input, target_rate, &output))
            .await
            .map_err(|e| Error::Resample(format!("resample task failed: {e}")))?
            .map_err(|e| match e {
                Error::Resample(_) => e,
                other => Error::Resample(other.to_string()),
            })
    }
}

/// Resample mono samples with rubato
///
/// The whole signal is pushed through, including the final partial chunk,
/// and the output is trimmed of the resampler delay so its length matches
/// the input duration.
///
/// # Errors
///
/// Returns error if either rate is zero or the resampler fails
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]
pub fn resample_samples(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    use rubato::{FftFixedIn, Resampler};

    if from_rate == 0 || to_rate == 0 {
        return Err(Error::Resample(format!(
            "invalid sample rates {from_rate} -> {to_rate}"
        )));
    }
    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let mut resampler = FftFixedIn::<f64>::new(
        from_rate as usize,
        to_rate as usize,
        CHUNK_SIZE,
        SUB_CHUNKS,
        1,
    )
    .map_err(|e| Error::Resample(format!("resampler init failed: {e}")))?;

    let input: Vec<f64> = samples.iter().map(|&s| f64::from(s)).collect();
    let expected =
        (samples.len() as f64 * f64::from(to_rate) / f64::from(from_rate)).ceil() as usize;
    let delay = resampler.output_delay();

    let mut output = Vec::with_capacity(expected + delay);
    for chunk in input.chunks(CHUNK_SIZE) {
        let result = if chunk.len() == CHUNK_SIZE {
            resampler.process(&[chunk][..], None)
        } else {
            resampler.process_partial(Some(&[chunk][..]), None)
        }
        .map_err(|e| Error::Resample(format!("resample failed: {e}")))?;
        output.extend_from_slice(&result[0]);
    }

    // Flush the delay line
    while output.len() < expected + delay {
        let result = resampler
            .process_partial::<&[f64]>(None, None)
            .map_err(|e| Error::Resample(format!("resample flush failed: {e}")))?;
        if result[0].is_empty() {
            break;
        }
        output.extend_from_slice(&result[0]);
    }

    Ok(output
        .iter()
        .skip(delay)
        .take(expected)
        .map(|&s| s as f32)
        .collect())
}
