//! Interfaces to the external services a turn depends on
//!
//! Concrete implementations live in [`crate::voice`] and [`crate::llm`];
//! tests substitute scripted ones.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::config::VoiceConfig;
use crate::conversation::Message;
use crate::error::CaptureError;
use crate::Result;

/// One captured utterance as mono PCM samples
#[derive(Debug, Clone, PartialEq)]
pub struct RawUtterance {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl RawUtterance {
    /// Duration of the utterance in seconds
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }
}

/// Records a single utterance from the input device
#[async_trait]
pub trait SpeechCapture: Send + Sync {
    /// Block until one utterance has been heard
    ///
    /// # Errors
    ///
    /// Returns a [`CaptureError`] kind describing why nothing was captured
    async fn capture(&self) -> std::result::Result<RawUtterance, CaptureError>;
}

/// Turns an utterance into text
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe the utterance; an empty string means nothing was understood
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Transcription`] if the service fails
    async fn transcribe(&self, utterance: &RawUtterance) -> Result<String>;
}

/// Stateless chat completion
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Generate the assistant reply for the given message sequence
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Generation`] on network, timeout, or
    /// malformed response
    async fn generate(&self, messages: &[Message]) -> Result<String>;
}

/// Text-to-speech with voice conversion
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Speak `text`, writing the raw TTS artifact to `tts_path` and the
    /// converted one to `converted_path`. Returns the artifact to play.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Synthesis`] if synthesis fails
    async fn synthesize(
        &self,
        text: &str,
        voice: &VoiceConfig,
        tts_path: &Path,
        converted_path: &Path,
    ) -> Result<PathBuf>;
}

/// Sample rate normalization of an audio artifact
#[async_trait]
pub trait AudioResampler: Send + Sync {
    /// Resample `input` to `target_rate`, writing the result to `output`
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Resample`] if decoding, resampling or writing fails
    async fn resample(&self, input: &Path, target_rate: u32, output: &Path) -> Result<PathBuf>;
}

/// Plays an audio artifact on the output device
#[async_trait]
pub trait AudioPlayer: Send + Sync {
    /// Play the artifact, returning once playback has finished
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Playback`] if the file or device fails
    async fn play(&self, artifact: &Path) -> Result<()>;
}
