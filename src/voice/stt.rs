//! Speech-to-text (STT) processing

use async_trait::async_trait;

use super::capture::samples_to_wav;
use crate::config::{ApiKeys, SttConfig, TranscriptionMode};
use crate::pipeline::{RawUtterance, Transcriber};
use crate::{Error, Result};

const OPENAI_API_URL: &str = "https://api.openai.com";
const DEEPGRAM_API_URL: &str = "https://api.deepgram.com";

/// Response from Whisper-style transcription endpoints
#[derive(serde::Deserialize)]
struct WhisperResponse {
    text: String,
}

/// Response from Deepgram transcription API
#[derive(serde::Deserialize)]
struct DeepgramResponse {
    results: DeepgramResults,
}

#[derive(serde::Deserialize)]
struct DeepgramResults {
    channels: Vec<DeepgramChannel>,
}

#[derive(serde::Deserialize)]
struct DeepgramChannel {
    alternatives: Vec<DeepgramAlternative>,
}

#[derive(serde::Deserialize)]
struct DeepgramAlternative {
    transcript: String,
}

/// Transcribes captured utterances through one of the supported backends
pub struct SpeechToText {
    client: reqwest::Client,
    mode: TranscriptionMode,
    api_key: String,
    model: String,
    base_url: String,
}

impl SpeechToText {
    /// Build the transcriber selected by configuration
    ///
    /// # Errors
    ///
    /// Returns error if the chosen hosted backend has no API key
    pub fn from_config(stt: &SttConfig, keys: &ApiKeys) -> Result<Self> {
        let (api_key, base_url) = match stt.mode {
            TranscriptionMode::Whisper => (
                require_key(keys.openai.as_deref(), "OpenAI API key required for Whisper")?,
                OPENAI_API_URL.to_string(),
            ),
            TranscriptionMode::Deepgram => (
                require_key(keys.deepgram.as_deref(), "Deepgram API key required")?,
                DEEPGRAM_API_URL.to_string(),
            ),
            TranscriptionMode::Local => (String::new(), stt.url.clone()),
        };

        Ok(Self {
            client: reqwest::Client::new(),
            mode: stt.mode,
            api_key,
            model: stt.model.clone(),
            base_url,
        })
    }

    /// Point the transcriber at a different host
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Transcription backend in use
    #[must_use]
    pub const fn mode(&self) -> TranscriptionMode {
        self.mode
    }

    /// Transcribe WAV bytes to text
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the backend rejects it
    pub async fn transcribe_wav(&self, audio: &[u8]) -> Result<String> {
        let text = match self.mode {
            TranscriptionMode::Whisper => self.transcribe_whisper(audio).await,
            TranscriptionMode::Deepgram => self.transcribe_deepgram(audio).await,
            TranscriptionMode::Local => self.transcribe_local(audio).await,
        }?;

        let text = text.trim().to_string();
        tracing::info!(transcript = %text, "transcription complete");
        Ok(text)
    }

    /// Transcribe using the `OpenAI` transcription API
    async fn transcribe_whisper(&self, audio: &[u8]) -> Result<String> {
        tracing::debug!(audio_bytes = audio.len(), "starting Whisper transcription");

        let form = reqwest::multipart::Form::new()
            .part("file", wav_part(audio)?)
            .text("model", self.model.clone());

        let response = self
            .client
            .post(format!("{}/v1/audio/transcriptions", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::Transcription(format!("Whisper request failed: {e}")))?;

        let result: WhisperResponse = parse_response(response, "Whisper").await?;
        Ok(result.text)
    }

    /// Transcribe using Deepgram
    async fn transcribe_deepgram(&self, audio: &[u8]) -> Result<String> {
        tracing::debug!(audio_bytes = audio.len(), "starting Deepgram transcription");

        let response = self
            .client
            .post(format!("{}/v1/listen", self.base_url))
            .query(&[("model", self.model.as_str()), ("punctuate", "true")])
            .header("Authorization", format!("Token {}", self.api_key))
            .header("Content-Type", "audio/wav")
            .body(audio.to_vec())
            .send()
            .await
            .map_err(|e| Error::Transcription(format!("Deepgram request failed: {e}")))?;

        let result: DeepgramResponse = parse_response(response, "Deepgram").await?;

        Ok(result
            .results
            .channels
            .first()
            .and_then(|c| c.alternatives.first())
            .map(|a| a.transcript.clone())
            .unwrap_or_default())
    }

    /// Transcribe using a local whisper server
    async fn transcribe_local(&self, audio: &[u8]) -> Result<String> {
        tracing::debug!(
            audio_bytes = audio.len(),
            url = %self.base_url,
            "starting local transcription"
        );

        let form = reqwest::multipart::Form::new()
            .part("file", wav_part(audio)?)
            .text("response_format", "json");

        let response = self
            .client
            .post(format!("{}/inference", self.base_url))
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::Transcription(format!("local whisper unreachable: {e}")))?;

        let result: WhisperResponse = parse_response(response, "local whisper").await?;
        Ok(result.text)
    }
}

#[async_trait]
impl Transcriber for SpeechToText {
    async fn transcribe(&self, utterance: &RawUtterance) -> Result<String> {
        let wav = samples_to_wav(&utterance.samples, utterance.sample_rate)
            .map_err(|e| Error::Transcription(e.to_string()))?;
        self.transcribe_wav(&wav).await
    }
}

fn require_key(key: Option<&str>, message: &str) -> Result<String> {
    key.filter(|k| !k.is_empty())
        .map(ToString::to_string)
        .ok_or_else(|| Error::Config(message.to_string()))
}

fn wav_part(audio: &[u8]) -> Result<reqwest::multipart::Part> {
    reqwest::multipart::Part::bytes(audio.to_vec())
        .file_name("audio.wav")
        .mime_str("audio/wav")
        .map_err(|e| Error::Transcription(e.to_string()))
}

async fn parse_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
    backend: &str,
) -> Result<T> {
    let status = response.status();
    tracing::debug!(status = %status, backend, "received response");

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        tracing::error!(status = %status, body = %body, backend, "transcription API error");
        return Err(Error::Transcription(format!(
            "{backend} API error {status}: {body}"
        )));
    }

    response
        .json()
        .await
        .map_err(|e| Error::Transcription(format!("invalid {backend} response: {e}")))
}
