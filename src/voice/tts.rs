//! Text-to-speech through an Applio server
//!
//! Applio runs TTS followed by RVC voice conversion and exposes it as a
//! Gradio endpoint. A call is two requests: a POST that queues the job and
//! returns an event id, then a GET that streams server-sent events until the
//! job completes or fails.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::config::VoiceConfig;
use crate::pipeline::Synthesizer;
use crate::{Error, Result};

const ENDPOINT: &str = "run_tts_script";

#[derive(serde::Deserialize)]
struct QueuedCall {
    event_id: String,
}

/// Synthesizes and voice-converts speech through Applio
pub struct ApplioClient {
    client: reqwest::Client,
    base_url: String,
}

impl ApplioClient {
    /// Create a client for the configured Applio server
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(config: &VoiceConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(Error::Http)?;

        Ok(Self {
            client,
            base_url: config.applio_url.trim_end_matches('/').to_string(),
        })
    }

    /// Queue a TTS job and return its event id
    async fn queue(&self, data: Vec<Value>) -> Result<String> {
        let response = self
            .client
            .post(format!("{}/gradio_api/call/{ENDPOINT}", self.base_url))
            .json(&json!({ "data": data }))
            .send()
            .await
            .map_err(|e| Error::Synthesis(format!("Applio unreachable: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Synthesis(format!("Applio error {status}: {body}")));
        }

        let queued: QueuedCall = response
            .json()
            .await
            .map_err(|e| Error::Synthesis(format!("invalid Applio response: {e}")))?;
        Ok(queued.event_id)
    }

    /// Wait for a queued job and return its output data
    async fn result(&self, event_id: &str) -> Result<Value> {
        let response = self
            .client
            .get(format!(
                "{}/gradio_api/call/{ENDPOINT}/{event_id}",
                self.base_url
            ))
            .send()
            .await
            .map_err(|e| Error::Synthesis(format!("Applio result request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Synthesis(format!("Applio stream failed: {e}")))?;
        if !status.is_success() {
            return Err(Error::Synthesis(format!("Applio error {status}: {body}")));
        }

        parse_event_stream(&body)
    }
}

#[async_trait]
impl Synthesizer for ApplioClient {
    async fn synthesize(
        &self,
        text: &str,
        voice: &VoiceConfig,
        tts_path: &Path,
        converted_path: &Path,
    ) -> Result<PathBuf> {
        for path in [tts_path, converted_path] {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    Error::Synthesis(format!("cannot create {}: {e}", parent.display()))
                })?;
            }
        }

        let event_id = self
            .queue(request_data(text, voice, tts_path, converted_path))
            .await?;
        tracing::debug!(event_id = %event_id, "Applio job queued");

        let output = self.result(&event_id).await?;
        tracing::info!(response = %output, "Applio response");

        Ok(converted_path.to_path_buf())
    }
}

/// Positional inputs of `run_tts_script`, defaults for everything but the
/// text, voice, output paths and model files
fn request_data(
    text: &str,
    voice: &VoiceConfig,
    tts_path: &Path,
    converted_path: &Path,
) -> Vec<Value> {
    let path_or_empty = |p: Option<&PathBuf>| {
        p.map(|p| p.display().to_string()).unwrap_or_default()
    };

    vec![
        json!(""),                 // tts_file
        json!(text),               // tts_text
        json!(voice.tts_voice),    // tts_voice
        json!(0),                  // tts_rate
        json!(0),                  // pitch
        json!(0.75),               // index_rate
        json!(1),                  // volume_envelope
        json!(0.5),                // protect
        json!(128),                // hop_length
        json!("rmvpe"),            // f0_method
        json!(tts_path.display().to_string()),
        json!(converted_path.display().to_string()),
        json!(path_or_empty(voice.pth_path.as_ref())),
        json!(path_or_empty(voice.index_path.as_ref())),
        json!(false),              // split_audio
        json!(false),              // f0_autotune
        json!(1),                  // f0_autotune_strength
        json!(true),               // clean_audio
        json!(0.5),                // clean_strength
        json!("WAV"),              // export_format
        Value::Null,               // f0_file
        json!("contentvec"),       // embedder_model
        Value::Null,               // embedder_model_custom
        json!(0),                  // sid
    ]
}

/// Extract the data of the `complete` event from a Gradio event stream
fn parse_event_stream(body: &str) -> Result<Value> {
    let mut event = "";

    for line in body.lines() {
        if let Some(name) = line.strip_prefix("event:") {
            event = name.trim();
        } else if let Some(data) = line.strip_prefix("data:") {
            match event {
                "complete" => {
                    return serde_json::from_str(data.trim()).map_err(|e| {
                        Error::Synthesis(format!("invalid Applio result data: {e}"))
                    });
                }
                "error" => {
                    return Err(Error::Synthesis(format!(
                        "Applio job failed: {}",
                        data.trim()
                    )));
                }
                _ => {}
            }
        }
    }

    Err(Error::Synthesis(
        "Applio stream ended without a result".to_string(),
    ))
}
