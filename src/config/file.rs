//! TOML configuration file loading
//!
//! Supports `~/.config/parley/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::{Error, Result};

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct ParleyConfigFile {
    /// Language model configuration
    #[serde(default)]
    pub llm: LlmFileConfig,

    /// Prompt configuration
    #[serde(default)]
    pub prompt: PromptFileConfig,

    /// Voice synthesis configuration
    #[serde(default)]
    pub voice: VoiceFileConfig,

    /// Audio device configuration
    #[serde(default)]
    pub audio: AudioFileConfig,

    /// Speech-to-text configuration
    #[serde(default)]
    pub stt: SttFileConfig,

    /// Response filter configuration
    #[serde(default)]
    pub filter: FilterFileConfig,

    /// History configuration
    #[serde(default)]
    pub history: HistoryFileConfig,

    /// Session configuration
    #[serde(default)]
    pub session: SessionFileConfig,

    /// API keys for external services
    #[serde(default)]
    pub api_keys: ApiKeysFileConfig,
}

/// LLM-related configuration
#[derive(Debug, Default, Deserialize)]
pub struct LlmFileConfig {
    /// Model identifier (e.g. "llama3")
    pub model: Option<String>,

    /// Ollama base URL
    pub url: Option<String>,

    /// Request timeout in seconds
    pub timeout_secs: Option<u64>,
}

/// Prompt configuration
#[derive(Debug, Default, Deserialize)]
pub struct PromptFileConfig {
    /// Instruction prefix prepended to every utterance
    pub start_prompt: Option<String>,
}

/// Voice synthesis configuration
#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    /// TTS voice identifier (e.g. "en-US-AriaNeural")
    pub tts_voice: Option<String>,

    /// Applio Gradio server URL
    pub applio_url: Option<String>,

    /// Voice conversion model weights
    pub pth_path: Option<String>,

    /// Voice conversion index file
    pub index_path: Option<String>,

    /// Where the raw TTS artifact is written
    pub tts_output_path: Option<String>,

    /// Where the converted artifact is written
    pub rvc_output_path: Option<String>,

    /// Playback sample rate artifacts are resampled to
    pub resample_rate: Option<u32>,

    /// Applio request timeout in seconds
    pub timeout_secs: Option<u64>,
}

/// Audio device configuration
#[derive(Debug, Default, Deserialize)]
pub struct AudioFileConfig {
    /// Input device index (see `parley devices`)
    pub input_device: Option<usize>,

    /// Output device index
    pub output_device: Option<usize>,
}

/// Speech-to-text configuration
#[derive(Debug, Default, Deserialize)]
pub struct SttFileConfig {
    /// "whisper", "deepgram" or "local"
    pub provider: Option<String>,

    /// STT model (e.g. "whisper-1", "nova-2")
    pub model: Option<String>,

    /// Base URL of a local whisper server
    pub url: Option<String>,
}

/// Response filter configuration
#[derive(Debug, Default, Deserialize)]
pub struct FilterFileConfig {
    /// Characters removed from replies even if otherwise allowed
    pub forbidden_chars: Option<String>,

    /// Punctuation and whitespace kept alongside alphanumerics
    pub allowed_symbols: Option<String>,
}

/// History configuration
#[derive(Debug, Default, Deserialize)]
pub struct HistoryFileConfig {
    /// Number of recent messages sent to the model
    pub window: Option<usize>,

    /// Directory holding history records
    pub dir: Option<String>,
}

/// Session configuration
#[derive(Debug, Default, Deserialize)]
pub struct SessionFileConfig {
    /// User whose history is loaded
    pub user_id: Option<String>,

    /// Utterance that ends the session
    pub exit_keyword: Option<String>,
}

/// API keys configuration
#[derive(Debug, Default, Deserialize)]
pub struct ApiKeysFileConfig {
    pub openai: Option<String>,
    pub deepgram: Option<String>,
}

/// Load the TOML config file from the standard path
///
/// Returns `ParleyConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> ParleyConfigFile {
    let Some(path) = config_file_path() else {
        return ParleyConfigFile::default();
    };

    if !path.exists() {
        return ParleyConfigFile::default();
    }

    match read_config_file(&path) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to load config file, using defaults"
            );
            ParleyConfigFile::default()
        }
    }
}

/// Read and parse a specific config file
///
/// # Errors
///
/// Returns error if the file cannot be read or is not valid TOML
pub fn read_config_file(path: &Path) -> Result<ParleyConfigFile> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("failed to read {}: {e}", path.display()))
    })?;
    let config = toml::from_str(&content)?;
    tracing::info!(path = %path.display(), "loaded config file");
    Ok(config)
}

/// Return the config file path: `~/.config/parley/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("parley").join("config.toml"))
}
