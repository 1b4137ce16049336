//! Configuration management for Parley
//!
//! Loaded once at startup with precedence env > toml > default, then passed
//! by value to the session and its collaborators.

pub mod file;

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use self::file::ParleyConfigFile;
use crate::conversation::DEFAULT_WINDOW;
use crate::pipeline::DEFAULT_ALLOWED_SYMBOLS;
use crate::{Error, Result};

/// Default Ollama endpoint
const DEFAULT_LLM_URL: &str = "http://localhost:11434";

/// Default chat model
const DEFAULT_LLM_MODEL: &str = "llama3";

/// Default Applio Gradio endpoint
const DEFAULT_APPLIO_URL: &str = "http://127.0.0.1:6969";

/// Default playback sample rate
pub const DEFAULT_RESAMPLE_RATE: u32 = 44_100;

/// Default instruction prefix for each utterance
const DEFAULT_START_PROMPT: &str =
    "Reply in one or two short spoken sentences without lists or formatting. ";

/// Parley configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Session configuration
    pub session: SessionConfig,

    /// Instruction prefix prepended to every user utterance
    pub start_prompt: String,

    /// Language model configuration
    pub llm: LlmConfig,

    /// Voice synthesis configuration
    pub voice: VoiceConfig,

    /// Audio device configuration
    pub audio: AudioConfig,

    /// Speech-to-text configuration
    pub stt: SttConfig,

    /// Response filter configuration
    pub filter: FilterConfig,

    /// History configuration
    pub history: HistoryConfig,

    /// API keys
    pub api_keys: ApiKeys,
}

/// Session identity and termination
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// User whose history is loaded and saved
    pub user_id: String,

    /// Utterance that ends the session (case-insensitive)
    pub exit_keyword: String,
}

/// Language model configuration
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Ollama base URL
    pub url: String,

    /// Model identifier
    pub model: String,

    /// Per-request timeout
    pub timeout: Duration,
}

/// Voice synthesis configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// TTS voice identifier
    pub tts_voice: String,

    /// Applio Gradio server URL
    pub applio_url: String,

    /// Voice conversion model weights
    pub pth_path: Option<PathBuf>,

    /// Voice conversion index file
    pub index_path: Option<PathBuf>,

    /// Raw TTS artifact path
    pub tts_output_path: PathBuf,

    /// Converted artifact path
    pub rvc_output_path: PathBuf,

    /// Sample rate artifacts are resampled to before playback
    pub resample_rate: u32,

    /// Per-request timeout for Applio, covering the whole synthesis
    pub timeout: Duration,
}

/// Audio device selection by index; `None` is the host default
#[derive(Debug, Clone, Copy, Default)]
pub struct AudioConfig {
    pub input_device: Option<usize>,
    pub output_device: Option<usize>,
}

/// How utterances are transcribed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TranscriptionMode {
    /// `OpenAI` transcription API
    #[default]
    Whisper,
    /// Deepgram API
    Deepgram,
    /// Local whisper server
    Local,
}

impl FromStr for TranscriptionMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "whisper" | "openai" => Ok(Self::Whisper),
            "deepgram" => Ok(Self::Deepgram),
            "local" => Ok(Self::Local),
            other => Err(Error::Config(format!(
                "unknown stt provider '{other}' (expected whisper, deepgram or local)"
            ))),
        }
    }
}

impl TranscriptionMode {
    /// Model used when none is configured
    #[must_use]
    pub const fn default_model(self) -> &'static str {
        match self {
            Self::Whisper => "whisper-1",
            Self::Deepgram => "nova-2",
            // whisper.cpp serves whatever model it was started with
            Self::Local => "",
        }
    }
}

/// Speech-to-text configuration
#[derive(Debug, Clone)]
pub struct SttConfig {
    /// Transcription backend
    pub mode: TranscriptionMode,

    /// Model name passed to the backend
    pub model: String,

    /// Base URL of the local whisper server
    pub url: String,
}

/// Response filter configuration
#[derive(Debug, Clone)]
pub struct FilterConfig {
    pub allowed_symbols: String,
    pub forbidden_chars: String,
}

/// History configuration
#[derive(Debug, Clone)]
pub struct HistoryConfig {
    /// Number of recent messages sent to the model
    pub window: usize,

    /// Directory holding history records
    pub dir: PathBuf,
}

/// API keys for external services
#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    /// `OpenAI` API key (for Whisper)
    pub openai: Option<String>,

    /// `Deepgram` API key (optional STT)
    pub deepgram: Option<String>,
}

/// Return the data directory: `~/.local/share/parley` on Linux
pub fn data_dir() -> PathBuf {
    directories::BaseDirs::new()
        .map_or_else(|| PathBuf::from(".parley"), |d| d.data_dir().join("parley"))
}

impl Config {
    /// Load configuration from the environment and a TOML file
    ///
    /// An explicit `path` must exist and parse; otherwise the standard path
    /// is used when present.
    ///
    /// # Errors
    ///
    /// Returns error if the explicit file is unusable or a value is invalid
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let fc = match path {
            Some(path) => file::read_config_file(path)?,
            None => file::load_config_file(),
        };

        Self::from_sources(fc, |key| std::env::var(key).ok(), &data_dir())
    }

    /// Build configuration from a parsed file and an environment lookup
    ///
    /// # Errors
    ///
    /// Returns error if a value is invalid
    pub fn from_sources(
        fc: ParleyConfigFile,
        env: impl Fn(&str) -> Option<String>,
        data_dir: &Path,
    ) -> Result<Self> {
        let session = SessionConfig {
            user_id: env("PARLEY_USER")
                .or(fc.session.user_id)
                .unwrap_or_else(|| "user".to_string()),
            exit_keyword: fc
                .session
                .exit_keyword
                .unwrap_or_else(|| "exit".to_string()),
        };

        if session.user_id.trim().is_empty() {
            return Err(Error::Config("session user id must not be empty".to_string()));
        }
        if session.exit_keyword.trim().is_empty() {
            return Err(Error::Config("exit keyword must not be empty".to_string()));
        }

        let start_prompt = env("PARLEY_START_PROMPT")
            .or(fc.prompt.start_prompt)
            .unwrap_or_else(|| DEFAULT_START_PROMPT.to_string());

        let llm = LlmConfig {
            url: env("PARLEY_LLM_URL")
                .or_else(|| env("OLLAMA_HOST"))
                .or(fc.llm.url)
                .unwrap_or_else(|| DEFAULT_LLM_URL.to_string()),
            model: env("PARLEY_LLM_MODEL")
                .or(fc.llm.model)
                .unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
            timeout: Duration::from_secs(fc.llm.timeout_secs.unwrap_or(120)),
        };

        let artifact_dir = data_dir.join("audio");
        let voice = VoiceConfig {
            tts_voice: env("PARLEY_TTS_VOICE")
                .or(fc.voice.tts_voice)
                .unwrap_or_else(|| "en-US-AriaNeural".to_string()),
            applio_url: env("PARLEY_APPLIO_URL")
                .or(fc.voice.applio_url)
                .unwrap_or_else(|| DEFAULT_APPLIO_URL.to_string()),
            pth_path: fc.voice.pth_path.map(PathBuf::from),
            index_path: fc.voice.index_path.map(PathBuf::from),
            tts_output_path: fc
                .voice
                .tts_output_path
                .map_or_else(|| artifact_dir.join("tts_output.wav"), PathBuf::from),
            rvc_output_path: fc
                .voice
                .rvc_output_path
                .map_or_else(|| artifact_dir.join("rvc_output.wav"), PathBuf::from),
            resample_rate: fc.voice.resample_rate.unwrap_or(DEFAULT_RESAMPLE_RATE),
            timeout: Duration::from_secs(fc.voice.timeout_secs.unwrap_or(300)),
        };

        if voice.resample_rate == 0 {
            return Err(Error::Config("voice.resample_rate must be positive".to_string()));
        }

        let audio = AudioConfig {
            input_device: parse_env(&env, "PARLEY_INPUT_DEVICE")?.or(fc.audio.input_device),
            output_device: parse_env(&env, "PARLEY_OUTPUT_DEVICE")?.or(fc.audio.output_device),
        };

        let stt_mode: TranscriptionMode = env("PARLEY_STT_PROVIDER")
            .or(fc.stt.provider)
            .map(|s| s.parse::<TranscriptionMode>())
            .transpose()?
            .unwrap_or_default();
        let stt = SttConfig {
            mode: stt_mode,
            model: fc
                .stt
                .model
                .unwrap_or_else(|| stt_mode.default_model().to_string()),
            url: fc
                .stt
                .url
                .unwrap_or_else(|| "http://127.0.0.1:8080".to_string()),
        };

        let filter = FilterConfig {
            allowed_symbols: fc
                .filter
                .allowed_symbols
                .unwrap_or_else(|| DEFAULT_ALLOWED_SYMBOLS.to_string()),
            forbidden_chars: fc.filter.forbidden_chars.unwrap_or_default(),
        };

        let history = HistoryConfig {
            window: parse_env(&env, "PARLEY_HISTORY_WINDOW")?
                .or(fc.history.window)
                .unwrap_or(DEFAULT_WINDOW),
            dir: env("PARLEY_HISTORY_DIR")
                .or(fc.history.dir)
                .map_or_else(|| data_dir.join("history"), PathBuf::from),
        };

        let api_keys = ApiKeys {
            openai: env("OPENAI_API_KEY").or(fc.api_keys.openai),
            deepgram: env("DEEPGRAM_API_KEY").or(fc.api_keys.deepgram),
        };

        Ok(Self {
            session,
            start_prompt,
            llm,
            voice,
            audio,
            stt,
            filter,
            history,
            api_keys,
        })
    }
}

/// Parse an optional numeric environment variable
fn parse_env<T: FromStr>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>> {
    env(key)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|_| Error::Config(format!("{key} must be a number, got '{raw}'")))
        })
        .transpose()
}
