//! Error types for Parley

use thiserror::Error;

/// Result type alias for Parley operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while running a conversation
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Speech capture error
    #[error("capture error: {0}")]
    Capture(#[from] CaptureError),

    /// Speech-to-text error
    #[error("transcription error: {0}")]
    Transcription(String),

    /// Language model error
    #[error("generation error: {0}")]
    Generation(String),

    /// Text-to-speech / voice conversion error
    #[error("synthesis error: {0}")]
    Synthesis(String),

    /// Resampling error
    #[error("resample error: {0}")]
    Resample(String),

    /// Playback error
    #[error("playback error: {0}")]
    Playback(String),

    /// Conversation history persistence error
    #[error("storage error: {0}")]
    Storage(String),

    /// Audio device error
    #[error("audio error: {0}")]
    Audio(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Why no utterance could be captured
///
/// Every kind is recoverable: the session skips the turn and listens again
#[derive(Debug, Error)]
pub enum CaptureError {
    /// Audio was heard but nothing intelligible came out of it
    #[error("no speech understood")]
    NoSpeech,

    /// The recognition service could not be reached
    #[error("speech service unavailable: {0}")]
    Unavailable(String),

    /// The input device failed
    #[error("input device failure: {0}")]
    Device(String),
}
