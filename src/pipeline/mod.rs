//! The turn pipeline and the collaborators it drives

mod collaborators;
mod filter;
mod turn;

pub use collaborators::{
    AudioPlayer, AudioResampler, LanguageModel, RawUtterance, SpeechCapture, Synthesizer,
    Transcriber,
};
pub use filter::{DEFAULT_ALLOWED_SYMBOLS, ResponseFilter};
pub use turn::{Stage, TurnOutcome, TurnPipeline, TurnStages, resampled_path};
