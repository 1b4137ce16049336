//! Parley - a spoken conversation loop with a local language model
//!
//! This library provides the pieces of the loop:
//! - Microphone capture and transcription
//! - Chat generation through Ollama
//! - Speech synthesis and voice conversion through Applio
//! - Resampling and playback
//! - Durable per-user conversation history
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                     Session                          │
//! │   listen  │  transcribe  │  exit keyword  │  save    │
//! └────────────────────┬────────────────────────────────┘
//!                      │ one turn per utterance
//! ┌────────────────────▼────────────────────────────────┐
//! │                  Turn pipeline                       │
//! │ compose → generate → filter → synthesize → resample  │
//! │                    → play                            │
//! └────────────────────┬────────────────────────────────┘
//!                      │ checkpoint after generate
//! ┌────────────────────▼────────────────────────────────┐
//! │               Conversation store                     │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod conversation;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod session;
pub mod voice;

pub use config::Config;
pub use conversation::{ConversationHistory, ConversationStore, HistoryWindow, Message, Role};
pub use error::{CaptureError, Error, Result};
pub use pipeline::{Stage, TurnOutcome, TurnPipeline, TurnStages};
pub use session::{ExitReason, Session, SessionSummary};
