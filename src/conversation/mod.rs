//! Conversation memory
//!
//! Per-user message history, the window sent to the model each turn,
//! and crash-safe persistence of the full history

mod message;
mod store;
mod window;

pub use message::{ConversationHistory, Message, Role};
pub use store::{ConversationStore, StagedSave};
pub use window::{DEFAULT_WINDOW, HistoryWindow};
