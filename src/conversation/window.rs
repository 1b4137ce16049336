//! History window sent to the language model
//!
//! Bounds request size by sending the anchor message plus the most recent
//! messages. Only the outgoing request is windowed; the stored history is
//! never truncated.

use super::{ConversationHistory, Message};

/// Default number of recent messages sent per turn
pub const DEFAULT_WINDOW: usize = 20;

/// Windowing policy over a conversation history
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryWindow {
    size: usize,
}

impl Default for HistoryWindow {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

impl HistoryWindow {
    /// Create a window keeping the `size` most recent messages
    #[must_use]
    pub const fn new(size: usize) -> Self {
        Self { size }
    }

    /// Messages to send for the next turn
    ///
    /// Histories up to `size` messages are returned whole. Longer ones yield
    /// the anchor followed by the last `size` messages, in original order.
    #[must_use]
    pub fn window(&self, history: &ConversationHistory) -> Vec<Message> {
        let messages = history.messages();
        if messages.len() <= self.size {
            return messages.to_vec();
        }

        let tail = &messages[messages.len() - self.size..];
        let mut windowed = Vec::with_capacity(self.size + 1);
        windowed.push(messages[0].clone());
        windowed.extend_from_slice(tail);
        windowed
    }
}
