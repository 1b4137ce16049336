//! Response text filtering before speech synthesis
//!
//! Keeps alphanumerics and an allow-list of punctuation and whitespace,
//! minus any explicitly forbidden characters. Total and idempotent.

/// Punctuation and whitespace kept by default
pub const DEFAULT_ALLOWED_SYMBOLS: &str = " .,!?'-:;\n";

/// Character filter applied to model replies
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseFilter {
    allowed: Vec<char>,
    forbidden: Vec<char>,
}

impl Default for ResponseFilter {
    fn default() -> Self {
        Self::new(DEFAULT_ALLOWED_SYMBOLS, "")
    }
}

impl ResponseFilter {
    /// Create a filter from the allowed symbol set and the forbidden set
    #[must_use]
    pub fn new(allowed_symbols: &str, forbidden_chars: &str) -> Self {
        Self {
            allowed: allowed_symbols.chars().collect(),
            forbidden: forbidden_chars.chars().collect(),
        }
    }

    /// Whether a character survives filtering
    #[must_use]
    pub fn keeps(&self, c: char) -> bool {
        (c.is_alphanumeric() || self.allowed.contains(&c)) && !self.forbidden.contains(&c)
    }

    /// Filter text, logging what was removed
    #[must_use]
    pub fn apply(&self, text: &str) -> String {
        let (kept, removed): (String, String) = text.chars().partition(|&c| self.keeps(c));

        if !removed.is_empty() {
            tracing::debug!(removed = %removed, "filtered characters from response");
        }

        kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forbidden_char_is_removed_from_alphanumerics() {
        let filter = ResponseFilter::new(DEFAULT_ALLOWED_SYMBOLS, "o");
        assert_eq!(filter.apply("Hello, World! 123"), "Hell, Wrld! 123");
    }

    #[test]
    fn symbols_outside_allow_list_are_removed() {
        let filter = ResponseFilter::default();
        assert_eq!(
            filter.apply("**Sure!** Here's a list: #1 (one) & *two*"),
            "Sure! Here's a list: 1 one  two"
        );
    }

    #[test]
    fn unicode_letters_are_alphanumeric() {
        let filter = ResponseFilter::default();
        assert_eq!(filter.apply("Café über 42 🎉"), "Café über 42 ");
    }

    #[test]
    fn filtering_is_idempotent() {
        let filter = ResponseFilter::new(" .,!?", "xZ");
        let samples = [
            "",
            "plain text",
            "Emoji 😀 and *markdown* `code` x marks Zed",
            "tabs\tand\nnewlines\r\n",
            "¿Qué tal? — «bien»",
        ];
        for sample in samples {
            let once = filter.apply(sample);
            assert_eq!(filter.apply(&once), once);
            assert!(once.chars().all(|c| filter.keeps(c)));
        }
    }

    #[test]
    fn filtering_is_deterministic() {
        let filter = ResponseFilter::new(DEFAULT_ALLOWED_SYMBOLS, "o");
        assert_eq!(
            filter.apply("Hello, World! 123"),
            filter.apply("Hello, World! 123")
        );
    }

    #[test]
    fn forbidden_wins_over_allowed() {
        let filter = ResponseFilter::new("!,", "!");
        assert_eq!(filter.apply("Hi, there!"), "Hi,there");
    }
}
