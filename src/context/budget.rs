//! Token budget estimation.
//!
//! One token is approximated as four characters; there is no tokenizer
//! dependency. Assistant tool calls count with their serialized payload.

use crate::types::Message;

const CHARS_PER_TOKEN: f64 = 4.0;

/// Fraction of the context window kept free.
pub const DEFAULT_THRESHOLD_RATIO: f64 = 0.05;
/// Minimum number of tokens kept free.
pub const DEFAULT_THRESHOLD_FLOOR_TOKENS: usize = 5_000;

/// Estimate the token count for a string.
pub fn estimate_text_tokens(text: &str) -> f64 {
    text.chars().count() as f64 / CHARS_PER_TOKEN
}

/// Estimate tokens for a single message.
pub fn estimate_message_tokens(message: &Message) -> f64 {
    let mut tokens = message.text().map(estimate_text_tokens).unwrap_or(0.0);
    if message.has_tool_calls() {
        let payload = serde_json::to_string(message.tool_calls()).unwrap_or_default();
        tokens += estimate_text_tokens(&payload);
    }
    tokens
}

/// Estimate tokens for a message list.
pub fn estimate_messages_tokens(messages: &[Message]) -> f64 {
    messages.iter().map(estimate_message_tokens).sum()
}

/// Context-window budget for the active model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenBudget {
    pub context_window: usize,
    pub threshold_ratio: f64,
    pub threshold_floor_tokens: usize,
}

impl TokenBudget {
    pub fn new(context_window: usize) -> Self {
        Self {
            context_window,
            threshold_ratio: DEFAULT_THRESHOLD_RATIO,
            threshold_floor_tokens: DEFAULT_THRESHOLD_FLOOR_TOKENS,
        }
    }

    /// Usable tokens: the window minus `max(window * ratio, floor)`.
    pub fn threshold(&self) -> f64 {
        let window = self.context_window as f64;
        let reserve = (window * self.threshold_ratio).max(self.threshold_floor_tokens as f64);
        window - reserve
    }

    /// Whether `messages` exceed the usable part of the window.
    pub fn is_over_limit(&self, messages: &[Message]) -> bool {
        estimate_messages_tokens(messages) > self.threshold()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ToolCallRequest;

    #[test]
    fn four_chars_is_one_token() {
        assert_eq!(estimate_text_tokens("test"), 1.0);
        assert_eq!(estimate_text_tokens("hello"), 1.25);
        assert_eq!(estimate_text_tokens(""), 0.0);
    }

    #[test]
    fn tool_calls_count_serialized_payload() {
        let call = ToolCallRequest::new("a", "f", r#"{"x":1}"#);
        let payload = serde_json::to_string(&vec![call.clone()]).unwrap();
        let msg = Message::assistant_tool_calls(vec![call]);
        assert_eq!(
            estimate_message_tokens(&msg),
            payload.chars().count() as f64 / 4.0
        );
    }

    #[test]
    fn threshold_uses_floor_for_small_windows() {
        assert_eq!(TokenBudget::new(32_000).threshold(), 27_000.0);
        assert_eq!(TokenBudget::new(200_000).threshold(), 190_000.0);
    }

    #[test]
    fn appending_never_decreases_estimate() {
        let mut log = vec![Message::user("hello there")];
        let mut previous = estimate_messages_tokens(&log);
        for next in [
            Message::assistant(""),
            Message::assistant_tool_calls(vec![ToolCallRequest::new("a", "f", "")]),
            Message::tool_result("a", ""),
            Message::user("more"),
        ] {
            log.push(next);
            let current = estimate_messages_tokens(&log);
            assert!(current >= previous);
            previous = current;
        }
    }

    #[test]
    fn over_limit_compares_against_threshold() {
        let budget = TokenBudget {
            context_window: 100,
            threshold_ratio: 0.05,
            threshold_floor_tokens: 10,
        };
        // threshold = 90 tokens = 360 chars
        assert!(!budget.is_over_limit(&[Message::user("a".repeat(360))]));
        assert!(budget.is_over_limit(&[Message::user("a".repeat(361))]));
    }
}
