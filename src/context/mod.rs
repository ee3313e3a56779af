//! Context-window budgeting: size estimation and pair-safe trimming.

pub mod budget;
pub mod trim;

pub use budget::{
    estimate_message_tokens, estimate_messages_tokens, estimate_text_tokens, TokenBudget,
};
pub use trim::{trim_history, TrimReport, DEFAULT_MAX_EVICTIONS};
