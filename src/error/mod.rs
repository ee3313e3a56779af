//! Error types for roci-chat.

use thiserror::Error;

/// Primary error type for all chat runtime operations.
///
/// Cancellation is deliberately absent: an aborted turn ends with
/// [`LoopStatus::Cancelled`](crate::agent_loop::LoopStatus) instead of an error.
#[derive(Error, Debug)]
pub enum ChatError {
    /// Rejected before any turn started (empty instructions, unavailable mode).
    #[error("Validation error: {0}")]
    Validation(String),

    /// The completion service could not be reached or refused the request.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The completion stream failed part-way through.
    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Tool execution error: {tool_name} — {message}")]
    ToolExecution { tool_name: String, message: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The model answered, but not in the shape the caller asked for.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("History error: {0}")]
    History(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    TomlDe(#[from] toml::de::Error),
}

/// Broad error category for routing recovery logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    Transport,
    ToolExecution,
    Persistence,
    Configuration,
    Internal,
}

impl ChatError {
    /// Shorthand for a tool failure.
    pub fn tool(tool_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolExecution {
            tool_name: tool_name.into(),
            message: message.into(),
        }
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Validation(_) | Self::InvalidArgument(_) => ErrorCategory::Validation,
            Self::Transport(_) | Self::Stream(_) | Self::InvalidResponse(_) => {
                ErrorCategory::Transport
            }
            Self::ToolExecution { .. } => ErrorCategory::ToolExecution,
            Self::History(_) | Self::Io(_) | Self::Serialization(_) => ErrorCategory::Persistence,
            Self::Configuration(_) | Self::TomlDe(_) => ErrorCategory::Configuration,
            Self::InvalidState(_) => ErrorCategory::Internal,
        }
    }

    /// Whether this error aborts the turn and flags the originating user message.
    ///
    /// Validation errors are raised before a turn exists, so they never flag anything.
    pub fn is_turn_fatal(&self) -> bool {
        !matches!(self.category(), ErrorCategory::Validation)
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, ChatError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_failures_are_turn_fatal() {
        let err = ChatError::tool("run_script", "exit code 1");
        assert_eq!(err.category(), ErrorCategory::ToolExecution);
        assert!(err.is_turn_fatal());
        assert_eq!(
            err.to_string(),
            "Tool execution error: run_script — exit code 1"
        );
    }

    #[test]
    fn validation_is_not_turn_fatal() {
        let err = ChatError::Validation("Instructions are required".into());
        assert_eq!(err.category(), ErrorCategory::Validation);
        assert!(!err.is_turn_fatal());
    }

    #[test]
    fn stream_failures_classify_as_transport() {
        assert_eq!(
            ChatError::Stream("connection reset".into()).category(),
            ErrorCategory::Transport
        );
    }
}
