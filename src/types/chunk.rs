//! Streaming completion chunks.

use serde::{Deserialize, Serialize};

/// One partial completion received from the completion service.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CompletionChunk {
    /// Incremental answer text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Partial tool calls, keyed by their stream-local index.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallDelta>,
}

impl CompletionChunk {
    /// A text-only chunk.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            tool_calls: Vec::new(),
        }
    }

    /// A chunk carrying tool-call deltas only.
    pub fn tool_calls(deltas: Vec<ToolCallDelta>) -> Self {
        Self {
            text: None,
            tool_calls: deltas,
        }
    }
}

/// A fragment of one tool call.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ToolCallDelta {
    pub index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<FunctionDelta>,
}

impl ToolCallDelta {
    /// The opening delta of a call: id, name, and the first arguments fragment.
    pub fn start(
        index: usize,
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            index,
            id: Some(id.into()),
            function: Some(FunctionDelta {
                name: Some(name.into()),
                arguments: Some(arguments.into()),
            }),
        }
    }

    /// A continuation delta appending to the arguments of `index`.
    pub fn arguments(index: usize, fragment: impl Into<String>) -> Self {
        Self {
            index,
            id: None,
            function: Some(FunctionDelta {
                name: None,
                arguments: Some(fragment.into()),
            }),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FunctionDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// A fragment of the serialized arguments blob.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}
