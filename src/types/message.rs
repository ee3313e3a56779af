//! Canonical, model-facing message types.

use serde::{Deserialize, Serialize};
use strum::Display;

/// Conversation role.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A message in the canonical log sent to the completion service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Message {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCallRequest>,
    },
    Tool {
        tool_call_id: String,
        content: String,
    },
}

impl Message {
    /// Create a system message.
    pub fn system(text: impl Into<String>) -> Self {
        Self::System {
            content: text.into(),
        }
    }

    /// Create a user message.
    pub fn user(text: impl Into<String>) -> Self {
        Self::User {
            content: text.into(),
        }
    }

    /// Create a plain-text assistant message.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::Assistant {
            content: Some(text.into()),
            tool_calls: Vec::new(),
        }
    }

    /// Create an assistant message carrying tool-call requests.
    pub fn assistant_tool_calls(tool_calls: Vec<ToolCallRequest>) -> Self {
        Self::Assistant {
            content: None,
            tool_calls,
        }
    }

    /// Create a tool result answering `tool_call_id`.
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::Tool {
            tool_call_id: tool_call_id.into(),
            content: content.into(),
        }
    }

    pub fn role(&self) -> Role {
        match self {
            Self::System { .. } => Role::System,
            Self::User { .. } => Role::User,
            Self::Assistant { .. } => Role::Assistant,
            Self::Tool { .. } => Role::Tool,
        }
    }

    /// Text content, if any.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::System { content } | Self::User { content } | Self::Tool { content, .. } => {
                Some(content)
            }
            Self::Assistant { content, .. } => content.as_deref(),
        }
    }

    /// Tool calls requested by this message (empty unless an assistant turn).
    pub fn tool_calls(&self) -> &[ToolCallRequest] {
        match self {
            Self::Assistant { tool_calls, .. } => tool_calls,
            _ => &[],
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls().is_empty()
    }

    /// The call id this tool message answers.
    pub fn tool_call_id(&self) -> Option<&str> {
        match self {
            Self::Tool { tool_call_id, .. } => Some(tool_call_id),
            _ => None,
        }
    }
}

/// A tool invocation requested by the model.
///
/// `arguments` stays a raw serialized blob; tools parse it themselves.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

impl ToolCallRequest {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }
}

/// A break in the assistant-tool-call / tool-response pairing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingViolation {
    /// A tool call was not answered by the message at `position`.
    MissingResponse { call_id: String, position: usize },
    /// A tool message at `position` answers no pending call.
    OrphanResponse { call_id: String, position: usize },
}

/// Check that every assistant tool-call message is immediately followed by one
/// tool message per request, in request order.
pub fn validate_pairing(messages: &[Message]) -> Result<(), PairingViolation> {
    let mut idx = 0;
    while idx < messages.len() {
        match &messages[idx] {
            Message::Assistant { tool_calls, .. } if !tool_calls.is_empty() => {
                for (offset, call) in tool_calls.iter().enumerate() {
                    let position = idx + 1 + offset;
                    match messages.get(position).and_then(Message::tool_call_id) {
                        Some(id) if id == call.id => {}
                        _ => {
                            return Err(PairingViolation::MissingResponse {
                                call_id: call.id.clone(),
                                position,
                            })
                        }
                    }
                }
                idx += 1 + tool_calls.len();
            }
            Message::Tool { tool_call_id, .. } => {
                return Err(PairingViolation::OrphanResponse {
                    call_id: tool_call_id.clone(),
                    position: idx,
                });
            }
            _ => idx += 1,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_role_tag() {
        let msg = Message::tool_result("call_1", "ok");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "tool");
        assert_eq!(json["tool_call_id"], "call_1");

        let assistant = serde_json::to_value(Message::assistant("hi")).unwrap();
        assert!(assistant.get("tool_calls").is_none());
    }

    #[test]
    fn pairing_accepts_complete_units() {
        let log = vec![
            Message::user("go"),
            Message::assistant_tool_calls(vec![
                ToolCallRequest::new("a", "f", "{}"),
                ToolCallRequest::new("b", "g", "{}"),
            ]),
            Message::tool_result("a", "1"),
            Message::tool_result("b", "2"),
            Message::assistant("done"),
        ];
        assert_eq!(validate_pairing(&log), Ok(()));
    }

    #[test]
    fn pairing_detects_missing_and_orphan_responses() {
        let missing = vec![
            Message::assistant_tool_calls(vec![ToolCallRequest::new("a", "f", "{}")]),
            Message::user("next"),
        ];
        assert_eq!(
            validate_pairing(&missing),
            Err(PairingViolation::MissingResponse {
                call_id: "a".into(),
                position: 1
            })
        );

        let orphan = vec![Message::tool_result("a", "1"), Message::user("x")];
        assert!(matches!(
            validate_pairing(&orphan),
            Err(PairingViolation::OrphanResponse { position: 0, .. })
        ));
    }
}
