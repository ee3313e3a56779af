//! UI-facing display log entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;

/// Role of a display entry. System prompts are never displayed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DisplayRole {
    User,
    Assistant,
    Tool,
}

/// Position in the canonical log captured when a user turn was created.
///
/// Captured once and never recomputed; restart/retry truncate the canonical
/// log to this position.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(transparent)]
pub struct CanonicalIndex(pub usize);

impl CanonicalIndex {
    pub fn get(self) -> usize {
        self.0
    }
}

/// Opaque context payload attached to a user turn (editor selection, db schema, ...).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct ContextElement(pub serde_json::Value);

impl ContextElement {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    /// The element's `type` field, when it has one.
    pub fn kind(&self) -> Option<&str> {
        self.0.get("type").and_then(|v| v.as_str())
    }
}

/// An entry of the display log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DisplayMessage {
    pub role: DisplayRole,
    pub content: String,
    /// Set on user turns whose dispatch failed.
    #[serde(default)]
    pub error: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<ContextElement>,
    /// Canonical-log position, user turns only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<CanonicalIndex>,
    /// Tool call this status line belongs to, tool entries only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl DisplayMessage {
    pub fn user(
        content: impl Into<String>,
        context: Vec<ContextElement>,
        index: CanonicalIndex,
    ) -> Self {
        Self {
            role: DisplayRole::User,
            content: content.into(),
            error: false,
            context,
            index: Some(index),
            tool_call_id: None,
            created_at: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: DisplayRole::Assistant,
            content: content.into(),
            error: false,
            context: Vec::new(),
            index: None,
            tool_call_id: None,
            created_at: Utc::now(),
        }
    }

    pub fn tool_status(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: DisplayRole::Tool,
            content: content.into(),
            error: false,
            context: Vec::new(),
            index: None,
            tool_call_id: Some(tool_call_id.into()),
            created_at: Utc::now(),
        }
    }

    pub fn is_user(&self) -> bool {
        self.role == DisplayRole::User
    }
}
