//! Conversation modes and their tool/prompt profiles.

pub mod change_mode;
pub mod controller;
pub mod prompts;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use crate::error::ChatError;
use crate::tools::Tool;
use crate::types::{ContextElement, Message};

pub use change_mode::{ChangeModeTool, CHANGE_MODE_TOOL_NAME};
pub use controller::{ModeController, ModeTransition};

/// The assistant's operating mode.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Mode {
    Script,
    Flow,
    #[default]
    Navigator,
    Ask,
}

impl Mode {
    /// Whether the built-in `change_mode` tool is offered in this mode.
    pub fn offers_mode_switch(self) -> bool {
        self != Mode::Ask
    }

    /// Whether the system prompt is prefixed with the mode-switch guidance.
    pub fn has_switch_guidance(self) -> bool {
        matches!(self, Mode::Script | Mode::Flow)
    }
}

/// Prompt, tools and message formatting for one mode.
///
/// A mode is available only while a profile is attached for it.
pub trait ModeProfile: Send + Sync {
    fn system_prompt(&self) -> String;

    fn tools(&self) -> Vec<Arc<dyn Tool>>;

    /// Build the canonical user message for raw instructions.
    fn user_message(&self, instructions: &str, context: &[ContextElement]) -> Message {
        Message::user(format_user_message(instructions, context))
    }
}

/// Instructions followed by a listing of the attached context.
pub fn format_user_message(instructions: &str, context: &[ContextElement]) -> String {
    if context.is_empty() {
        return instructions.to_string();
    }
    let mut text = format!("{instructions}\n\nCONTEXT:\n");
    for element in context {
        let content = element.0.get("content").and_then(|v| v.as_str());
        match (element.kind(), content) {
            (Some(kind), Some(content)) => {
                let title = element
                    .0
                    .get("title")
                    .and_then(|v| v.as_str())
                    .unwrap_or(kind);
                text.push_str(&format!("- {kind} {title}:\n```\n{content}\n```\n"));
            }
            _ => text.push_str(&format!("- {}\n", element.0)),
        }
    }
    text
}

/// A fixed prompt and tool list.
#[derive(Clone)]
pub struct StaticProfile {
    prompt: String,
    tools: Vec<Arc<dyn Tool>>,
}

impl StaticProfile {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            tools: Vec::new(),
        }
    }

    pub fn with_tools(mut self, tools: Vec<Arc<dyn Tool>>) -> Self {
        self.tools = tools;
        self
    }
}

impl ModeProfile for StaticProfile {
    fn system_prompt(&self) -> String {
        self.prompt.clone()
    }

    fn tools(&self) -> Vec<Arc<dyn Tool>> {
        self.tools.clone()
    }
}

/// Externally supplied tools for Navigator mode, loaded on first entry.
#[async_trait]
pub trait ToolCatalog: Send + Sync {
    async fn load(&self) -> Result<Vec<Arc<dyn Tool>>, ChatError>;
}
