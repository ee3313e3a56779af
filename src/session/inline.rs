//! One-shot inline code edits.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde_json::json;

use super::recorder::ReplyCollector;
use super::{ChatSession, TurnGuard};
use crate::agent_loop::{ToolLoop, WithSystemPrompt};
use crate::error::ChatError;
use crate::mode::prompts::INLINE_EDIT_SYSTEM_PROMPT;
use crate::mode::Mode;
use crate::types::ContextElement;

static NEW_CODE_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<new_code>(.*?)</new_code>").expect("new_code block regex must compile")
});

static NEW_CODE_OPEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<new_code>").expect("new_code tag regex must compile"));

/// Selected lines in the editor, 1-based and inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineRange {
    pub start: u32,
    pub end: u32,
}

impl LineRange {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }
}

/// Context element carrying the selected code.
pub fn code_piece(code: &str, lines: LineRange) -> ContextElement {
    ContextElement::new(json!({
        "type": "code_piece",
        "title": format!("L{}-L{}", lines.start, lines.end),
        "startLine": lines.start,
        "endLine": lines.end,
        "content": code,
    }))
}

/// Pull the replacement code out of a model reply.
///
/// Takes the first complete `<new_code>…</new_code>` block; without a closing
/// tag, everything after the last `<new_code>` with markdown fences removed.
pub fn extract_new_code(reply: &str) -> Result<String, ChatError> {
    if reply.trim().is_empty() {
        return Err(ChatError::InvalidResponse("AI response was empty".into()));
    }

    if let Some(found) = NEW_CODE_BLOCK_RE.captures(reply).and_then(|c| c.get(1)) {
        return non_empty(found.as_str().trim().to_string());
    }

    if let Some(last) = NEW_CODE_OPEN_RE.find_iter(reply).last() {
        let code = reply[last.end()..].replace("```", "");
        return non_empty(code.trim().to_string());
    }

    Err(ChatError::InvalidResponse(
        "AI response did not contain valid code. Please try rephrasing your request.".into(),
    ))
}

fn non_empty(code: String) -> Result<String, ChatError> {
    if code.is_empty() {
        return Err(ChatError::InvalidResponse(
            "AI response contained empty code block".into(),
        ));
    }
    Ok(code)
}

impl ChatSession {
    /// Ask for a rewrite of `selected_code` and return the new code.
    ///
    /// Runs outside the conversation: neither log changes and the loading
    /// flag is left alone. Returns `Ok(None)` when cancelled.
    pub async fn inline_edit(
        &self,
        instructions: &str,
        selected_code: &str,
        lines: LineRange,
    ) -> Result<Option<String>, ChatError> {
        if instructions.trim().is_empty() {
            return Err(ChatError::Validation("Instructions are required".into()));
        }
        let cancel = self.cancel.begin()?;
        let _guard = TurnGuard::new(self, false);

        let mut context = self.selected_context();
        context.push(code_piece(selected_code, lines));
        let user_message = self.modes.user_message_for(Mode::Script, instructions, &context);

        let collector = Arc::new(ReplyCollector::default());
        let turn_context = WithSystemPrompt::new(self.modes.as_ref(), INLINE_EDIT_SYSTEM_PROMPT);
        let outcome = ToolLoop::new(self.service.as_ref(), &turn_context)
            .with_observer(collector.clone())
            .with_max_iterations(self.config.max_iterations)
            .run(vec![user_message], &cancel)
            .await?;
        if outcome.is_cancelled() {
            return Ok(None);
        }

        extract_new_code(&collector.text()).map(Some)
    }
}
