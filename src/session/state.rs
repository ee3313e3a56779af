//! Conversation state and its transitions.
//!
//! Every mutation of the two logs goes through a method here; the session
//! decides when to persist, notify or dispatch around them.

use uuid::Uuid;

use super::history::SavedChat;
use crate::error::ChatError;
use crate::types::{CanonicalIndex, ContextElement, DisplayMessage, DisplayRole, Message, Role};

/// The display log and the canonical log of one chat.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationState {
    pub chat_id: Uuid,
    pub display: Vec<DisplayMessage>,
    pub messages: Vec<Message>,
}

impl Default for ConversationState {
    fn default() -> Self {
        Self::new()
    }
}

impl From<SavedChat> for ConversationState {
    fn from(chat: SavedChat) -> Self {
        Self {
            chat_id: chat.id,
            display: chat.display,
            messages: chat.messages,
        }
    }
}

impl ConversationState {
    pub fn new() -> Self {
        Self {
            chat_id: Uuid::new_v4(),
            display: Vec::new(),
            messages: Vec::new(),
        }
    }

    pub fn snapshot(&self) -> SavedChat {
        SavedChat::new(self.chat_id, self.display.clone(), self.messages.clone())
    }

    /// Record a user turn in both logs; the display entry points at the
    /// canonical message's position.
    pub fn begin_turn(
        &mut self,
        text: &str,
        context: Vec<ContextElement>,
        user_message: Message,
    ) -> CanonicalIndex {
        let index = CanonicalIndex(self.messages.len());
        self.display.push(DisplayMessage::user(text, context, index));
        self.messages.push(user_message);
        index
    }

    /// Append messages produced by the dispatch loop.
    pub fn fold(&mut self, added: Vec<Message>) {
        self.messages.extend(added);
    }

    pub fn flag_last_user_error(&mut self) {
        if let Some(turn) = self.display.iter_mut().rev().find(|m| m.is_user()) {
            turn.error = true;
        }
    }

    /// The user turn at `display_index`, checked against the canonical log.
    ///
    /// Fails when the entry is not a user turn or its canonical index no
    /// longer points at a user message.
    pub fn user_turn(&self, display_index: usize) -> Result<&DisplayMessage, ChatError> {
        let turn = self
            .display
            .get(display_index)
            .filter(|m| m.is_user())
            .ok_or_else(|| {
                ChatError::InvalidArgument(format!(
                    "No user message found at display index {display_index}"
                ))
            })?;
        let index = turn.index.ok_or_else(|| {
            ChatError::InvalidState(format!(
                "user turn at display index {display_index} has no canonical index"
            ))
        })?;
        match self.messages.get(index.get()) {
            Some(message) if message.role() == Role::User => Ok(turn),
            _ => Err(ChatError::InvalidState(format!(
                "canonical index {} does not reference a user message ({} messages)",
                index.get(),
                self.messages.len()
            ))),
        }
    }

    /// Truncate both logs to just before the user turn at `display_index`
    /// and return that turn. Leaves both logs untouched on failure.
    pub fn rewind_to(&mut self, display_index: usize) -> Result<DisplayMessage, ChatError> {
        let turn = self.user_turn(display_index)?.clone();
        if let Some(index) = turn.index {
            self.messages.truncate(index.get());
        }
        self.display.truncate(display_index);
        Ok(turn)
    }

    /// Update the status line of `call_id` in the current turn, or add one.
    pub fn upsert_tool_status(&mut self, call_id: &str, text: &str) {
        let existing = self
            .display
            .iter_mut()
            .rev()
            .take_while(|m| !m.is_user())
            .find(|m| m.role == DisplayRole::Tool && m.tool_call_id.as_deref() == Some(call_id));
        match existing {
            Some(entry) => entry.content = text.to_string(),
            None => self
                .display
                .push(DisplayMessage::tool_status(call_id, text)),
        }
    }

    /// Start over with empty logs and a fresh id.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn three_turns() -> ConversationState {
        let mut state = ConversationState::new();
        for text in ["one", "two", "three"] {
            state.begin_turn(text, Vec::new(), Message::user(text));
            state.display.push(DisplayMessage::assistant(format!("re: {text}")));
            state.fold(vec![Message::assistant(format!("re: {text}"))]);
        }
        state
    }

    #[test]
    fn begin_turn_captures_canonical_length() {
        let state = three_turns();
        let indices: Vec<_> = state
            .display
            .iter()
            .filter_map(|m| m.index.map(CanonicalIndex::get))
            .collect();
        assert_eq!(indices, vec![0, 2, 4]);
    }

    #[test]
    fn rewind_truncates_both_logs() {
        let mut state = three_turns();
        let turn = state.rewind_to(2).unwrap();
        assert_eq!(turn.content, "two");
        assert_eq!(state.display.len(), 2);
        assert_eq!(state.messages, vec![Message::user("one"), Message::assistant("re: one")]);
    }

    #[test]
    fn rewind_rejects_non_user_entries_without_mutation() {
        let mut state = three_turns();
        let before = state.clone();
        assert!(matches!(state.rewind_to(1), Err(ChatError::InvalidArgument(_))));
        assert!(matches!(state.rewind_to(99), Err(ChatError::InvalidArgument(_))));
        assert_eq!(state, before);
    }

    #[test]
    fn rewind_fails_loudly_on_dangling_index() {
        let mut state = three_turns();
        state.messages.truncate(1);
        let before = state.clone();
        assert!(matches!(state.rewind_to(4), Err(ChatError::InvalidState(_))));
        assert_eq!(state, before);
    }

    #[test]
    fn tool_status_is_upserted_within_the_turn() {
        let mut state = ConversationState::new();
        state.begin_turn("go", Vec::new(), Message::user("go"));
        state.upsert_tool_status("a", "Switching...");
        state.upsert_tool_status("b", "Working");
        state.upsert_tool_status("a", "Switched");

        let tool_lines: Vec<_> = state
            .display
            .iter()
            .filter(|m| m.role == DisplayRole::Tool)
            .map(|m| (m.tool_call_id.clone().unwrap(), m.content.clone()))
            .collect();
        assert_eq!(
            tool_lines,
            vec![("a".into(), "Switched".into()), ("b".into(), "Working".into())]
        );
    }

    #[test]
    fn flag_marks_most_recent_user_turn() {
        let mut state = three_turns();
        state.flag_last_user_error();
        let flagged: Vec<_> = state.display.iter().map(|m| m.error).collect();
        assert_eq!(flagged, vec![false, false, false, false, true, false]);
    }

    #[test]
    fn reset_starts_a_new_chat() {
        let mut state = three_turns();
        let old_id = state.chat_id;
        state.reset();
        assert_ne!(state.chat_id, old_id);
        assert!(state.display.is_empty() && state.messages.is_empty());
    }
}
