//! Turn observers used by the session.

use std::sync::{Arc, Mutex, PoisonError};

use super::state::ConversationState;
use crate::agent_loop::{ChatEvent, ChatEventSink, TurnObserver};
use crate::types::{ContextElement, DisplayMessage, ToolCallRequest};

/// Mirrors a running turn into the display log and the event sink.
pub(crate) struct TurnRecorder {
    state: Arc<Mutex<ConversationState>>,
    reply: Mutex<String>,
    reply_context: Vec<ContextElement>,
    sink: Option<ChatEventSink>,
}

impl TurnRecorder {
    pub(crate) fn new(
        state: Arc<Mutex<ConversationState>>,
        reply_context: Vec<ContextElement>,
        sink: Option<ChatEventSink>,
    ) -> Self {
        Self {
            state,
            reply: Mutex::new(String::new()),
            reply_context,
            sink,
        }
    }

    fn emit(&self, event: ChatEvent) {
        if let Some(sink) = &self.sink {
            sink(event);
        }
    }
}

impl TurnObserver for TurnRecorder {
    fn on_token(&self, token: &str) {
        self.reply
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_str(token);
        self.emit(ChatEvent::Token {
            text: token.to_string(),
        });
    }

    fn on_message_end(&self) {
        let reply = std::mem::take(&mut *self.reply.lock().unwrap_or_else(PoisonError::into_inner));
        if reply.is_empty() {
            return;
        }
        let mut entry = DisplayMessage::assistant(reply.clone());
        entry.context = self.reply_context.clone();
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .display
            .push(entry);
        self.emit(ChatEvent::MessageEnd { content: reply });
    }

    fn set_status(&self, call_id: &str, text: &str) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .upsert_tool_status(call_id, text);
        self.emit(ChatEvent::ToolStatus {
            tool_call_id: call_id.to_string(),
            text: text.to_string(),
        });
    }

    fn on_tool_call_started(&self, call: &ToolCallRequest) {
        self.emit(ChatEvent::ToolCallStarted { call: call.clone() });
    }

    fn on_tool_call_finished(&self, call: &ToolCallRequest, result: &str) {
        self.emit(ChatEvent::ToolCallFinished {
            tool_call_id: call.id.clone(),
            result: result.to_string(),
        });
    }
}

/// Collects streamed text without touching any log.
#[derive(Default)]
pub(crate) struct ReplyCollector {
    text: Mutex<String>,
}

impl ReplyCollector {
    pub(crate) fn text(&self) -> String {
        self.text
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl TurnObserver for ReplyCollector {
    fn on_token(&self, token: &str) {
        self.text
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_str(token);
    }

    fn on_message_end(&self) {}

    fn set_status(&self, _call_id: &str, _text: &str) {}
}
