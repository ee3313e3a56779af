//! Turn observers and chat events.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::mode::Mode;
use crate::tools::ToolCallbacks;
use crate::types::ToolCallRequest;

/// Receives streaming progress from the tool loop.
///
/// All callbacks run on the loop's task, in stream order.
pub trait TurnObserver: Send + Sync {
    /// A text delta arrived; echo it immediately.
    fn on_token(&self, token: &str);

    /// The current text segment is complete.
    fn on_message_end(&self);

    /// Transient progress text for a tool call.
    fn set_status(&self, call_id: &str, text: &str);

    fn on_tool_call_started(&self, _call: &ToolCallRequest) {}

    fn on_tool_call_finished(&self, _call: &ToolCallRequest, _result: &str) {}
}

/// Observer that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl TurnObserver for NoopObserver {
    fn on_token(&self, _token: &str) {}
    fn on_message_end(&self) {}
    fn set_status(&self, _call_id: &str, _text: &str) {}
}

/// Exposes an observer's `set_status` to tools.
pub(crate) struct ObserverCallbacks(pub(crate) Arc<dyn TurnObserver>);

impl ToolCallbacks for ObserverCallbacks {
    fn set_status(&self, call_id: &str, text: &str) {
        self.0.set_status(call_id, text);
    }
}

/// Events emitted by a chat session for rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    Loading {
        loading: bool,
    },
    Token {
        text: String,
    },
    MessageEnd {
        content: String,
    },
    ToolStatus {
        tool_call_id: String,
        text: String,
    },
    ToolCallStarted {
        call: ToolCallRequest,
    },
    ToolCallFinished {
        tool_call_id: String,
        result: String,
    },
    ModeChanged {
        mode: Mode,
    },
    Notification {
        message: String,
        is_error: bool,
    },
}

/// Sink for [`ChatEvent`] emission.
pub type ChatEventSink = Arc<dyn Fn(ChatEvent) + Send + Sync>;
