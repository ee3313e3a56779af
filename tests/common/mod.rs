//! Shared test helpers and a scripted completion service.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use roci_chat::error::ChatError;
use roci_chat::provider::{ChunkStream, CompletionRequest, CompletionService};
use roci_chat::session::NotificationSink;
use roci_chat::tools::{ChatTool, Tool, ToolParameters};
use roci_chat::types::{CompletionChunk, ToolCallDelta};

/// One step of a scripted model turn.
pub enum Step {
    Chunk(CompletionChunk),
    /// Fail the stream with a transport-style error.
    Fail(String),
    /// Wake the test, then keep streaming.
    Signal(Arc<Notify>),
    /// Block until the turn is cancelled.
    Hang,
}

/// Completion service replaying scripted turns and recording every request.
#[derive(Default)]
pub struct ScriptedService {
    turns: Mutex<VecDeque<Vec<Step>>>,
    submit_errors: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_turn(&self, steps: Vec<Step>) {
        self.turns.lock().unwrap().push_back(steps);
    }

    /// Queue a plain text answer streamed in two pieces.
    pub fn push_text(&self, text: &str) {
        let split = text.len() / 2;
        let split = (0..=split).rev().find(|i| text.is_char_boundary(*i)).unwrap_or(0);
        let (head, tail) = text.split_at(split);
        self.push_turn(vec![
            Step::Chunk(CompletionChunk::text(head)),
            Step::Chunk(CompletionChunk::text(tail)),
        ]);
    }

    /// Queue a turn made of a single tool call.
    pub fn push_tool_call(&self, id: &str, name: &str, arguments: &str) {
        self.push_turn(vec![Step::Chunk(tool_call_chunk(0, id, name, arguments))]);
    }

    /// Make the next `submit` fail before streaming.
    pub fn fail_next_submit(&self, message: &str) {
        self.submit_errors.lock().unwrap().push_back(message.to_string());
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn remaining_turns(&self) -> usize {
        self.turns.lock().unwrap().len()
    }
}

#[async_trait]
impl CompletionService for ScriptedService {
    async fn submit(
        &self,
        request: CompletionRequest,
        cancel: CancellationToken,
    ) -> Result<ChunkStream, ChatError> {
        self.requests.lock().unwrap().push(request);
        if let Some(message) = self.submit_errors.lock().unwrap().pop_front() {
            return Err(ChatError::Transport(message));
        }
        let steps = self
            .turns
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ChatError::Transport("no scripted turn left".into()))?;

        let stream = async_stream::stream! {
            for step in steps {
                match step {
                    Step::Chunk(chunk) => yield Ok(chunk),
                    Step::Fail(message) => {
                        yield Err(ChatError::Stream(message));
                        return;
                    }
                    Step::Signal(notify) => notify.notify_one(),
                    Step::Hang => {
                        cancel.cancelled().await;
                        return;
                    }
                }
            }
        };
        Ok(Box::pin(stream))
    }
}

pub fn tool_call_chunk(index: usize, id: &str, name: &str, arguments: &str) -> CompletionChunk {
    CompletionChunk::tool_calls(vec![ToolCallDelta::start(index, id, name, arguments)])
}

/// Tool echoing its `text` argument and recording every call.
pub fn echo_tool(calls: Arc<Mutex<Vec<String>>>) -> Arc<dyn Tool> {
    Arc::new(ChatTool::new(
        "echo",
        "Echo the text argument",
        ToolParameters::object().string("text", "Text to echo", true).build(),
        move |args, ctx| {
            let calls = calls.clone();
            async move {
                let text = args.get_str("text")?.to_string();
                ctx.set_status(&format!("Echoing {text}"));
                calls.lock().unwrap().push(text.clone());
                Ok::<_, ChatError>(format!("echo: {text}"))
            }
        },
    ))
}

/// Tool that always fails.
pub fn failing_tool() -> Arc<dyn Tool> {
    Arc::new(ChatTool::new(
        "explode",
        "Always fails",
        ToolParameters::empty(),
        |_args, _ctx| async move { Err(ChatError::tool("explode", "boom")) },
    ))
}

/// Tool that signals `started` and then waits for cancellation.
pub fn blocking_tool(started: Arc<Notify>) -> Arc<dyn Tool> {
    Arc::new(ChatTool::new(
        "wait_forever",
        "Blocks until cancelled",
        ToolParameters::empty(),
        move |_args, ctx| {
            let started = started.clone();
            async move {
                started.notify_one();
                ctx.cancel.cancelled().await;
                Ok("cancelled".to_string())
            }
        },
    ))
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub notes: Mutex<Vec<(String, bool)>>,
}

impl NotificationSink for RecordingNotifier {
    fn notify(&self, message: &str, is_error: bool) {
        self.notes.lock().unwrap().push((message.to_string(), is_error));
    }
}
