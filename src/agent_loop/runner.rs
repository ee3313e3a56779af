//! The streaming tool-dispatch loop.

use std::sync::Arc;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::assembler::ChunkAssembler;
use super::events::{NoopObserver, ObserverCallbacks, TurnObserver};
use crate::error::ChatError;
use crate::mode::Mode;
use crate::provider::{CompletionRequest, CompletionService};
use crate::tools::{Tool, ToolArguments, ToolCallbacks, ToolExecutionContext};
use crate::types::{Message, ToolCallRequest};

/// Live view of the mode-dependent turn inputs.
///
/// The loop re-reads every accessor at the start of each iteration, so a
/// mode switch performed by a tool takes effect on the next request.
pub trait TurnContext: Send + Sync {
    fn mode(&self) -> Mode;

    fn system_prompt(&self) -> String;

    fn tools(&self) -> Vec<Arc<dyn Tool>>;

    /// A one-shot instruction to append to the next request only.
    fn take_pending_message(&self) -> Option<Message>;
}

/// Wraps a context and replaces its system prompt.
pub struct WithSystemPrompt<'a> {
    inner: &'a dyn TurnContext,
    prompt: String,
}

impl<'a> WithSystemPrompt<'a> {
    pub fn new(inner: &'a dyn TurnContext, prompt: impl Into<String>) -> Self {
        Self {
            inner,
            prompt: prompt.into(),
        }
    }
}

impl TurnContext for WithSystemPrompt<'_> {
    fn mode(&self) -> Mode {
        self.inner.mode()
    }

    fn system_prompt(&self) -> String {
        self.prompt.clone()
    }

    fn tools(&self) -> Vec<Arc<dyn Tool>> {
        self.inner.tools()
    }

    fn take_pending_message(&self) -> Option<Message> {
        self.inner.take_pending_message()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopStatus {
    Completed,
    Cancelled,
}

/// Messages produced by one loop run.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopOutcome {
    /// Messages added during the run, in order. Never contains a tool-call
    /// message without all of its responses.
    pub messages: Vec<Message>,
    pub status: LoopStatus,
    pub iterations: usize,
}

impl LoopOutcome {
    fn completed(messages: Vec<Message>, iterations: usize) -> Self {
        Self {
            messages,
            status: LoopStatus::Completed,
            iterations,
        }
    }

    fn cancelled(messages: Vec<Message>, iterations: usize) -> Self {
        Self {
            messages,
            status: LoopStatus::Cancelled,
            iterations,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == LoopStatus::Cancelled
    }
}

/// Drives request → stream → tool execution until the model stops calling tools.
pub struct ToolLoop<'a> {
    service: &'a dyn CompletionService,
    context: &'a dyn TurnContext,
    observer: Arc<dyn TurnObserver>,
    max_iterations: Option<usize>,
    turn_id: Uuid,
}

impl<'a> ToolLoop<'a> {
    pub fn new(service: &'a dyn CompletionService, context: &'a dyn TurnContext) -> Self {
        Self {
            service,
            context,
            observer: Arc::new(NoopObserver),
            max_iterations: None,
            turn_id: Uuid::new_v4(),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn TurnObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: Option<usize>) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_turn_id(mut self, turn_id: Uuid) -> Self {
        self.turn_id = turn_id;
        self
    }

    /// Run the loop over `messages`.
    ///
    /// Errors from the service, the stream, or a tool end the run, unless
    /// `cancel` has fired, in which case the run reports
    /// [`LoopStatus::Cancelled`] with the complete units produced so far.
    pub async fn run(
        &self,
        mut messages: Vec<Message>,
        cancel: &CancellationToken,
    ) -> Result<LoopOutcome, ChatError> {
        let callbacks: Arc<dyn ToolCallbacks> = Arc::new(ObserverCallbacks(self.observer.clone()));
        let mut added: Vec<Message> = Vec::new();
        let mut iteration = 0usize;

        loop {
            if cancel.is_cancelled() {
                return Ok(LoopOutcome::cancelled(added, iteration));
            }
            iteration += 1;
            if let Some(max) = self.max_iterations {
                if iteration > max {
                    return Err(ChatError::InvalidState(format!(
                        "tool loop exceeded {max} iterations"
                    )));
                }
            }

            let mode = self.context.mode();
            let tools = self.context.tools();
            let mut request_messages = Vec::with_capacity(messages.len() + 2);
            request_messages.push(Message::system(self.context.system_prompt()));
            request_messages.extend(messages.iter().cloned());
            if let Some(pending) = self.context.take_pending_message() {
                request_messages.push(pending);
            }
            let request = CompletionRequest {
                messages: request_messages,
                tools: tools.iter().map(|tool| tool.definition()).collect(),
            };

            tracing::debug!(
                turn_id = %self.turn_id,
                iteration,
                mode = %mode,
                messages = request.messages.len(),
                tools = request.tools.len(),
                "submitting completion request"
            );

            let submitted = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Ok(LoopOutcome::cancelled(added, iteration));
                }
                submitted = self.service.submit(request, cancel.clone()) => submitted,
            };
            let mut stream = match submitted {
                Ok(stream) => stream,
                Err(err) => return self.fail(err, cancel, added, iteration),
            };

            let mut assembler = ChunkAssembler::new();
            loop {
                let next = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        self.observer.on_message_end();
                        tracing::debug!(turn_id = %self.turn_id, iteration, "turn cancelled mid-stream");
                        return Ok(LoopOutcome::cancelled(added, iteration));
                    }
                    next = stream.next() => next,
                };
                let Some(chunk) = next else { break };
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(err) => return self.fail(err, cancel, added, iteration),
                };

                let update = assembler.push(chunk);
                if let Some(token) = &update.token {
                    self.observer.on_token(token);
                }
                if update.flushed.is_some() {
                    self.observer.on_message_end();
                }
                for ready in &update.ready {
                    if let Some(tool) = find_tool(&tools, &ready.name) {
                        tool.pre_action(&ready.id, callbacks.as_ref());
                    }
                }
            }

            let turn = assembler.finish();
            self.observer.on_message_end();

            for segment in turn.segments {
                let message = Message::assistant(segment);
                messages.push(message.clone());
                added.push(message);
            }

            if turn.tool_calls.is_empty() {
                tracing::debug!(turn_id = %self.turn_id, iteration, "turn completed");
                return Ok(LoopOutcome::completed(added, iteration));
            }

            let unit_start = added.len();
            let request_message = Message::assistant_tool_calls(turn.tool_calls.clone());
            messages.push(request_message.clone());
            added.push(request_message);

            for call in &turn.tool_calls {
                self.observer.on_tool_call_started(call);
                let dispatched = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    result = self.dispatch(call, &tools, &callbacks, cancel) => Some(result),
                };
                let result = match dispatched {
                    None => {
                        added.truncate(unit_start);
                        tracing::debug!(turn_id = %self.turn_id, tool = %call.name, "turn cancelled during tool execution");
                        return Ok(LoopOutcome::cancelled(added, iteration));
                    }
                    Some(Err(_)) if cancel.is_cancelled() => {
                        added.truncate(unit_start);
                        return Ok(LoopOutcome::cancelled(added, iteration));
                    }
                    Some(Err(err)) => {
                        tracing::warn!(turn_id = %self.turn_id, tool = %call.name, error = %err, "tool failed");
                        return Err(err);
                    }
                    Some(Ok(content)) => content,
                };
                self.observer.on_tool_call_finished(call, &result);
                let response = Message::tool_result(&call.id, result);
                messages.push(response.clone());
                added.push(response);
            }
        }
    }

    async fn dispatch(
        &self,
        call: &ToolCallRequest,
        tools: &[Arc<dyn Tool>],
        callbacks: &Arc<dyn ToolCallbacks>,
        cancel: &CancellationToken,
    ) -> Result<String, ChatError> {
        let mode = self.context.mode();
        let Some(tool) = find_tool(tools, &call.name) else {
            tracing::warn!(turn_id = %self.turn_id, tool = %call.name, %mode, "model called unknown tool");
            return Ok(format!(
                "Tool '{}' is not available in {mode} mode.",
                call.name
            ));
        };

        let args = ToolArguments::parse(&call.arguments)
            .map_err(|err| ChatError::tool(&call.name, err.to_string()))?;
        let ctx = ToolExecutionContext {
            call_id: call.id.clone(),
            mode,
            callbacks: callbacks.clone(),
            cancel: cancel.child_token(),
        };

        tracing::debug!(turn_id = %self.turn_id, tool = %call.name, call_id = %call.id, "executing tool");
        tool.execute(&args, &ctx).await.map_err(|err| match err {
            err @ ChatError::ToolExecution { .. } => err,
            other => ChatError::tool(&call.name, other.to_string()),
        })
    }

    fn fail(
        &self,
        err: ChatError,
        cancel: &CancellationToken,
        added: Vec<Message>,
        iteration: usize,
    ) -> Result<LoopOutcome, ChatError> {
        self.observer.on_message_end();
        if cancel.is_cancelled() {
            tracing::debug!(turn_id = %self.turn_id, error = %err, "error after cancellation ignored");
            return Ok(LoopOutcome::cancelled(added, iteration));
        }
        tracing::warn!(turn_id = %self.turn_id, iteration, error = %err, "turn failed");
        Err(err)
    }
}

fn find_tool<'t>(tools: &'t [Arc<dyn Tool>], name: &str) -> Option<&'t Arc<dyn Tool>> {
    tools.iter().find(|tool| tool.name() == name)
}
