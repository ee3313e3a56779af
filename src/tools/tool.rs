//! Tool trait and closure-based tool wrapper.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::arguments::ToolArguments;
use super::types::{ToolDefinition, ToolParameters};
use crate::error::ChatError;
use crate::mode::Mode;

/// Callbacks exposed to tools while they run.
pub trait ToolCallbacks: Send + Sync {
    /// Show transient progress text for a call.
    fn set_status(&self, call_id: &str, text: &str);
}

/// Callbacks that drop everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopToolCallbacks;

impl ToolCallbacks for NoopToolCallbacks {
    fn set_status(&self, _call_id: &str, _text: &str) {}
}

/// Context available during tool execution.
#[derive(Clone)]
pub struct ToolExecutionContext {
    pub call_id: String,
    /// Mode active when the call was dispatched.
    pub mode: Mode,
    pub callbacks: Arc<dyn ToolCallbacks>,
    /// Cancelled when the turn is aborted; long-running tools should watch it.
    pub cancel: CancellationToken,
}

impl ToolExecutionContext {
    pub fn set_status(&self, text: &str) {
        self.callbacks.set_status(&self.call_id, text);
    }
}

impl std::fmt::Debug for ToolExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolExecutionContext")
            .field("call_id", &self.call_id)
            .field("mode", &self.mode)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

/// Core tool trait — implement to create custom tools.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name (must match what the model calls).
    fn name(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str;

    /// JSON Schema parameters.
    fn parameters(&self) -> &ToolParameters;

    /// Definition sent alongside each completion request.
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters().schema.clone(),
        }
    }

    /// Runs once per call as soon as its id and name have streamed in,
    /// before the arguments are complete.
    fn pre_action(&self, _call_id: &str, _callbacks: &dyn ToolCallbacks) {}

    /// Execute the tool; the returned string becomes the tool message content.
    async fn execute(
        &self,
        args: &ToolArguments,
        ctx: &ToolExecutionContext,
    ) -> Result<String, ChatError>;
}

type ToolHandler = dyn Fn(
        ToolArguments,
        ToolExecutionContext,
    ) -> Pin<Box<dyn Future<Output = Result<String, ChatError>> + Send>>
    + Send
    + Sync;

type PreActionHandler = dyn Fn(&str, &dyn ToolCallbacks) + Send + Sync;

/// Closure-based tool for quick tool creation.
pub struct ChatTool {
    name: String,
    description: String,
    parameters: ToolParameters,
    handler: Arc<ToolHandler>,
    pre_action: Option<Arc<PreActionHandler>>,
}

impl ChatTool {
    /// Create a tool from a closure.
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: ToolParameters,
        handler: F,
    ) -> Self
    where
        F: Fn(ToolArguments, ToolExecutionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, ChatError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            handler: Arc::new(move |args, ctx| Box::pin(handler(args, ctx))),
            pre_action: None,
        }
    }

    /// Attach a pre-action hook.
    pub fn with_pre_action<F>(mut self, pre_action: F) -> Self
    where
        F: Fn(&str, &dyn ToolCallbacks) + Send + Sync + 'static,
    {
        self.pre_action = Some(Arc::new(pre_action));
        self
    }
}

#[async_trait]
impl Tool for ChatTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> &ToolParameters {
        &self.parameters
    }

    fn pre_action(&self, call_id: &str, callbacks: &dyn ToolCallbacks) {
        if let Some(pre_action) = &self.pre_action {
            pre_action(call_id, callbacks);
        }
    }

    async fn execute(
        &self,
        args: &ToolArguments,
        ctx: &ToolExecutionContext,
    ) -> Result<String, ChatError> {
        (self.handler)(args.clone(), ctx.clone()).await
    }
}

impl std::fmt::Debug for ChatTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatTool")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("pre_action", &self.pre_action.is_some())
            .finish()
    }
}
