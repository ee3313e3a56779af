//! Completion service boundary.
//!
//! The runtime never speaks a provider protocol itself; it submits the
//! conversation to a [`CompletionService`] and consumes the chunk stream.

use async_trait::async_trait;
use futures::stream::BoxStream;
use tokio_util::sync::CancellationToken;

use crate::error::ChatError;
use crate::tools::ToolDefinition;
use crate::types::{CompletionChunk, Message};

/// Finite, single-pass stream of completion chunks for one model turn.
pub type ChunkStream = BoxStream<'static, Result<CompletionChunk, ChatError>>;

/// A request sent to the completion service.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// System prompt first, then the conversation.
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDefinition>,
}

/// Capability to submit a conversation and receive streamed chunks.
///
/// Implementations must stop yielding promptly once `cancel` fires.
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn submit(
        &self,
        request: CompletionRequest,
        cancel: CancellationToken,
    ) -> Result<ChunkStream, ChatError>;
}
