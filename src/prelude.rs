//! Convenience re-exports for common use.

pub use crate::agent_loop::{ChatEvent, ChatEventSink, LoopOutcome, LoopStatus, ToolLoop, TurnContext};
pub use crate::config::ChatConfig;
pub use crate::context::TokenBudget;
pub use crate::error::{ChatError, Result};
pub use crate::mode::{Mode, ModeController, ModeProfile, ModeTransition, StaticProfile, ToolCatalog};
pub use crate::provider::{ChunkStream, CompletionRequest, CompletionService};
pub use crate::session::{
    ChatSession, ContextProvider, HistoryStore, NotificationSink, SendOptions, TurnOutcome,
};
pub use crate::tools::{ChatTool, ParameterBuilder, Tool, ToolArguments, ToolParameters};
pub use crate::types::{
    CompletionChunk, ContextElement, DisplayMessage, Message, Role, ToolCallDelta, ToolCallRequest,
};
