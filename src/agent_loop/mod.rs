//! Streaming tool-dispatch loop.

pub mod assembler;
pub mod events;
pub mod runner;

pub use assembler::{AssembledTurn, ChunkAssembler, ChunkUpdate, ReadyCall};
pub use events::{ChatEvent, ChatEventSink, NoopObserver, TurnObserver};
pub use runner::{LoopOutcome, LoopStatus, ToolLoop, TurnContext, WithSystemPrompt};
