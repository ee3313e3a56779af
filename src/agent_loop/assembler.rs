//! Reassembles streamed completion chunks into text segments and tool calls.

use std::collections::BTreeMap;

use crate::types::{CompletionChunk, ToolCallDelta, ToolCallRequest};

/// A tool call whose id and name are known, ready for its pre-action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadyCall {
    pub id: String,
    pub name: String,
}

/// What a single chunk changed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChunkUpdate {
    /// Text to echo right away.
    pub token: Option<String>,
    /// A text segment completed because tool calls started after it.
    pub flushed: Option<String>,
    /// Calls whose id and name just became available.
    pub ready: Vec<ReadyCall>,
}

/// Result of one fully consumed model turn.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssembledTurn {
    /// Completed text segments, in stream order.
    pub segments: Vec<String>,
    /// Finalized tool calls, in stream-index order.
    pub tool_calls: Vec<ToolCallRequest>,
}

#[derive(Debug, Default)]
struct PartialToolCall {
    id: Option<String>,
    name: Option<String>,
    arguments: Option<String>,
    announced: bool,
}

impl PartialToolCall {
    fn merge(&mut self, delta: ToolCallDelta) {
        if self.id.is_none() {
            self.id = delta.id;
        }
        let Some(function) = delta.function else {
            return;
        };
        if self.name.is_none() {
            self.name = function.name;
        }
        if let Some(fragment) = function.arguments {
            self.arguments
                .get_or_insert_with(String::new)
                .push_str(&fragment);
        }
    }

    fn announce(&mut self) -> Option<ReadyCall> {
        if self.announced {
            return None;
        }
        let (Some(id), Some(name)) = (&self.id, &self.name) else {
            return None;
        };
        self.announced = true;
        Some(ReadyCall {
            id: id.clone(),
            name: name.clone(),
        })
    }

    fn finalize(self) -> Option<ToolCallRequest> {
        let id = self.id?;
        let arguments = self.arguments?;
        let arguments = if arguments.trim().is_empty() {
            "{}".to_string()
        } else {
            arguments
        };
        Some(ToolCallRequest {
            id,
            name: self.name.unwrap_or_default(),
            arguments,
        })
    }
}

/// Incremental assembler for one model turn.
#[derive(Debug, Default)]
pub struct ChunkAssembler {
    answer: String,
    segments: Vec<String>,
    calls: BTreeMap<usize, PartialToolCall>,
}

impl ChunkAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Text received since the last flush.
    pub fn pending_text(&self) -> &str {
        &self.answer
    }

    /// Fold one chunk in.
    ///
    /// Text before tool-call deltas is flushed as its own segment before the
    /// deltas are accumulated.
    pub fn push(&mut self, chunk: CompletionChunk) -> ChunkUpdate {
        let mut update = ChunkUpdate::default();

        if let Some(text) = chunk.text.filter(|t| !t.is_empty()) {
            self.answer.push_str(&text);
            update.token = Some(text);
        }

        if chunk.tool_calls.is_empty() {
            return update;
        }

        if !self.answer.is_empty() {
            let segment = std::mem::take(&mut self.answer);
            self.segments.push(segment.clone());
            update.flushed = Some(segment);
        }

        for delta in chunk.tool_calls {
            let call = self.calls.entry(delta.index).or_default();
            call.merge(delta);
            if let Some(ready) = call.announce() {
                update.ready.push(ready);
            }
        }

        update
    }

    /// Finish the turn; calls missing an id or arguments are dropped.
    pub fn finish(mut self) -> AssembledTurn {
        if !self.answer.is_empty() {
            self.segments.push(std::mem::take(&mut self.answer));
        }
        AssembledTurn {
            segments: self.segments,
            tool_calls: self
                .calls
                .into_values()
                .filter_map(PartialToolCall::finalize)
                .collect(),
        }
    }
}
