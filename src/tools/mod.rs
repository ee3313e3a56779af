//! Tool system for function calling.

pub mod arguments;
pub mod tool;
pub mod types;

pub use arguments::ToolArguments;
pub use tool::{ChatTool, NoopToolCallbacks, Tool, ToolCallbacks, ToolExecutionContext};
pub use types::{ParameterBuilder, ToolDefinition, ToolParameters};
