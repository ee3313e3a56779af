//! Roci Chat — tool-calling conversation runtime
//!
//! Drives a chat with a streaming, tool-calling completion service: chunks are
//! reassembled into text and tool calls, tools run sequentially, the model can
//! switch modes mid-turn, history is trimmed to the context window, and user
//! turns can be cancelled, retried or edited and resent.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use roci_chat::prelude::*;
//!
//! # async fn example(service: Arc<dyn CompletionService>) -> roci_chat::error::Result<()> {
//! let session = ChatSession::new(service, ChatConfig::load()?);
//! let outcome = session.send("Where are my flows?", SendOptions::default()).await?;
//! println!("{outcome:?}: {} display entries", session.display().len());
//! # Ok(())
//! # }
//! ```

pub mod agent_loop;
pub mod config;
pub mod context;
pub mod error;
pub mod mode;
pub mod prelude;
pub mod provider;
pub mod session;
pub mod tools;
pub mod types;
