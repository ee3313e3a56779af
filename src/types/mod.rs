//! Core types for roci-chat.

pub mod chunk;
pub mod display;
pub mod message;

pub use chunk::*;
pub use display::*;
pub use message::*;
