//! `claude-agent` — typed model of the agent SDK `stream-json` protocol.
//!
//! The SDK bridge emits one JSON object per line. This crate decodes those
//! lines into a [`Message`] enum and exposes them as an async stream over any
//! line-oriented reader, so the chat server and the `replay` command share
//! one decoder.
//!
//! # Architecture
//!
//! ```text
//! AsyncBufRead (bridge stdout, socket, .jsonl file)
//!     │
//!     ▼
//! decode_line     ← blank / unknown-type lines are skipped
//!     │
//!     ▼
//! MessageStream   ← implements futures::Stream<Item = Result<Message>>
//!     │              background task + mpsc channel
//!     ▼
//! Message enum    ← system / assistant / user / result / stream_event
//! ```

pub mod error;
pub mod stream;
pub mod types;

#[cfg(test)]
mod tests;

pub use error::ClaudeAgentError;
pub use stream::{decode_line, MessageStream};
pub use types::{
    AssistantContent, AssistantMessage, BlockDelta, ContentBlock, Message, PartialEvent,
    ResultMessage, StreamEventMessage, SystemMessage, SystemPayload, UserMessage,
};

/// Convenience `Result` alias for this crate.
pub type Result<T> = std::result::Result<T, ClaudeAgentError>;
