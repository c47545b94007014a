//! Wire models for both sides of the bridge.
//!
//! This module groups two submodules:
//! - `messages`: the block-structured Messages API spoken by clients (requests, responses and
//!   streaming events).
//! - `chat`: the delta-structured Chat Completions API spoken by the upstream.
//!
//! The mapping logic between them lives in `crate::content`, `crate::conversion` and
//! `crate::stream`.

pub mod chat;
pub mod messages;

// Convenience re-exports for downstream users.
pub use chat::{ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse, ChatContent};
pub use messages::{
    ContentBlock, MessageContent, MessagesRequest, MessagesResponse, StopReason, StreamEvent,
};
