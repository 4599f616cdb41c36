//! call-ai: streaming chat completion client
//!
//! Sends prompts to OpenRouter, OpenAI and Anthropic compatible endpoints and
//! normalizes their streaming responses into cumulative text snapshots,
//! optionally parsed and validated against a JSON schema once the model
//! signals completion.

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions, clippy::too_many_lines)]

pub mod cli;
pub mod config;
pub mod error;
pub mod messages;
pub mod services;

// Re-exports for convenience
pub use error::{CallAiError, ErrorContext, Result};
pub use messages::{Message, Prompt, Role};
pub use services::{
    client::call_ai,
    streaming::{Completion, FinishReason, Snapshot, SnapshotStream},
    CallAi, CallOptions, CallOutput, Schema,
};
