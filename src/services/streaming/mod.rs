//! Streaming support for AI model responses
//!
//! The pipeline for one request:
//!
//! 1. [`sse_parser`] turns response bytes into [`SseEvent`]s
//! 2. [`classify`] maps each event to exactly one [`DeltaFragment`]
//! 3. [`accumulator`] appends fragment text to the request's buffer
//! 4. [`completion`] finalizes the buffer on the finish signal
//! 5. [`emitter`] exposes the cumulative snapshots as a stream

pub mod accumulator;
pub mod anthropic_stream;
pub mod completion;
pub mod emitter;
pub mod openai_stream;
pub mod sse_parser;

use std::fmt;

use serde::Deserialize;

pub use accumulator::AccumulationBuffer;
pub use anthropic_stream::AnthropicStreamEvent;
pub use completion::{Completion, CompletionDetector};
pub use emitter::{collect_completion, snapshot_stream, Snapshot, SnapshotStream};
pub use openai_stream::OpenAIStreamChunk;
pub use sse_parser::{decode_events, SseEvent, SseParser, Utf8StreamDecoder};

use crate::error::{CallAiError, ErrorContext, Result};

/// Why the model stopped, normalized across vendors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishReason {
    /// `stop`, `end_turn`, `stop_sequence`
    Stop,
    /// `tool_calls`, `tool_use`, `function_call`
    ToolCalls,
    /// `length`, `max_tokens`
    Length,
    ContentFilter,
    /// `[DONE]` arrived without an explicit finish reason
    Done,
    Other(String),
}

impl FinishReason {
    /// Normalize a vendor's finish/stop reason
    #[must_use]
    pub fn from_vendor(reason: &str) -> Self {
        match reason {
            "stop" | "end_turn" | "stop_sequence" => Self::Stop,
            "tool_calls" | "tool_use" | "function_call" => Self::ToolCalls,
            "length" | "max_tokens" => Self::Length,
            "content_filter" => Self::ContentFilter,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for FinishReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stop => write!(f, "stop"),
            Self::ToolCalls => write!(f, "tool_calls"),
            Self::Length => write!(f, "length"),
            Self::ContentFilter => write!(f, "content_filter"),
            Self::Done => write!(f, "done"),
            Self::Other(reason) => write!(f, "{reason}"),
        }
    }
}

/// One classified, vendor-neutral event.
///
/// Some vendors put the last piece of text and the finish reason in the same
/// event; the text variants carry that finish so the event still maps to a
/// single fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeltaFragment {
    Content {
        text: String,
        finish: Option<FinishReason>,
    },
    ToolCallDelta {
        index: usize,
        text: String,
        finish: Option<FinishReason>,
    },
    Finish(FinishReason),
    Ignored,
}

impl DeltaFragment {
    /// Finish signal carried by this fragment, if any
    #[must_use]
    pub fn finish_reason(&self) -> Option<&FinishReason> {
        match self {
            Self::Content { finish, .. } | Self::ToolCallDelta { finish, .. } => finish.as_ref(),
            Self::Finish(reason) => Some(reason),
            Self::Ignored => None,
        }
    }
}

/// Vendor error object (`{"error": {...}}` / `{"type":"error","error":{...}}`)
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorData {
    #[serde(rename = "type", default)]
    pub error_type: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub code: Option<serde_json::Value>,
}

impl ErrorData {
    fn into_error(self, context: &ErrorContext) -> CallAiError {
        // OpenRouter puts the upstream HTTP status in `code`
        let status = self
            .code
            .as_ref()
            .and_then(serde_json::Value::as_u64)
            .and_then(|code| u16::try_from(code).ok());
        let message = match self.error_type {
            Some(kind) if !self.message.is_empty() => format!("{kind}: {}", self.message),
            Some(kind) => kind,
            None => self.message,
        };
        CallAiError::Api {
            status,
            message,
            context: context.clone(),
        }
    }
}

/// Classify one SSE event.
///
/// Data that is not JSON is an error: vendors always send whole JSON objects
/// per event, even when the text inside them is a fragment. Well-formed JSON
/// of an unknown shape is [`DeltaFragment::Ignored`].
pub fn classify(event: &SseEvent, context: &ErrorContext) -> Result<DeltaFragment> {
    if event.is_done_marker() {
        return Ok(DeltaFragment::Finish(FinishReason::Done));
    }

    let value: serde_json::Value =
        serde_json::from_str(&event.data).map_err(|source| CallAiError::MalformedEvent {
            data: event.data.clone(),
            source,
        })?;

    classify_value(value, context)
}

/// Classify an already-parsed payload: a stream event or a whole response body
pub fn classify_value(value: serde_json::Value, context: &ErrorContext) -> Result<DeltaFragment> {
    let Some(object) = value.as_object() else {
        return Ok(DeltaFragment::Ignored);
    };

    if object.get("type").and_then(serde_json::Value::as_str).is_some() {
        return match serde_json::from_value::<AnthropicStreamEvent>(value) {
            Ok(event) => anthropic_stream::classify_event(event).map_err(|e| e.into_error(context)),
            Err(e) => {
                tracing::trace!(error = %e, "unrecognized typed event");
                Ok(DeltaFragment::Ignored)
            }
        };
    }

    if let Some(error) = object.get("error").filter(|e| e.is_object()) {
        let data: ErrorData = serde_json::from_value(error.clone())?;
        return Err(data.into_error(context));
    }

    if object.contains_key("choices") {
        return match serde_json::from_value::<OpenAIStreamChunk>(value) {
            Ok(chunk) => Ok(openai_stream::classify_chunk(chunk)),
            Err(e) => {
                tracing::trace!(error = %e, "unrecognized choices payload");
                Ok(DeltaFragment::Ignored)
            }
        };
    }

    Ok(DeltaFragment::Ignored)
}
