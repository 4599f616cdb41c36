//! Server-Sent Events (SSE) decoding
//!
//! Turns the raw response body into a sequence of [`SseEvent`]s. Bytes are
//! decoded with a streaming-aware UTF-8 decoder so a character split across
//! two network reads is reassembled, and lines are buffered until the blank
//! line that ends an event.

use std::pin::Pin;

use futures::stream::{Stream, StreamExt};

use crate::error::{CallAiError, Result};

/// Data payload that ends an OpenAI-compatible stream
pub const DONE_MARKER: &str = "[DONE]";

/// SSE event
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
    /// Event type (e.g., "message_start", "content_block_delta")
    pub event_type: Option<String>,

    /// Event data (JSON payload)
    pub data: String,
}

impl SseEvent {
    /// Create an event carrying only data
    pub fn data(data: impl Into<String>) -> Self {
        Self {
            event_type: None,
            data: data.into(),
        }
    }

    /// Check if event is complete (has data)
    pub fn is_complete(&self) -> bool {
        !self.data.is_empty()
    }

    /// Check if this is the done marker for OpenAI streams
    pub fn is_done_marker(&self) -> bool {
        self.data.trim() == DONE_MARKER
    }
}

/// Incremental UTF-8 decoder.
///
/// Keeps the tail of an incomplete multi-byte sequence between reads instead
/// of decoding every chunk on its own.
#[derive(Debug, Default)]
pub struct Utf8StreamDecoder {
    pending: Vec<u8>,
}

impl Utf8StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode the next chunk of bytes.
    ///
    /// Returns all text that is complete so far. An invalid byte sequence
    /// (as opposed to an incomplete one) is an error.
    pub fn decode(&mut self, bytes: &[u8]) -> Result<String> {
        self.pending.extend_from_slice(bytes);

        let valid_up_to = match std::str::from_utf8(&self.pending) {
            Ok(_) => self.pending.len(),
            Err(e) => {
                if let Some(len) = e.error_len() {
                    return Err(CallAiError::Decode(format!(
                        "invalid UTF-8 sequence of {len} byte(s) after {} valid byte(s)",
                        e.valid_up_to()
                    )));
                }
                e.valid_up_to()
            }
        };

        let rest = self.pending.split_off(valid_up_to);
        let complete = std::mem::replace(&mut self.pending, rest);
        String::from_utf8(complete).map_err(|e| CallAiError::Decode(e.to_string()))
    }

    /// Check that no partial character is left once the body has ended
    pub fn finish(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            Ok(())
        } else {
            let n = self.pending.len();
            self.pending.clear();
            Err(CallAiError::Decode(format!(
                "stream ended inside a multi-byte UTF-8 sequence ({n} byte(s) pending)"
            )))
        }
    }
}

/// SSE parser for streaming responses
///
/// Follows the W3C Server-Sent Events specification:
/// https://html.spec.whatwg.org/multipage/server-sent-events.html
#[derive(Debug, Default)]
pub struct SseParser {
    /// Current event being assembled
    current_event: SseEvent,

    /// Buffer for incomplete lines
    line_buffer: String,
}

impl SseParser {
    /// Create a new SSE parser
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a chunk of SSE data
    ///
    /// Returns completed events. Incomplete events are buffered until next call.
    pub fn parse_chunk(&mut self, chunk: &str) -> Vec<SseEvent> {
        let mut events = Vec::new();

        self.line_buffer.push_str(chunk);

        while let Some(line_end) = self.line_buffer.find('\n') {
            let line = self.line_buffer[..line_end].trim_end_matches('\r').to_string();
            self.line_buffer.drain(..=line_end);

            if let Some(event) = self.process_line(&line) {
                events.push(event);
            }
        }

        events
    }

    /// Process a single line from the SSE stream
    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        // Empty line signals end of event
        if line.is_empty() {
            if self.current_event.is_complete() {
                return Some(std::mem::take(&mut self.current_event));
            }
            self.current_event = SseEvent::default();
            return None;
        }

        // Comments and keep-alives
        if line.starts_with(':') {
            return None;
        }

        match Self::parse_field(line) {
            Some(("event", value)) => {
                self.current_event.event_type = Some(value.to_string());
            }
            Some(("data", value)) => {
                if !self.current_event.data.is_empty() {
                    self.current_event.data.push('\n');
                }
                self.current_event.data.push_str(value);
            }
            _ => {
                tracing::trace!(line, "skipping non-data SSE line");
            }
        }

        None
    }

    /// Parse a field line into (field_name, value)
    fn parse_field(line: &str) -> Option<(&str, &str)> {
        let (field, value) = line.split_once(':')?;
        Some((field, value.strip_prefix(' ').unwrap_or(value)))
    }

    /// Flush any remaining buffered event
    pub fn flush(&mut self) -> Option<SseEvent> {
        if !self.line_buffer.is_empty() {
            let line = std::mem::take(&mut self.line_buffer);
            self.process_line(line.trim_end_matches('\r'));
        }

        if self.current_event.is_complete() {
            Some(std::mem::take(&mut self.current_event))
        } else {
            None
        }
    }
}

/// Boxed stream of decoded SSE events
pub type SseEventStream = Pin<Box<dyn Stream<Item = Result<SseEvent>> + Send>>;

/// Decode a response body into SSE events.
///
/// The sequence ends after the `[DONE]` marker (which is yielded so the
/// caller can see it) or when the body ends. Errors from the byte source are
/// passed through and end the sequence.
pub fn decode_events<S, B, E>(byte_stream: S) -> SseEventStream
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<CallAiError> + Send + 'static,
{
    Box::pin(async_stream::stream! {
        let mut decoder = Utf8StreamDecoder::new();
        let mut parser = SseParser::new();
        let mut byte_stream = Box::pin(byte_stream);

        while let Some(chunk_result) = byte_stream.next().await {
            let bytes = match chunk_result {
                Ok(bytes) => bytes,
                Err(e) => {
                    yield Err(e.into());
                    return;
                }
            };

            let text = match decoder.decode(bytes.as_ref()) {
                Ok(text) => text,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };

            for event in parser.parse_chunk(&text) {
                let done = event.is_done_marker();
                yield Ok(event);
                if done {
                    return;
                }
            }
        }

        if let Err(e) = decoder.finish() {
            yield Err(e);
            return;
        }

        if let Some(event) = parser.flush() {
            yield Ok(event);
        }
    })
}
