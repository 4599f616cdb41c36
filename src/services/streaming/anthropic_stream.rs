//! Anthropic Messages API wire format

use serde::Deserialize;

use super::{DeltaFragment, ErrorData, FinishReason};

/// Stream event types for Anthropic API
///
/// Control events are unit variants: their payload is not needed to
/// normalize the text, and extra fields are skipped.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnthropicStreamEvent {
    /// Initial message metadata
    MessageStart,

    /// Start of a content block
    ContentBlockStart,

    /// Delta update for content block
    ContentBlockDelta {
        #[serde(default)]
        index: usize,
        delta: ContentDelta,
    },

    /// End of a content block
    ContentBlockStop,

    /// Message-level delta (usage, stop reason, etc.)
    MessageDelta {
        #[serde(default)]
        delta: MessageDeltaData,
    },

    /// End of message stream
    MessageStop,

    /// Ping event (keepalive)
    Ping,

    /// Error event
    Error { error: ErrorData },

    /// Complete (non-streaming) response body
    Message {
        #[serde(default)]
        content: Vec<ResponseBlock>,
        #[serde(default)]
        stop_reason: Option<String>,
    },

    #[serde(other)]
    Unknown,
}

/// Content delta.
///
/// `type` is `text_delta`, `input_json_delta` or `thinking_delta`; the
/// payload field is what decides how it is classified.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContentDelta {
    #[serde(rename = "type", default)]
    pub delta_type: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub partial_json: Option<String>,
}

/// Message delta data
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageDeltaData {
    #[serde(default)]
    pub stop_reason: Option<String>,
    #[serde(default)]
    pub stop_sequence: Option<String>,
}

/// Content block of a complete response
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseBlock {
    Text {
        text: String,
    },
    ToolUse {
        #[serde(default)]
        name: Option<String>,
        input: serde_json::Value,
    },
    #[serde(other)]
    Other,
}

/// Map one Anthropic event to a fragment, or to the error it reports
pub(crate) fn classify_event(
    event: AnthropicStreamEvent,
) -> std::result::Result<DeltaFragment, ErrorData> {
    let fragment = match event {
        AnthropicStreamEvent::ContentBlockDelta { index, delta } => {
            if let Some(partial_json) = delta.partial_json {
                DeltaFragment::ToolCallDelta {
                    index,
                    text: partial_json,
                    finish: None,
                }
            } else if let Some(text) = delta.text {
                DeltaFragment::Content { text, finish: None }
            } else {
                tracing::trace!(delta_type = ?delta.delta_type, "ignoring content delta");
                DeltaFragment::Ignored
            }
        }

        AnthropicStreamEvent::MessageDelta { delta } => match delta.stop_reason {
            Some(reason) => DeltaFragment::Finish(FinishReason::from_vendor(&reason)),
            None => DeltaFragment::Ignored,
        },

        AnthropicStreamEvent::Message {
            content,
            stop_reason,
        } => response_fragment(content, stop_reason),

        AnthropicStreamEvent::Error { error } => return Err(error),

        AnthropicStreamEvent::MessageStart
        | AnthropicStreamEvent::ContentBlockStart
        | AnthropicStreamEvent::ContentBlockStop
        | AnthropicStreamEvent::MessageStop
        | AnthropicStreamEvent::Ping
        | AnthropicStreamEvent::Unknown => DeltaFragment::Ignored,
    };

    Ok(fragment)
}

/// Collapse a complete response into the single fragment it amounts to
fn response_fragment(content: Vec<ResponseBlock>, stop_reason: Option<String>) -> DeltaFragment {
    let finish = Some(FinishReason::from_vendor(
        stop_reason.as_deref().unwrap_or("end_turn"),
    ));

    let mut text = String::new();
    for (index, block) in content.into_iter().enumerate() {
        match block {
            ResponseBlock::ToolUse { name, input } => {
                tracing::trace!(?name, "using tool_use block as response body");
                return DeltaFragment::ToolCallDelta {
                    index,
                    text: input.to_string(),
                    finish,
                };
            }
            ResponseBlock::Text { text: block_text } => text.push_str(&block_text),
            ResponseBlock::Other => {}
        }
    }

    DeltaFragment::Content { text, finish }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(json: &str) -> std::result::Result<DeltaFragment, ErrorData> {
        classify_event(serde_json::from_str(json).unwrap())
    }

    #[test]
    fn test_control_events_are_ignored() {
        for json in [
            r#"{"type":"message_start"}"#,
            r#"{"type":"message_start","message":{"id":"msg_123","model":"claude-3","role":"assistant","type":"message","usage":{"input_tokens":10,"output_tokens":0}}}"#,
            r#"{"type":"content_block_start","index":0,"content_block":{"type":"text","text":""}}"#,
            r#"{"type":"content_block_stop","index":0}"#,
            r#"{"type":"message_stop"}"#,
            r#"{"type":"ping"}"#,
            r#"{"type":"brand_new_event","x":1}"#,
        ] {
            assert_eq!(classify(json).unwrap(), DeltaFragment::Ignored, "{json}");
        }
    }

    #[test]
    fn test_text_delta() {
        let fragment = classify(
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hello"}}"#,
        )
        .unwrap();
        assert_eq!(
            fragment,
            DeltaFragment::Content {
                text: "Hello".into(),
                finish: None
            }
        );

        // untyped delta as some proxies send it
        let fragment = classify(r#"{"type":"content_block_delta","delta":{"text":"hi"}}"#).unwrap();
        assert_eq!(
            fragment,
            DeltaFragment::Content {
                text: "hi".into(),
                finish: None
            }
        );
    }

    #[test]
    fn test_input_json_delta() {
        let fragment = classify(
            r#"{"type":"content_block_delta","index":1,"delta":{"type":"input_json_delta","partial_json":"{\"arg\":"}}"#,
        )
        .unwrap();
        assert_eq!(
            fragment,
            DeltaFragment::ToolCallDelta {
                index: 1,
                text: r#"{"arg":"#.into(),
                finish: None
            }
        );
    }

    #[test]
    fn test_stop_reason() {
        let fragment = classify(
            r#"{"type":"message_delta","delta":{"stop_reason":"end_turn","stop_sequence":null},"usage":{"output_tokens":15}}"#,
        )
        .unwrap();
        assert_eq!(fragment, DeltaFragment::Finish(FinishReason::Stop));
    }

    #[test]
    fn test_error_event() {
        let error = classify(
            r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#,
        )
        .unwrap_err();
        assert_eq!(error.message, "Overloaded");
    }

    #[test]
    fn test_complete_message_with_tool_use() {
        let fragment = classify(
            r#"{"type":"message","role":"assistant","content":[{"type":"text","text":"Sure."},{"type":"tool_use","id":"tu_1","name":"todos","input":{"todos":["a"]}}],"stop_reason":"tool_use"}"#,
        )
        .unwrap();
        assert_eq!(
            fragment,
            DeltaFragment::ToolCallDelta {
                index: 1,
                text: r#"{"todos":["a"]}"#.into(),
                finish: Some(FinishReason::ToolCalls)
            }
        );
    }
}
