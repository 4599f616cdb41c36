//! OpenAI-compatible wire format
//!
//! Covers OpenAI, OpenRouter and every other endpoint speaking the chat
//! completions protocol (`choices[].delta` when streaming,
//! `choices[].message` otherwise).

use serde::Deserialize;

use super::{DeltaFragment, FinishReason};

/// OpenAI stream event (chunk)
///
/// Only the fields the normalizer reads; everything else is ignored so new
/// vendor fields never break decoding.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OpenAIStreamChunk {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub choices: Vec<OpenAIChoice>,
}

/// OpenAI choice in stream
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OpenAIChoice {
    #[serde(default)]
    pub index: usize,
    #[serde(default)]
    pub delta: Option<OpenAIDelta>,
    /// Present instead of `delta` in non-streaming responses
    #[serde(default)]
    pub message: Option<OpenAIDelta>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// OpenAI delta content
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OpenAIDelta {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<ToolCallDelta>>,
}

/// Tool call delta for OpenAI
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolCallDelta {
    #[serde(default)]
    pub index: usize,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub function: Option<FunctionDelta>,
}

/// Function call delta
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FunctionDelta {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: Option<String>,
}

/// Map one chunk to a fragment.
///
/// Only the first choice is considered; n > 1 is never requested.
pub(crate) fn classify_chunk(chunk: OpenAIStreamChunk) -> DeltaFragment {
    let Some(choice) = chunk.choices.into_iter().next() else {
        // usage-only trailer chunks
        return DeltaFragment::Ignored;
    };

    let finish = choice
        .finish_reason
        .as_deref()
        .map(FinishReason::from_vendor);
    let delta = choice.delta.or(choice.message).unwrap_or_default();

    if let Some((index, arguments)) = delta.tool_calls.as_deref().and_then(tool_arguments) {
        if delta.content.as_deref().is_some_and(|c| !c.is_empty()) {
            tracing::trace!("dropping text content sent alongside tool call arguments");
        }
        return DeltaFragment::ToolCallDelta {
            index,
            text: arguments,
            finish,
        };
    }

    match (delta.content, finish) {
        (Some(text), finish) if !text.is_empty() => DeltaFragment::Content { text, finish },
        (_, Some(reason)) => DeltaFragment::Finish(reason),
        _ => DeltaFragment::Ignored,
    }
}

/// Arguments text for the tool call the event is about.
///
/// An event normally carries one entry; if it carries several, only the
/// entries sharing the first entry's index are joined.
fn tool_arguments(calls: &[ToolCallDelta]) -> Option<(usize, String)> {
    let first = calls.first()?;
    let text: String = calls
        .iter()
        .filter(|call| call.index == first.index)
        .filter_map(|call| call.function.as_ref()?.arguments.as_deref())
        .collect();

    if text.is_empty() {
        // name/id-only announcement of a call
        None
    } else {
        Some((first.index, text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(json: &str) -> OpenAIStreamChunk {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_content_delta() {
        let fragment = classify_chunk(chunk(
            r#"{"id":"chatcmpl-123","object":"chat.completion.chunk","created":1234567890,"model":"gpt-4","choices":[{"index":0,"delta":{"role":"assistant","content":"Hello"},"finish_reason":null}]}"#,
        ));
        assert_eq!(
            fragment,
            DeltaFragment::Content {
                text: "Hello".into(),
                finish: None
            }
        );
    }

    #[test]
    fn test_finish_only() {
        let fragment = classify_chunk(chunk(
            r#"{"choices":[{"index":0,"delta":{},"finish_reason":"stop"}]}"#,
        ));
        assert_eq!(fragment, DeltaFragment::Finish(FinishReason::Stop));
    }

    #[test]
    fn test_content_with_finish_in_same_chunk() {
        let fragment = classify_chunk(chunk(
            r#"{"choices":[{"delta":{"content":"!"},"finish_reason":"length"}]}"#,
        ));
        assert_eq!(
            fragment,
            DeltaFragment::Content {
                text: "!".into(),
                finish: Some(FinishReason::Length)
            }
        );
    }

    #[test]
    fn test_tool_call_arguments() {
        let announce = classify_chunk(chunk(
            r#"{"choices":[{"index":0,"delta":{"role":"assistant","tool_calls":[{"index":0,"id":"call_abc","type":"function","function":{"name":"get_weather","arguments":""}}]},"finish_reason":null}]}"#,
        ));
        assert_eq!(announce, DeltaFragment::Ignored);

        let args = classify_chunk(chunk(
            r#"{"choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"location\":"}}]},"finish_reason":null}]}"#,
        ));
        assert_eq!(
            args,
            DeltaFragment::ToolCallDelta {
                index: 0,
                text: r#"{"location":"#.into(),
                finish: None
            }
        );
    }

    #[test]
    fn test_usage_trailer_is_ignored() {
        let fragment = classify_chunk(chunk(
            r#"{"choices":[],"usage":{"prompt_tokens":3,"completion_tokens":5}}"#,
        ));
        assert_eq!(fragment, DeltaFragment::Ignored);
    }

    #[test]
    fn test_non_streaming_message() {
        let fragment = classify_chunk(chunk(
            r#"{"choices":[{"index":0,"message":{"role":"assistant","content":"Hi there"},"finish_reason":"stop"}]}"#,
        ));
        assert_eq!(
            fragment,
            DeltaFragment::Content {
                text: "Hi there".into(),
                finish: Some(FinishReason::Stop)
            }
        );
    }
}
