//! Result emission
//!
//! Drives the decode → classify → accumulate → finalize pipeline and hands
//! the caller cumulative snapshots. The stream ends right after the final
//! snapshot; dropping it early stops decoding and nothing is finalized.

use std::pin::Pin;

use futures::stream::{Stream, StreamExt};

use super::{
    classify, sse_parser::SseEventStream, AccumulationBuffer, Completion, CompletionDetector,
};
use crate::error::{CallAiError, ErrorContext, Result};

/// Cumulative response text at one point of the stream
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// Everything received so far (not a delta)
    pub text: String,

    /// Set on the last snapshot only
    pub completion: Option<Completion>,
}

impl Snapshot {
    fn partial(text: &str) -> Self {
        Self {
            text: text.to_string(),
            completion: None,
        }
    }

    fn finished(completion: Completion) -> Self {
        Self {
            text: completion.text.clone(),
            completion: Some(completion),
        }
    }

    /// Whether this is the finalized, validated last snapshot
    pub fn is_final(&self) -> bool {
        self.completion.is_some()
    }
}

/// Snapshot stream type
pub type SnapshotStream = Pin<Box<dyn Stream<Item = Result<Snapshot>> + Send>>;

/// Build the snapshot stream for one request.
///
/// `debug` raises the per-event logs of this request from trace to debug
/// level without touching any other request.
pub fn snapshot_stream(
    events: SseEventStream,
    detector: CompletionDetector,
    context: ErrorContext,
    debug: bool,
) -> SnapshotStream {
    Box::pin(async_stream::stream! {
        let mut events = events;
        let mut buffer = AccumulationBuffer::new();

        while let Some(event) = events.next().await {
            let event = match event {
                Ok(event) => event,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };

            let fragment = match classify(&event, &context) {
                Ok(fragment) => fragment,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };

            if debug {
                tracing::debug!(request = ?context.request_id, ?fragment, "stream event");
            } else {
                tracing::trace!(request = ?context.request_id, ?fragment, "stream event");
            }

            let appended = buffer.push(&fragment).is_some();

            if let Some(result) = detector.observe(&mut buffer, &fragment) {
                yield result.map(Snapshot::finished);
                return;
            }

            if appended {
                yield Ok(Snapshot::partial(buffer.snapshot()));
            }
        }

        tracing::debug!(
            request = ?context.request_id,
            received = buffer.snapshot().len(),
            "stream closed without a finish signal"
        );
        yield Err(CallAiError::Truncated(context.clone()));
    })
}

/// Drain a snapshot stream and return its completion.
///
/// Streams from [`snapshot_stream`] end with either a final snapshot or an
/// error carrying the request context, which is returned as is. The
/// context-free `Truncated` only comes from a stream that was already
/// drained.
pub async fn collect_completion(mut stream: SnapshotStream) -> Result<Completion> {
    while let Some(snapshot) = stream.next().await {
        if let Some(completion) = snapshot?.completion {
            return Ok(completion);
        }
    }
    Err(CallAiError::Truncated(ErrorContext::default()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{
        request::{Schema, SchemaStrategy},
        streaming::{decode_events, FinishReason},
    };
    use bytes::Bytes;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn events_from(chunks: &[&str]) -> SseEventStream {
        let chunks: Vec<std::result::Result<Bytes, CallAiError>> = chunks
            .iter()
            .map(|c| Ok(Bytes::copy_from_slice(c.as_bytes())))
            .collect();
        decode_events(futures::stream::iter(chunks))
    }

    fn ctx() -> ErrorContext {
        ErrorContext::new("test-model", "http://example.invalid")
    }

    async fn run(chunks: &[&str], detector: CompletionDetector) -> Vec<Result<Snapshot>> {
        snapshot_stream(events_from(chunks), detector, ctx(), false)
            .collect()
            .await
    }

    #[tokio::test]
    async fn test_anthropic_stream() {
        let out = run(
            &[
                "data: {\"type\":\"message_start\"}\n\n",
                "data: {\"type\":\"content_block_delta\",\"delta\":{\"text\":\"hello\"}}\n\n",
                "data: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"end_turn\"}}\n\n",
            ],
            CompletionDetector::plain(),
        )
        .await;

        let last = out.last().unwrap().as_ref().unwrap();
        assert!(last.is_final());
        assert_eq!(last.text, "hello");
        assert_eq!(
            last.completion.as_ref().unwrap().finish_reason,
            FinishReason::Stop
        );
    }

    #[tokio::test]
    async fn test_openai_stream_is_cumulative() {
        let out = run(
            &[
                "data: {\"choices\":[{\"delta\":{\"content\":\"A\"},\"finish_reason\":null}]}\n\n",
                "data: {\"choices\":[{\"delta\":{\"content\":\"B\"},\"finish_reason\":null}]}\n\n",
                "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
                "data: [DONE]\n\n",
            ],
            CompletionDetector::plain(),
        )
        .await;

        let texts: Vec<_> = out
            .into_iter()
            .map(|s| {
                let s = s.unwrap();
                let is_final = s.is_final();
                (s.text, is_final)
            })
            .collect();
        assert_eq!(
            texts,
            vec![
                ("A".to_string(), false),
                ("AB".to_string(), false),
                ("AB".to_string(), true)
            ]
        );
    }

    #[tokio::test]
    async fn test_prose_after_tool_input_is_not_repeated() {
        let out = run(
            &[
                "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"input_json_delta\",\"partial_json\":\"{\\\"a\\\":1}\"}}\n\n",
                "data: {\"type\":\"content_block_delta\",\"index\":1,\"delta\":{\"type\":\"text_delta\",\"text\":\" trailing prose\"}}\n\n",
                "data: {\"type\":\"content_block_delta\",\"index\":1,\"delta\":{\"type\":\"text_delta\",\"text\":\" more\"}}\n\n",
                "data: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"tool_use\"}}\n\n",
            ],
            CompletionDetector::plain(),
        )
        .await;

        let texts: Vec<_> = out
            .into_iter()
            .map(|s| {
                let s = s.unwrap();
                let is_final = s.is_final();
                (s.text, is_final)
            })
            .collect();
        assert_eq!(
            texts,
            vec![
                (r#"{"a":1}"#.to_string(), false),
                (r#"{"a":1}"#.to_string(), true)
            ]
        );
    }

    #[tokio::test]
    async fn test_schema_result_is_parsed_value() {
        let detector = CompletionDetector::new(
            Some(Schema::new(json!({
                "properties": { "todos": { "type": "array", "items": { "type": "string" } } }
            }))),
            SchemaStrategy::JsonSchema,
        )
        .unwrap();

        let stream = snapshot_stream(
            events_from(&[
                "data: {\"choices\":[{\"delta\":{\"content\":\"{\\\"todos\\\":[\\\"a\\\",\"}}]}\n\n",
                "data: {\"choices\":[{\"delta\":{\"content\":\"\\\"b\\\"]}\"}}]}\n\n",
                "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
            ]),
            detector,
            ctx(),
            true,
        );

        let completion = collect_completion(stream).await.unwrap();
        assert_eq!(completion.text, r#"{"todos":["a","b"]}"#);
        assert_eq!(completion.value, Some(json!({"todos": ["a", "b"]})));
    }

    fn country_detector() -> CompletionDetector {
        CompletionDetector::new(
            Some(Schema::new(json!({
                "properties": {
                    "city": { "type": "string" },
                    "population": { "type": "number" },
                    "tags": { "type": "array", "items": { "type": "string" } }
                }
            }))),
            SchemaStrategy::JsonSchema,
        )
        .unwrap()
    }

    fn content_event(text: &str) -> String {
        format!(
            "data: {}\n\n",
            json!({ "choices": [{ "delta": { "content": text } }] })
        )
    }

    const STOP_EVENT: &str = "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n";

    #[tokio::test]
    async fn test_document_split_at_every_offset_parses() {
        let expected = json!({ "city": "Zürich", "population": 421_878.5, "tags": ["naïve"] });
        let document = expected.to_string();

        // the content split between two events, at every character boundary
        for (at, _) in document.char_indices().skip(1) {
            let (head, tail) = document.split_at(at);
            let first = content_event(head);
            let second = content_event(tail);
            let stream = snapshot_stream(
                events_from(&[first.as_str(), second.as_str(), STOP_EVENT]),
                country_detector(),
                ctx(),
                false,
            );

            let completion = collect_completion(stream).await.unwrap();
            assert_eq!(completion.text, document, "split at {at}");
            assert_eq!(completion.value.as_ref(), Some(&expected), "split at {at}");
        }

        // the raw bytes split at every offset, including inside multi-byte characters
        let body = format!("{}{STOP_EVENT}", content_event(&document));
        let bytes = body.as_bytes();
        for at in 1..bytes.len() {
            let chunks: Vec<std::result::Result<Bytes, CallAiError>> = vec![
                Ok(Bytes::copy_from_slice(&bytes[..at])),
                Ok(Bytes::copy_from_slice(&bytes[at..])),
            ];
            let stream = snapshot_stream(
                decode_events(futures::stream::iter(chunks)),
                country_detector(),
                ctx(),
                false,
            );

            let completion = collect_completion(stream).await.unwrap();
            assert_eq!(completion.value.as_ref(), Some(&expected), "byte split at {at}");
        }
    }

    #[tokio::test]
    async fn test_truncated_stream_never_finalizes() {
        let detector = CompletionDetector::new(
            Some(Schema::new(json!({ "properties": { "todos": { "type": "array" } } }))),
            SchemaStrategy::JsonSchema,
        )
        .unwrap();

        let out = run(
            &["data: {\"choices\":[{\"delta\":{\"content\":\"{\\\"todos\\\":\"}}]}\n\n"],
            detector,
        )
        .await;

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].as_ref().unwrap().text, r#"{"todos":"#);
        assert!(!out[0].as_ref().unwrap().is_final());
        assert!(matches!(out[1], Err(CallAiError::Truncated(_))));
    }

    #[tokio::test]
    async fn test_done_without_finish_reason_finalizes() {
        let out = run(
            &[
                "data: {\"choices\":[{\"delta\":{\"content\":\"hi\"}}]}\n\n",
                "data: [DONE]\n\n",
            ],
            CompletionDetector::plain(),
        )
        .await;

        let last = out.last().unwrap().as_ref().unwrap();
        assert_eq!(
            last.completion.as_ref().map(|c| &c.finish_reason),
            Some(&FinishReason::Done)
        );
    }

    #[tokio::test]
    async fn test_malformed_event_ends_stream_with_error() {
        let out = run(
            &[
                "data: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\n\n",
                "data: {\"choices\":[{\"delta\"\n\n",
                "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
            ],
            CompletionDetector::plain(),
        )
        .await;

        assert_eq!(out.len(), 2);
        assert!(matches!(out[1], Err(CallAiError::MalformedEvent { .. })));
    }

    #[tokio::test]
    async fn test_events_after_finish_are_not_read() {
        let out = run(
            &[
                "data: {\"type\":\"content_block_delta\",\"delta\":{\"text\":\"ok\"}}\n\n",
                "data: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"end_turn\"}}\n\n",
                "data: {\"type\":\"content_block_delta\",\"delta\":{\"text\":\" more\"}}\n\n",
                "data: not json at all\n\n",
            ],
            CompletionDetector::plain(),
        )
        .await;

        assert_eq!(out.len(), 2);
        assert_eq!(out[1].as_ref().unwrap().text, "ok");
    }

    #[tokio::test]
    async fn test_dropping_stream_cancels() {
        let mut stream = snapshot_stream(
            events_from(&[
                "data: {\"choices\":[{\"delta\":{\"content\":\"A\"}}]}\n\n",
                "data: {\"choices\":[{\"delta\":{\"content\":\"B\"}}]}\n\n",
            ]),
            CompletionDetector::plain(),
            ctx(),
            false,
        );

        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.text, "A");
        drop(stream);
    }
}
