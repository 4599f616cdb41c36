//! HTTP client for chat completion endpoints
//!
//! Sends the request built by [`super::request`] and runs the response
//! through the streaming pipeline. Failures are classified and returned;
//! nothing here retries or refreshes credentials.

use reqwest::Client;
use serde_json::Value;

use super::{
    request::{build_request, HttpRequestParts},
    streaming::{
        classify_value, decode_events, snapshot_stream, AccumulationBuffer, Completion,
        CompletionDetector, DeltaFragment, FinishReason, SnapshotStream,
    },
    CallOptions,
};
use crate::{
    error::{CallAiError, ErrorContext, Result},
    messages::Prompt,
};

/// Result of [`CallAi::call`]
pub enum CallOutput {
    /// Finalized response of a non-streaming call
    Complete(Completion),
    /// Cumulative snapshots of a streaming call
    Stream(SnapshotStream),
}

impl std::fmt::Debug for CallOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Complete(completion) => f.debug_tuple("Complete").field(completion).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// Chat completion client
#[derive(Debug, Clone)]
pub struct CallAi {
    client: Client,
}

impl CallAi {
    /// Create a client with default HTTP settings
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: Client::builder().build()?,
        })
    }

    /// Use an existing `reqwest` client (proxies, timeouts, ...)
    #[must_use]
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Call the model, streaming or not depending on `options.stream`
    pub async fn call(&self, prompt: impl Into<Prompt>, options: &CallOptions) -> Result<CallOutput> {
        if options.stream {
            self.stream(prompt, options).await.map(CallOutput::Stream)
        } else {
            self.complete(prompt, options).await.map(CallOutput::Complete)
        }
    }

    /// Start a streaming call.
    ///
    /// Transport and status errors are returned here; errors once the body
    /// is flowing come out of the stream.
    pub async fn stream(
        &self,
        prompt: impl Into<Prompt>,
        options: &CallOptions,
    ) -> Result<SnapshotStream> {
        let options = CallOptions {
            stream: true,
            ..options.clone()
        };
        let parts = build_request(prompt.into(), &options)?;
        let detector = CompletionDetector::new(options.schema.clone(), parts.strategy)?;
        let context = ErrorContext::new(&options.model, &parts.url);

        let response = self.send(&parts, &context, options.debug).await?;
        let events = decode_events(response.bytes_stream());

        Ok(snapshot_stream(events, detector, context, options.debug))
    }

    /// Make a non-streaming call and return the finalized response
    pub async fn complete(
        &self,
        prompt: impl Into<Prompt>,
        options: &CallOptions,
    ) -> Result<Completion> {
        let options = CallOptions {
            stream: false,
            ..options.clone()
        };
        let parts = build_request(prompt.into(), &options)?;
        let detector = CompletionDetector::new(options.schema.clone(), parts.strategy)?;
        let context = ErrorContext::new(&options.model, &parts.url);

        let response = self.send(&parts, &context, options.debug).await?;
        let status = response.status();
        let body = response.bytes().await?;

        let fragment = match serde_json::from_slice::<Value>(&body) {
            Ok(value) => classify_value(value, &context)?,
            Err(_) => {
                // Some compatible servers answer with the bare text
                let text = String::from_utf8(body.to_vec())
                    .map_err(|e| CallAiError::Decode(e.to_string()))?;
                tracing::debug!(request = ?context.request_id, "response body is not JSON, using it as text");
                DeltaFragment::Content { text, finish: None }
            }
        };

        if matches!(fragment, DeltaFragment::Ignored) {
            return Err(CallAiError::Api {
                status: Some(status.as_u16()),
                message: "unrecognized response body".to_string(),
                context,
            });
        }

        let mut buffer = AccumulationBuffer::new();
        buffer.push(&fragment);
        let finish_reason = fragment
            .finish_reason()
            .cloned()
            .unwrap_or(FinishReason::Stop);
        detector.finalize(&mut buffer, finish_reason)
    }

    async fn send(
        &self,
        parts: &HttpRequestParts,
        context: &ErrorContext,
        debug: bool,
    ) -> Result<reqwest::Response> {
        if debug {
            tracing::debug!(
                request = ?context.request_id,
                url = %parts.url,
                provider = %parts.provider,
                strategy = ?parts.strategy,
                body = %parts.body,
                "sending request"
            );
        }

        let response = self
            .client
            .post(&parts.url)
            .headers(parts.headers.clone())
            .json(&parts.body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                tracing::debug!(error = %e, "failed to read error body");
                String::new()
            }
        };
        let message = error_message(&body)
            .or_else(|| status.canonical_reason().map(String::from))
            .unwrap_or_else(|| format!("HTTP {status}"));

        tracing::debug!(request = ?context.request_id, %status, %message, "request failed");
        Err(CallAiError::Api {
            status: Some(status.as_u16()),
            message,
            context: context.clone(),
        })
    }
}

/// Pull the human-readable message out of an error body.
///
/// Tries the JSON shapes vendors use, then falls back to the raw text.
fn error_message(body: &str) -> Option<String> {
    let body = body.trim();
    if body.is_empty() {
        return None;
    }

    if let Ok(value) = serde_json::from_str::<Value>(body) {
        let message = value
            .pointer("/error/message")
            .or_else(|| value.get("error").filter(|e| e.is_string()))
            .or_else(|| value.get("message"))
            .and_then(Value::as_str);
        if let Some(message) = message {
            return Some(message.to_string());
        }
    }

    Some(body.to_string())
}

/// One-shot call with a fresh client
pub async fn call_ai(prompt: impl Into<Prompt>, options: &CallOptions) -> Result<CallOutput> {
    CallAi::new()?.call(prompt, options).await
}
