//! Completion detection and finalization
//!
//! A finish fragment ends the request: the buffer is finalized exactly once
//! and, when a schema was requested, parsed as JSON. A parse failure here is
//! a real error. The whole message has arrived, so it can no longer be a
//! token split across events.

use once_cell::sync::Lazy;
use regex::Regex;

use super::{AccumulationBuffer, DeltaFragment, FinishReason};
use crate::{
    error::{CallAiError, Result},
    services::request::{Schema, SchemaStrategy},
};

/// Matches a response wrapped in a Markdown code fence
static CODE_FENCE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?s)^\s*```[A-Za-z]*\s*\n?(.*?)\s*```\s*$").ok());

/// The finalized result of one request
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    /// Final cumulative text, exactly as received
    pub text: String,

    /// Parsed document, when a schema was requested
    pub value: Option<serde_json::Value>,

    pub finish_reason: FinishReason,
}

/// Decides when a request is complete and validates the result
pub struct CompletionDetector {
    schema: Option<Schema>,
    strategy: SchemaStrategy,
    validator: Option<jsonschema::Validator>,
}

impl CompletionDetector {
    /// Detector for an unstructured request
    #[must_use]
    pub fn plain() -> Self {
        Self {
            schema: None,
            strategy: SchemaStrategy::None,
            validator: None,
        }
    }

    /// Detector for a request that may carry a schema.
    ///
    /// Strict schemas are compiled up front so a broken schema fails before
    /// any request is sent.
    pub fn new(schema: Option<Schema>, strategy: SchemaStrategy) -> Result<Self> {
        let validator = match &schema {
            Some(schema) if schema.strict => Some(
                jsonschema::validator_for(&schema.schema)
                    .map_err(|e| CallAiError::InvalidSchema(e.to_string()))?,
            ),
            _ => None,
        };

        Ok(Self {
            schema,
            strategy,
            validator,
        })
    }

    /// Whether results are parsed as JSON
    #[must_use]
    pub fn is_structured(&self) -> bool {
        self.schema.is_some()
    }

    /// Feed a fragment that was already pushed into `buffer`.
    ///
    /// Returns the completion if the fragment carried the finish signal and
    /// the buffer was not finalized yet.
    pub fn observe(
        &self,
        buffer: &mut AccumulationBuffer,
        fragment: &DeltaFragment,
    ) -> Option<Result<Completion>> {
        let reason = fragment.finish_reason()?;
        if buffer.is_finalized() {
            return None;
        }
        Some(self.finalize(buffer, reason.clone()))
    }

    /// Finalize the buffer.
    ///
    /// A `tool_calls` finish goes through the same path as `stop`: the text
    /// to finalize is whatever the buffer accumulated, wherever it came from.
    pub fn finalize(
        &self,
        buffer: &mut AccumulationBuffer,
        finish_reason: FinishReason,
    ) -> Result<Completion> {
        if !buffer.mark_finalized() {
            return Err(CallAiError::AlreadyFinalized);
        }

        let text = buffer.snapshot().to_string();
        tracing::debug!(
            %finish_reason,
            tool_channel = buffer.uses_tool_channel(),
            len = text.len(),
            "finalizing response"
        );

        if self.schema.is_none() {
            return Ok(Completion {
                text,
                value: None,
                finish_reason,
            });
        }

        let value = self.parse_structured(&text)?;
        self.validate(&value)?;

        Ok(Completion {
            text,
            value: Some(value),
            finish_reason,
        })
    }

    fn parse_structured(&self, text: &str) -> Result<serde_json::Value> {
        let source = match serde_json::from_str(text) {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        // Models told about the schema in a system message tend to wrap the
        // JSON in a code fence or a sentence.
        if self.strategy == SchemaStrategy::SystemMessage {
            if let Some(value) = extract_embedded_json(text) {
                return Ok(value);
            }
        }

        Err(CallAiError::InvalidStructuredResponse {
            text: text.to_string(),
            source,
        })
    }

    fn validate(&self, value: &serde_json::Value) -> Result<()> {
        let Some(validator) = &self.validator else {
            return Ok(());
        };

        let errors: Vec<String> = validator
            .iter_errors(value)
            .map(|err| format!("{} at {}", err, err.instance_path))
            .collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(CallAiError::SchemaMismatch(errors))
        }
    }
}

/// Find a JSON document inside fenced or chatty model output
fn extract_embedded_json(text: &str) -> Option<serde_json::Value> {
    if let Some(inner) = CODE_FENCE
        .as_ref()
        .and_then(|re| re.captures(text))
        .and_then(|caps| caps.get(1))
    {
        if let Ok(value) = serde_json::from_str(inner.as_str()) {
            return Some(value);
        }
    }

    let start = text.find(['{', '['])?;
    let end = text.rfind(['}', ']'])?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}
