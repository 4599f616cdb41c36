//! Error types for call-ai

use std::{fmt, path::PathBuf};

use thiserror::Error;
use uuid::Uuid;

/// Result type alias using [`CallAiError`]
pub type Result<T> = std::result::Result<T, CallAiError>;

/// Where a request-scoped error happened.
///
/// Carried by errors that an outer layer may want to act on (auth refresh,
/// falling back to another model), so it can tell which call failed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorContext {
    pub request_id: Option<Uuid>,
    pub model: Option<String>,
    pub endpoint: Option<String>,
}

impl ErrorContext {
    /// Create a context for a new request
    #[must_use]
    pub fn new(model: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            request_id: Some(Uuid::new_v4()),
            model: Some(model.into()),
            endpoint: Some(endpoint.into()),
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "model={}, endpoint={}",
            self.model.as_deref().unwrap_or("?"),
            self.endpoint.as_deref().unwrap_or("?")
        )?;
        if let Some(id) = self.request_id {
            write!(f, ", request={id}")?;
        }
        Ok(())
    }
}

/// Main error type for call-ai
#[derive(Debug, Error)]
pub enum CallAiError {
    /// Network failure before or during the response body
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-2xx response, or an error object sent inside the stream
    #[error("API error{}: {message} ({context})", .status.map(|s| format!(" {s}")).unwrap_or_default())]
    Api {
        status: Option<u16>,
        message: String,
        context: ErrorContext,
    },

    /// Corrupted bytes or framing on the wire
    #[error("Decode error: {0}")]
    Decode(String),

    /// An SSE event whose data is not JSON at all
    #[error("Malformed stream event {data:?}: {source}")]
    MalformedEvent {
        data: String,
        #[source]
        source: serde_json::Error,
    },

    /// The finished response was expected to be JSON but is not
    #[error("Invalid structured response: {source}")]
    InvalidStructuredResponse {
        text: String,
        #[source]
        source: serde_json::Error,
    },

    /// The finished response parsed but does not satisfy the schema
    #[error("Structured response does not match schema: {}", .0.join("; "))]
    SchemaMismatch(Vec<String>),

    /// The schema supplied by the caller could not be compiled
    #[error("Invalid JSON schema: {0}")]
    InvalidSchema(String),

    /// The stream closed before any finish signal arrived
    #[error("Stream ended before the response was complete ({0})")]
    Truncated(ErrorContext),

    /// A response buffer was finalized twice
    #[error("Response was already finalized")]
    AlreadyFinalized,

    /// Configuration parse error
    #[error("Failed to parse config at {path}: {message}")]
    ConfigParse { path: PathBuf, message: String },

    /// Configuration validation error
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// No API key configured for the provider
    #[error("Missing API key for provider: {provider}")]
    MissingApiKey { provider: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CallAiError {
    /// HTTP status attached to the error, if any
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => *status,
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Request context attached to the error, if any
    #[must_use]
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Self::Api { context, .. } | Self::Truncated(context) => Some(context),
            _ => None,
        }
    }

    /// Whether the provider rejected the requested model id.
    ///
    /// OpenRouter answers 400 or 404 with "is not a valid model ID" or
    /// "No endpoints found"; OpenAI uses "model_not_found".
    #[must_use]
    pub fn is_invalid_model(&self) -> bool {
        let Self::Api {
            status, message, ..
        } = self
        else {
            return false;
        };
        if !matches!(status, Some(400 | 404)) {
            return false;
        }
        let lower = message.to_lowercase();
        lower.contains("not a valid model")
            || lower.contains("model_not_found")
            || lower.contains("no endpoints found")
            || lower.contains("does not exist")
    }

    /// Whether the provider rejected the credentials
    #[must_use]
    pub fn is_auth_error(&self) -> bool {
        matches!(self.status(), Some(401 | 403))
    }
}
