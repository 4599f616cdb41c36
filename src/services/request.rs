//! Request construction
//!
//! Builds the URL, headers and JSON body for a chat call. Structured output
//! is requested differently per model family, see [`SchemaStrategy`].

use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::CallOptions;
use crate::{
    config::models::{ModelFamily, ProviderType},
    error::{CallAiError, Result},
    messages::{Message, Prompt, Role},
};

/// `anthropic-version` header value
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// The Messages API requires `max_tokens`
const ANTHROPIC_DEFAULT_MAX_TOKENS: u32 = 4096;

/// A caller-supplied JSON schema for structured output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    /// Name sent to the provider (function / `json_schema` name)
    pub name: String,

    /// The JSON Schema document
    pub schema: Value,

    /// Ask the provider for strict adherence and validate the result
    pub strict: bool,
}

impl Schema {
    /// Build a schema from either a full JSON Schema or the short form
    /// `{ "name": ..., "properties": {...}, "required": [...] }`.
    ///
    /// The short form becomes an object schema; `required` defaults to every
    /// property and `additionalProperties` to `false`.
    #[must_use]
    pub fn new(value: Value) -> Self {
        let name = value
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or("result")
            .to_string();

        let schema = match value {
            Value::Object(mut map) => {
                map.remove("name");
                if !map.contains_key("type") {
                    if let Some(Value::Object(properties)) = map.get("properties") {
                        let required: Vec<Value> =
                            properties.keys().cloned().map(Value::String).collect();
                        map.insert("type".into(), json!("object"));
                        map.entry("required").or_insert(Value::Array(required));
                        map.entry("additionalProperties").or_insert(json!(false));
                    }
                }
                Value::Object(map)
            }
            other => other,
        };

        Self {
            name,
            schema,
            strict: true,
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    #[must_use]
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }
}

/// How a schema is communicated to the model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaStrategy {
    /// No schema requested
    None,
    /// `response_format: { type: "json_schema" }` (OpenAI, Gemini)
    JsonSchema,
    /// A single forced tool whose parameters are the schema (Claude)
    ToolMode,
    /// Schema described in a system message (everything else)
    SystemMessage,
}

impl SchemaStrategy {
    /// Pick the strategy for a model on a provider
    #[must_use]
    pub fn resolve(schema: Option<&Schema>, model: &str, provider: ProviderType) -> Self {
        if schema.is_none() {
            return Self::None;
        }
        if provider.is_anthropic_native() {
            return Self::ToolMode;
        }
        match ModelFamily::of(model) {
            ModelFamily::Claude => Self::ToolMode,
            ModelFamily::OpenAI | ModelFamily::Gemini => Self::JsonSchema,
            ModelFamily::Llama | ModelFamily::DeepSeek | ModelFamily::Unknown => {
                Self::SystemMessage
            }
        }
    }
}

/// Everything needed to send one chat request
#[derive(Debug, Clone)]
pub struct HttpRequestParts {
    pub url: String,
    pub headers: HeaderMap,
    pub body: Value,
    pub provider: ProviderType,
    pub strategy: SchemaStrategy,
}

/// Build the HTTP request for a call
pub fn build_request(prompt: Prompt, options: &CallOptions) -> Result<HttpRequestParts> {
    let provider = options.effective_provider();
    let url = options.effective_endpoint().ok_or_else(|| {
        CallAiError::InvalidConfig(format!("no endpoint configured for provider {provider}"))
    })?;
    let strategy = SchemaStrategy::resolve(options.schema.as_ref(), &options.model, provider);

    let mut messages = prompt.into_messages();
    if let (SchemaStrategy::SystemMessage, Some(schema)) = (strategy, &options.schema) {
        inject_schema_instructions(&mut messages, schema)?;
    }

    let body = if provider.is_anthropic_native() {
        anthropic_body(messages, options, strategy)
    } else {
        openai_body(messages, options, strategy)
    };

    Ok(HttpRequestParts {
        url,
        headers: build_headers(provider, options)?,
        body,
        provider,
        strategy,
    })
}

fn openai_body(messages: Vec<Message>, options: &CallOptions, strategy: SchemaStrategy) -> Value {
    let mut body = json!({
        "model": options.model,
        "messages": messages,
        "stream": options.stream,
    });
    if let Some(max_tokens) = options.max_tokens {
        body["max_tokens"] = json!(max_tokens);
    }
    if let Some(temperature) = options.temperature {
        body["temperature"] = json!(temperature);
    }

    let Some(schema) = &options.schema else {
        return body;
    };
    match strategy {
        SchemaStrategy::JsonSchema => {
            body["response_format"] = json!({
                "type": "json_schema",
                "json_schema": {
                    "name": schema.name,
                    "strict": schema.strict,
                    "schema": schema.schema,
                },
            });
        }
        SchemaStrategy::ToolMode => {
            body["tools"] = json!([{
                "type": "function",
                "function": {
                    "name": schema.name,
                    "description": tool_description(schema),
                    "parameters": schema.schema,
                },
            }]);
            body["tool_choice"] = json!({
                "type": "function",
                "function": { "name": schema.name },
            });
        }
        SchemaStrategy::SystemMessage | SchemaStrategy::None => {}
    }
    body
}

fn anthropic_body(messages: Vec<Message>, options: &CallOptions, strategy: SchemaStrategy) -> Value {
    let (system, messages): (Vec<Message>, Vec<Message>) = messages
        .into_iter()
        .partition(|message| message.role == Role::System);

    let mut body = json!({
        "model": options.model,
        "messages": messages,
        "max_tokens": options.max_tokens.unwrap_or(ANTHROPIC_DEFAULT_MAX_TOKENS),
        "stream": options.stream,
    });
    if !system.is_empty() {
        let system: Vec<&str> = system.iter().map(|m| m.content.as_str()).collect();
        body["system"] = json!(system.join("\n\n"));
    }
    if let Some(temperature) = options.temperature {
        body["temperature"] = json!(temperature);
    }

    if let (SchemaStrategy::ToolMode, Some(schema)) = (strategy, &options.schema) {
        body["tools"] = json!([{
            "name": schema.name,
            "description": tool_description(schema),
            "input_schema": schema.schema,
        }]);
        body["tool_choice"] = json!({ "type": "tool", "name": schema.name });
    }
    body
}

fn tool_description(schema: &Schema) -> String {
    format!("Produce the response as {} structured data", schema.name)
}

/// Describe the schema in the leading system message
fn inject_schema_instructions(messages: &mut Vec<Message>, schema: &Schema) -> Result<()> {
    let instructions = format!(
        "Provide your response as a JSON object that matches this schema:\n{}\n\
         Respond with only the JSON object, without markdown or any other text.",
        serde_json::to_string_pretty(&schema.schema)?
    );

    match messages.first_mut() {
        Some(first) if first.role == Role::System => {
            first.content.push_str("\n\n");
            first.content.push_str(&instructions);
        }
        _ => messages.insert(0, Message::system(instructions)),
    }
    Ok(())
}

fn build_headers(provider: ProviderType, options: &CallOptions) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    if options.stream {
        headers.insert(header::ACCEPT, HeaderValue::from_static("text/event-stream"));
    }

    match options.api_key.as_deref().filter(|key| !key.is_empty()) {
        Some(key) if provider.is_anthropic_native() => {
            headers.insert("x-api-key", header_value("x-api-key", key)?);
            headers.insert(
                "anthropic-version",
                HeaderValue::from_static(ANTHROPIC_VERSION),
            );
        }
        Some(key) => {
            headers.insert(
                header::AUTHORIZATION,
                header_value("Authorization", &format!("Bearer {key}"))?,
            );
        }
        None if provider.requires_api_key() => {
            return Err(CallAiError::MissingApiKey {
                provider: provider.name().to_string(),
            });
        }
        None => {}
    }

    if provider == ProviderType::OpenRouter {
        if let Some(referer) = &options.referer {
            headers.insert("HTTP-Referer", header_value("HTTP-Referer", referer)?);
        }
        if let Some(title) = &options.title {
            headers.insert("X-Title", header_value("X-Title", title)?);
        }
    }

    for (name, value) in &options.headers {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| CallAiError::InvalidConfig(format!("Invalid header name: {name}")))?;
        headers.insert(header_name, header_value(name, value)?);
    }

    Ok(headers)
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|_| CallAiError::InvalidConfig(format!("Invalid value for header {name}")))
}
