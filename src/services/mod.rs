//! Service layer for calling chat completion APIs
//!
//! This module provides:
//! - [`CallOptions`], the per-call options object
//! - [`request`], which turns a prompt and options into an HTTP request
//! - [`client`], which sends it and feeds the response through [`streaming`]

pub mod client;
pub mod request;
pub mod streaming;

use std::collections::HashMap;

pub use client::{CallAi, CallOutput};
pub use request::{HttpRequestParts, Schema, SchemaStrategy};

use crate::config::models::{ProviderType, DEFAULT_MODEL};

/// Options for one call
#[derive(Debug, Clone)]
pub struct CallOptions {
    /// API key sent to the provider
    pub api_key: Option<String>,

    /// Model id (e.g. `anthropic/claude-3.5-sonnet`)
    pub model: String,

    /// Full chat endpoint URL; the provider default when unset
    pub endpoint: Option<String>,

    /// Provider; guessed from the endpoint when unset
    pub provider: Option<ProviderType>,

    /// Whether to stream the response
    pub stream: bool,

    /// Structured output schema
    pub schema: Option<Schema>,

    /// Maximum tokens to generate
    pub max_tokens: Option<u32>,

    /// Temperature for sampling
    pub temperature: Option<f32>,

    /// Extra headers, applied last
    pub headers: HashMap<String, String>,

    /// `HTTP-Referer` sent to OpenRouter
    pub referer: Option<String>,

    /// `X-Title` sent to OpenRouter
    pub title: Option<String>,

    /// Log the pipeline of this call at debug level
    pub debug: bool,
}

impl Default for CallOptions {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            endpoint: None,
            provider: None,
            stream: false,
            schema: None,
            max_tokens: None,
            temperature: None,
            headers: HashMap::new(),
            referer: None,
            title: None,
            debug: false,
        }
    }
}

impl CallOptions {
    #[must_use]
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    #[must_use]
    pub fn with_provider(mut self, provider: ProviderType) -> Self {
        self.provider = Some(provider);
        self
    }

    #[must_use]
    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    #[must_use]
    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Provider the call goes to
    #[must_use]
    pub fn effective_provider(&self) -> ProviderType {
        self.provider.unwrap_or_else(|| {
            self.endpoint
                .as_deref()
                .map_or(ProviderType::OpenRouter, ProviderType::detect)
        })
    }

    /// Endpoint the call goes to, if one can be determined
    #[must_use]
    pub fn effective_endpoint(&self) -> Option<String> {
        self.endpoint.clone().or_else(|| {
            self.effective_provider()
                .default_endpoint()
                .map(String::from)
        })
    }
}
