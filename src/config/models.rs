//! Provider and model metadata

use serde::{Deserialize, Serialize};

/// Model used when none is configured
pub const DEFAULT_MODEL: &str = "openrouter/auto";

/// AI provider types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    OpenRouter,
    OpenAI,
    Anthropic,
    /// Any other OpenAI-compatible endpoint
    Custom,
}

impl ProviderType {
    /// Get the default chat endpoint for this provider
    #[must_use]
    pub const fn default_endpoint(&self) -> Option<&'static str> {
        match self {
            Self::OpenRouter => Some("https://openrouter.ai/api/v1/chat/completions"),
            Self::OpenAI => Some("https://api.openai.com/v1/chat/completions"),
            Self::Anthropic => Some("https://api.anthropic.com/v1/messages"),
            Self::Custom => None,
        }
    }

    /// Guess the provider from an endpoint URL
    #[must_use]
    pub fn detect(endpoint: &str) -> Self {
        let host = endpoint.to_lowercase();
        if host.contains("openrouter.ai") {
            Self::OpenRouter
        } else if host.contains("api.openai.com") {
            Self::OpenAI
        } else if host.contains("api.anthropic.com") || host.ends_with("/v1/messages") {
            Self::Anthropic
        } else {
            Self::Custom
        }
    }

    /// Check if this provider requires an API key
    #[must_use]
    pub const fn requires_api_key(&self) -> bool {
        !matches!(self, Self::Custom)
    }

    /// Whether requests use the Anthropic Messages format
    #[must_use]
    pub const fn is_anthropic_native(&self) -> bool {
        matches!(self, Self::Anthropic)
    }

    /// Name used in logs and errors
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::OpenRouter => "openrouter",
            Self::OpenAI => "openai",
            Self::Anthropic => "anthropic",
            Self::Custom => "custom",
        }
    }
}

impl std::fmt::Display for ProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for ProviderType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openrouter" => Ok(Self::OpenRouter),
            "openai" => Ok(Self::OpenAI),
            "anthropic" => Ok(Self::Anthropic),
            "custom" => Ok(Self::Custom),
            _ => Err(format!("Invalid provider: {s}")),
        }
    }
}

/// Model families that handle structured output differently
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFamily {
    Claude,
    OpenAI,
    Gemini,
    Llama,
    DeepSeek,
    Unknown,
}

impl ModelFamily {
    /// Detect the family from a model id such as `anthropic/claude-3.5-sonnet`
    #[must_use]
    pub fn of(model: &str) -> Self {
        let model = model.to_lowercase();
        if model.contains("claude") || model.starts_with("anthropic/") {
            Self::Claude
        } else if model.starts_with("openai/")
            || model.starts_with("gpt")
            || model.contains("/gpt")
            || model.starts_with("o1")
            || model.starts_with("o3")
        {
            Self::OpenAI
        } else if model.contains("gemini") {
            Self::Gemini
        } else if model.contains("llama") {
            Self::Llama
        } else if model.contains("deepseek") {
            Self::DeepSeek
        } else {
            Self::Unknown
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_default_endpoints() {
        assert_eq!(
            ProviderType::OpenRouter.default_endpoint(),
            Some("https://openrouter.ai/api/v1/chat/completions")
        );
        assert_eq!(
            ProviderType::Anthropic.default_endpoint(),
            Some("https://api.anthropic.com/v1/messages")
        );
        assert!(ProviderType::Custom.default_endpoint().is_none());
    }

    #[test]
    fn test_provider_detection() {
        assert_eq!(
            ProviderType::detect("https://openrouter.ai/api/v1/chat/completions"),
            ProviderType::OpenRouter
        );
        assert_eq!(
            ProviderType::detect("https://api.anthropic.com/v1/messages"),
            ProviderType::Anthropic
        );
        assert_eq!(
            ProviderType::detect("http://localhost:11434/v1/chat/completions"),
            ProviderType::Custom
        );
    }

    #[test]
    fn test_provider_from_str() {
        assert_eq!("OpenAI".parse::<ProviderType>().unwrap(), ProviderType::OpenAI);
        assert!("bedrock".parse::<ProviderType>().is_err());
    }

    #[test]
    fn test_model_family() {
        assert_eq!(ModelFamily::of("anthropic/claude-3-sonnet"), ModelFamily::Claude);
        assert_eq!(ModelFamily::of("openai/gpt-4o"), ModelFamily::OpenAI);
        assert_eq!(ModelFamily::of("gpt-4o-mini"), ModelFamily::OpenAI);
        assert_eq!(ModelFamily::of("google/gemini-2.0-flash"), ModelFamily::Gemini);
        assert_eq!(ModelFamily::of("meta-llama/llama-3.3-70b"), ModelFamily::Llama);
        assert_eq!(ModelFamily::of("deepseek/deepseek-chat"), ModelFamily::DeepSeek);
        assert_eq!(ModelFamily::of("openrouter/auto"), ModelFamily::Unknown);
    }
}
