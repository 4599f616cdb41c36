//! Settings file format shared by the global and project config files

use std::{collections::HashMap, fmt, fs, path::Path};

use serde::{Deserialize, Serialize};

use super::ProviderType;
use crate::error::{CallAiError, Result};

/// Settings read from a config file.
///
/// Every field is optional so a project file only needs to name what it
/// overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Chat endpoint URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderType>,

    /// Default model id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// `HTTP-Referer` for OpenRouter
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referer: Option<String>,

    /// `X-Title` for OpenRouter
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Debug logging for every call
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<bool>,

    /// Extra request headers
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
}

impl Settings {
    /// Load settings from a specific path
    ///
    /// A missing file yields empty settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path).map_err(|e| CallAiError::ConfigParse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        serde_json::from_str(&contents).map_err(|e| CallAiError::ConfigParse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Save settings to a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Overlay `other` on top of `self`; set fields in `other` win
    pub fn merge(&mut self, other: Self) {
        macro_rules! overlay {
            ($($field:ident),*) => {
                $(if other.$field.is_some() {
                    self.$field = other.$field;
                })*
            };
        }
        overlay!(
            api_key,
            endpoint,
            provider,
            model,
            max_tokens,
            temperature,
            referer,
            title,
            debug
        );
        self.headers.extend(other.headers);
    }

    /// Apply environment overrides.
    ///
    /// `CALLAI_API_KEY` (or `OPENROUTER_API_KEY`), `CALLAI_CHAT_URL`,
    /// `CALLAI_MODEL` and `CALLAI_DEBUG`.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        let non_empty = |name: &str| var(name).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_empty("CALLAI_API_KEY").or_else(|| non_empty("OPENROUTER_API_KEY")) {
            self.api_key = Some(key);
        }
        if let Some(endpoint) = non_empty("CALLAI_CHAT_URL") {
            self.endpoint = Some(endpoint);
        }
        if let Some(model) = non_empty("CALLAI_MODEL") {
            self.model = Some(model);
        }
        if let Some(debug) = non_empty("CALLAI_DEBUG") {
            self.debug = Some(matches!(
                debug.to_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            ));
        }
    }

    /// Set one field by its file key, as given to `call-ai config --set`
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown key or a value that does not parse
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let text = || Some(value.to_string());
        match key {
            "apiKey" => self.api_key = text(),
            "endpoint" => self.endpoint = text(),
            "provider" => self.provider = Some(value.parse().map_err(|e| invalid(key, e))?),
            "model" => self.model = text(),
            "maxTokens" => self.max_tokens = Some(value.parse().map_err(|e| invalid(key, e))?),
            "temperature" => {
                self.temperature = Some(value.parse().map_err(|e| invalid(key, e))?);
            }
            "referer" => self.referer = text(),
            "title" => self.title = text(),
            "debug" => self.debug = Some(value.parse().map_err(|e| invalid(key, e))?),
            _ => {
                return Err(CallAiError::InvalidConfig(format!(
                    "unknown setting: {key}"
                )))
            }
        }
        Ok(())
    }
}

fn invalid(key: &str, err: impl fmt::Display) -> CallAiError {
    CallAiError::InvalidConfig(format!("{key}: {err}"))
}
