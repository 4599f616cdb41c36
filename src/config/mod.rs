//! Configuration management for call-ai
//!
//! Implements a hierarchical configuration system:
//! 1. Global config (`<config dir>/call-ai/config.json`)
//! 2. Project config (`./.call-ai.json`)
//! 3. Environment variables
//! 4. CLI parameters / per-call options (highest priority)

pub mod models;
pub mod settings;

use std::path::{Path, PathBuf};

pub use self::{
    models::{ModelFamily, ProviderType, DEFAULT_MODEL},
    settings::Settings,
};
use crate::{error::Result, services::CallOptions};

/// Effective configuration after merging every layer
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub settings: Settings,
}

impl Config {
    /// Load configuration from files and environment
    ///
    /// # Errors
    ///
    /// Returns an error if a configuration file exists but cannot be parsed
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::global_config_path(), &Self::project_config_path())
    }

    /// Load configuration from explicit file locations plus the environment
    ///
    /// # Errors
    ///
    /// Returns an error if a configuration file exists but cannot be parsed
    pub fn load_from(global: &Path, project: &Path) -> Result<Self> {
        let mut settings = Settings::load_from_path(global)?;
        settings.merge(Settings::load_from_path(project)?);
        settings.apply_env(|name| std::env::var(name).ok());

        tracing::debug!(
            global = %global.display(),
            project = %project.display(),
            has_api_key = settings.api_key.is_some(),
            "configuration loaded"
        );
        Ok(Self { settings })
    }

    /// Get the configuration directory path
    #[must_use]
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("call-ai")
    }

    /// Get the global config file path
    #[must_use]
    pub fn global_config_path() -> PathBuf {
        Self::config_dir().join("config.json")
    }

    /// Get the project config file path in the current directory
    #[must_use]
    pub fn project_config_path() -> PathBuf {
        PathBuf::from(".call-ai.json")
    }

    /// Default options for a call
    #[must_use]
    pub fn call_options(&self) -> CallOptions {
        let s = &self.settings;
        CallOptions {
            api_key: s.api_key.clone(),
            model: s.model.clone().unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            endpoint: s.endpoint.clone(),
            provider: s.provider,
            max_tokens: s.max_tokens,
            temperature: s.temperature,
            headers: s.headers.clone(),
            referer: s.referer.clone(),
            title: s.title.clone(),
            debug: s.debug.unwrap_or(false),
            ..CallOptions::default()
        }
    }
}
