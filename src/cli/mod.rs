//! CLI argument parsing and command routing

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// call-ai: chat with LLM endpoints from the terminal
#[derive(Debug, Parser)]
#[command(name = "call-ai")]
#[command(about = "Call OpenRouter, OpenAI and Anthropic chat models", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Send a prompt and print the response
    Chat(ChatArgs),

    /// Show configuration
    Config {
        /// Print the effective settings
        #[arg(long)]
        list: bool,

        /// Print the config file locations
        #[arg(long)]
        path: bool,

        /// Set a value in the config file (e.g. `model=openai/gpt-4o-mini`)
        #[arg(long, value_name = "KEY=VALUE")]
        set: Vec<String>,

        /// Write to the global config instead of the project config
        #[arg(long, requires = "set")]
        global: bool,
    },

    /// Show version information
    Version,
}

/// Arguments of `call-ai chat`
#[derive(Debug, clap::Args)]
pub struct ChatArgs {
    /// The prompt to send
    pub prompt: String,

    /// Model id (e.g. `anthropic/claude-3.5-sonnet`)
    #[arg(short, long)]
    pub model: Option<String>,

    /// Stream the response as it arrives
    #[arg(short, long)]
    pub stream: bool,

    /// JSON schema file for structured output
    #[arg(long, value_name = "FILE")]
    pub schema: Option<PathBuf>,

    /// Name given to the schema (tool or `json_schema` name)
    #[arg(long, requires = "schema")]
    pub schema_name: Option<String>,

    /// Only parse the response, do not validate it against the schema
    #[arg(long, requires = "schema")]
    pub no_strict: bool,

    /// Maximum tokens to generate
    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// Sampling temperature
    #[arg(long)]
    pub temperature: Option<f32>,

    /// Chat endpoint URL
    #[arg(long, env = "CALLAI_CHAT_URL")]
    pub endpoint: Option<String>,

    /// System message sent before the prompt
    #[arg(long)]
    pub system: Option<String>,

    /// Log request and stream details for this call
    #[arg(long)]
    pub debug: bool,
}

impl Cli {
    /// Parse CLI arguments from environment
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
