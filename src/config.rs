//! TOML configuration.
//!
//! ```toml
//! [provider]
//! kind = "gemini"                 # gemini | openai | disabled
//! model = "gemini-3-flash-preview"
//! api_key_env = "API_KEY"
//! timeout_secs = 60
//!
//! [reader]
//! language = "en"                 # en | zh
//! heading_rules = ["markdown", "latin", "cjk"]
//! max_upload_bytes = 52428800
//!
//! [server]
//! bind = "127.0.0.1:7341"
//! ```
//!
//! Every field has a default, so an empty file (or no file) is valid.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::heading::HeadingRules;
use crate::models::Language;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub reader: ReaderConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProviderConfig {
    #[serde(default = "default_provider_kind")]
    pub kind: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Name of the environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Base URL override (e.g. a proxy or an OpenAI-compatible host).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub system_instruction: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: default_provider_kind(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            url: None,
            timeout_secs: default_timeout_secs(),
            system_instruction: None,
        }
    }
}

fn default_provider_kind() -> String {
    "gemini".to_string()
}
fn default_model() -> String {
    "gemini-3-flash-preview".to_string()
}
fn default_api_key_env() -> String {
    "API_KEY".to_string()
}
fn default_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReaderConfig {
    #[serde(default)]
    pub language: Language,
    #[serde(default = "default_heading_rules")]
    pub heading_rules: Vec<String>,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            language: Language::default(),
            heading_rules: default_heading_rules(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

impl ReaderConfig {
    pub fn heading_rules(&self) -> Result<HeadingRules> {
        HeadingRules::from_names(&self.heading_rules).map_err(anyhow::Error::msg)
    }
}

fn default_heading_rules() -> Vec<String> {
    vec!["markdown".to_string(), "latin".to_string(), "cjk".to_string()]
}
fn default_max_upload_bytes() -> usize {
    50 * 1024 * 1024
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}

impl ProviderConfig {
    pub fn is_enabled(&self) -> bool {
        self.kind != "disabled"
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate_config(&config)?;
    Ok(config)
}

/// Loads `path` if it exists, otherwise returns the defaults.
pub fn load_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        Ok(Config::default())
    }
}

fn validate_config(config: &Config) -> Result<()> {
    match config.provider.kind.as_str() {
        "disabled" | "gemini" | "openai" => {}
        other => anyhow::bail!(
            "Unknown provider kind: '{}'. Must be disabled, gemini, or openai.",
            other
        ),
    }

    if config.provider.is_enabled() && config.provider.model.trim().is_empty() {
        anyhow::bail!(
            "provider.model must be specified when kind is '{}'",
            config.provider.kind
        );
    }

    if config.provider.timeout_secs == 0 {
        anyhow::bail!("provider.timeout_secs must be > 0");
    }

    if config.reader.max_upload_bytes == 0 {
        anyhow::bail!("reader.max_upload_bytes must be > 0");
    }

    config.reader.heading_rules()?;
    Ok(())
}
