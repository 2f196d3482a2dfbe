use std::env;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SyndicateError};
use crate::llm::{LanguageModel, StubModel};
use crate::openai::OpenAiClient;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub organization: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            api_key: None,
            base_url: None,
            organization: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "stub".into()
}

fn default_model() -> String {
    "stub-model".into()
}

fn default_request_timeout_secs() -> u64 {
    60
}

impl ModelConfig {
    /// Build the transport for the configured provider.
    pub fn build_client(&self) -> Result<Arc<dyn LanguageModel>> {
        match self.provider.to_ascii_lowercase().as_str() {
            "openai" => Ok(Arc::new(OpenAiClient::from_config(self)?)),
            "stub" => Ok(StubModel::new(Vec::new())),
            other => Err(SyndicateError::Config(format!(
                "unsupported model provider `{other}`"
            ))),
        }
    }
}

/// Defaults applied to every agent built from this configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentDefaults {
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub max_tool_rounds: Option<usize>,
}

impl Default for AgentDefaults {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
            max_tool_rounds: None,
        }
    }
}

impl AgentDefaults {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

pub(crate) fn default_temperature() -> f32 {
    0.7
}

pub(crate) fn default_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub agent: AgentDefaults,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let cfg: Self = toml::from_str(&raw)
            .map_err(|err| SyndicateError::Config(format!("Failed to parse configuration: {err}")))?;
        Ok(cfg)
    }

    pub fn from_env_or_file(path: impl AsRef<Path>) -> Result<Self> {
        let mut cfg = Self::from_file(path)?;
        cfg.apply_env();
        Ok(cfg)
    }

    /// Apply `SYNDICATE_*` overrides. Unparseable numbers are ignored.
    pub fn apply_env(&mut self) {
        if let Ok(provider) = env::var("SYNDICATE_PROVIDER") {
            self.model.provider = provider;
        }
        if let Ok(model) = env::var("SYNDICATE_MODEL") {
            self.model.model = model;
        }
        if let Ok(key) = env::var("SYNDICATE_API_KEY") {
            self.model.api_key = Some(key);
        }
        if let Ok(url) = env::var("SYNDICATE_BASE_URL") {
            self.model.base_url = Some(url);
        }
        if let Ok(org) = env::var("SYNDICATE_ORGANIZATION") {
            self.model.organization = Some(org);
        }
        if let Ok(temperature) = env::var("SYNDICATE_TEMPERATURE") {
            if let Ok(parsed) = temperature.parse::<f32>() {
                self.agent.temperature = parsed.clamp(0.0, 2.0);
            }
        }
        if let Ok(timeout) = env::var("SYNDICATE_TIMEOUT_SECS") {
            if let Ok(parsed) = timeout.parse::<u64>() {
                self.agent.timeout_secs = parsed;
            }
        }
        if let Ok(level) = env::var("SYNDICATE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(json) = env::var("SYNDICATE_LOG_JSON") {
            if let Ok(parsed) = json.parse::<bool>() {
                self.logging.json = parsed;
            }
        }
    }
}
