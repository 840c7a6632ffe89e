pub mod validation;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::builder::BuilderConfig;
use crate::orchestrator::OrchestratorConfig;
use crate::protocol::{ProviderKind, RemoteServer, RequestOptions, ToolDefinition};

use self::validation::validate_config;

/// Error type for configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Text batching of the event builder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuilderSettings {
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
    #[serde(default = "default_max_pending_chars")]
    pub max_pending_chars: usize,
}

fn default_flush_interval_ms() -> u64 {
    50
}
fn default_max_pending_chars() -> usize {
    256
}

impl Default for BuilderSettings {
    fn default() -> Self {
        Self {
            flush_interval_ms: default_flush_interval_ms(),
            max_pending_chars: default_max_pending_chars(),
        }
    }
}

impl BuilderSettings {
    #[must_use]
    pub fn to_builder_config(&self) -> BuilderConfig {
        BuilderConfig {
            flush_interval: Duration::from_millis(self.flush_interval_ms),
            max_pending_chars: self.max_pending_chars,
        }
    }
}

/// Tool-call loop limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorSettings {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
}

fn default_max_iterations() -> u32 {
    10
}
fn default_tool_timeout_secs() -> u64 {
    30
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            tool_timeout_secs: default_tool_timeout_secs(),
        }
    }
}

/// One model provider endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    pub kind: ProviderKind,
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    #[serde(default)]
    pub max_tokens: Option<u64>,
    #[serde(default)]
    pub reasoning_effort: Option<String>,
    #[serde(default)]
    pub api_version: Option<String>,
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default)]
    pub is_default: bool,
}

fn default_timeout() -> u64 {
    180
}

/// Feature flags and settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturesConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_json: bool,
}

fn default_log_level() -> String {
    "INFO".to_string()
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub builder: BuilderSettings,
    #[serde(default)]
    pub orchestrator: OrchestratorSettings,
    pub providers: Vec<ProviderConfig>,
    #[serde(default)]
    pub remote_servers: Vec<RemoteServer>,
    #[serde(default)]
    pub tools: Vec<ToolDefinition>,
    #[serde(default)]
    pub features: FeaturesConfig,
}

impl AppConfig {
    /// The provider named `name`, or the default provider when `name` is `None`.
    #[must_use]
    pub fn provider(&self, name: Option<&str>) -> Option<&ProviderConfig> {
        match name {
            Some(name) => self.providers.iter().find(|provider| provider.name == name),
            None => self
                .providers
                .iter()
                .find(|provider| provider.is_default)
                .or_else(|| self.providers.first()),
        }
    }

    #[must_use]
    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            max_iterations: self.orchestrator.max_iterations,
            tool_timeout: Duration::from_secs(self.orchestrator.tool_timeout_secs),
            builder: self.builder.to_builder_config(),
        }
    }

    /// Request options for `provider`, carrying the configured tools and
    /// remote servers.
    #[must_use]
    pub fn request_options(&self, provider: &ProviderConfig) -> RequestOptions {
        RequestOptions {
            model: provider.model.clone(),
            max_tokens: provider.max_tokens,
            tools: self.tools.clone(),
            remote_servers: self.remote_servers.clone(),
            reasoning_effort: provider.reasoning_effort.clone(),
            stream: true,
        }
    }
}

/// Load configuration from a YAML file and validate it.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] when reading the file fails, [`ConfigError::Yaml`]
/// when parsing fails, or [`ConfigError::Validation`] when semantic validation fails.
pub fn load_config(path: &str) -> Result<AppConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    let config: AppConfig = serde_yaml::from_str(&contents)?;
    validate_config(&config)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_example_config() {
        // The example config should load and validate successfully
        let config = load_config("config.example.yaml");
        assert!(
            config.is_ok(),
            "Failed to load example config: {:?}",
            config.err()
        );
        let config = config.unwrap();
        assert_eq!(config.builder.flush_interval_ms, 50);
        assert_eq!(config.builder.max_pending_chars, 256);
        assert_eq!(config.orchestrator.max_iterations, 10);
        assert!(config.providers.len() >= 3);
        assert_eq!(config.provider(None).unwrap().kind, ProviderKind::OpenAiChat);
        assert_eq!(
            config.provider(Some("claude")).unwrap().kind,
            ProviderKind::Anthropic
        );
        assert_eq!(config.remote_servers[0].label, "docs");
    }

    #[test]
    fn test_defaults_from_minimal_yaml() {
        let config: AppConfig = serde_yaml::from_str(
            "providers:\n  - name: p\n    kind: anthropic\n    base_url: https://api.anthropic.com/v1\n    api_key: k\n    model: m\n",
        )
        .unwrap();
        assert_eq!(config.orchestrator.tool_timeout_secs, 30);
        assert_eq!(config.features.log_level, "INFO");
        assert_eq!(config.providers[0].timeout, 180);

        let orchestrator = config.orchestrator_config();
        assert_eq!(orchestrator.max_iterations, 10);
        assert_eq!(orchestrator.builder.flush_interval, Duration::from_millis(50));
        assert_eq!(config.provider(None).unwrap().name, "p");
    }

    #[test]
    fn test_request_options_carry_tools_and_servers() {
        let config: AppConfig = serde_yaml::from_str(
            r"
providers:
  - name: r
    kind: openai_responses
    base_url: https://api.openai.com/v1
    api_key: k
    model: gpt-5
    reasoning_effort: low
remote_servers:
  - label: docs
    url: https://mcp.example/sse
tools:
  - name: get_weather
    description: Current weather
",
        )
        .unwrap();
        let options = config.request_options(&config.providers[0]);
        assert!(options.stream);
        assert_eq!(options.reasoning_effort.as_deref(), Some("low"));
        assert_eq!(options.default_server_label(), Some("docs"));
        assert_eq!(options.tools[0].parameters["type"], "object");
    }
}
