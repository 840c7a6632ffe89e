use std::collections::HashSet;

use super::{AppConfig, ConfigError};

/// Validate the full application config, returning an error if any rule is violated.
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] when any configuration invariant is violated.
pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    validate_builder(config)?;
    validate_orchestrator(config)?;
    validate_providers(config)?;
    validate_remote_servers(config)?;
    validate_tools(config)?;
    validate_log_level(config)?;
    Ok(())
}

fn validation_err(msg: impl Into<String>) -> ConfigError {
    ConfigError::Validation(msg.into())
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

fn validate_builder(config: &AppConfig) -> Result<(), ConfigError> {
    if config.builder.flush_interval_ms == 0 {
        return Err(validation_err(
            "builder.flush_interval_ms must be greater than 0",
        ));
    }
    if config.builder.max_pending_chars == 0 {
        return Err(validation_err(
            "builder.max_pending_chars must be greater than 0",
        ));
    }
    Ok(())
}

fn validate_orchestrator(config: &AppConfig) -> Result<(), ConfigError> {
    if config.orchestrator.max_iterations == 0 {
        return Err(validation_err(
            "orchestrator.max_iterations must be greater than 0",
        ));
    }
    if config.orchestrator.tool_timeout_secs == 0 {
        return Err(validation_err(
            "orchestrator.tool_timeout_secs must be greater than 0",
        ));
    }
    Ok(())
}

fn validate_providers(config: &AppConfig) -> Result<(), ConfigError> {
    if config.providers.is_empty() {
        return Err(validation_err("providers cannot be empty"));
    }

    let mut names = HashSet::new();
    for provider in &config.providers {
        if provider.name.trim().is_empty() {
            return Err(validation_err("provider name cannot be empty"));
        }
        if !names.insert(provider.name.as_str()) {
            return Err(validation_err(format!(
                "Duplicate provider name '{}'",
                provider.name
            )));
        }
        if !is_http_url(&provider.base_url) {
            return Err(validation_err(format!(
                "Provider '{}': base_url must start with http:// or https://",
                provider.name
            )));
        }
        if provider.api_key.trim().is_empty() {
            return Err(validation_err(format!(
                "Provider '{}': api_key cannot be empty",
                provider.name
            )));
        }
        if provider.model.trim().is_empty() {
            return Err(validation_err(format!(
                "Provider '{}': model cannot be empty",
                provider.name
            )));
        }
        if provider.timeout == 0 {
            return Err(validation_err(format!(
                "Provider '{}': timeout must be greater than 0",
                provider.name
            )));
        }
        if let Some(effort) = provider.reasoning_effort.as_deref() {
            if !["minimal", "low", "medium", "high"].contains(&effort) {
                return Err(validation_err(format!(
                    "Provider '{}': reasoning_effort must be one of minimal, low, medium, high",
                    provider.name
                )));
            }
        }
    }

    let defaults = config
        .providers
        .iter()
        .filter(|provider| provider.is_default)
        .count();
    if defaults > 1 {
        return Err(validation_err(format!(
            "Only one provider can be marked as default, found {defaults}"
        )));
    }
    Ok(())
}

fn validate_remote_servers(config: &AppConfig) -> Result<(), ConfigError> {
    let mut labels = HashSet::new();
    for server in &config.remote_servers {
        if server.label.trim().is_empty() {
            return Err(validation_err("remote server label cannot be empty"));
        }
        if !labels.insert(server.label.as_str()) {
            return Err(validation_err(format!(
                "Duplicate remote server label '{}'",
                server.label
            )));
        }
        if !is_http_url(&server.url) {
            return Err(validation_err(format!(
                "Remote server '{}': url must start with http:// or https://",
                server.label
            )));
        }
    }
    Ok(())
}

fn validate_tools(config: &AppConfig) -> Result<(), ConfigError> {
    let mut names = HashSet::new();
    for tool in &config.tools {
        if tool.name.trim().is_empty() {
            return Err(validation_err("tool name cannot be empty"));
        }
        if !names.insert(tool.name.as_str()) {
            return Err(validation_err(format!("Duplicate tool name '{}'", tool.name)));
        }
        if !tool.parameters.is_object() {
            return Err(validation_err(format!(
                "Tool '{}': parameters must be a JSON schema object",
                tool.name
            )));
        }
    }
    Ok(())
}

fn validate_log_level(config: &AppConfig) -> Result<(), ConfigError> {
    let valid_levels = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL", "DISABLED"];
    if !valid_levels.contains(&config.features.log_level.to_uppercase().as_str()) {
        return Err(validation_err(format!(
            "log_level must be one of {valid_levels:?}"
        )));
    }
    Ok(())
}
