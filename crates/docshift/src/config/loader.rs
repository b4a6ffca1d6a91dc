use std::path::Path;

use crate::config::schema::{Config, CONFIG_VERSION};
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../schema/config-v1.json");

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: Config = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != CONFIG_VERSION {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    if config.storage_root.as_os_str().is_empty() {
        return Err(ConfigError::Validation {
            message: "storage_root must not be empty".to_string(),
        });
    }

    if config.database_path.as_os_str().is_empty() {
        return Err(ConfigError::Validation {
            message: "database_path must not be empty".to_string(),
        });
    }

    for (name, program) in [
        ("tools.office", &config.tools.office),
        ("tools.pdf_renderer", &config.tools.pdf_renderer),
        ("tools.slides", &config.tools.slides),
    ] {
        if program.trim().is_empty() {
            return Err(ConfigError::Validation {
                message: format!("{} must not be empty", name),
            });
        }
    }

    if config.tool_timeout_secs == 0 {
        return Err(ConfigError::Validation {
            message: "tool_timeout_secs must be greater than 0".to_string(),
        });
    }

    // A live attempt must never look stale while its tool is still allowed to run.
    if config.processing_lease_secs < config.tool_timeout_secs {
        return Err(ConfigError::Validation {
            message: format!(
                "processing_lease_secs ({}) must be at least tool_timeout_secs ({})",
                config.processing_lease_secs, config.tool_timeout_secs
            ),
        });
    }

    Ok(())
}
