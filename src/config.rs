use serde::{Deserialize, Serialize};
use std::env;
use thiserror::Error;
use validator::Validate;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Environment variable error: {0}")]
    EnvVar(#[from] std::env::VarError),

    #[error("Parse error for {field}: {value} - {source}")]
    Parse {
        field: String,
        value: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Engine configuration with validation.
#[derive(Clone, Debug, Validate, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Path to the schema reflection document (tables + FK edges).
    #[validate(length(min = 1, message = "schema_path cannot be empty"))]
    pub schema_path: String,

    /// Path to an agent-DSL method catalog to merge over the built-in one.
    /// Empty means "built-in catalog only".
    #[serde(default)]
    pub agent_catalog_path: String,

    /// Ceiling on `IN` filter list size before `AnalyzeComplexity` tags a
    /// query complex (spec.md §4.D).
    #[validate(range(min = 1, max = 10_000, message = "max_in_filter_size must be between 1 and 10000"))]
    pub max_in_filter_size: u32,

    /// Whether planning traces are recorded (they're always produced;
    /// this controls whether the facade logs them at `debug` level).
    #[serde(default)]
    pub log_traces: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            schema_path: "schema.yaml".to_string(),
            agent_catalog_path: String::new(),
            max_in_filter_size: 32,
            log_traces: false,
        }
    }
}

impl EngineConfig {
    /// Create configuration from environment variables with validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self {
            schema_path: env::var("HTNQL_SCHEMA_PATH")
                .unwrap_or_else(|_| "schema.yaml".to_string()),
            agent_catalog_path: env::var("HTNQL_AGENT_CATALOG_PATH").unwrap_or_default(),
            max_in_filter_size: parse_env_var("HTNQL_MAX_IN_FILTER_SIZE", "32")?,
            log_traces: parse_env_var("HTNQL_LOG_TRACES", "false")?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Create configuration from CLI arguments with validation.
    pub fn from_cli(cli: CliConfig) -> Result<Self, ConfigError> {
        let config = Self {
            schema_path: cli.schema_path,
            agent_catalog_path: cli.agent_catalog_path.unwrap_or_default(),
            max_in_filter_size: cli.max_in_filter_size,
            log_traces: cli.log_traces,
        };
        config.validate()?;
        Ok(config)
    }

    /// Create configuration from a YAML file.
    pub fn from_yaml_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Parse {
            field: "yaml_file".to_string(),
            value: "file read failed".to_string(),
            source: Box::new(e),
        })?;

        let config: Self = serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse {
            field: "yaml_content".to_string(),
            value: content,
            source: Box::new(e),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Merge with another configuration (the other's fields win).
    pub fn merge(&mut self, other: Self) {
        self.schema_path = other.schema_path;
        self.agent_catalog_path = other.agent_catalog_path;
        self.max_in_filter_size = other.max_in_filter_size;
        self.log_traces = other.log_traces;
    }
}

/// CLI configuration (parsed from command line arguments).
#[derive(Clone, Debug)]
pub struct CliConfig {
    pub schema_path: String,
    pub agent_catalog_path: Option<String>,
    pub max_in_filter_size: u32,
    pub log_traces: bool,
}

/// Parse an environment variable with a default value.
fn parse_env_var<T: std::str::FromStr>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let value = env::var(key).unwrap_or_else(|_| default.to_string());
    value.parse().map_err(|e| ConfigError::Parse {
        field: key.to_string(),
        value,
        source: Box::new(e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_in_filter_size, 32);
    }

    #[test]
    fn rejects_empty_schema_path() {
        let config = EngineConfig {
            schema_path: String::new(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_oversized_filter_limit() {
        let config = EngineConfig {
            max_in_filter_size: 20_000,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
