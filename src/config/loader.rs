//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::config::schema::ServiceConfig;
use crate::config::validation::{validate_config, ValidationError};
use crate::middleware::MiddlewareSpec;

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Load and validate configuration from a TOML file.
///
/// When `middleware-config-path` is set, that file is loaded too and its
/// pipeline replaces the inline one. A relative path is resolved against
/// the main configuration file's directory.
pub fn load_config(path: &Path) -> Result<ServiceConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    let mut config = parse_config(&content)?;

    if let Some(middleware_path) = config.middleware_config_path.clone() {
        let resolved = match path.parent() {
            Some(dir) if middleware_path.is_relative() => dir.join(&middleware_path),
            _ => middleware_path,
        };
        config.middleware = load_middleware(&resolved)?;
    }
    Ok(config)
}

/// Parse and validate configuration from a TOML string. The
/// `middleware-config-path` indirection is left for [`load_config`];
/// here the inline pipeline is taken as-is.
pub fn parse_config(content: &str) -> Result<ServiceConfig, ConfigError> {
    let config: ServiceConfig = toml::from_str(content).map_err(ConfigError::Parse)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// A middleware file carries the same `[[middleware]]` tables as the
/// main configuration, and nothing else is read from it.
fn load_middleware(path: &Path) -> Result<Vec<MiddlewareSpec>, ConfigError> {
    #[derive(Deserialize)]
    struct MiddlewareFile {
        #[serde(default)]
        middleware: Vec<MiddlewareSpec>,
    }

    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    let file: MiddlewareFile = toml::from_str(&content).map_err(ConfigError::Parse)?;
    Ok(file.middleware)
}
