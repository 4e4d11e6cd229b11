//! Loading engine configuration from YAML

use super::schema::EngineConfig;
use super::validate::validate_config;
use crate::error::{Error, Result};
use std::fs;
use std::path::Path;

/// Load and validate engine configuration from a YAML file
///
/// # Example
///
/// ```no_run
/// use tensorgrad::config::load_config;
///
/// let config = load_config("tensorgrad.yaml")?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn load_config<P: AsRef<Path>>(config_path: P) -> Result<EngineConfig> {
    let yaml_content = fs::read_to_string(config_path.as_ref()).map_err(|e| {
        Error::ConfigError(format!(
            "Failed to read config file {}: {}",
            config_path.as_ref().display(),
            e
        ))
    })?;

    parse_config(&yaml_content)
}

/// Parse and validate engine configuration from a YAML string
pub fn parse_config(yaml: &str) -> Result<EngineConfig> {
    let config: EngineConfig = serde_yaml::from_str(yaml)
        .map_err(|e| Error::ConfigError(format!("Failed to parse YAML config: {}", e)))?;

    validate_config(&config).map_err(|e| Error::ConfigError(format!("Invalid config: {}", e)))?;

    Ok(config)
}
