//! Configuration loading shared by the binaries
//!
//! Each binary defines its own `Config` with defaults; this module layers an
//! optional YAML file and environment variable overrides on top.

use crate::{CoreError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

/// Environment variable naming an optional YAML configuration file
pub const CONFIG_PATH_ENV: &str = "ROUTER_CONFIG";

/// Logging configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,
    /// Emit JSON lines instead of compact text
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl LoggingConfig {
    pub fn apply_env(&mut self) -> Result<()> {
        if let Some(level) = env_var::<String>("LOG_LEVEL")? {
            self.level = level;
        }
        if let Some(format) = env_var::<String>("LOG_FORMAT")? {
            self.json = format.eq_ignore_ascii_case("json");
        }
        Ok(())
    }
}

/// Load `T` from the YAML file named by [`CONFIG_PATH_ENV`], or its default
/// when the variable is unset
pub fn load_file_or_default<T: DeserializeOwned + Default>() -> Result<T> {
    match std::env::var(CONFIG_PATH_ENV) {
        Ok(path) if !path.trim().is_empty() => load_yaml(path.trim()),
        _ => Ok(T::default()),
    }
}

/// Load `T` from a YAML file
pub fn load_yaml<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    Ok(serde_yaml::from_str(&contents)?)
}

/// Read and parse an environment variable.
///
/// Unset or blank variables yield `None`; unparsable ones are an error.
pub fn env_var<T: FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => value.trim().parse().map(Some).map_err(|_| {
            CoreError::InvalidConfiguration(format!("{} has an invalid value: {:?}", name, value))
        }),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, Deserialize, PartialEq)]
    #[serde(default)]
    struct Sample {
        name: String,
        port: u16,
    }

    #[test]
    fn test_env_var_unset_is_none() {
        assert_eq!(env_var::<u16>("ROUTING_CORE_TEST_UNSET").unwrap(), None);
    }

    #[test]
    fn test_env_var_parses() {
        std::env::set_var("ROUTING_CORE_TEST_PORT", " 8081 ");
        assert_eq!(env_var::<u16>("ROUTING_CORE_TEST_PORT").unwrap(), Some(8081));
        std::env::remove_var("ROUTING_CORE_TEST_PORT");
    }

    #[test]
    fn test_env_var_invalid_is_error() {
        std::env::set_var("ROUTING_CORE_TEST_BAD", "eighty");
        let result = env_var::<u16>("ROUTING_CORE_TEST_BAD");
        assert!(matches!(result, Err(CoreError::InvalidConfiguration(_))));
        std::env::remove_var("ROUTING_CORE_TEST_BAD");
    }

    #[test]
    fn test_load_yaml_partial_file() {
        let path = std::env::temp_dir().join(format!("routing-core-{}.yaml", std::process::id()));
        std::fs::write(&path, "port: 9090\n").unwrap();

        let sample: Sample = load_yaml(&path).unwrap();
        assert_eq!(sample, Sample { name: String::new(), port: 9090 });

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_load_yaml_missing_file() {
        let result = load_yaml::<Sample>("/nonexistent/routing.yaml");
        assert!(matches!(result, Err(CoreError::Io(_))));
    }

    #[test]
    fn test_logging_defaults() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, "info");
        assert!(!config.json);
    }
}
