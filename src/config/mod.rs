//! Configuration management for snapscheduler
//!
//! This module provides a layered configuration system that loads settings from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use snapscheduler::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("API server: {}", config.cluster.api_server);
//! ```
//!
//! # Environment Variables
//!
//! Configuration can be overridden using environment variables with the pattern:
//! `SNAPSCHEDULER__<section>__<key>`
//!
//! Examples:
//! - `SNAPSCHEDULER__CLUSTER__API_SERVER=https://10.0.0.1:6443`
//! - `SNAPSCHEDULER__EXPIRATION__DELETE_CONCURRENCY=8`
//! - `SNAPSCHEDULER__CLUSTER__REQUEST_TIMEOUT=1m`
//!
//! The API bearer token is read from `SNAPSCHEDULER_TOKEN` only.
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/snapscheduler.toml`.
//! This can be overridden using the `SNAPSCHEDULER_CONFIG` environment variable.

mod models;
mod sources;
mod validation;

pub use crate::humanize::HumanDuration;
pub use models::{
    ClusterConfig, Config, ExpirationConfig, LoggingConfig, SERVICE_ACCOUNT_CA_FILE, VersionsConfig,
};
pub use validation::ValidationError;

use thiserror::Error;

use crate::expire::ExpirerSettings;
use crate::version::VersionChecker;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

impl Config {
    /// Load configuration from all sources (file + environment)
    ///
    /// Configuration is loaded with the following priority (highest to lowest):
    /// 1. Environment variables (`SNAPSCHEDULER__*`)
    /// 2. TOML file (default: `config/snapscheduler.toml`)
    /// 3. Default values
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file is malformed or validation fails.
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path
    ///
    /// Useful for testing with custom configuration files.
    pub fn load_from_path(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        sources::load_dotenv();
        let mut config = sources::load_from_sources(path)?;
        sources::load_secrets(&mut config);
        validation::validate(&config)?;
        Ok(config)
    }

    /// Engine settings derived from the `[cluster]` and `[expiration]` sections
    pub fn expirer_settings(&self) -> ExpirerSettings {
        let defaults = ExpirerSettings::default();
        ExpirerSettings {
            delete_concurrency: self.expiration.delete_concurrency,
            call_timeout: self
                .cluster
                .request_timeout
                .to_std()
                .unwrap_or(defaults.call_timeout),
        }
    }

    /// Explicit capability set, or `None` when versions should be probed
    pub fn version_override(&self) -> Option<VersionChecker> {
        if self.versions.probe {
            None
        } else {
            Some(VersionChecker::new(
                self.versions.v1alpha1,
                self.versions.v1beta1,
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_load_minimal_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[cluster]
api_server = "https://10.0.0.1:6443"
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = Config::load_from_path(config_path).unwrap();
        assert_eq!(config.cluster.api_server, "https://10.0.0.1:6443");
        assert!(config.version_override().is_none());
    }

    #[test]
    fn test_validation_catches_zero_concurrency() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[expiration]
delete_concurrency = 0
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let result = Config::load_from_path(config_path);
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::ValidationError(ValidationError::InvalidDeleteConcurrency)
        ));
    }

    #[test]
    fn test_malformed_duration_fails_to_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[cluster]
request_timeout = "soon"
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let result = Config::load_from_path(config_path);
        assert!(matches!(result.unwrap_err(), ConfigError::LoadError(_)));
    }

    #[test]
    fn test_full_config_example() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[cluster]
api_server = "https://api.prod.example:6443"
token_file = "/etc/snapscheduler/token"
ca_file = "/etc/snapscheduler/ca.crt"
request_timeout = "20s"
connect_timeout = "5s"
page_size = 250

[expiration]
delete_concurrency = 16
deadline = "2m"

[versions]
probe = false
v1alpha1 = true
v1beta1 = true

[logging]
filter = "snapscheduler=debug,info"
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = Config::load_from_path(config_path).unwrap();

        assert_eq!(config.cluster.page_size, 250);
        assert_eq!(config.logging.filter, "snapscheduler=debug,info");

        let settings = config.expirer_settings();
        assert_eq!(settings.delete_concurrency, 16);
        assert_eq!(settings.call_timeout, Duration::from_secs(20));

        assert_eq!(config.version_override(), Some(VersionChecker::all()));
    }
}
