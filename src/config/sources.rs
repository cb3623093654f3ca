use super::models::Config;
use config::{ConfigError, Environment, File};
use std::env;
use std::path::{Path, PathBuf};

const CONFIG_ENV_VAR: &str = "SNAPSCHEDULER_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/snapscheduler.toml";
const ENV_PREFIX: &str = "SNAPSCHEDULER";
const ENV_SEPARATOR: &str = "__";
const TOKEN_ENV_VAR: &str = "SNAPSCHEDULER_TOKEN";
const DOTENV_FILE: &str = ".env";

/// Load configuration from multiple sources with priority:
/// 1. Defaults (embedded in structs)
/// 2. TOML file (if exists)
/// 3. Environment variables from .env file (via dotenvy)
/// 4. System environment variables (highest priority)
pub fn load() -> Result<Config, ConfigError> {
    load_dotenv();

    let config_path = env::var(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

    let mut config = load_from_sources(config_path)?;
    load_secrets(&mut config);

    Ok(config)
}

/// Load `.env` into the process environment if it exists
pub fn load_dotenv() {
    // Missing file is fine
    let _ = dotenvy::dotenv();
}

/// Secrets are never read from TOML files, only from the environment or `.env`
pub fn load_secrets(config: &mut Config) {
    load_secrets_from(config, Path::new(DOTENV_FILE));
}

fn load_secrets_from(config: &mut Config, dotenv_path: &Path) {
    let token = env::var(TOKEN_ENV_VAR)
        .ok()
        .or_else(|| dotenv_value(dotenv_path, TOKEN_ENV_VAR));

    if let Some(token) = token.filter(|t| !t.trim().is_empty()) {
        config.cluster.token = Some(token.trim().to_string());
    }
}

fn dotenv_value(path: &Path, key: &str) -> Option<String> {
    dotenvy::from_path_iter(path)
        .ok()?
        .filter_map(|item| item.ok())
        .find(|(k, _)| k == key)
        .map(|(_, v)| v)
}

/// Load configuration from a specific path and environment
/// Useful for testing with custom config files
pub fn load_from_sources(config_path: PathBuf) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();

    if config_path.exists() {
        tracing::info!("Loading configuration from: {}", config_path.display());
        builder = builder.add_source(File::from(config_path).required(false));
    } else {
        tracing::warn!(
            "Configuration file not found at {}, using defaults and environment overrides",
            config_path.display()
        );
    }

    // SNAPSCHEDULER__CLUSTER__API_SERVER -> cluster.api_server
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .try_parsing(true),
    );

    let config = builder.build()?;
    config.try_deserialize()
}
