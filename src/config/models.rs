use crate::humanize::HumanDuration;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub cluster: ClusterConfig,
    #[serde(default)]
    pub expiration: ExpirationConfig,
    #[serde(default)]
    pub versions: VersionsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// API server connection
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClusterConfig {
    #[serde(default = "default_api_server")]
    pub api_server: String,
    #[serde(default = "default_token_file")]
    pub token_file: PathBuf,
    /// Bearer token (loaded from environment, not from config file)
    #[serde(skip)]
    pub token: Option<String>,
    #[serde(default = "default_ca_file")]
    pub ca_file: Option<PathBuf>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout: HumanDuration,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: HumanDuration,
    /// Items requested per list page
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            api_server: default_api_server(),
            token_file: default_token_file(),
            token: None,
            ca_file: default_ca_file(),
            request_timeout: default_request_timeout(),
            connect_timeout: default_connect_timeout(),
            page_size: default_page_size(),
        }
    }
}

fn default_api_server() -> String {
    "https://kubernetes.default.svc".to_string()
}

fn default_token_file() -> PathBuf {
    PathBuf::from("/var/run/secrets/kubernetes.io/serviceaccount/token")
}

/// CA bundle mounted into every pod with a service account
pub const SERVICE_ACCOUNT_CA_FILE: &str = "/var/run/secrets/kubernetes.io/serviceaccount/ca.crt";

fn default_ca_file() -> Option<PathBuf> {
    Some(PathBuf::from(SERVICE_ACCOUNT_CA_FILE))
}

fn default_request_timeout() -> HumanDuration {
    HumanDuration::from_secs(30)
}

fn default_connect_timeout() -> HumanDuration {
    HumanDuration::from_secs(10)
}

fn default_page_size() -> u32 {
    500
}

/// Expiration engine tunables
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExpirationConfig {
    #[serde(default = "default_delete_concurrency")]
    pub delete_concurrency: usize,
    /// Upper bound on one full pass over a schedule
    #[serde(default = "default_deadline")]
    pub deadline: HumanDuration,
}

impl Default for ExpirationConfig {
    fn default() -> Self {
        Self {
            delete_concurrency: default_delete_concurrency(),
            deadline: default_deadline(),
        }
    }
}

fn default_delete_concurrency() -> usize {
    4
}

fn default_deadline() -> HumanDuration {
    HumanDuration::from_secs(5 * 60)
}

/// Snapshot API version detection
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VersionsConfig {
    /// Ask the API server at startup; when false the flags below are used as-is
    #[serde(default = "default_probe")]
    pub probe: bool,
    #[serde(default)]
    pub v1alpha1: bool,
    #[serde(default)]
    pub v1beta1: bool,
}

impl Default for VersionsConfig {
    fn default() -> Self {
        Self {
            probe: default_probe(),
            v1alpha1: false,
            v1beta1: false,
        }
    }
}

fn default_probe() -> bool {
    true
}

/// Log output
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// `tracing` env-filter directive, overridden by `RUST_LOG`
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

fn default_log_filter() -> String {
    "info".to_string()
}
