use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("{resource} {namespace}/{name} not found")]
    NotFound {
        resource: String,
        namespace: String,
        name: String,
    },

    #[error("API server returned HTTP {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Invalid cluster client configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Request interrupted: {0}")]
    Interrupted(String),
}

impl ClusterError {
    /// True when the target resource does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ClusterError::NotFound { .. } | ClusterError::Api { status: 404, .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, ClusterError>;
