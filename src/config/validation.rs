use super::models::Config;
use crate::humanize::HumanDuration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid API server URL '{url}', expected 'http://' or 'https://'")]
    InvalidApiServer { url: String },

    #[error("Timeout must be positive: {field} = {value}")]
    InvalidTimeout { field: String, value: HumanDuration },

    #[error("cluster.page_size must be at least 1")]
    InvalidPageSize,

    #[error("expiration.delete_concurrency must be at least 1")]
    InvalidDeleteConcurrency,

    #[error("versions.probe is disabled but no snapshot API version is enabled")]
    NoVersionsEnabled,
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_cluster(config)?;
    validate_expiration(config)?;
    validate_versions(config)?;
    Ok(())
}

fn validate_cluster(config: &Config) -> Result<(), ValidationError> {
    let url = &config.cluster.api_server;
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(ValidationError::InvalidApiServer { url: url.clone() });
    }

    ensure_positive("cluster.request_timeout", config.cluster.request_timeout)?;
    ensure_positive("cluster.connect_timeout", config.cluster.connect_timeout)?;

    if config.cluster.page_size == 0 {
        return Err(ValidationError::InvalidPageSize);
    }
    Ok(())
}

fn validate_expiration(config: &Config) -> Result<(), ValidationError> {
    if config.expiration.delete_concurrency == 0 {
        return Err(ValidationError::InvalidDeleteConcurrency);
    }
    ensure_positive("expiration.deadline", config.expiration.deadline)
}

fn validate_versions(config: &Config) -> Result<(), ValidationError> {
    let versions = &config.versions;
    if !versions.probe && !versions.v1alpha1 && !versions.v1beta1 {
        return Err(ValidationError::NoVersionsEnabled);
    }
    Ok(())
}

fn ensure_positive(field: &str, value: HumanDuration) -> Result<(), ValidationError> {
    if value.is_positive() {
        Ok(())
    } else {
        Err(ValidationError::InvalidTimeout {
            field: field.to_string(),
            value,
        })
    }
}
