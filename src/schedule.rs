//! SnapshotSchedule resource as read by the expiration engine

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::snapshot::ObjectMeta;

/// Label written on every snapshot naming the schedule that created it
pub const SCHEDULE_LABEL: &str = "snapscheduler.backube/schedule";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotSchedule {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: SnapshotScheduleSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotScheduleSpec {
    #[serde(default)]
    pub retention: RetentionSpec,
}

/// Retention policy of a schedule; both limits are optional and independent
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetentionSpec {
    /// Maximum snapshot age, e.g. `"168h"`. Empty means unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<String>,
    /// Snapshots kept per source volume
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_count: Option<u32>,
}

impl SnapshotSchedule {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            metadata: ObjectMeta::new(namespace, name),
            spec: SnapshotScheduleSpec::default(),
        }
    }

    pub fn with_expires(mut self, expires: impl Into<String>) -> Self {
        self.spec.retention.expires = Some(expires.into());
        self
    }

    pub fn with_max_count(mut self, max_count: u32) -> Self {
        self.spec.retention.max_count = Some(max_count);
        self
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn namespace(&self) -> &str {
        &self.metadata.namespace
    }

    /// Configured `expires` value, treating an empty string as unset
    pub fn expires(&self) -> Option<&str> {
        self.spec
            .retention
            .expires
            .as_deref()
            .filter(|s| !s.trim().is_empty())
    }

    pub fn max_count(&self) -> Option<u32> {
        self.spec.retention.max_count
    }
}

#[derive(Debug, Error)]
pub enum ScheduleFileError {
    #[error("failed to read schedule file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid JSON schedule: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid TOML schedule: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Read a schedule from disk; `.toml` files are parsed as TOML, anything else as JSON
pub fn load_schedule(path: &Path) -> Result<SnapshotSchedule, ScheduleFileError> {
    let raw = std::fs::read_to_string(path)?;
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("toml") => Ok(toml::from_str(&raw)?),
        _ => Ok(serde_json::from_str(&raw)?),
    }
}
