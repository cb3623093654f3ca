//! Lookup of the snapshots belonging to a schedule

use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::cluster::{ClusterClient, ClusterError, LabelSelector, with_timeout};
use crate::schedule::{SCHEDULE_LABEL, SnapshotSchedule};
use crate::snapshot::{MultiversionSnapshot, SnapshotVersion};
use crate::version::VersionChecker;

/// Kubernetes limit on label value length
pub const MAX_LABEL_VALUE_LEN: usize = 63;

#[derive(Debug, Error)]
pub enum SelectorError {
    #[error("schedule name {value:?} is not a valid label value: {reason}")]
    InvalidLabelValue { value: String, reason: &'static str },

    #[error("schedule {0:?} has no namespace")]
    MissingNamespace(String),

    #[error("listing {version} snapshots failed: {source}")]
    List {
        version: SnapshotVersion,
        #[source]
        source: ClusterError,
    },
}

impl SelectorError {
    /// True for problems in the schedule itself rather than the cluster
    pub fn is_configuration(&self) -> bool {
        !matches!(self, SelectorError::List { .. })
    }
}

/// Check `value` against the label value grammar
///
/// Empty, or at most 63 characters that begin and end with an alphanumeric
/// and contain only alphanumerics, `-`, `_` and `.` in between.
pub fn validate_label_value(value: &str) -> Result<(), SelectorError> {
    let invalid = |reason| SelectorError::InvalidLabelValue {
        value: value.to_string(),
        reason,
    };

    if value.is_empty() {
        return Ok(());
    }
    if value.len() > MAX_LABEL_VALUE_LEN {
        return Err(invalid("must be no more than 63 characters"));
    }

    let bytes = value.as_bytes();
    let edges_ok = bytes[0].is_ascii_alphanumeric() && bytes[bytes.len() - 1].is_ascii_alphanumeric();
    let body_ok = bytes
        .iter()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'));

    if !body_ok {
        return Err(invalid("may only contain alphanumerics, '-', '_' or '.'"));
    }
    if !edges_ok {
        return Err(invalid("must start and end with an alphanumeric character"));
    }
    Ok(())
}

/// List every snapshot created by `schedule`
///
/// One list call is made per enabled API version, each bounded by
/// `call_timeout`. Any failing call fails the whole lookup. An object served
/// under several versions is returned once, through the newest version.
/// Items outside the schedule's namespace or without its label are dropped.
pub async fn snapshots_from_schedule(
    schedule: &SnapshotSchedule,
    versions: VersionChecker,
    client: &dyn ClusterClient,
    call_timeout: Duration,
) -> Result<Vec<MultiversionSnapshot>, SelectorError> {
    let name = schedule.name();
    let namespace = schedule.namespace();

    validate_label_value(name)?;
    if namespace.is_empty() {
        return Err(SelectorError::MissingNamespace(name.to_string()));
    }

    if versions.is_empty() {
        warn!(schedule = name, namespace, "No snapshot API versions enabled");
        return Ok(Vec::new());
    }

    let selector = LabelSelector::new().with_label(SCHEDULE_LABEL, name);
    let mut seen = HashSet::new();
    let mut snapshots = Vec::new();

    for version in versions.enabled() {
        let list = with_timeout(
            call_timeout,
            client.list_snapshots(version, namespace, &selector),
        )
        .await
        .map_err(|source| SelectorError::List { version, source })?;

        debug!(schedule = name, namespace, %version, count = list.len(), "Listed snapshots");

        for snap in list.into_snapshots() {
            if snap.namespace() != namespace || snap.schedule_label() != Some(name) {
                debug!(snapshot = %snap.identity(), "Skipping snapshot outside schedule scope");
                continue;
            }
            if seen.insert(snap.identity()) {
                snapshots.push(snap);
            }
        }
    }

    Ok(snapshots)
}
