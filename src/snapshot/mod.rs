//! Version-independent view of `VolumeSnapshot` resources
//!
//! The cluster may serve the snapshot API under several incompatible schema
//! revisions. [`MultiversionSnapshot`] wraps any of them and exposes the
//! handful of fields the expiration engine needs, plus a delete call that is
//! routed to the matching API version. Nothing outside this module matches on
//! the variants.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use snapscheduler::snapshot::{MultiversionSnapshot, v1beta1};
//!
//! let snap = MultiversionSnapshot::from(beta_object);
//! if snap.creation_time() < threshold {
//!     snap.delete(client.as_ref()).await?;
//! }
//! ```

pub mod meta;
pub mod v1alpha1;
pub mod v1beta1;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::cluster::{ClusterClient, ClusterError};
use crate::schedule::SCHEDULE_LABEL;

pub use meta::{ObjectMeta, SnapshotRef};

/// API group serving VolumeSnapshot resources
pub const SNAPSHOT_GROUP: &str = "snapshot.storage.k8s.io";

/// Plural resource name used in REST paths
pub const SNAPSHOT_RESOURCE: &str = "volumesnapshots";

/// Supported schema revisions, ordered oldest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotVersion {
    V1Alpha1,
    V1Beta1,
}

impl SnapshotVersion {
    pub const ALL: [SnapshotVersion; 2] = [SnapshotVersion::V1Alpha1, SnapshotVersion::V1Beta1];

    /// Version segment, e.g. `v1beta1`
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotVersion::V1Alpha1 => "v1alpha1",
            SnapshotVersion::V1Beta1 => "v1beta1",
        }
    }

    /// Full `apiVersion`, e.g. `snapshot.storage.k8s.io/v1beta1`
    pub fn api_version(&self) -> String {
        format!("{}/{}", SNAPSHOT_GROUP, self.as_str())
    }

    pub fn from_version_str(version: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|v| v.as_str() == version)
    }
}

impl fmt::Display for SnapshotVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// List metadata shared by every version's list type
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListMeta {
    #[serde(default, rename = "continue")]
    pub continue_token: Option<String>,
}

/// Result of an idempotent delete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteStatus {
    Deleted,
    /// Someone else removed it first
    AlreadyAbsent,
}

/// A VolumeSnapshot of any supported schema revision
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MultiversionSnapshot {
    V1Alpha1(v1alpha1::VolumeSnapshot),
    V1Beta1(v1beta1::VolumeSnapshot),
}

impl MultiversionSnapshot {
    pub fn version(&self) -> SnapshotVersion {
        match self {
            MultiversionSnapshot::V1Alpha1(_) => SnapshotVersion::V1Alpha1,
            MultiversionSnapshot::V1Beta1(_) => SnapshotVersion::V1Beta1,
        }
    }

    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            MultiversionSnapshot::V1Alpha1(snap) => &snap.metadata,
            MultiversionSnapshot::V1Beta1(snap) => &snap.metadata,
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata().name
    }

    pub fn namespace(&self) -> &str {
        &self.metadata().namespace
    }

    pub fn identity(&self) -> SnapshotRef {
        SnapshotRef::new(self.namespace(), self.name())
    }

    /// Creation time; snapshots without one sort before everything else
    pub fn creation_time(&self) -> DateTime<Utc> {
        self.metadata()
            .creation_timestamp
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Name of the PVC this snapshot was taken from, if recorded
    pub fn source_volume_name(&self) -> Option<&str> {
        let name = match self {
            MultiversionSnapshot::V1Alpha1(snap) => {
                snap.spec.source.as_ref().map(|src| src.name.as_str())
            }
            MultiversionSnapshot::V1Beta1(snap) => {
                snap.spec.source.persistent_volume_claim_name.as_deref()
            }
        };
        name.filter(|n| !n.is_empty())
    }

    /// Name of the schedule that created this snapshot
    pub fn schedule_label(&self) -> Option<&str> {
        self.metadata().labels.get(SCHEDULE_LABEL).map(String::as_str)
    }

    /// Delete through the API version this object was read from
    ///
    /// `NotFound` is reported as [`DeleteStatus::AlreadyAbsent`].
    pub async fn delete(&self, client: &dyn ClusterClient) -> Result<DeleteStatus, ClusterError> {
        let version = self.version();
        match client
            .delete_snapshot(version, self.namespace(), self.name())
            .await
        {
            Ok(()) => Ok(DeleteStatus::Deleted),
            Err(e) if e.is_not_found() => {
                debug!(snapshot = %self.identity(), %version, "Snapshot already gone");
                Ok(DeleteStatus::AlreadyAbsent)
            }
            Err(e) => Err(e),
        }
    }
}

impl From<v1alpha1::VolumeSnapshot> for MultiversionSnapshot {
    fn from(snap: v1alpha1::VolumeSnapshot) -> Self {
        MultiversionSnapshot::V1Alpha1(snap)
    }
}

impl From<v1beta1::VolumeSnapshot> for MultiversionSnapshot {
    fn from(snap: v1beta1::VolumeSnapshot) -> Self {
        MultiversionSnapshot::V1Beta1(snap)
    }
}
