//! `snapshot.storage.k8s.io/v1beta1` VolumeSnapshot schema

use serde::{Deserialize, Serialize};

use super::meta::ObjectMeta;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeSnapshot {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: VolumeSnapshotSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeSnapshotSpec {
    #[serde(default)]
    pub source: VolumeSnapshotSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_snapshot_class_name: Option<String>,
}

/// Exactly one of the two fields is set by the API server
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeSnapshotSource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistent_volume_claim_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_snapshot_content_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeSnapshotList {
    #[serde(default)]
    pub items: Vec<VolumeSnapshot>,
    #[serde(default)]
    pub metadata: super::ListMeta,
}

impl VolumeSnapshot {
    pub fn new(metadata: ObjectMeta) -> Self {
        Self {
            metadata,
            spec: VolumeSnapshotSpec::default(),
        }
    }

    pub fn with_source_pvc(mut self, pvc_name: impl Into<String>) -> Self {
        self.spec.source.persistent_volume_claim_name = Some(pvc_name.into());
        self
    }
}
