//! Cluster resource client abstraction
//!
//! The expiration engine only needs three things from the cluster: list the
//! snapshots of one API version by label, delete one snapshot, and report
//! which snapshot API versions are served. [`ClusterClient`] captures that
//! surface so the engine can run against the real API server
//! ([`HttpClusterClient`]) or an in-process fake ([`InMemoryCluster`]).

mod error;
pub mod http;
pub mod memory;

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use crate::snapshot::{MultiversionSnapshot, SnapshotVersion, v1alpha1, v1beta1};

pub use error::{ClusterError, Result};
pub use http::{HttpClusterClient, HttpClusterSettings};
pub use memory::InMemoryCluster;

/// Equality-based label selector (`key=value,...`)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSelector {
    match_labels: BTreeMap<String, String>,
}

impl LabelSelector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.match_labels.insert(key.into(), value.into());
        self
    }

    /// Render for the `labelSelector` query parameter
    pub fn to_query(&self) -> String {
        self.match_labels
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.match_labels
            .iter()
            .all(|(k, v)| labels.get(k) == Some(v))
    }
}

/// Items returned by a single-version list call
#[derive(Debug, Clone)]
pub enum SnapshotList {
    V1Alpha1(Vec<v1alpha1::VolumeSnapshot>),
    V1Beta1(Vec<v1beta1::VolumeSnapshot>),
}

impl SnapshotList {
    pub fn len(&self) -> usize {
        match self {
            SnapshotList::V1Alpha1(items) => items.len(),
            SnapshotList::V1Beta1(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wrap every item in the version-independent view
    pub fn into_snapshots(self) -> Vec<MultiversionSnapshot> {
        match self {
            SnapshotList::V1Alpha1(items) => items.into_iter().map(Into::into).collect(),
            SnapshotList::V1Beta1(items) => items.into_iter().map(Into::into).collect(),
        }
    }
}

/// Namespaced VolumeSnapshot operations against a cluster
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// List every snapshot of `version` in `namespace` matching `selector`
    ///
    /// Implementations must return the complete set, following pagination.
    async fn list_snapshots(
        &self,
        version: SnapshotVersion,
        namespace: &str,
        selector: &LabelSelector,
    ) -> Result<SnapshotList>;

    /// Delete one snapshot; a missing object is reported as `NotFound`
    async fn delete_snapshot(
        &self,
        version: SnapshotVersion,
        namespace: &str,
        name: &str,
    ) -> Result<()>;

    /// Snapshot API versions served by the cluster
    async fn served_versions(&self) -> Result<Vec<SnapshotVersion>>;
}

/// Bound a cluster call by `timeout`
pub async fn with_timeout<T, F>(timeout: Duration, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(ClusterError::Timeout(timeout)),
    }
}
