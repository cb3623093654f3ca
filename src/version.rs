//! Snapshot API versions available in the target cluster
//!
//! Built once at startup, either by probing the API server or from an explicit
//! configuration override, and then passed by value to every component that
//! has to pick a concrete API version. It never changes afterwards; tests
//! construct their own instance instead of mutating shared state.

use tracing::info;

use crate::cluster::{ClusterClient, ClusterError};
use crate::snapshot::SnapshotVersion;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VersionChecker {
    v1alpha1: bool,
    v1beta1: bool,
}

impl VersionChecker {
    pub fn new(v1alpha1: bool, v1beta1: bool) -> Self {
        Self { v1alpha1, v1beta1 }
    }

    /// Capability set with every supported version enabled
    pub fn all() -> Self {
        Self::new(true, true)
    }

    pub fn from_versions(versions: impl IntoIterator<Item = SnapshotVersion>) -> Self {
        versions
            .into_iter()
            .fold(Self::default(), |mut checker, version| {
                match version {
                    SnapshotVersion::V1Alpha1 => checker.v1alpha1 = true,
                    SnapshotVersion::V1Beta1 => checker.v1beta1 = true,
                }
                checker
            })
    }

    /// Ask the cluster which snapshot API versions it serves
    pub async fn probe(client: &dyn ClusterClient) -> Result<Self, ClusterError> {
        let served = client.served_versions().await?;
        let checker = Self::from_versions(served);
        info!(
            v1alpha1 = checker.v1alpha1,
            v1beta1 = checker.v1beta1,
            "Detected snapshot API versions"
        );
        Ok(checker)
    }

    pub fn has_v1alpha1(&self) -> bool {
        self.v1alpha1
    }

    pub fn has_v1beta1(&self) -> bool {
        self.v1beta1
    }

    pub fn is_enabled(&self, version: SnapshotVersion) -> bool {
        match version {
            SnapshotVersion::V1Alpha1 => self.v1alpha1,
            SnapshotVersion::V1Beta1 => self.v1beta1,
        }
    }

    /// Enabled versions, newest first
    pub fn enabled(&self) -> Vec<SnapshotVersion> {
        SnapshotVersion::ALL
            .into_iter()
            .rev()
            .filter(|v| self.is_enabled(*v))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        !self.v1alpha1 && !self.v1beta1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::InMemoryCluster;

    #[test]
    fn test_from_versions() {
        let checker = VersionChecker::from_versions([SnapshotVersion::V1Beta1]);
        assert!(!checker.has_v1alpha1());
        assert!(checker.has_v1beta1());
        assert_eq!(checker.enabled(), vec![SnapshotVersion::V1Beta1]);
    }

    #[test]
    fn test_enabled_is_newest_first() {
        assert_eq!(
            VersionChecker::all().enabled(),
            vec![SnapshotVersion::V1Beta1, SnapshotVersion::V1Alpha1]
        );
        assert!(VersionChecker::default().enabled().is_empty());
        assert!(VersionChecker::default().is_empty());
    }

    #[tokio::test]
    async fn test_probe() {
        let cluster = InMemoryCluster::with_served_versions([SnapshotVersion::V1Alpha1]);
        let checker = VersionChecker::probe(&cluster).await.unwrap();
        assert_eq!(checker, VersionChecker::new(true, false));
    }
}
