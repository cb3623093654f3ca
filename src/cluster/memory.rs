//! In-process fake cluster for tests and local development

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;

use super::error::{ClusterError, Result};
use super::{ClusterClient, LabelSelector, SnapshotList};
use crate::snapshot::{MultiversionSnapshot, SNAPSHOT_RESOURCE, SnapshotVersion};

type ObjectKey = (SnapshotVersion, String, String);

/// Snapshot store keyed by (version, namespace, name)
///
/// Each stored object lives under the API version it was inserted with.
/// Failures and latency can be injected to exercise error paths.
#[derive(Debug)]
pub struct InMemoryCluster {
    served: BTreeSet<SnapshotVersion>,
    objects: RwLock<BTreeMap<ObjectKey, MultiversionSnapshot>>,
    failing_deletes: RwLock<HashSet<String>>,
    failing_lists: RwLock<HashSet<SnapshotVersion>>,
    latency: Option<Duration>,
    list_calls: AtomicUsize,
    delete_calls: AtomicUsize,
}

impl InMemoryCluster {
    /// Fake cluster serving every supported version
    pub fn new() -> Self {
        Self::with_served_versions(SnapshotVersion::ALL)
    }

    pub fn with_served_versions(versions: impl IntoIterator<Item = SnapshotVersion>) -> Self {
        Self {
            served: versions.into_iter().collect(),
            objects: RwLock::new(BTreeMap::new()),
            failing_deletes: RwLock::new(HashSet::new()),
            failing_lists: RwLock::new(HashSet::new()),
            latency: None,
            list_calls: AtomicUsize::new(0),
            delete_calls: AtomicUsize::new(0),
        }
    }

    /// Delay every list and delete call
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub async fn insert(&self, snapshot: impl Into<MultiversionSnapshot>) {
        let snapshot = snapshot.into();
        let key = (
            snapshot.version(),
            snapshot.namespace().to_string(),
            snapshot.name().to_string(),
        );
        self.objects.write().await.insert(key, snapshot);
    }

    pub async fn get(
        &self,
        version: SnapshotVersion,
        namespace: &str,
        name: &str,
    ) -> Option<MultiversionSnapshot> {
        let key = (version, namespace.to_string(), name.to_string());
        self.objects.read().await.get(&key).cloned()
    }

    /// Every stored snapshot, across versions and namespaces
    pub async fn all(&self) -> Vec<MultiversionSnapshot> {
        self.objects.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }

    /// Make deletes of any snapshot called `name` fail with HTTP 403
    pub async fn fail_delete_of(&self, name: impl Into<String>) {
        self.failing_deletes.write().await.insert(name.into());
    }

    /// Make list calls for `version` fail with HTTP 500
    pub async fn fail_list_of(&self, version: SnapshotVersion) {
        self.failing_lists.write().await.insert(version);
    }

    /// Drop every injected failure
    pub async fn clear_failures(&self) {
        self.failing_deletes.write().await.clear();
        self.failing_lists.write().await.clear();
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::Relaxed)
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::Relaxed)
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn ensure_served(&self, version: SnapshotVersion) -> Result<()> {
        if self.served.contains(&version) {
            Ok(())
        } else {
            Err(ClusterError::Api {
                status: 404,
                message: format!("the server could not find the requested resource ({})", version.api_version()),
            })
        }
    }
}

impl Default for InMemoryCluster {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ClusterClient for InMemoryCluster {
    async fn list_snapshots(
        &self,
        version: SnapshotVersion,
        namespace: &str,
        selector: &LabelSelector,
    ) -> Result<SnapshotList> {
        self.list_calls.fetch_add(1, Ordering::Relaxed);
        self.simulate_latency().await;
        self.ensure_served(version)?;

        if self.failing_lists.read().await.contains(&version) {
            return Err(ClusterError::Api {
                status: 500,
                message: format!("injected list failure for {}", version),
            });
        }

        let objects = self.objects.read().await;
        let matching = objects
            .iter()
            .filter(|((v, ns, _), snap)| {
                *v == version && ns == namespace && selector.matches(&snap.metadata().labels)
            })
            .map(|(_, snap)| snap.clone());

        let list = match version {
            SnapshotVersion::V1Alpha1 => SnapshotList::V1Alpha1(
                matching
                    .filter_map(|snap| match snap {
                        MultiversionSnapshot::V1Alpha1(inner) => Some(inner),
                        _ => None,
                    })
                    .collect(),
            ),
            SnapshotVersion::V1Beta1 => SnapshotList::V1Beta1(
                matching
                    .filter_map(|snap| match snap {
                        MultiversionSnapshot::V1Beta1(inner) => Some(inner),
                        _ => None,
                    })
                    .collect(),
            ),
        };
        Ok(list)
    }

    async fn delete_snapshot(
        &self,
        version: SnapshotVersion,
        namespace: &str,
        name: &str,
    ) -> Result<()> {
        self.delete_calls.fetch_add(1, Ordering::Relaxed);
        self.simulate_latency().await;
        self.ensure_served(version)?;

        if self.failing_deletes.read().await.contains(name) {
            return Err(ClusterError::Api {
                status: 403,
                message: format!("injected delete failure for {}/{}", namespace, name),
            });
        }

        let key = (version, namespace.to_string(), name.to_string());
        match self.objects.write().await.remove(&key) {
            Some(_) => Ok(()),
            None => Err(ClusterError::NotFound {
                resource: SNAPSHOT_RESOURCE.to_string(),
                namespace: namespace.to_string(),
                name: name.to_string(),
            }),
        }
    }

    async fn served_versions(&self) -> Result<Vec<SnapshotVersion>> {
        Ok(self.served.iter().copied().collect())
    }
}
