//! Expiration engine
//!
//! [`Expirer`] applies a schedule's two retention policies to the live set of
//! snapshots in the cluster:
//!
//! - **time**: delete snapshots older than `retention.expires`
//! - **count**: per source volume, keep only the newest `retention.maxCount`
//!
//! Each evaluator is stateless: it lists the schedule's snapshots, computes
//! the candidates, and deletes them. A re-run after a partial failure simply
//! recomputes from what is left in the cluster.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let expirer = Expirer::new(client, versions, ExpirerSettings::default());
//! expirer.expire_by_time(&schedule).await?;
//! expirer.expire_by_count(&schedule).await?;
//! ```

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::cluster::{ClusterClient, ClusterError, with_timeout};
use crate::observability::Metrics;
use crate::retention::{
    RetentionError, excess_over_count, expiration_threshold, filter_expired,
    group_by_source_volume,
};
use crate::schedule::SnapshotSchedule;
use crate::selector::{SelectorError, snapshots_from_schedule};
use crate::snapshot::{DeleteStatus, MultiversionSnapshot, SnapshotRef, SnapshotVersion};
use crate::version::VersionChecker;

#[derive(Debug, Error)]
pub enum ExpireError {
    #[error(transparent)]
    Retention(#[from] RetentionError),

    #[error(transparent)]
    Selector(#[from] SelectorError),

    #[error(transparent)]
    Deletion(#[from] DeletionError),

    #[error("expiration of schedule {schedule} exceeded deadline of {deadline:?}")]
    DeadlineExceeded { schedule: String, deadline: Duration },
}

impl ExpireError {
    /// Errors in the schedule itself rather than the cluster
    pub fn is_configuration(&self) -> bool {
        match self {
            ExpireError::Retention(_) => true,
            ExpireError::Selector(e) => e.is_configuration(),
            ExpireError::Deletion(_) | ExpireError::DeadlineExceeded { .. } => false,
        }
    }
}

/// One snapshot that could not be deleted
#[derive(Debug)]
pub struct DeletionFailure {
    pub snapshot: SnapshotRef,
    pub version: SnapshotVersion,
    pub source: ClusterError,
}

/// Aggregate of every failed deletion in a batch
#[derive(Debug)]
pub struct DeletionError {
    pub failures: Vec<DeletionFailure>,
    pub succeeded: usize,
}

impl fmt::Display for DeletionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "failed to delete {} of {} snapshots",
            self.failures.len(),
            self.failures.len() + self.succeeded
        )?;
        for (i, failure) in self.failures.iter().enumerate() {
            let sep = if i == 0 { ": " } else { "; " };
            write!(
                f,
                "{}{} ({}): {}",
                sep, failure.snapshot, failure.version, failure.source
            )?;
        }
        Ok(())
    }
}

impl std::error::Error for DeletionError {}

#[derive(Debug)]
pub enum DeletionOutcome {
    Deleted,
    AlreadyAbsent,
    Failed(ClusterError),
}

/// Per-item outcomes of a deletion batch, in completion order
#[derive(Debug, Default)]
pub struct DeletionReport {
    pub outcomes: Vec<(SnapshotRef, SnapshotVersion, DeletionOutcome)>,
}

impl DeletionReport {
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn deleted(&self) -> usize {
        self.count(|o| matches!(o, DeletionOutcome::Deleted))
    }

    pub fn already_absent(&self) -> usize {
        self.count(|o| matches!(o, DeletionOutcome::AlreadyAbsent))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, DeletionOutcome::Failed(_)))
    }

    fn count(&self, pred: impl Fn(&DeletionOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|(_, _, o)| pred(o)).count()
    }

    /// Success summary, or the aggregate of every failure
    pub fn into_result(self) -> Result<DeletionSummary, DeletionError> {
        let mut summary = DeletionSummary::default();
        let mut failures = Vec::new();

        for (snapshot, version, outcome) in self.outcomes {
            match outcome {
                DeletionOutcome::Deleted => summary.deleted += 1,
                DeletionOutcome::AlreadyAbsent => summary.already_absent += 1,
                DeletionOutcome::Failed(source) => failures.push(DeletionFailure {
                    snapshot,
                    version,
                    source,
                }),
            }
        }

        if failures.is_empty() {
            Ok(summary)
        } else {
            Err(DeletionError {
                failures,
                succeeded: summary.deleted + summary.already_absent,
            })
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeletionSummary {
    pub deleted: usize,
    pub already_absent: usize,
}

impl DeletionSummary {
    pub fn total(&self) -> usize {
        self.deleted + self.already_absent
    }
}

/// Result of running both policies for one schedule
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExpirationSummary {
    pub by_time: DeletionSummary,
    pub by_count: DeletionSummary,
}

/// Tunables for the expiration engine
#[derive(Debug, Clone)]
pub struct ExpirerSettings {
    /// Maximum deletions in flight per batch
    pub delete_concurrency: usize,
    /// Bound on each individual list or delete call
    pub call_timeout: Duration,
}

impl Default for ExpirerSettings {
    fn default() -> Self {
        Self {
            delete_concurrency: 4,
            call_timeout: Duration::from_secs(30),
        }
    }
}

/// Applies retention policies of schedules against a cluster
///
/// Cheap to share behind an `Arc`; distinct schedules can be evaluated
/// concurrently. Dropping an evaluator future aborts its in-flight deletions.
pub struct Expirer {
    client: Arc<dyn ClusterClient>,
    versions: VersionChecker,
    settings: ExpirerSettings,
    metrics: Arc<Metrics>,
}

impl Expirer {
    pub fn new(
        client: Arc<dyn ClusterClient>,
        versions: VersionChecker,
        settings: ExpirerSettings,
    ) -> Self {
        Self {
            client,
            versions,
            settings,
            metrics: Arc::new(Metrics::new()),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn versions(&self) -> VersionChecker {
        self.versions
    }

    async fn list(
        &self,
        schedule: &SnapshotSchedule,
    ) -> Result<Vec<MultiversionSnapshot>, SelectorError> {
        snapshots_from_schedule(
            schedule,
            self.versions,
            self.client.as_ref(),
            self.settings.call_timeout,
        )
        .await
    }

    /// Snapshots the time policy would delete at `now`
    pub async fn plan_by_time(
        &self,
        schedule: &SnapshotSchedule,
        now: DateTime<Utc>,
    ) -> Result<Vec<MultiversionSnapshot>, ExpireError> {
        let Some(threshold) = expiration_threshold(schedule, now)? else {
            return Ok(Vec::new());
        };

        let snapshots = self.list(schedule).await?;
        let listed = snapshots.len();
        let expired = filter_expired(snapshots, threshold);
        debug!(
            schedule = schedule.name(),
            namespace = schedule.namespace(),
            %threshold,
            listed,
            expired = expired.len(),
            "Evaluated time-based retention"
        );
        Ok(expired)
    }

    /// Snapshots the count policy would delete
    pub async fn plan_by_count(
        &self,
        schedule: &SnapshotSchedule,
    ) -> Result<Vec<MultiversionSnapshot>, ExpireError> {
        let Some(max_count) = schedule.max_count() else {
            return Ok(Vec::new());
        };

        let snapshots = self.list(schedule).await?;
        let mut candidates = Vec::new();

        for (volume, group) in group_by_source_volume(snapshots) {
            let size = group.len();
            let excess = excess_over_count(group, max_count as usize);
            if !excess.is_empty() {
                debug!(
                    schedule = schedule.name(),
                    namespace = schedule.namespace(),
                    volume = %volume,
                    size,
                    max_count,
                    excess = excess.len(),
                    "Volume over snapshot count"
                );
                candidates.extend(excess);
            }
        }
        Ok(candidates)
    }

    /// Delete snapshots of `schedule` older than `retention.expires`
    pub async fn expire_by_time(
        &self,
        schedule: &SnapshotSchedule,
    ) -> Result<DeletionSummary, ExpireError> {
        self.metrics.evaluation();
        let result = self.run_by_time(schedule).await;
        self.finish(schedule, "time", result)
    }

    /// Delete the oldest snapshots of each volume beyond `retention.maxCount`
    pub async fn expire_by_count(
        &self,
        schedule: &SnapshotSchedule,
    ) -> Result<DeletionSummary, ExpireError> {
        self.metrics.evaluation();
        let result = self.run_by_count(schedule).await;
        self.finish(schedule, "count", result)
    }

    async fn run_by_time(&self, schedule: &SnapshotSchedule) -> Result<DeletionSummary, ExpireError> {
        let candidates = self.plan_by_time(schedule, Utc::now()).await?;
        Ok(self.delete_snapshots(candidates).await?)
    }

    async fn run_by_count(&self, schedule: &SnapshotSchedule) -> Result<DeletionSummary, ExpireError> {
        let candidates = self.plan_by_count(schedule).await?;
        Ok(self.delete_snapshots(candidates).await?)
    }

    /// Run the time policy, then the count policy on what remains
    pub async fn expire(
        &self,
        schedule: &SnapshotSchedule,
    ) -> Result<ExpirationSummary, ExpireError> {
        let by_time = self.expire_by_time(schedule).await?;
        let by_count = self.expire_by_count(schedule).await?;
        Ok(ExpirationSummary { by_time, by_count })
    }

    /// [`Expirer::expire`] bounded by an overall deadline
    pub async fn expire_within(
        &self,
        schedule: &SnapshotSchedule,
        deadline: Duration,
    ) -> Result<ExpirationSummary, ExpireError> {
        match tokio::time::timeout(deadline, self.expire(schedule)).await {
            Ok(result) => result,
            Err(_) => {
                self.metrics.evaluation_failed();
                Err(ExpireError::DeadlineExceeded {
                    schedule: format!("{}/{}", schedule.namespace(), schedule.name()),
                    deadline,
                })
            }
        }
    }

    fn finish(
        &self,
        schedule: &SnapshotSchedule,
        policy: &'static str,
        result: Result<DeletionSummary, ExpireError>,
    ) -> Result<DeletionSummary, ExpireError> {
        match &result {
            Ok(summary) if summary.total() > 0 => info!(
                schedule = schedule.name(),
                namespace = schedule.namespace(),
                policy,
                deleted = summary.deleted,
                already_absent = summary.already_absent,
                "Expired snapshots"
            ),
            Ok(_) => {}
            Err(e) => {
                self.metrics.evaluation_failed();
                warn!(
                    schedule = schedule.name(),
                    namespace = schedule.namespace(),
                    policy,
                    error = %e,
                    "Snapshot expiration failed"
                );
            }
        }
        result
    }

    /// Delete every candidate, failing with an aggregate of what could not be deleted
    pub async fn delete_snapshots(
        &self,
        candidates: Vec<MultiversionSnapshot>,
    ) -> Result<DeletionSummary, DeletionError> {
        self.delete_all(candidates).await.into_result()
    }

    /// Delete every candidate and report each outcome
    ///
    /// Deletions run concurrently, at most `delete_concurrency` at a time, with
    /// no ordering between them. A failure never stops the rest of the batch.
    pub async fn delete_all(&self, candidates: Vec<MultiversionSnapshot>) -> DeletionReport {
        let mut report = DeletionReport::default();
        if candidates.is_empty() {
            return report;
        }

        let semaphore = Arc::new(Semaphore::new(self.settings.delete_concurrency.max(1)));
        let call_timeout = self.settings.call_timeout;
        let mut pending: HashMap<SnapshotRef, SnapshotVersion> = HashMap::new();
        let mut tasks = JoinSet::new();

        for snap in candidates {
            pending.insert(snap.identity(), snap.version());
            let client = Arc::clone(&self.client);
            let semaphore = Arc::clone(&semaphore);

            tasks.spawn(async move {
                // The semaphore is never closed
                let _permit = semaphore.acquire_owned().await.ok();
                let outcome = match with_timeout(call_timeout, snap.delete(client.as_ref())).await {
                    Ok(DeleteStatus::Deleted) => DeletionOutcome::Deleted,
                    Ok(DeleteStatus::AlreadyAbsent) => DeletionOutcome::AlreadyAbsent,
                    Err(e) => DeletionOutcome::Failed(e),
                };
                (snap.identity(), snap.version(), outcome)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let (snapshot, version, outcome) = match joined {
                Ok(done) => done,
                Err(e) => {
                    warn!(error = %e, "Snapshot deletion task did not complete");
                    continue;
                }
            };
            pending.remove(&snapshot);
            self.record(&snapshot, version, &outcome);
            report.outcomes.push((snapshot, version, outcome));
        }

        for (snapshot, version) in pending {
            let outcome = DeletionOutcome::Failed(ClusterError::Interrupted(
                "deletion task panicked or was cancelled".to_string(),
            ));
            self.record(&snapshot, version, &outcome);
            report.outcomes.push((snapshot, version, outcome));
        }

        report
    }

    fn record(&self, snapshot: &SnapshotRef, version: SnapshotVersion, outcome: &DeletionOutcome) {
        match outcome {
            DeletionOutcome::Deleted => {
                self.metrics.snapshot_deleted();
                info!(snapshot = %snapshot, %version, "Deleted snapshot");
            }
            DeletionOutcome::AlreadyAbsent => {
                self.metrics.snapshot_already_absent();
                debug!(snapshot = %snapshot, %version, "Snapshot was already deleted");
            }
            DeletionOutcome::Failed(e) => {
                self.metrics.delete_failed();
                warn!(snapshot = %snapshot, %version, error = %e, "Failed to delete snapshot");
            }
        }
    }
}
