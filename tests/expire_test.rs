//! Retention scenarios run end to end against the in-memory cluster

use chrono::{DateTime, TimeDelta, Utc};
use std::sync::Arc;
use std::time::Duration;

use snapscheduler::cluster::InMemoryCluster;
use snapscheduler::snapshot::{ObjectMeta, SnapshotVersion, v1alpha1, v1beta1};
use snapscheduler::{
    ExpireError, Expirer, ExpirerSettings, SCHEDULE_LABEL, SnapshotSchedule, VersionChecker,
};

fn snapshot_meta(namespace: &str, schedule: &str, created: DateTime<Utc>) -> ObjectMeta {
    ObjectMeta::new(
        namespace,
        format!("{}-{}-{}", namespace, schedule, created.format("%Y%m%d%H%M%S")),
    )
    .with_creation_timestamp(created)
    .with_label("foo", "bar")
    .with_label(SCHEDULE_LABEL, schedule)
}

fn alpha(
    namespace: &str,
    schedule: &str,
    created: DateTime<Utc>,
    pvc: &str,
) -> v1alpha1::VolumeSnapshot {
    v1alpha1::VolumeSnapshot::new(snapshot_meta(namespace, schedule, created)).with_source_pvc(pvc)
}

fn expirer(cluster: &Arc<InMemoryCluster>, versions: VersionChecker) -> Expirer {
    Expirer::new(cluster.clone(), versions, ExpirerSettings::default())
}

#[tokio::test]
async fn test_expire_by_time_scope() {
    let cluster = Arc::new(InMemoryCluster::new());
    let now = Utc::now();
    let recent = now - TimeDelta::hours(1);
    let old = now - TimeDelta::hours(48);

    for namespace in ["same", "different"] {
        for schedule in ["schedule", "different"] {
            for created in [recent, old] {
                cluster.insert(alpha(namespace, schedule, created, "pvc")).await;
            }
        }
    }
    assert_eq!(cluster.len().await, 8);

    let schedule = SnapshotSchedule::new("same", "schedule").with_expires("24h");
    let summary = expirer(&cluster, VersionChecker::new(true, false))
        .expire_by_time(&schedule)
        .await
        .unwrap();

    assert_eq!(summary.deleted, 1);
    assert_eq!(cluster.len().await, 7);

    let expired_name = snapshot_meta("same", "schedule", old).name;
    assert!(
        cluster
            .get(SnapshotVersion::V1Alpha1, "same", &expired_name)
            .await
            .is_none()
    );
}

#[tokio::test]
async fn test_expire_by_time_without_expires_is_noop() {
    let cluster = Arc::new(InMemoryCluster::new());
    let old = Utc::now() - TimeDelta::days(365);
    cluster.insert(alpha("same", "schedule", old, "pvc")).await;

    let schedule = SnapshotSchedule::new("same", "schedule");
    let summary = expirer(&cluster, VersionChecker::all())
        .expire_by_time(&schedule)
        .await
        .unwrap();

    assert_eq!(summary.total(), 0);
    assert_eq!(cluster.list_calls(), 0);
    assert_eq!(cluster.len().await, 1);
}

#[tokio::test]
async fn test_expire_by_time_rejects_bad_duration() {
    let cluster = Arc::new(InMemoryCluster::new());
    let schedule = SnapshotSchedule::new("same", "schedule").with_expires("-10s");

    let err = expirer(&cluster, VersionChecker::all())
        .expire_by_time(&schedule)
        .await
        .unwrap_err();

    assert!(err.is_configuration());
    assert_eq!(cluster.list_calls(), 0);
}

#[tokio::test]
async fn test_expire_by_count_scope() {
    let cluster = Arc::new(InMemoryCluster::new());
    let now = Utc::now();

    let kept: Vec<_> = (0..4)
        .map(|hours| alpha("same", "schedule", now - TimeDelta::hours(hours), "pvc1"))
        .collect();
    for snap in &kept {
        cluster.insert(snap.clone()).await;
    }
    let older = now - TimeDelta::hours(10);
    cluster.insert(alpha("different", "schedule", older, "pvc1")).await;
    cluster.insert(alpha("same", "schedule", older, "pvc2")).await;
    cluster
        .insert(alpha("same", "other", now - TimeDelta::hours(11), "pvc1"))
        .await;
    assert_eq!(cluster.len().await, 7);

    let noexpire = SnapshotSchedule::new("same", "schedule");
    let summary = expirer(&cluster, VersionChecker::new(true, false))
        .expire_by_count(&noexpire)
        .await
        .unwrap();
    assert_eq!(summary.total(), 0);
    assert_eq!(cluster.len().await, 7);

    let schedule = SnapshotSchedule::new("same", "schedule").with_max_count(3);
    let summary = expirer(&cluster, VersionChecker::new(true, false))
        .expire_by_count(&schedule)
        .await
        .unwrap();

    assert_eq!(summary.deleted, 1);
    assert_eq!(cluster.len().await, 6);

    // pvc1 has four in scope; the oldest of them (3h) goes
    let oldest = &kept[3].metadata.name;
    assert!(
        cluster
            .get(SnapshotVersion::V1Alpha1, "same", oldest)
            .await
            .is_none()
    );
}

#[tokio::test]
async fn test_expire_by_count_groups_are_independent() {
    let cluster = Arc::new(InMemoryCluster::new());
    let now = Utc::now();

    for minutes in 0..5 {
        cluster
            .insert(alpha("apps", "hourly", now - TimeDelta::minutes(minutes), "big"))
            .await;
    }
    cluster
        .insert(alpha("apps", "hourly", now - TimeDelta::days(30), "small"))
        .await;

    let schedule = SnapshotSchedule::new("apps", "hourly").with_max_count(2);
    let summary = expirer(&cluster, VersionChecker::all())
        .expire_by_count(&schedule)
        .await
        .unwrap();

    assert_eq!(summary.deleted, 3);
    let remaining = cluster.all().await;
    assert_eq!(remaining.len(), 3);
    assert_eq!(
        remaining
            .iter()
            .filter(|snap| snap.source_volume_name() == Some("small"))
            .count(),
        1
    );
}

#[tokio::test]
async fn test_max_count_zero_deletes_group() {
    let cluster = Arc::new(InMemoryCluster::new());
    let now = Utc::now();
    for hours in 0..3 {
        cluster
            .insert(alpha("apps", "hourly", now - TimeDelta::hours(hours), "data"))
            .await;
    }

    let schedule = SnapshotSchedule::new("apps", "hourly").with_max_count(0);
    let summary = expirer(&cluster, VersionChecker::all())
        .expire_by_count(&schedule)
        .await
        .unwrap();

    assert_eq!(summary.deleted, 3);
    assert!(cluster.is_empty().await);
}

#[tokio::test]
async fn test_mixed_versions() {
    let cluster = Arc::new(InMemoryCluster::new());
    let old = Utc::now() - TimeDelta::hours(48);

    cluster.insert(alpha("apps", "daily", old, "data")).await;
    let beta = v1beta1::VolumeSnapshot::new(
        ObjectMeta::new("apps", "beta-snap")
            .with_creation_timestamp(old)
            .with_label(SCHEDULE_LABEL, "daily"),
    )
    .with_source_pvc("data");
    cluster.insert(beta).await;

    let schedule = SnapshotSchedule::new("apps", "daily").with_expires("24h");

    let summary = expirer(&cluster, VersionChecker::new(false, true))
        .expire_by_time(&schedule)
        .await
        .unwrap();
    assert_eq!(summary.deleted, 1);
    assert!(
        cluster
            .get(SnapshotVersion::V1Beta1, "apps", "beta-snap")
            .await
            .is_none()
    );
    assert_eq!(cluster.len().await, 1);

    let summary = expirer(&cluster, VersionChecker::all())
        .expire_by_time(&schedule)
        .await
        .unwrap();
    assert_eq!(summary.deleted, 1);
    assert!(cluster.is_empty().await);
}

#[tokio::test]
async fn test_rerun_after_partial_failure() {
    let cluster = Arc::new(InMemoryCluster::new());
    let old = Utc::now() - TimeDelta::hours(48);

    let stuck = alpha("apps", "daily", old, "a");
    let fine = alpha("apps", "daily", old - TimeDelta::hours(1), "b");
    cluster.insert(stuck.clone()).await;
    cluster.insert(fine.clone()).await;
    cluster.fail_delete_of(stuck.metadata.name.clone()).await;

    let schedule = SnapshotSchedule::new("apps", "daily").with_expires("24h");
    let engine = expirer(&cluster, VersionChecker::all());

    let err = engine.expire_by_time(&schedule).await.unwrap_err();
    let deletion = match err {
        ExpireError::Deletion(deletion) => deletion,
        other => panic!("expected aggregated deletion error, got {other:?}"),
    };
    assert_eq!(deletion.succeeded, 1);
    assert_eq!(deletion.failures.len(), 1);
    assert_eq!(deletion.failures[0].snapshot.name, stuck.metadata.name);
    assert!(deletion.to_string().contains(&stuck.metadata.name));

    assert_eq!(cluster.len().await, 1);

    // Second pass only sees what is left
    cluster.clear_failures().await;
    let deletes_before = cluster.delete_calls();
    let summary = engine.expire_by_time(&schedule).await.unwrap();
    assert_eq!(summary.deleted, 1);
    assert_eq!(cluster.delete_calls() - deletes_before, 1);
    assert!(cluster.is_empty().await);
}

#[tokio::test]
async fn test_expire_runs_both_policies() {
    let cluster = Arc::new(InMemoryCluster::new());
    let now = Utc::now();

    cluster
        .insert(alpha("apps", "daily", now - TimeDelta::hours(72), "data"))
        .await;
    for hours in 1..4 {
        cluster
            .insert(alpha("apps", "daily", now - TimeDelta::hours(hours), "data"))
            .await;
    }

    let schedule = SnapshotSchedule::new("apps", "daily")
        .with_expires("48h")
        .with_max_count(2);
    let engine = expirer(&cluster, VersionChecker::all());
    let summary = engine
        .expire_within(&schedule, Duration::from_secs(10))
        .await
        .unwrap();

    assert_eq!(summary.by_time.deleted, 1);
    assert_eq!(summary.by_count.deleted, 1);
    assert_eq!(cluster.len().await, 2);

    let metrics = engine.metrics().snapshot();
    assert_eq!(metrics.snapshots_deleted, 2);
    assert_eq!(metrics.evaluations, 2);
}

#[tokio::test]
async fn test_list_failure_fails_evaluation() {
    let cluster = Arc::new(InMemoryCluster::new());
    cluster
        .insert(alpha("apps", "daily", Utc::now() - TimeDelta::hours(48), "data"))
        .await;
    cluster.fail_list_of(SnapshotVersion::V1Beta1).await;

    let schedule = SnapshotSchedule::new("apps", "daily").with_expires("24h");
    let err = expirer(&cluster, VersionChecker::all())
        .expire_by_time(&schedule)
        .await
        .unwrap_err();

    assert!(matches!(err, ExpireError::Selector(_)));
    assert!(!err.is_configuration());
    assert_eq!(cluster.delete_calls(), 0);
}

#[tokio::test]
async fn test_dropped_evaluation_aborts_deletions() {
    let cluster = Arc::new(InMemoryCluster::new().with_latency(Duration::from_millis(100)));
    let old = Utc::now() - TimeDelta::hours(48);
    for hours in 0..4 {
        cluster
            .insert(alpha("apps", "daily", old - TimeDelta::hours(hours), "data"))
            .await;
    }

    let schedule = SnapshotSchedule::new("apps", "daily").with_expires("24h");
    let engine = expirer(&cluster, VersionChecker::new(true, false));

    // The list completes, the deletions are still sleeping when the future is dropped
    let result =
        tokio::time::timeout(Duration::from_millis(150), engine.expire_by_time(&schedule)).await;
    assert!(result.is_err());

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(cluster.delete_calls(), 4);
    assert_eq!(cluster.len().await, 4);
}
