//! Retention policy computations
//!
//! Pure functions over in-memory snapshot sequences. Nothing here talks to
//! the cluster; [`crate::expire`] wires these into the delete path.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::humanize::{HumanDuration, ParseError};
use crate::schedule::SnapshotSchedule;
use crate::snapshot::MultiversionSnapshot;

#[derive(Debug, Error)]
pub enum RetentionError {
    #[error("invalid retention.expires {value:?}: {source}")]
    InvalidDuration {
        value: String,
        #[source]
        source: ParseError,
    },

    #[error("retention.expires must be positive, got {0}")]
    NonPositive(HumanDuration),

    #[error("retention.expires {0} reaches before the earliest representable time")]
    OutOfRange(HumanDuration),
}

/// Cutoff before which snapshots of `schedule` are expired
///
/// `Ok(None)` when the schedule sets no `expires`.
pub fn expiration_threshold(
    schedule: &SnapshotSchedule,
    now: DateTime<Utc>,
) -> Result<Option<DateTime<Utc>>, RetentionError> {
    let Some(expires) = schedule.expires() else {
        return Ok(None);
    };

    let duration: HumanDuration =
        expires
            .parse()
            .map_err(|source| RetentionError::InvalidDuration {
                value: expires.to_string(),
                source,
            })?;

    if !duration.is_positive() {
        return Err(RetentionError::NonPositive(duration));
    }

    now.checked_sub_signed(duration.as_delta())
        .map(Some)
        .ok_or(RetentionError::OutOfRange(duration))
}

/// Snapshots created strictly before `threshold`, in input order
pub fn filter_expired(
    snapshots: Vec<MultiversionSnapshot>,
    threshold: DateTime<Utc>,
) -> Vec<MultiversionSnapshot> {
    snapshots
        .into_iter()
        .filter(|snap| snap.creation_time() < threshold)
        .collect()
}

/// Group snapshots by source volume
///
/// Snapshots without a recorded source are left out entirely. Input order is
/// kept within each group.
pub fn group_by_source_volume(
    snapshots: Vec<MultiversionSnapshot>,
) -> BTreeMap<String, Vec<MultiversionSnapshot>> {
    let mut groups: BTreeMap<String, Vec<MultiversionSnapshot>> = BTreeMap::new();
    for snap in snapshots {
        if let Some(volume) = snap.source_volume_name() {
            groups.entry(volume.to_string()).or_default().push(snap);
        }
    }
    groups
}

/// Oldest first; equal timestamps keep their input order. `None` stays `None`.
pub fn sort_by_time(
    snapshots: Option<Vec<MultiversionSnapshot>>,
) -> Option<Vec<MultiversionSnapshot>> {
    snapshots.map(|mut list| {
        list.sort_by_key(MultiversionSnapshot::creation_time);
        list
    })
}

/// Oldest snapshots beyond the newest `max_count` of one volume group
pub fn excess_over_count(
    group: Vec<MultiversionSnapshot>,
    max_count: usize,
) -> Vec<MultiversionSnapshot> {
    let mut sorted = sort_by_time(Some(group)).unwrap_or_default();
    if sorted.len() <= max_count {
        return Vec::new();
    }
    let excess = sorted.len() - max_count;
    sorted.truncate(excess);
    sorted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{ObjectMeta, v1alpha1, v1beta1};
    use chrono::{TimeDelta, TimeZone};

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn snap_at(name: &str, created: DateTime<Utc>) -> MultiversionSnapshot {
        v1alpha1::VolumeSnapshot::new(ObjectMeta::new("default", name).with_creation_timestamp(created))
            .into()
    }

    fn snap_of(name: &str, pvc: &str) -> MultiversionSnapshot {
        v1alpha1::VolumeSnapshot::new(ObjectMeta::new("default", name))
            .with_source_pvc(pvc)
            .into()
    }

    #[test]
    fn test_expiration_threshold_unset() {
        let schedule = SnapshotSchedule::new("ns", "s");
        assert!(expiration_threshold(&schedule, Utc::now()).unwrap().is_none());
        assert!(
            expiration_threshold(&schedule, DateTime::<Utc>::MIN_UTC)
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_expiration_threshold_invalid() {
        let garbage = SnapshotSchedule::new("ns", "s").with_expires("garbage");
        assert!(matches!(
            expiration_threshold(&garbage, Utc::now()),
            Err(RetentionError::InvalidDuration { .. })
        ));

        let negative = SnapshotSchedule::new("ns", "s").with_expires("-10s");
        assert!(matches!(
            expiration_threshold(&negative, Utc::now()),
            Err(RetentionError::NonPositive(_))
        ));

        let zero = SnapshotSchedule::new("ns", "s").with_expires("0s");
        assert!(matches!(
            expiration_threshold(&zero, Utc::now()),
            Err(RetentionError::NonPositive(_))
        ));
    }

    #[test]
    fn test_expiration_threshold_value() {
        let schedule = SnapshotSchedule::new("ns", "s").with_expires("1h");
        let now = at("2013-02-01T11:04:05Z");
        let threshold = expiration_threshold(&schedule, now).unwrap();
        assert_eq!(threshold, Some(at("2013-02-01T10:04:05Z")));
    }

    #[test]
    fn test_expiration_threshold_out_of_range() {
        let schedule = SnapshotSchedule::new("ns", "s").with_expires("1h");
        assert!(matches!(
            expiration_threshold(&schedule, DateTime::<Utc>::MIN_UTC),
            Err(RetentionError::OutOfRange(_))
        ));
    }

    #[test]
    fn test_filter_expired() {
        let threshold = at("2000-01-01T00:00:00Z");
        let times = [
            "1990-01-01T00:00:00Z", // expired
            "2010-02-10T10:30:05Z",
            "1999-12-31T23:59:00Z", // expired
            "2001-01-01T00:00:00Z",
            "2005-01-01T00:00:00Z",
        ];
        let snaps = times
            .iter()
            .enumerate()
            .map(|(i, t)| snap_at(&format!("snap-{i}"), at(t)))
            .collect();

        let expired = filter_expired(snaps, threshold);
        let names: Vec<_> = expired.iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["snap-0", "snap-2"]);
    }

    #[test]
    fn test_filter_expired_boundary_and_empty() {
        let threshold = at("2000-01-01T00:00:00Z");
        let on_threshold = vec![snap_at("exact", threshold)];
        assert!(filter_expired(on_threshold, threshold).is_empty());
        assert!(filter_expired(Vec::new(), threshold).is_empty());
    }

    #[test]
    fn test_group_by_source_volume() {
        let mut snaps = vec![
            snap_of("snap1-1", "pvc1"),
            snap_of("snap2-1", "pvc2"),
            snap_of("snap1-2", "pvc1"),
            snap_of("snap2-2", "pvc2"),
            snap_of("snap3-blah", "pvc3"),
        ];
        snaps.push(v1alpha1::VolumeSnapshot::new(ObjectMeta::new("default", "i-have-nil-source")).into());

        let groups = group_by_source_volume(snaps);
        assert_eq!(groups.len(), 3);
        assert_eq!(groups["pvc1"].len(), 2);
        assert_eq!(groups["pvc2"].len(), 2);
        assert_eq!(groups["pvc3"].len(), 1);

        let mut total = 0;
        for (pvc, list) in &groups {
            let prefix = pvc.replace("pvc", "snap");
            for snap in list {
                total += 1;
                assert!(snap.name().starts_with(&prefix), "{} in {}", snap.name(), pvc);
            }
        }
        assert_eq!(total, 5);
        assert_eq!(groups["pvc1"][0].name(), "snap1-1");
    }

    #[test]
    fn test_group_mixes_versions() {
        let alpha = snap_of("a", "data");
        let beta: MultiversionSnapshot = v1beta1::VolumeSnapshot::new(ObjectMeta::new("default", "b"))
            .with_source_pvc("data")
            .into();
        let groups = group_by_source_volume(vec![alpha, beta]);
        assert_eq!(groups["data"].len(), 2);
    }

    #[test]
    fn test_sort_by_time() {
        let now = Utc::now();
        let snaps = vec![
            snap_at("later", now + TimeDelta::hours(1)),
            snap_at("earlier", now - TimeDelta::hours(1)),
            snap_at("now", now),
        ];
        let sorted = sort_by_time(Some(snaps)).unwrap();
        assert_eq!(sorted.len(), 3);
        assert!(sorted[0].creation_time() <= sorted[1].creation_time());
        assert!(sorted[1].creation_time() <= sorted[2].creation_time());

        assert!(sort_by_time(None).is_none());
        assert_eq!(sort_by_time(Some(Vec::new())), Some(Vec::new()));
    }

    #[test]
    fn test_sort_by_time_is_stable() {
        let t = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let snaps = vec![
            snap_at("b", t),
            snap_at("a", t),
            snap_at("first", t - TimeDelta::seconds(1)),
            snap_at("c", t),
        ];
        let names: Vec<_> = sort_by_time(Some(snaps))
            .unwrap()
            .iter()
            .map(|s| s.name().to_string())
            .collect();
        assert_eq!(names, vec!["first", "b", "a", "c"]);
    }

    #[test]
    fn test_excess_over_count() {
        let t = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let group = vec![
            snap_at("h1", t - TimeDelta::hours(1)),
            snap_at("h12", t - TimeDelta::hours(12)),
            snap_at("h24", t - TimeDelta::hours(24)),
            snap_at("h48", t - TimeDelta::hours(48)),
        ];

        let excess = excess_over_count(group.clone(), 3);
        assert_eq!(excess.len(), 1);
        assert_eq!(excess[0].name(), "h48");

        let excess = excess_over_count(group.clone(), 1);
        let names: Vec<_> = excess.iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["h48", "h24", "h12"]);

        assert!(excess_over_count(group.clone(), 4).is_empty());
        assert_eq!(excess_over_count(group, 0).len(), 4);
    }
}
