pub mod cluster;
pub mod config;
pub mod expire;
pub mod humanize;
pub mod observability;
pub mod retention;
pub mod schedule;
pub mod selector;
pub mod snapshot;
pub mod version;

pub use expire::{ExpireError, Expirer, ExpirerSettings};
pub use schedule::{SCHEDULE_LABEL, SnapshotSchedule};
pub use version::VersionChecker;
