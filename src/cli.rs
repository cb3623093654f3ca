use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "snapscheduler")]
#[command(about = "Snapshot retention for SnapshotSchedule resources", long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to $SNAPSCHEDULER_CONFIG or config/snapscheduler.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Apply a schedule's retention policy once
    Expire(ExpireArgs),
    /// Print the snapshot API versions served by the cluster
    Probe,
}

#[derive(clap::Args, Debug)]
pub struct ExpireArgs {
    /// SnapshotSchedule manifest (.json or .toml)
    #[arg(long)]
    pub schedule: PathBuf,

    /// List the snapshots that would be deleted without deleting them
    #[arg(long)]
    pub dry_run: bool,
}
