use chrono::Utc;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use snapscheduler::cluster::{ClusterClient, HttpClusterClient};
use snapscheduler::config::Config;
use snapscheduler::schedule::load_schedule;
use snapscheduler::{Expirer, VersionChecker};

use crate::cli::ExpireArgs;

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub async fn probe(config: &Config) -> Result<(), AnyError> {
    let client = HttpClusterClient::from_config(&config.cluster)?;
    let versions = client.served_versions().await?;

    if versions.is_empty() {
        println!("no supported snapshot API versions served");
    }
    for version in versions {
        println!("{}", version.api_version());
    }
    Ok(())
}

pub async fn expire(config: &Config, args: ExpireArgs) -> Result<(), AnyError> {
    let schedule = load_schedule(&args.schedule)?;
    let client: Arc<dyn ClusterClient> = Arc::new(HttpClusterClient::from_config(&config.cluster)?);

    let versions = match config.version_override() {
        Some(versions) => versions,
        None => VersionChecker::probe(client.as_ref()).await?,
    };

    let expirer = Expirer::new(client, versions, config.expirer_settings());

    if args.dry_run {
        let by_time = expirer.plan_by_time(&schedule, Utc::now()).await?;
        let by_count = expirer.plan_by_count(&schedule).await?;

        let candidates: BTreeSet<_> = by_time
            .iter()
            .chain(by_count.iter())
            .map(|snap| snap.identity())
            .collect();
        info!(
            schedule = schedule.name(),
            namespace = schedule.namespace(),
            by_time = by_time.len(),
            by_count = by_count.len(),
            "Dry run complete"
        );
        for snapshot in candidates {
            println!("would delete {}", snapshot);
        }
        return Ok(());
    }

    let deadline = config
        .expiration
        .deadline
        .to_std()
        .unwrap_or(Duration::from_secs(300));
    let summary = expirer.expire_within(&schedule, deadline).await?;

    println!(
        "{}/{}: expired {} by age, {} by count",
        schedule.namespace(),
        schedule.name(),
        summary.by_time.total(),
        summary.by_count.total()
    );
    Ok(())
}
