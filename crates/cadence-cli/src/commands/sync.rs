use std::sync::Arc;

use cadence_core::{HttpRemoteApi, RemoteConfig, SyncReport};
use serde::Serialize;

use crate::commands::common::{
    describe_location, open_engine, open_local_engine, sync_config, Context,
};
use crate::error::CliError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusItem {
    pub is_online: bool,
    pub is_syncing: bool,
    pub queued: usize,
    pub dead_letters: usize,
    pub db_path: String,
    pub remote: Option<String>,
}

pub fn format_report(report: &SyncReport) -> Vec<String> {
    let mut lines = vec![format!(
        "Replayed {}, retrying {}, dead-lettered {}, deferred {}, reconciled {}",
        report.replayed, report.retried, report.exhausted, report.deferred, report.reconciled
    )];
    if report.reconcile_failed > 0 {
        lines.push(format!(
            "{} offline records could not be pushed",
            report.reconcile_failed
        ));
    }
    lines.extend(
        report
            .failures
            .iter()
            .map(|failure| format!("  {}: {}", failure.entry_id, failure.error)),
    );
    lines
}

pub async fn run_sync(as_json: bool, ctx: &Context) -> Result<(), CliError> {
    let remote_config = RemoteConfig::from_env()
        .map_err(|error| CliError::Config(error.to_string()))?
        .ok_or(CliError::SyncNotConfigured)?;
    let config = sync_config()?;
    let remote = HttpRemoteApi::new(&remote_config, config.request_timeout)
        .map_err(|error| CliError::Config(error.to_string()))?;

    let engine = open_engine(ctx, Arc::new(remote), config).await?;
    let report = engine.trigger_sync().await?.ok_or(CliError::Offline)?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for line in format_report(&report) {
            println!("{line}");
        }
    }
    Ok(())
}

pub async fn run_status(as_json: bool, ctx: &Context) -> Result<(), CliError> {
    let engine = open_local_engine(ctx).await?;
    let status = engine.status();
    let remote = RemoteConfig::from_env()
        .ok()
        .flatten()
        .map(|config| config.base_url);

    let item = StatusItem {
        is_online: status.is_online,
        is_syncing: status.is_syncing,
        queued: engine.store().count_queue().await?,
        dead_letters: engine.store().list_dead_letters().await?.len(),
        db_path: describe_location(engine.store().location()),
        remote,
    };

    if as_json {
        println!("{}", serde_json::to_string_pretty(&item)?);
        return Ok(());
    }

    println!("Online:       {}", if item.is_online { "yes" } else { "no" });
    println!("Queued:       {}", item.queued);
    println!("Dead letters: {}", item.dead_letters);
    println!("Database:     {}", item.db_path);
    println!(
        "Remote:       {}",
        item.remote.as_deref().unwrap_or("not configured")
    );
    Ok(())
}
