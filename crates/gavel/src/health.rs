// SPDX-FileCopyrightText: 2026 Gavel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `gavel health` command implementation.
//!
//! Reads the durable side of the engine straight from its database: storage
//! reachability, pending/active jobs per type and the dead-letter count.

use std::collections::BTreeMap;
use std::time::Duration;

use gavel_config::GavelConfig;
use gavel_core::{DeadLetterStore, GavelError, HealthStatus, JobQueue, PluginAdapter};
use gavel_storage::SqliteStorage;
use serde::Serialize;

/// Structured health output for `--json` mode.
#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub database: String,
    pub storage: HealthStatus,
    pub queue_depth: BTreeMap<String, u64>,
    pub queued_total: u64,
    pub dead_letters: u64,
}

pub async fn collect(storage: &SqliteStorage, config: &GavelConfig) -> Result<HealthReport, GavelError> {
    let status = match storage.health_check().await {
        Ok(status) => status,
        Err(e) => HealthStatus::Unhealthy(e.to_string()),
    };
    let queue_depth = storage.depth().await?;
    Ok(HealthReport {
        database: config.storage.database_path.clone(),
        storage: status,
        queued_total: queue_depth.values().sum(),
        queue_depth,
        dead_letters: storage.count().await?,
    })
}

fn render(report: &HealthReport) -> String {
    let status = match &report.storage {
        HealthStatus::Healthy => "healthy".to_string(),
        HealthStatus::Degraded(reason) => format!("degraded ({reason})"),
        HealthStatus::Unhealthy(reason) => format!("unhealthy ({reason})"),
    };
    let mut out = format!(
        "database:     {}\nstorage:      {status}\nqueued:       {}\ndead letters: {}\n",
        report.database, report.queued_total, report.dead_letters
    );
    for (job_type, depth) in &report.queue_depth {
        out.push_str(&format!("  {job_type:<24} {depth}\n"));
    }
    out
}

/// Run `gavel health` once.
pub async fn run_health(storage: &SqliteStorage, config: &GavelConfig, json: bool) -> Result<(), GavelError> {
    let report = collect(storage, config).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render(&report));
    }
    Ok(())
}

/// Run `gavel health --watch`, refreshing until SIGINT/SIGTERM.
pub async fn watch(
    storage: &SqliteStorage,
    config: &GavelConfig,
    interval_secs: u64,
    json: bool,
) -> Result<(), GavelError> {
    let cancel = gavel_engine::shutdown::install_signal_handler();
    let interval = Duration::from_secs(interval_secs.max(1));
    loop {
        run_health(storage, config, json).await?;
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            _ = tokio::time::sleep(interval) => {}
        }
        println!();
    }
}
