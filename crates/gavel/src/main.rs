// SPDX-FileCopyrightText: 2026 Gavel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gavel - moderation operation engine.
//!
//! Operator commands against the configured engine database: lane
//! introspection, queue health and dead-letter management.

mod dlq;
mod health;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use gavel_config::GavelConfig;
use gavel_core::GavelError;
use gavel_engine::{DeadLetterQueue, EventBus, OperationClassifier};
use gavel_storage::SqliteStorage;

/// Gavel - moderation operation engine.
#[derive(Parser, Debug)]
#[command(name = "gavel", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the standard locations.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print which lane every known operation type is routed to.
    Lanes {
        #[arg(long)]
        json: bool,
    },
    /// Show queue depth and dead-letter count.
    Health {
        #[arg(long)]
        json: bool,
        /// Refresh every N seconds until interrupted.
        #[arg(long, value_name = "SECS")]
        watch: Option<u64>,
    },
    /// Inspect and manage dead-lettered jobs.
    Dlq {
        #[command(subcommand)]
        action: DlqAction,
    },
    /// Durable queue maintenance.
    Queue {
        #[command(subcommand)]
        action: QueueAction,
    },
    /// Configuration commands.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum DlqAction {
    /// List quarantined jobs.
    List {
        /// Include jobs already released back into the queue.
        #[arg(long)]
        all: bool,
        #[arg(long)]
        json: bool,
    },
    /// Put a quarantined job back into the queue with a fresh attempt budget.
    Release { job_id: String },
    /// Delete every dead-letter entry.
    Purge,
}

#[derive(Subcommand, Debug)]
enum QueueAction {
    /// Return jobs left active by a crashed run to pending.
    ///
    /// Run only while no engine is processing this database.
    Recover,
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Validate the configuration and print the effective values.
    Check,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => gavel_config::load_and_validate_path(path),
        None => gavel_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            gavel_config::render_errors(&errors);
            std::process::exit(1);
        }
    };
    init_tracing(&config.engine.log_level);
    tracing::debug!(engine = %config.engine.name, database = %config.storage.database_path, "config loaded");

    if let Err(e) = run(cli.command, &config).await {
        eprintln!("gavel: {e}");
        std::process::exit(1);
    }
}

async fn run(command: Option<Commands>, config: &GavelConfig) -> Result<(), GavelError> {
    match command {
        Some(Commands::Lanes { json }) => print_lanes(config, json),
        Some(Commands::Health { json, watch }) => {
            let storage = open_storage(config).await?;
            match watch {
                Some(secs) => health::watch(&storage, config, secs, json).await,
                None => health::run_health(&storage, config, json).await,
            }
        }
        Some(Commands::Dlq { action }) => {
            let storage = Arc::new(open_storage(config).await?);
            let dead_letters = DeadLetterQueue::new(storage.clone(), storage, EventBus::new(1));
            match action {
                DlqAction::List { all, json } => dlq::list(&dead_letters, all, json).await,
                DlqAction::Release { job_id } => dlq::release(&dead_letters, &job_id).await,
                DlqAction::Purge => dlq::purge(&dead_letters).await,
            }
        }
        Some(Commands::Queue {
            action: QueueAction::Recover,
        }) => {
            let storage = open_storage(config).await?;
            let recovered = storage.recover_all_active().await?;
            println!("recovered {recovered} job(s)");
            Ok(())
        }
        Some(Commands::Config {
            action: ConfigAction::Check,
        }) => {
            let rendered = toml::to_string_pretty(config)
                .map_err(|e| GavelError::Config(format!("could not render config: {e}")))?;
            println!("{rendered}");
            eprintln!("gavel: config ok (engine.name={})", config.engine.name);
            Ok(())
        }
        None => {
            println!("gavel: use --help for available commands");
            Ok(())
        }
    }
}

fn print_lanes(config: &GavelConfig, json: bool) -> Result<(), GavelError> {
    let lanes = OperationClassifier::from_config(&config.classifier).lanes();
    if json {
        println!("{}", serde_json::to_string_pretty(&lanes)?);
        return Ok(());
    }
    for (lane, types) in [
        ("realtime", &lanes.realtime),
        ("durable", &lanes.durable),
        ("hybrid", &lanes.hybrid),
    ] {
        println!("{lane}:");
        for op_type in types {
            println!("  {op_type}");
        }
    }
    Ok(())
}

async fn open_storage(config: &GavelConfig) -> Result<SqliteStorage, GavelError> {
    Ok(SqliteStorage::open(&config.storage)
        .await?
        .with_lock_timeout(Duration::from_secs(config.worker.lock_timeout_secs)))
}

/// Install the global subscriber. `RUST_LOG` overrides the configured level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("gavel={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_loads_config_defaults() {
        let config = gavel_config::load_and_validate_str("").expect("default config should be valid");
        assert_eq!(config.engine.name, "gavel");
    }

    #[test]
    fn parses_dlq_release() {
        let cli = Cli::try_parse_from(["gavel", "dlq", "release", "job-1"]).unwrap();
        match cli.command {
            Some(Commands::Dlq {
                action: DlqAction::Release { job_id },
            }) => assert_eq!(job_id, "job-1"),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parses_global_config_flag_after_subcommand() {
        let cli =
            Cli::try_parse_from(["gavel", "health", "--watch", "5", "--config", "/tmp/g.toml"])
                .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/g.toml")));
        assert!(matches!(
            cli.command,
            Some(Commands::Health {
                json: false,
                watch: Some(5)
            })
        ));
    }

    #[test]
    fn rejects_unknown_subcommand() {
        assert!(Cli::try_parse_from(["gavel", "serve"]).is_err());
    }

    #[test]
    fn lanes_render_from_configured_classifier() {
        let mut config = GavelConfig::default();
        config.classifier.durable = vec!["warn_user".into()];
        let lanes = OperationClassifier::from_config(&config.classifier).lanes();
        assert!(lanes.durable.contains(&"WARN_USER".to_string()));
        print_lanes(&config, true).unwrap();
    }
}
