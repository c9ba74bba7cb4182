// SPDX-FileCopyrightText: 2026 Gavel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Gavel engine.
//!
//! All structs use `#[serde(deny_unknown_fields)]` so that a misspelled key
//! fails at startup instead of silently falling back to a default.

use serde::{Deserialize, Serialize};

/// Top-level Gavel configuration. Every section is optional.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GavelConfig {
    #[serde(default)]
    pub engine: EngineConfig,

    /// Deduplicator cache and in-flight tracking.
    #[serde(default)]
    pub dedup: DedupConfig,

    /// Realtime deadline and durable retry budget.
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Operation types added to the built-in lane tables.
    #[serde(default)]
    pub classifier: ClassifierConfig,

    /// Background worker pool.
    #[serde(default)]
    pub worker: WorkerConfig,

    /// Audit log batch buffer.
    #[serde(default)]
    pub batch: BatchConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

/// Engine identity and logging.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Instance name, used in logs.
    #[serde(default = "default_engine_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Capacity of the engine event broadcast channel.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            name: default_engine_name(),
            log_level: default_log_level(),
            event_capacity: default_event_capacity(),
        }
    }
}

fn default_engine_name() -> String {
    "gavel".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_event_capacity() -> usize {
    256
}

/// Deduplicator configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DedupConfig {
    /// How long a successful result is reused for identical requests.
    #[serde(default = "default_result_ttl_secs")]
    pub result_ttl_secs: u64,

    /// Ceiling on concurrently in-flight operations.
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,

    /// In-flight entries older than this are considered leaked and reclaimed.
    #[serde(default = "default_in_flight_max_age_secs")]
    pub in_flight_max_age_secs: u64,

    /// Interval of the background sweep over the cache and in-flight map.
    #[serde(default = "default_dedup_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Longest a caller waits on another caller's in-flight operation.
    #[serde(default = "default_await_timeout_secs")]
    pub await_timeout_secs: u64,

    /// How many times one caller re-enters admission after awaited operations failed.
    #[serde(default = "default_max_await_retries")]
    pub max_await_retries: u32,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            result_ttl_secs: default_result_ttl_secs(),
            max_in_flight: default_max_in_flight(),
            in_flight_max_age_secs: default_in_flight_max_age_secs(),
            sweep_interval_secs: default_dedup_sweep_interval_secs(),
            await_timeout_secs: default_await_timeout_secs(),
            max_await_retries: default_max_await_retries(),
        }
    }
}

fn default_result_ttl_secs() -> u64 {
    300
}

fn default_max_in_flight() -> usize {
    1000
}

fn default_in_flight_max_age_secs() -> u64 {
    120
}

fn default_dedup_sweep_interval_secs() -> u64 {
    60
}

fn default_await_timeout_secs() -> u64 {
    30
}

fn default_max_await_retries() -> u32 {
    3
}

/// Dispatcher configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DispatchConfig {
    /// Deadline for a single realtime executor call.
    #[serde(default = "default_realtime_timeout_ms")]
    pub realtime_timeout_ms: u64,

    /// Retry budget given to newly enqueued durable jobs.
    #[serde(default = "default_max_attempts")]
    pub default_max_attempts: u32,

    /// Record an audit entry for every realtime dispatch.
    #[serde(default = "default_audit_realtime")]
    pub audit_realtime: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            realtime_timeout_ms: default_realtime_timeout_ms(),
            default_max_attempts: default_max_attempts(),
            audit_realtime: default_audit_realtime(),
        }
    }
}

fn default_realtime_timeout_ms() -> u64 {
    5000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_audit_realtime() -> bool {
    true
}

/// Extra operation types per lane, merged over the built-in tables.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ClassifierConfig {
    #[serde(default)]
    pub realtime: Vec<String>,

    #[serde(default)]
    pub durable: Vec<String>,

    #[serde(default)]
    pub hybrid: Vec<String>,
}

/// Worker pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WorkerConfig {
    /// Concurrent jobs per processor.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Idle wait between empty dequeue polls.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// First retry delay; doubled per attempt.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Ceiling on the retry delay.
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,

    /// Pacing delay between items of a bulk job.
    #[serde(default = "default_bulk_item_delay_ms")]
    pub bulk_item_delay_ms: u64,

    /// Attempts per bulk item before it is recorded as failed.
    #[serde(default = "default_bulk_item_attempts")]
    pub bulk_item_attempts: u32,

    /// Deadline for processing a single job.
    #[serde(default = "default_job_timeout_secs")]
    pub job_timeout_secs: u64,

    /// How long shutdown waits for running jobs.
    #[serde(default = "default_drain_timeout_secs")]
    pub drain_timeout_secs: u64,

    /// How long a dequeued job stays locked before it is considered abandoned.
    #[serde(default = "default_lock_timeout_secs")]
    pub lock_timeout_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            poll_interval_ms: default_poll_interval_ms(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            bulk_item_delay_ms: default_bulk_item_delay_ms(),
            bulk_item_attempts: default_bulk_item_attempts(),
            job_timeout_secs: default_job_timeout_secs(),
            drain_timeout_secs: default_drain_timeout_secs(),
            lock_timeout_secs: default_lock_timeout_secs(),
        }
    }
}

fn default_concurrency() -> usize {
    5
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_backoff_base_ms() -> u64 {
    1000
}

fn default_backoff_max_ms() -> u64 {
    60_000
}

fn default_bulk_item_delay_ms() -> u64 {
    100
}

fn default_bulk_item_attempts() -> u32 {
    2
}

fn default_job_timeout_secs() -> u64 {
    300
}

fn default_drain_timeout_secs() -> u64 {
    30
}

fn default_lock_timeout_secs() -> u64 {
    600
}

/// Audit batch buffer configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BatchConfig {
    /// Buffer length that forces a synchronous flush.
    #[serde(default = "default_flush_size")]
    pub flush_size: usize,

    /// Time-based flush interval.
    #[serde(default = "default_flush_interval_secs")]
    pub flush_interval_secs: u64,

    /// How often the supervisor checks whether the flush interval elapsed.
    #[serde(default = "default_batch_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Ceiling on entries retained after failed flushes.
    #[serde(default = "default_max_retained")]
    pub max_retained: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            flush_size: default_flush_size(),
            flush_interval_secs: default_flush_interval_secs(),
            sweep_interval_secs: default_batch_sweep_interval_secs(),
            max_retained: default_max_retained(),
        }
    }
}

fn default_flush_size() -> usize {
    50
}

fn default_flush_interval_secs() -> u64 {
    10
}

fn default_batch_sweep_interval_secs() -> u64 {
    5
}

fn default_max_retained() -> usize {
    500
}

/// SQLite storage configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("gavel").join("gavel.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("gavel.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_wal_mode() -> bool {
    true
}
