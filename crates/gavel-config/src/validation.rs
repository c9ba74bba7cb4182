// SPDX-FileCopyrightText: 2026 Gavel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.

use std::collections::HashMap;

use crate::diagnostic::ConfigError;
use crate::model::GavelConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration, collecting every failure.
pub fn validate_config(config: &GavelConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if !LOG_LEVELS.contains(&config.engine.log_level.as_str()) {
        errors.push(ConfigError::validation(format!(
            "engine.log_level must be one of {}, got `{}`",
            LOG_LEVELS.join(", "),
            config.engine.log_level
        )));
    }

    let positive: &[(&str, u64)] = &[
        ("engine.event_capacity", config.engine.event_capacity as u64),
        ("dedup.result_ttl_secs", config.dedup.result_ttl_secs),
        ("dedup.max_in_flight", config.dedup.max_in_flight as u64),
        ("dedup.in_flight_max_age_secs", config.dedup.in_flight_max_age_secs),
        ("dedup.sweep_interval_secs", config.dedup.sweep_interval_secs),
        ("dedup.await_timeout_secs", config.dedup.await_timeout_secs),
        ("dispatch.realtime_timeout_ms", config.dispatch.realtime_timeout_ms),
        ("dispatch.default_max_attempts", config.dispatch.default_max_attempts as u64),
        ("worker.concurrency", config.worker.concurrency as u64),
        ("worker.poll_interval_ms", config.worker.poll_interval_ms),
        ("worker.backoff_base_ms", config.worker.backoff_base_ms),
        ("worker.bulk_item_attempts", config.worker.bulk_item_attempts as u64),
        ("worker.job_timeout_secs", config.worker.job_timeout_secs),
        ("worker.lock_timeout_secs", config.worker.lock_timeout_secs),
        ("batch.flush_size", config.batch.flush_size as u64),
        ("batch.flush_interval_secs", config.batch.flush_interval_secs),
        ("batch.sweep_interval_secs", config.batch.sweep_interval_secs),
        ("batch.max_retained", config.batch.max_retained as u64),
    ];
    for (key, value) in positive {
        if *value == 0 {
            errors.push(ConfigError::validation(format!(
                "{key} must be greater than zero"
            )));
        }
    }

    if config.worker.backoff_max_ms < config.worker.backoff_base_ms {
        errors.push(ConfigError::validation(format!(
            "worker.backoff_max_ms ({}) must not be below worker.backoff_base_ms ({})",
            config.worker.backoff_max_ms, config.worker.backoff_base_ms
        )));
    }

    if config.worker.lock_timeout_secs < config.worker.job_timeout_secs {
        errors.push(ConfigError::validation(format!(
            "worker.lock_timeout_secs ({}) must not be below worker.job_timeout_secs ({})",
            config.worker.lock_timeout_secs, config.worker.job_timeout_secs
        )));
    }

    if config.batch.flush_size > config.batch.max_retained {
        errors.push(ConfigError::validation(format!(
            "batch.flush_size ({}) must not exceed batch.max_retained ({})",
            config.batch.flush_size, config.batch.max_retained
        )));
    }

    let mut lanes: HashMap<&str, &str> = HashMap::new();
    let extras = [
        ("realtime", &config.classifier.realtime),
        ("durable", &config.classifier.durable),
        ("hybrid", &config.classifier.hybrid),
    ];
    for (lane, types) in extras {
        for op_type in types {
            if op_type.trim().is_empty() {
                errors.push(ConfigError::validation(format!(
                    "classifier.{lane} contains an empty operation type"
                )));
                continue;
            }
            if let Some(previous) = lanes.insert(op_type.as_str(), lane)
                && previous != lane
            {
                errors.push(ConfigError::validation(format!(
                    "operation type `{op_type}` is listed in both classifier.{previous} and classifier.{lane}"
                )));
            }
        }
    }

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::validation(
            "storage.database_path must not be empty",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
