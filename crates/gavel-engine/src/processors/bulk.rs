// SPDX-FileCopyrightText: 2026 Gavel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bulk moderation jobs, executed one item at a time with pacing.
//!
//! A bulk job fans out into single-item actions against the live connection.
//! Items run sequentially with a fixed delay between calls to stay under the
//! platform's rate limits. Each item gets a small retry budget of its own and
//! its failure is recorded without stopping the rest of the batch. The job
//! fails as a whole only when no item succeeded.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use gavel_config::model::WorkerConfig;
use gavel_core::ops::*;
use gavel_core::{
    AuditEntry, GavelError, Operation, Payload, QueueJob, RealtimeExecutor, ResourceKey,
};

use super::{JobProcessor, ProcessorResult};
use crate::batch::BatchWriteBuffer;

/// How one bulk type maps onto its single-item action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkSpec {
    pub bulk_type: &'static str,
    pub item_type: &'static str,
    /// Payload field holding the list of ids.
    pub list_field: &'static str,
    /// Field each id is written to in the item payload.
    pub item_field: &'static str,
}

pub const BULK_SPECS: &[BulkSpec] = &[
    BulkSpec {
        bulk_type: BULK_BAN,
        item_type: BAN_USER,
        list_field: "user_ids",
        item_field: "user_id",
    },
    BulkSpec {
        bulk_type: BULK_KICK,
        item_type: KICK_USER,
        list_field: "user_ids",
        item_field: "user_id",
    },
    BulkSpec {
        bulk_type: BULK_TIMEOUT,
        item_type: TIMEOUT_USER,
        list_field: "user_ids",
        item_field: "user_id",
    },
    BulkSpec {
        bulk_type: BULK_DELETE_MESSAGES,
        item_type: DELETE_MESSAGE,
        list_field: "message_ids",
        item_field: "message_id",
    },
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkItemError {
    pub item: String,
    pub error: String,
}

/// Per-item accounting for one bulk job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkOutcome {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub errors: Vec<BulkItemError>,
}

pub struct BulkProcessor {
    executor: Arc<dyn RealtimeExecutor>,
    audit: BatchWriteBuffer,
    item_delay: Duration,
    item_attempts: u32,
}

impl BulkProcessor {
    pub fn new(
        config: &WorkerConfig,
        executor: Arc<dyn RealtimeExecutor>,
        audit: BatchWriteBuffer,
    ) -> Self {
        Self {
            executor,
            audit,
            item_delay: Duration::from_millis(config.bulk_item_delay_ms),
            item_attempts: config.bulk_item_attempts.max(1),
        }
    }

    fn spec(job_type: &str) -> Option<&'static BulkSpec> {
        BULK_SPECS.iter().find(|s| s.bulk_type == job_type)
    }

    async fn run_item(
        &self,
        operation: &Operation,
        spec: &BulkSpec,
        payload: &Payload,
    ) -> Result<Value, GavelError> {
        let mut attempt = 1;
        loop {
            let outcome = self
                .executor
                .execute(spec.item_type, operation.guild_id.as_deref(), payload)
                .await;
            match outcome {
                Err(e) if attempt < self.item_attempts => {
                    debug!(item_type = spec.item_type, attempt, error = %e, "bulk item failed, retrying");
                    attempt += 1;
                    tokio::time::sleep(self.item_delay).await;
                }
                other => return other,
            }
        }
    }
}

#[async_trait]
impl JobProcessor for BulkProcessor {
    fn name(&self) -> &str {
        "bulk"
    }

    fn job_types(&self) -> Vec<String> {
        BULK_SPECS.iter().map(|s| s.bulk_type.to_string()).collect()
    }

    async fn process(&self, job: &QueueJob) -> Result<ProcessorResult, GavelError> {
        let spec = Self::spec(&job.job_type).ok_or_else(|| {
            GavelError::Internal(format!("bulk processor got job type {}", job.job_type))
        })?;
        let operation = job.operation()?;
        let items = match operation.payload.get(spec.list_field) {
            Some(Value::Array(items)) if !items.is_empty() => items.clone(),
            _ => {
                return Err(GavelError::validation(format!(
                    "{}: `{}` must be a non-empty list",
                    spec.bulk_type, spec.list_field
                )));
            }
        };

        let mut base = operation.payload.clone();
        base.remove(spec.list_field);

        let mut outcome = BulkOutcome {
            total: items.len(),
            ..BulkOutcome::default()
        };
        for (index, item) in items.into_iter().enumerate() {
            if index > 0 {
                tokio::time::sleep(self.item_delay).await;
            }
            let label = match &item {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            let mut item_key = Payload::new();
            item_key.insert(spec.item_field.to_string(), item.clone());
            let target = match ResourceKey::derive(&item_key) {
                ResourceKey::Global => None,
                key => Some(key.to_string()),
            };
            let mut payload = base.clone();
            payload.insert(spec.item_field.to_string(), item);

            let result = self.run_item(&operation, spec, &payload).await;
            self.audit
                .append(AuditEntry::for_operation(
                    &operation,
                    spec.item_type,
                    target,
                    result.as_ref(),
                ))
                .await;
            match result {
                Ok(_) => outcome.succeeded += 1,
                Err(e) => {
                    outcome.failed += 1;
                    outcome.errors.push(BulkItemError {
                        item: label,
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            job_id = %job.id,
            job_type = %job.job_type,
            total = outcome.total,
            succeeded = outcome.succeeded,
            failed = outcome.failed,
            "bulk job processed"
        );
        let data = serde_json::to_value(&outcome)?;
        if outcome.succeeded == 0 {
            return Ok(ProcessorResult::failed(
                format!("all {} items of {} failed", outcome.total, job.job_type),
                Some(data),
            ));
        }
        Ok(ProcessorResult::succeeded(data))
    }
}
