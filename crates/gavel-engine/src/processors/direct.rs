// SPDX-FileCopyrightText: 2026 Gavel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fallback processor: replays the queued operation through the live connection.

use std::sync::Arc;

use async_trait::async_trait;

use gavel_core::{AuditEntry, GavelError, QueueJob, RealtimeExecutor};

use super::{JobProcessor, ProcessorResult};
use crate::batch::BatchWriteBuffer;

/// Runs jobs of every type without a dedicated processor, including
/// hybrid fallbacks and unknown types.
pub struct DirectProcessor {
    executor: Arc<dyn RealtimeExecutor>,
    audit: BatchWriteBuffer,
}

impl DirectProcessor {
    pub fn new(executor: Arc<dyn RealtimeExecutor>, audit: BatchWriteBuffer) -> Self {
        Self { executor, audit }
    }
}

#[async_trait]
impl JobProcessor for DirectProcessor {
    fn name(&self) -> &str {
        "direct"
    }

    fn job_types(&self) -> Vec<String> {
        Vec::new()
    }

    async fn process(&self, job: &QueueJob) -> Result<ProcessorResult, GavelError> {
        let operation = job.operation()?;
        let outcome = self
            .executor
            .execute(
                &operation.op_type,
                operation.guild_id.as_deref(),
                &operation.payload,
            )
            .await;
        self.audit
            .append(AuditEntry::for_operation(
                &operation,
                &operation.op_type,
                operation.target(),
                outcome.as_ref(),
            ))
            .await;
        outcome.map(ProcessorResult::succeeded)
    }
}
