// SPDX-FileCopyrightText: 2026 Gavel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Routes an admitted operation to its lane and settles the admission ticket.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, warn};

use gavel_config::model::DispatchConfig;
use gavel_core::{
    AuditEntry, ExecutionMethod, GavelError, JobQueue, Lane, NewJob, Operation, OperationResult,
    RealtimeExecutor,
};

use crate::batch::BatchWriteBuffer;
use crate::dedup::Ticket;
use crate::telemetry;

pub struct Dispatcher {
    executor: Arc<dyn RealtimeExecutor>,
    queue: Arc<dyn JobQueue>,
    /// Realtime outcomes are audited only when set.
    audit: Option<BatchWriteBuffer>,
    realtime_timeout: Duration,
    max_attempts: u32,
}

impl Dispatcher {
    pub fn new(
        config: &DispatchConfig,
        executor: Arc<dyn RealtimeExecutor>,
        queue: Arc<dyn JobQueue>,
        audit: BatchWriteBuffer,
    ) -> Self {
        Self {
            executor,
            queue,
            audit: config.audit_realtime.then_some(audit),
            realtime_timeout: Duration::from_millis(config.realtime_timeout_ms),
            max_attempts: config.default_max_attempts,
        }
    }

    /// Execute or enqueue `operation` on `lane`, then publish the outcome
    /// through `ticket`. The ticket is settled on every path.
    pub async fn dispatch(
        &self,
        operation: &Operation,
        lane: Lane,
        ticket: Ticket,
    ) -> Result<OperationResult, GavelError> {
        let started = Instant::now();
        let outcome = match lane {
            Lane::Realtime => self
                .realtime(operation)
                .await
                .map(|data| OperationResult::executed(ExecutionMethod::Realtime, data, elapsed_ms(started))),
            Lane::Durable => self
                .enqueue(operation)
                .await
                .map(|job_id| OperationResult::accepted(ExecutionMethod::Durable, job_id, elapsed_ms(started))),
            Lane::Hybrid => self.hybrid(operation, started).await,
        };
        telemetry::dispatch_latency(lane, started.elapsed());

        match outcome {
            Ok(result) => {
                telemetry::submission(lane, "success");
                debug!(
                    operation_id = %operation.id,
                    op_type = %operation.op_type,
                    method = %result.method,
                    job_id = ?result.job_id,
                    elapsed_ms = result.execution_time_ms,
                    "operation dispatched"
                );
                ticket.complete(result.clone());
                Ok(result)
            }
            Err(e) => {
                telemetry::submission(lane, "failed");
                warn!(
                    operation_id = %operation.id,
                    op_type = %operation.op_type,
                    %lane,
                    error = %e,
                    "operation failed"
                );
                ticket.fail(&e);
                Err(e)
            }
        }
    }

    async fn hybrid(&self, operation: &Operation, started: Instant) -> Result<OperationResult, GavelError> {
        match self.realtime(operation).await {
            Ok(data) => Ok(OperationResult::executed(
                ExecutionMethod::Hybrid,
                data,
                elapsed_ms(started),
            )),
            Err(e) => {
                warn!(
                    operation_id = %operation.id,
                    op_type = %operation.op_type,
                    error = %e,
                    "realtime attempt failed, falling back to durable queue"
                );
                let job_id = self.enqueue(operation).await?;
                Ok(OperationResult::accepted(
                    ExecutionMethod::Hybrid,
                    job_id,
                    elapsed_ms(started),
                ))
            }
        }
    }

    /// One live-connection call bounded by the realtime timeout. Audited when enabled.
    async fn realtime(&self, operation: &Operation) -> Result<Value, GavelError> {
        let call = self.executor.execute(
            &operation.op_type,
            operation.guild_id.as_deref(),
            &operation.payload,
        );
        let outcome = match tokio::time::timeout(self.realtime_timeout, call).await {
            Ok(outcome) => outcome,
            Err(_) => Err(GavelError::Timeout {
                duration: self.realtime_timeout,
            }),
        };
        if let Some(audit) = &self.audit {
            let entry = AuditEntry::for_operation(
                operation,
                &operation.op_type,
                operation.target(),
                outcome.as_ref(),
            );
            audit.append(entry).await;
        }
        outcome
    }

    async fn enqueue(&self, operation: &Operation) -> Result<String, GavelError> {
        let job = NewJob::for_operation(operation, self.max_attempts)?;
        self.queue.enqueue(job).await
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
