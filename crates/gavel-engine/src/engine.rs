// SPDX-FileCopyrightText: 2026 Gavel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The engine facade: submission pipeline, introspection and lifecycle.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::future::join_all;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use gavel_config::GavelConfig;
use gavel_core::{
    AuditSink, DeadLetterStore, ExecutionMethod, GavelError, HealthStatus, JobQueue, Operation,
    OperationResult, PluginAdapter, RealtimeExecutor,
};

use crate::batch::BatchWriteBuffer;
use crate::classifier::{LaneTable, OperationClassifier};
use crate::dead_letter::DeadLetterQueue;
use crate::dedup::{Admission, Deduplicator, Settlement};
use crate::dispatcher::Dispatcher;
use crate::events::{EngineEvent, EventBus};
use crate::normalizer::{BulkItem, InboundRequest, RequestNormalizer, SubmitOptions};
use crate::processors::{BulkProcessor, DirectProcessor, JobProcessor};
use crate::telemetry;
use crate::worker::WorkerPool;

/// Aggregate counts for a bulk submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BulkSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub method_counts: BTreeMap<ExecutionMethod, u64>,
}

/// Per-item results in submission order, plus the summary.
#[derive(Debug)]
pub struct BulkSubmission {
    pub results: Vec<Result<OperationResult, GavelError>>,
    pub summary: BulkSummary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollaboratorHealth {
    pub name: String,
    pub status: HealthStatus,
}

/// Point-in-time engine state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineHealth {
    pub in_flight: usize,
    pub cache_size: usize,
    pub queue_depth: BTreeMap<String, u64>,
    pub dead_letters: u64,
    pub batch_pending: usize,
    pub collaborators: Vec<CollaboratorHealth>,
}

/// Assembles an [`OperationEngine`] from configuration and collaborators.
pub struct EngineBuilder {
    config: GavelConfig,
    executor: Option<Arc<dyn RealtimeExecutor>>,
    queue: Option<Arc<dyn JobQueue>>,
    dead_letter_store: Option<Arc<dyn DeadLetterStore>>,
    audit_sink: Option<Arc<dyn AuditSink>>,
    processors: Vec<Arc<dyn JobProcessor>>,
}

impl EngineBuilder {
    pub fn new(config: GavelConfig) -> Self {
        Self {
            config,
            executor: None,
            queue: None,
            dead_letter_store: None,
            audit_sink: None,
            processors: Vec::new(),
        }
    }

    pub fn executor(mut self, executor: Arc<dyn RealtimeExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn queue(mut self, queue: Arc<dyn JobQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn dead_letter_store(mut self, store: Arc<dyn DeadLetterStore>) -> Self {
        self.dead_letter_store = Some(store);
        self
    }

    pub fn audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit_sink = Some(sink);
        self
    }

    /// Register a processor. It takes precedence over the built-in bulk
    /// processor for the job types it declares.
    pub fn processor(mut self, processor: Arc<dyn JobProcessor>) -> Self {
        self.processors.push(processor);
        self
    }

    /// Wire the engine without starting background tasks.
    pub fn build(self) -> Result<OperationEngine, GavelError> {
        let executor = self
            .executor
            .ok_or_else(|| GavelError::Config("engine needs a realtime executor".into()))?;
        let queue = self
            .queue
            .ok_or_else(|| GavelError::Config("engine needs a job queue".into()))?;
        let dead_letter_store = self
            .dead_letter_store
            .ok_or_else(|| GavelError::Config("engine needs a dead-letter store".into()))?;
        let audit_sink = self
            .audit_sink
            .ok_or_else(|| GavelError::Config("engine needs an audit sink".into()))?;
        let config = self.config;

        let events = EventBus::new(config.engine.event_capacity);
        let audit = BatchWriteBuffer::new(&config.batch, Arc::clone(&audit_sink), events.clone());
        let dead_letters = DeadLetterQueue::new(
            Arc::clone(&dead_letter_store),
            Arc::clone(&queue),
            events.clone(),
        );
        let dispatcher = Dispatcher::new(
            &config.dispatch,
            Arc::clone(&executor),
            Arc::clone(&queue),
            audit.clone(),
        );

        let mut processors = self.processors;
        processors.push(Arc::new(BulkProcessor::new(
            &config.worker,
            Arc::clone(&executor),
            audit.clone(),
        )));
        let fallback: Arc<dyn JobProcessor> =
            Arc::new(DirectProcessor::new(Arc::clone(&executor), audit.clone()));
        let workers = Arc::new(WorkerPool::new(
            &config.worker,
            Arc::clone(&queue),
            dead_letters.clone(),
            events.clone(),
            processors,
            fallback,
        ));

        Ok(OperationEngine {
            normalizer: RequestNormalizer::new(),
            classifier: OperationClassifier::from_config(&config.classifier),
            dedup: Deduplicator::new(&config.dedup),
            dispatcher,
            workers,
            dead_letters,
            audit,
            events,
            executor,
            queue,
            dead_letter_store,
            audit_sink,
            await_timeout: Duration::from_secs(config.dedup.await_timeout_secs),
            max_await_retries: config.dedup.max_await_retries,
            cancel: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
            shut_down: AtomicBool::new(false),
        })
    }

    /// Build and start background tasks.
    pub fn start(self) -> Result<OperationEngine, GavelError> {
        let engine = self.build()?;
        engine.start();
        Ok(engine)
    }
}

/// Accepts operations, guarantees at most one in flight per resource and
/// routes them to the realtime or durable lane.
pub struct OperationEngine {
    normalizer: RequestNormalizer,
    classifier: OperationClassifier,
    dedup: Deduplicator,
    dispatcher: Dispatcher,
    workers: Arc<WorkerPool>,
    dead_letters: DeadLetterQueue,
    audit: BatchWriteBuffer,
    events: EventBus,
    executor: Arc<dyn RealtimeExecutor>,
    queue: Arc<dyn JobQueue>,
    dead_letter_store: Arc<dyn DeadLetterStore>,
    audit_sink: Arc<dyn AuditSink>,
    await_timeout: Duration,
    max_await_retries: u32,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    started: AtomicBool,
    shut_down: AtomicBool,
}

impl OperationEngine {
    /// Spawn the dedup sweeper, the audit flush ticker and the worker pool.
    /// Calling it again has no effect.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut tasks = self.tasks.lock();
        tasks.push(self.dedup.spawn_sweeper(self.cancel.child_token()));
        tasks.push(self.audit.spawn_ticker(self.cancel.child_token()));
        tasks.extend(Arc::clone(&self.workers).start(self.cancel.child_token()));
        info!(tasks = tasks.len(), "operation engine started");
    }

    /// Submit one operation.
    pub async fn submit(
        &self,
        op_type: &str,
        payload: Value,
        options: SubmitOptions,
    ) -> Result<OperationResult, GavelError> {
        self.submit_request(InboundRequest::Single {
            op_type: op_type.to_string(),
            payload,
            options,
        })
        .await
    }

    /// Submit any inbound request shape.
    pub async fn submit_request(&self, request: InboundRequest) -> Result<OperationResult, GavelError> {
        let operation = self.normalizer.normalize(request)?;
        self.submit_operation(operation).await
    }

    /// Submit an already canonical operation.
    pub async fn submit_operation(&self, operation: Operation) -> Result<OperationResult, GavelError> {
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(GavelError::ShuttingDown);
        }
        let lane = self.classifier.classify(&operation.op_type);
        let mut retries = 0;

        loop {
            let admission = match self.dedup.admit_attempt(&operation, retries) {
                Ok(admission) => admission,
                Err(e) => {
                    telemetry::submission(lane, e.code());
                    return Err(e);
                }
            };
            match admission {
                Admission::Admitted(ticket) => {
                    return self.dispatcher.dispatch(&operation, lane, ticket).await;
                }
                Admission::Duplicate(result) => {
                    telemetry::submission(lane, "duplicate");
                    return Ok(result);
                }
                Admission::Conflict(e) => {
                    telemetry::submission(lane, "conflict");
                    return Err(e);
                }
                Admission::AwaitExisting(wait) => {
                    let settlement = tokio::time::timeout(self.await_timeout, wait.settled())
                        .await
                        .map_err(|_| GavelError::Timeout {
                            duration: self.await_timeout,
                        })?;
                    match settlement {
                        Settlement::Completed(result) => {
                            telemetry::submission(lane, "awaited");
                            return Ok(result);
                        }
                        Settlement::ShuttingDown => return Err(GavelError::ShuttingDown),
                        other => {
                            retries += 1;
                            if retries > self.max_await_retries {
                                return Err(match other {
                                    Settlement::Failed(message) => GavelError::execution(message),
                                    _ => GavelError::execution(format!(
                                        "resource still busy after {} waits",
                                        self.max_await_retries
                                    )),
                                });
                            }
                            debug!(
                                operation_id = %operation.id,
                                retries,
                                "in-flight operation settled without a reusable result, re-admitting"
                            );
                        }
                    }
                }
            }
        }
    }

    /// Submit an ordered list of items concurrently. Item failures are
    /// reported per item and never fail the whole submission.
    pub async fn submit_bulk(&self, items: Vec<BulkItem>, options: SubmitOptions) -> BulkSubmission {
        let submissions = items.into_iter().map(|item| {
            self.submit_request(InboundRequest::BulkItem {
                item,
                options: options.clone(),
            })
        });
        let results = join_all(submissions).await;

        let mut summary = BulkSummary {
            total: results.len(),
            ..BulkSummary::default()
        };
        for result in &results {
            match result {
                Ok(r) if r.success => {
                    summary.successful += 1;
                    *summary.method_counts.entry(r.method).or_insert(0) += 1;
                }
                _ => summary.failed += 1,
            }
        }
        info!(
            total = summary.total,
            successful = summary.successful,
            failed = summary.failed,
            "bulk submission finished"
        );
        BulkSubmission { results, summary }
    }

    /// The three lane lists.
    pub fn lanes(&self) -> LaneTable {
        self.classifier.lanes()
    }

    pub fn classifier(&self) -> &OperationClassifier {
        &self.classifier
    }

    pub fn dedup(&self) -> &Deduplicator {
        &self.dedup
    }

    pub fn dead_letters(&self) -> &DeadLetterQueue {
        &self.dead_letters
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Flush buffered audit entries now.
    pub async fn flush_audit(&self) -> Result<usize, GavelError> {
        self.audit.force_flush().await
    }

    pub async fn health(&self) -> Result<EngineHealth, GavelError> {
        let mut collaborators = Vec::new();
        for role in self.distinct_roles() {
            collaborators.push(match role {
                Role::Executor => probe(&*self.executor).await,
                Role::Queue => probe(&*self.queue).await,
                Role::DeadLetters => probe(&*self.dead_letter_store).await,
                Role::Audit => probe(&*self.audit_sink).await,
            });
        }
        Ok(EngineHealth {
            in_flight: self.dedup.in_flight_count(),
            cache_size: self.dedup.cache_size(),
            queue_depth: self.queue.depth().await?,
            dead_letters: self.dead_letters.count().await?,
            batch_pending: self.audit.pending(),
            collaborators,
        })
    }

    /// Collaborator roles, skipping any object already listed under an earlier role.
    fn distinct_roles(&self) -> Vec<Role> {
        let roles = [
            (Role::Executor, Arc::as_ptr(&self.executor) as *const ()),
            (Role::Queue, Arc::as_ptr(&self.queue) as *const ()),
            (Role::DeadLetters, Arc::as_ptr(&self.dead_letter_store) as *const ()),
            (Role::Audit, Arc::as_ptr(&self.audit_sink) as *const ()),
        ];
        roles
            .iter()
            .enumerate()
            .filter(|(i, (_, ptr))| !roles[..*i].iter().any(|(_, earlier)| earlier == ptr))
            .map(|(_, (role, _))| *role)
            .collect()
    }

    /// Stop the engine. Safe to call more than once.
    ///
    /// Rejects waiters on in-flight operations, stops claiming jobs and lets
    /// running ones drain, flushes the audit buffer, then shuts collaborators down.
    pub async fn shutdown(&self) -> Result<(), GavelError> {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        info!("operation engine shutting down");
        self.cancel.cancel();
        self.dedup.shutdown();

        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "background task ended abnormally");
            }
        }

        if let Err(e) = self.audit.force_flush().await {
            warn!(error = %e, pending = self.audit.pending(), "final audit flush failed");
        }

        for role in self.distinct_roles() {
            match role {
                Role::Executor => stop(&*self.executor).await,
                Role::Queue => stop(&*self.queue).await,
                Role::DeadLetters => stop(&*self.dead_letter_store).await,
                Role::Audit => stop(&*self.audit_sink).await,
            }
        }
        info!("operation engine stopped");
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Executor,
    Queue,
    DeadLetters,
    Audit,
}

async fn probe<A: PluginAdapter + ?Sized>(adapter: &A) -> CollaboratorHealth {
    let status = match adapter.health_check().await {
        Ok(status) => status,
        Err(e) => HealthStatus::Unhealthy(e.to_string()),
    };
    CollaboratorHealth {
        name: adapter.name().to_string(),
        status,
    }
}

async fn stop<A: PluginAdapter + ?Sized>(adapter: &A) {
    if let Err(e) = adapter.shutdown().await {
        warn!(adapter = adapter.name(), error = %e, "collaborator shutdown failed");
    }
}
