// SPDX-FileCopyrightText: 2026 Gavel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded-concurrency consumers of the durable queue.
//!
//! One poll loop runs per processor. Each loop claims only the job types its
//! processor declares; the fallback processor claims everything else. A
//! semaphore caps how many jobs a loop runs at once. Failed attempts are
//! rescheduled with exponential backoff until the job's budget is used up,
//! after which it is handed to the [`DeadLetterQueue`].

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use gavel_config::model::WorkerConfig;
use gavel_core::{FailOutcome, GavelError, JobFilter, JobQueue, QueueJob};

use crate::dead_letter::DeadLetterQueue;
use crate::events::{EngineEvent, EventBus};
use crate::processors::JobProcessor;
use crate::telemetry;

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Delay before retry number `attempts`: `base * 2^(attempts - 1)`, capped at `max`.
pub fn backoff_delay(base: Duration, max: Duration, attempts: u32) -> Duration {
    let exponent = attempts.saturating_sub(1).min(31);
    base.saturating_mul(1u32 << exponent).min(max)
}

pub struct WorkerPool {
    queue: Arc<dyn JobQueue>,
    dead_letters: DeadLetterQueue,
    events: EventBus,
    processors: Vec<Arc<dyn JobProcessor>>,
    fallback: Arc<dyn JobProcessor>,
    concurrency: usize,
    poll_interval: Duration,
    backoff_base: Duration,
    backoff_max: Duration,
    job_timeout: Duration,
    drain_timeout: Duration,
    recovery_interval: Duration,
}

impl WorkerPool {
    pub fn new(
        config: &WorkerConfig,
        queue: Arc<dyn JobQueue>,
        dead_letters: DeadLetterQueue,
        events: EventBus,
        processors: Vec<Arc<dyn JobProcessor>>,
        fallback: Arc<dyn JobProcessor>,
    ) -> Self {
        Self {
            queue,
            dead_letters,
            events,
            processors,
            fallback,
            concurrency: config.concurrency.max(1),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            backoff_base: Duration::from_millis(config.backoff_base_ms),
            backoff_max: Duration::from_millis(config.backoff_max_ms),
            job_timeout: Duration::from_secs(config.job_timeout_secs),
            drain_timeout: Duration::from_secs(config.drain_timeout_secs),
            recovery_interval: Duration::from_secs(config.lock_timeout_secs.max(1)),
        }
    }

    /// Job filter per loop. Later processors do not claim types owned by earlier ones.
    fn routes(&self) -> Vec<(Arc<dyn JobProcessor>, JobFilter)> {
        let mut claimed: Vec<String> = Vec::new();
        let mut routes = Vec::new();
        for processor in &self.processors {
            let types: Vec<String> = processor
                .job_types()
                .into_iter()
                .filter(|t| !claimed.contains(t))
                .collect();
            if types.is_empty() {
                warn!(processor = processor.name(), "processor owns no job types, skipped");
                continue;
            }
            claimed.extend(types.iter().cloned());
            routes.push((Arc::clone(processor), JobFilter::Only(types)));
        }
        routes.push((Arc::clone(&self.fallback), JobFilter::Except(claimed)));
        routes
    }

    /// Spawn the poll loops and the stale-lock recovery task.
    ///
    /// Loops stop claiming jobs once `cancel` fires and wait up to the drain
    /// timeout for running jobs before aborting them.
    pub fn start(self: Arc<Self>, cancel: CancellationToken) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();
        for (processor, filter) in self.routes() {
            info!(
                processor = processor.name(),
                ?filter,
                concurrency = self.concurrency,
                "starting worker loop"
            );
            let pool = Arc::clone(&self);
            handles.push(tokio::spawn(pool.run_loop(processor, filter, cancel.clone())));
        }
        let pool = Arc::clone(&self);
        handles.push(tokio::spawn(pool.run_recovery(cancel)));
        handles
    }

    async fn run_loop(
        self: Arc<Self>,
        processor: Arc<dyn JobProcessor>,
        filter: JobFilter,
        cancel: CancellationToken,
    ) {
        let permits = Arc::new(Semaphore::new(self.concurrency));
        let mut running = JoinSet::new();

        loop {
            while let Some(joined) = running.try_join_next() {
                if let Err(e) = joined {
                    error!(processor = processor.name(), error = %e, "job task panicked");
                }
            }

            let permit = tokio::select! {
                _ = cancel.cancelled() => break,
                permit = Arc::clone(&permits).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let job = match self.queue.dequeue(&filter).await {
                Ok(Some(job)) => job,
                Ok(None) => {
                    drop(permit);
                    if !self.idle(&cancel).await {
                        break;
                    }
                    continue;
                }
                Err(e) => {
                    drop(permit);
                    warn!(processor = processor.name(), error = %e, "dequeue failed");
                    if !self.idle(&cancel).await {
                        break;
                    }
                    continue;
                }
            };

            let pool = Arc::clone(&self);
            let processor = Arc::clone(&processor);
            running.spawn(async move {
                pool.run_job(processor.as_ref(), job).await;
                drop(permit);
            });
        }

        if !running.is_empty() {
            info!(
                processor = processor.name(),
                running = running.len(),
                "draining in-progress jobs"
            );
            let drained = tokio::time::timeout(self.drain_timeout, async {
                while running.join_next().await.is_some() {}
            })
            .await;
            if drained.is_err() {
                warn!(
                    processor = processor.name(),
                    remaining = running.len(),
                    "drain timeout elapsed, aborting jobs"
                );
                running.abort_all();
                while running.join_next().await.is_some() {}
            }
        }
        debug!(processor = processor.name(), "worker loop stopped");
    }

    /// Sleep one poll interval. Returns false if cancelled meanwhile.
    async fn idle(&self, cancel: &CancellationToken) -> bool {
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(self.poll_interval) => true,
        }
    }

    async fn run_job(&self, processor: &dyn JobProcessor, job: QueueJob) {
        debug!(job_id = %job.id, job_type = %job.job_type, attempts = job.attempts, "processing job");
        // A panic counts as a failed attempt so the job still reaches the dead-letter queue.
        let attempt = AssertUnwindSafe(processor.process(&job)).catch_unwind();
        let outcome = match tokio::time::timeout(self.job_timeout, attempt).await {
            Err(_) => Err(GavelError::Timeout {
                duration: self.job_timeout,
            }),
            Ok(Err(panic)) => {
                let message = panic_message(panic.as_ref());
                error!(job_id = %job.id, job_type = %job.job_type, panic = %message, "processor panicked");
                Err(GavelError::execution(format!("processor panicked: {message}")))
            }
            Ok(Ok(Err(e))) => Err(e),
            Ok(Ok(Ok(result))) if result.success => Ok(result.data),
            Ok(Ok(Ok(result))) => Err(GavelError::execution(
                result
                    .error
                    .unwrap_or_else(|| "processor reported failure".to_string()),
            )),
        };

        let handled = match outcome {
            Ok(data) => self.complete(&job, data).await,
            Err(e) => self.fail(job.clone(), &e).await,
        };
        if let Err(e) = handled {
            error!(job_id = %job.id, job_type = %job.job_type, error = %e, "could not record job outcome");
        }
    }

    async fn complete(&self, job: &QueueJob, data: Option<serde_json::Value>) -> Result<(), GavelError> {
        self.queue.ack(&job.id).await?;
        telemetry::job(&job.job_type, "completed");
        info!(job_id = %job.id, job_type = %job.job_type, "job completed");
        self.events.publish(EngineEvent::JobCompleted {
            job_id: job.id.clone(),
            job_type: job.job_type.clone(),
            data,
        });
        Ok(())
    }

    async fn fail(&self, job: QueueJob, error: &GavelError) -> Result<(), GavelError> {
        let message = error.to_string();
        let delay = backoff_delay(self.backoff_base, self.backoff_max, job.attempts + 1);
        let retry_at = Utc::now()
            + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::seconds(60));

        match self.queue.fail(&job.id, &message, retry_at).await? {
            FailOutcome::Retrying {
                attempts,
                run_after,
            } => {
                telemetry::job(&job.job_type, "retrying");
                warn!(
                    job_id = %job.id,
                    job_type = %job.job_type,
                    attempts,
                    max_attempts = job.max_attempts,
                    retry_in_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %message,
                    "job failed, retry scheduled"
                );
                self.events.publish(EngineEvent::JobRetryScheduled {
                    job_id: job.id,
                    job_type: job.job_type,
                    attempts,
                    run_after,
                    error: message,
                });
                Ok(())
            }
            FailOutcome::Exhausted(exhausted) => {
                telemetry::job(&exhausted.job_type, "exhausted");
                self.dead_letters.handle_failed_job(exhausted, &message).await
            }
        }
    }

    async fn run_recovery(self: Arc<Self>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.recovery_interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => match self.queue.recover_stale().await {
                    Ok(0) => {}
                    Ok(recovered) => info!(recovered, "returned jobs with expired locks to the queue"),
                    Err(e) => warn!(error = %e, "stale job recovery failed"),
                },
            }
        }
    }
}
