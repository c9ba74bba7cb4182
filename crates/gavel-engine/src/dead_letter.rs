// SPDX-FileCopyrightText: 2026 Gavel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Quarantine for jobs that used up their retry budget.

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info};

use gavel_core::{DeadLetterEntry, DeadLetterStore, GavelError, JobQueue, QueueJob};

use crate::events::{EngineEvent, EventBus};
use crate::telemetry;

/// Owns dead-letter entries from quarantine until release or purge.
#[derive(Clone)]
pub struct DeadLetterQueue {
    store: Arc<dyn DeadLetterStore>,
    queue: Arc<dyn JobQueue>,
    events: EventBus,
}

impl DeadLetterQueue {
    pub fn new(store: Arc<dyn DeadLetterStore>, queue: Arc<dyn JobQueue>, events: EventBus) -> Self {
        Self {
            store,
            queue,
            events,
        }
    }

    /// Quarantine an exhausted job with the error of its last attempt.
    ///
    /// Jobs with attempts left are refused: exhaustion is the only way in.
    pub async fn handle_failed_job(&self, job: QueueJob, last_error: &str) -> Result<(), GavelError> {
        if !job.is_exhausted() {
            return Err(GavelError::Queue(format!(
                "job {} has used {} of {} attempts and cannot be dead-lettered",
                job.id, job.attempts, job.max_attempts
            )));
        }

        let exhausted = GavelError::ExhaustedRetries {
            job_id: job.id.clone(),
            attempts: job.attempts,
            last_error: last_error.to_string(),
        };
        error!(
            job_id = %job.id,
            job_type = %job.job_type,
            attempts = job.attempts,
            payload = %job.payload,
            error = %exhausted,
            "job moved to dead-letter queue"
        );

        let (job_id, job_type, attempts) = (job.id.clone(), job.job_type.clone(), job.attempts);
        self.store
            .quarantine(DeadLetterEntry {
                job,
                last_error: last_error.to_string(),
                quarantined_at: Utc::now(),
                released: false,
            })
            .await?;

        telemetry::dead_letter(&job_type);
        self.events.publish(EngineEvent::JobDeadLettered {
            job_id,
            job_type,
            attempts,
            error: last_error.to_string(),
        });
        Ok(())
    }

    /// Unreleased entries, oldest first.
    pub async fn list_quarantined(&self) -> Result<Vec<DeadLetterEntry>, GavelError> {
        self.store.list(false).await
    }

    /// Every entry including released ones.
    pub async fn list_all(&self) -> Result<Vec<DeadLetterEntry>, GavelError> {
        self.store.list(true).await
    }

    /// Re-enqueue a quarantined job with its attempt counter reset.
    ///
    /// Returns false if no failed job with that id exists.
    pub async fn release(&self, job_id: &str) -> Result<bool, GavelError> {
        if !self.queue.requeue(job_id).await? {
            return Ok(false);
        }
        self.store.mark_released(job_id).await?;
        info!(job_id, "dead-lettered job released");
        self.events.publish(EngineEvent::DeadLetterReleased {
            job_id: job_id.to_string(),
        });
        Ok(true)
    }

    /// Delete every entry. Returns how many were removed.
    pub async fn purge(&self) -> Result<u64, GavelError> {
        let purged = self.store.purge().await?;
        info!(purged, "dead-letter queue purged");
        Ok(purged)
    }

    pub async fn count(&self) -> Result<u64, GavelError> {
        self.store.count().await
    }
}
