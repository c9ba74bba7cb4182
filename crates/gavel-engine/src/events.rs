// SPDX-FileCopyrightText: 2026 Gavel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Engine event stream.
//!
//! Durable and hybrid submissions are acknowledged before the action runs;
//! subscribers learn the final outcome from these events.

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::broadcast;

/// Events emitted by the worker pool and the dead-letter queue.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// A durable job finished successfully.
    JobCompleted {
        job_id: String,
        job_type: String,
        data: Option<Value>,
    },
    /// A durable job failed and will run again at `run_after`.
    JobRetryScheduled {
        job_id: String,
        job_type: String,
        attempts: u32,
        run_after: DateTime<Utc>,
        error: String,
    },
    /// A durable job exhausted its retries and was quarantined.
    JobDeadLettered {
        job_id: String,
        job_type: String,
        attempts: u32,
        error: String,
    },
    /// A quarantined job was released back into the queue.
    DeadLetterReleased { job_id: String },
    /// Audit entries were written to the sink.
    AuditFlushed { count: usize },
}

/// Broadcast fan-out for [`EngineEvent`]s. Publishing never blocks.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Send to current subscribers. Events without subscribers are dropped.
    pub fn publish(&self, event: EngineEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }
}
