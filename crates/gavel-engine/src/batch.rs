// SPDX-FileCopyrightText: 2026 Gavel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory audit buffer with size- and time-triggered bulk flushes.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use gavel_config::model::BatchConfig;
use gavel_core::{AuditEntry, AuditSink, GavelError};

use crate::events::{EngineEvent, EventBus};
use crate::telemetry;

struct BatchState {
    entries: Vec<AuditEntry>,
    last_flush: Instant,
    /// Set after a failed flush; automatic flushes wait until then.
    retry_after: Option<Instant>,
}

struct BatchInner {
    sink: Arc<dyn AuditSink>,
    events: EventBus,
    state: Mutex<BatchState>,
    /// Serializes flushes so entries reach the sink in append order.
    flush_lock: tokio::sync::Mutex<()>,
    flush_size: usize,
    flush_interval: Duration,
    sweep_interval: Duration,
    max_retained: usize,
}

/// Accumulates [`AuditEntry`] records and writes them with one bulk insert.
///
/// Entries are not durable until flushed. The buffer never holds more than
/// `max_retained` entries; overflow drops the oldest ones.
#[derive(Clone)]
pub struct BatchWriteBuffer {
    inner: Arc<BatchInner>,
}

impl fmt::Debug for BatchWriteBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchWriteBuffer")
            .field("pending", &self.pending())
            .field("flush_size", &self.inner.flush_size)
            .finish()
    }
}

impl BatchWriteBuffer {
    pub fn new(config: &BatchConfig, sink: Arc<dyn AuditSink>, events: EventBus) -> Self {
        Self {
            inner: Arc::new(BatchInner {
                sink,
                events,
                state: Mutex::new(BatchState {
                    entries: Vec::new(),
                    last_flush: Instant::now(),
                    retry_after: None,
                }),
                flush_lock: tokio::sync::Mutex::new(()),
                flush_size: config.flush_size.max(1),
                flush_interval: Duration::from_secs(config.flush_interval_secs),
                sweep_interval: Duration::from_secs(config.sweep_interval_secs),
                max_retained: config.max_retained.max(1),
            }),
        }
    }

    /// Buffer an entry. Reaching the flush size flushes before returning,
    /// unless a previous flush failed and its retry delay has not elapsed.
    pub async fn append(&self, entry: AuditEntry) {
        let should_flush = {
            let mut state = self.inner.state.lock();
            state.entries.push(entry);
            let dropped = self.enforce_cap(&mut state.entries);
            if dropped > 0 {
                warn!(dropped, "audit buffer full, dropped oldest entries");
            }
            telemetry::batch_pending(state.entries.len());
            state.entries.len() >= self.inner.flush_size && !in_backoff(&state, Instant::now())
        };
        if should_flush && let Err(e) = self.flush().await {
            warn!(error = %e, "size-triggered audit flush failed");
        }
    }

    /// Write every buffered entry in one bulk insert. Returns how many were written.
    ///
    /// On failure the entries go back in front of anything appended meanwhile
    /// (capped at `max_retained`) and automatic flushes pause for one flush interval.
    pub async fn flush(&self) -> Result<usize, GavelError> {
        let _guard = self.inner.flush_lock.lock().await;
        let batch = std::mem::take(&mut self.inner.state.lock().entries);
        if batch.is_empty() {
            self.inner.state.lock().last_flush = Instant::now();
            return Ok(0);
        }

        match self.inner.sink.bulk_insert(&batch).await {
            Ok(written) => {
                let mut state = self.inner.state.lock();
                state.last_flush = Instant::now();
                state.retry_after = None;
                telemetry::batch_pending(state.entries.len());
                drop(state);
                debug!(written, "flushed audit entries");
                self.inner
                    .events
                    .publish(EngineEvent::AuditFlushed { count: written });
                Ok(written)
            }
            Err(e) => {
                let count = batch.len();
                let mut state = self.inner.state.lock();
                let mut retained = batch;
                retained.append(&mut state.entries);
                let dropped = self.enforce_cap(&mut retained);
                state.entries = retained;
                state.retry_after = Some(Instant::now() + self.inner.flush_interval);
                telemetry::batch_pending(state.entries.len());
                drop(state);
                warn!(count, dropped, error = %e, "audit flush failed, entries retained");
                Err(e)
            }
        }
    }

    /// Flush regardless of any retry delay. Used at shutdown and by operators.
    pub async fn force_flush(&self) -> Result<usize, GavelError> {
        self.inner.state.lock().retry_after = None;
        self.flush().await
    }

    /// Entries waiting for a flush.
    pub fn pending(&self) -> usize {
        self.inner.state.lock().entries.len()
    }

    /// Every sweep interval, flush if the flush interval elapsed since the
    /// last flush. Stops when `cancel` fires; the final flush is the caller's.
    pub fn spawn_ticker(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let buffer = self.clone();
        let period = self.inner.sweep_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if buffer.interval_elapsed(Instant::now())
                            && let Err(e) = buffer.flush().await
                        {
                            warn!(error = %e, "interval audit flush failed");
                        }
                    }
                }
            }
            debug!("audit flush ticker stopped");
        })
    }

    fn interval_elapsed(&self, now: Instant) -> bool {
        let state = self.inner.state.lock();
        !state.entries.is_empty()
            && !in_backoff(&state, now)
            && now.duration_since(state.last_flush) >= self.inner.flush_interval
    }

    /// Drop the oldest entries beyond `max_retained`. Returns how many were dropped.
    fn enforce_cap(&self, entries: &mut Vec<AuditEntry>) -> usize {
        let excess = entries.len().saturating_sub(self.inner.max_retained);
        if excess > 0 {
            entries.drain(..excess);
        }
        excess
    }
}

fn in_backoff(state: &BatchState, now: Instant) -> bool {
    state.retry_after.is_some_and(|until| now < until)
}
