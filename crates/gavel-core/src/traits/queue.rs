// SPDX-FileCopyrightText: 2026 Gavel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable job queue backend.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::GavelError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{FailOutcome, JobFilter, NewJob, QueueJob};

/// Persisted job queue consumed by the worker pool.
///
/// Jobs move `pending -> active -> completed`, or back to `pending` through
/// [`JobQueue::fail`] until `attempts` reaches `max_attempts`, at which point
/// they stay `failed`.
#[async_trait]
pub trait JobQueue: PluginAdapter {
    /// Persist a new pending job and return its id.
    async fn enqueue(&self, job: NewJob) -> Result<String, GavelError>;

    /// Atomically claim the oldest eligible pending job matching `filter`.
    async fn dequeue(&self, filter: &JobFilter) -> Result<Option<QueueJob>, GavelError>;

    /// Mark an active job completed.
    async fn ack(&self, job_id: &str) -> Result<(), GavelError>;

    /// Record a failed attempt.
    ///
    /// Increments `attempts`. Below `max_attempts` the job returns to pending
    /// and becomes eligible at `retry_at`; otherwise it is marked failed and
    /// returned as [`FailOutcome::Exhausted`].
    async fn fail(
        &self,
        job_id: &str,
        error: &str,
        retry_at: DateTime<Utc>,
    ) -> Result<FailOutcome, GavelError>;

    /// Reset a failed job to pending with zero attempts. Returns false if unknown.
    async fn requeue(&self, job_id: &str) -> Result<bool, GavelError>;

    /// Look up a job by id.
    async fn get(&self, job_id: &str) -> Result<Option<QueueJob>, GavelError>;

    /// Pending and active job counts per job type.
    async fn depth(&self) -> Result<BTreeMap<String, u64>, GavelError>;

    /// Return active jobs whose lock expired to pending. Returns how many.
    async fn recover_stale(&self) -> Result<u64, GavelError>;
}
