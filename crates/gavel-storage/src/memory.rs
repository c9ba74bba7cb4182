// SPDX-FileCopyrightText: 2026 Gavel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory implementation of the storage traits.
//!
//! Nothing survives the process. Used by tests and by single-process
//! deployments that accept losing queued jobs on restart. Only the most
//! recent completed jobs are kept for lookup, and purging the dead-letter
//! queue drops the failed jobs it held.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;

use gavel_core::{
    AdapterType, AuditEntry, AuditSink, DeadLetterEntry, DeadLetterStore, FailOutcome,
    GavelError, HealthStatus, JobFilter, JobQueue, JobStatus, NewJob, PluginAdapter, QueueJob,
};

/// Completed jobs kept for [`JobQueue::get`] by default.
const DEFAULT_COMPLETED_RETENTION: usize = 1024;

#[derive(Debug, Clone)]
struct StoredJob {
    seq: u64,
    job: QueueJob,
    locked_until: Option<DateTime<Utc>>,
}

/// DashMap-backed queue, dead-letter store and audit sink.
#[derive(Debug)]
pub struct MemoryStorage {
    jobs: DashMap<String, StoredJob>,
    /// Completed job ids, oldest first.
    completed: Mutex<VecDeque<String>>,
    completed_retention: usize,
    next_seq: AtomicU64,
    dead_letters: DashMap<String, (u64, DeadLetterEntry)>,
    audit: Mutex<Vec<AuditEntry>>,
    lock_timeout: Duration,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            jobs: DashMap::new(),
            completed: Mutex::new(VecDeque::new()),
            completed_retention: DEFAULT_COMPLETED_RETENTION,
            next_seq: AtomicU64::new(0),
            dead_letters: DashMap::new(),
            audit: Mutex::new(Vec::new()),
            lock_timeout: Duration::from_secs(600),
        }
    }

    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    /// Keep at most `retention` completed jobs. Older ones are forgotten.
    pub fn with_completed_retention(mut self, retention: usize) -> Self {
        self.completed_retention = retention;
        self
    }

    /// Jobs currently held in memory, in any status.
    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    /// Every audit entry written so far, in write order.
    pub fn audit_entries(&self) -> Vec<AuditEntry> {
        self.audit.lock().clone()
    }

    fn seq(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::Relaxed)
    }

    /// Record a completion and evict completed jobs beyond the retention cap.
    fn retire(&self, job_id: &str) {
        let evicted: Vec<String> = {
            let mut completed = self.completed.lock();
            completed.push_back(job_id.to_string());
            let excess = completed.len().saturating_sub(self.completed_retention);
            completed.drain(..excess).collect()
        };
        for id in evicted {
            self.jobs
                .remove_if(&id, |_, stored| stored.job.status == JobStatus::Completed);
        }
    }
}

#[async_trait]
impl PluginAdapter for MemoryStorage {
    fn name(&self) -> &str {
        "memory"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Queue
    }

    async fn health_check(&self) -> Result<HealthStatus, GavelError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), GavelError> {
        Ok(())
    }
}

#[async_trait]
impl JobQueue for MemoryStorage {
    async fn enqueue(&self, job: NewJob) -> Result<String, GavelError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        let stored = StoredJob {
            seq: self.seq(),
            job: QueueJob {
                id: id.clone(),
                job_type: job.job_type,
                payload: job.payload,
                attempts: 0,
                max_attempts: job.max_attempts,
                status: JobStatus::Pending,
                enqueued_at: now,
                run_after: job.run_after.unwrap_or(now),
                last_error: None,
            },
            locked_until: None,
        };
        self.jobs.insert(id.clone(), stored);
        Ok(id)
    }

    async fn dequeue(&self, filter: &JobFilter) -> Result<Option<QueueJob>, GavelError> {
        loop {
            let now = Utc::now();
            let candidate = self
                .jobs
                .iter()
                .filter(|e| {
                    e.job.status == JobStatus::Pending
                        && e.job.run_after <= now
                        && filter.matches(&e.job.job_type)
                })
                .min_by_key(|e| e.seq)
                .map(|e| e.key().clone());

            let Some(id) = candidate else {
                return Ok(None);
            };

            // Another task may have claimed it between the scan and this lock.
            if let Some(mut entry) = self.jobs.get_mut(&id)
                && entry.job.status == JobStatus::Pending
            {
                entry.job.status = JobStatus::Active;
                entry.locked_until = Some(
                    now + chrono::Duration::from_std(self.lock_timeout)
                        .unwrap_or_else(|_| chrono::Duration::minutes(10)),
                );
                return Ok(Some(entry.job.clone()));
            }
        }
    }

    async fn ack(&self, job_id: &str) -> Result<(), GavelError> {
        match self.jobs.get_mut(job_id) {
            Some(mut entry) if entry.job.status == JobStatus::Active => {
                entry.job.status = JobStatus::Completed;
                entry.locked_until = None;
            }
            _ => return Err(GavelError::Queue("ack on a job that is not active".into())),
        }
        self.retire(job_id);
        Ok(())
    }

    async fn fail(
        &self,
        job_id: &str,
        error: &str,
        retry_at: DateTime<Utc>,
    ) -> Result<FailOutcome, GavelError> {
        let mut entry = match self.jobs.get_mut(job_id) {
            Some(entry) if entry.job.status == JobStatus::Active => entry,
            _ => return Err(GavelError::Queue("fail on a job that is not active".into())),
        };
        let attempts = entry.job.attempts + 1;
        entry.job.last_error = Some(error.to_string());
        entry.locked_until = None;
        if attempts >= entry.job.max_attempts {
            entry.job.attempts = entry.job.max_attempts;
            entry.job.status = JobStatus::Failed;
            Ok(FailOutcome::Exhausted(entry.job.clone()))
        } else {
            entry.job.attempts = attempts;
            entry.job.status = JobStatus::Pending;
            entry.job.run_after = retry_at;
            Ok(FailOutcome::Retrying {
                attempts,
                run_after: retry_at,
            })
        }
    }

    async fn requeue(&self, job_id: &str) -> Result<bool, GavelError> {
        match self.jobs.get_mut(job_id) {
            Some(mut entry) if entry.job.status == JobStatus::Failed => {
                entry.job.status = JobStatus::Pending;
                entry.job.attempts = 0;
                entry.job.last_error = None;
                entry.job.run_after = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn get(&self, job_id: &str) -> Result<Option<QueueJob>, GavelError> {
        Ok(self.jobs.get(job_id).map(|e| e.job.clone()))
    }

    async fn depth(&self) -> Result<BTreeMap<String, u64>, GavelError> {
        let mut depth = BTreeMap::new();
        for entry in self.jobs.iter() {
            if matches!(entry.job.status, JobStatus::Pending | JobStatus::Active) {
                *depth.entry(entry.job.job_type.clone()).or_insert(0) += 1;
            }
        }
        Ok(depth)
    }

    async fn recover_stale(&self) -> Result<u64, GavelError> {
        let now = Utc::now();
        let mut recovered = 0;
        for mut entry in self.jobs.iter_mut() {
            if entry.job.status == JobStatus::Active
                && entry.locked_until.is_none_or(|until| until <= now)
            {
                entry.job.status = JobStatus::Pending;
                entry.locked_until = None;
                recovered += 1;
            }
        }
        Ok(recovered)
    }
}

#[async_trait]
impl DeadLetterStore for MemoryStorage {
    async fn quarantine(&self, entry: DeadLetterEntry) -> Result<(), GavelError> {
        let seq = self.seq();
        self.dead_letters.insert(entry.job.id.clone(), (seq, entry));
        Ok(())
    }

    async fn list(&self, include_released: bool) -> Result<Vec<DeadLetterEntry>, GavelError> {
        let mut entries: Vec<(u64, DeadLetterEntry)> = self
            .dead_letters
            .iter()
            .filter(|e| include_released || !e.1.released)
            .map(|e| e.value().clone())
            .collect();
        entries.sort_by_key(|(seq, _)| *seq);
        Ok(entries.into_iter().map(|(_, entry)| entry).collect())
    }

    async fn mark_released(&self, job_id: &str) -> Result<bool, GavelError> {
        match self.dead_letters.get_mut(job_id) {
            Some(mut entry) if !entry.1.released => {
                entry.1.released = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn purge(&self) -> Result<u64, GavelError> {
        let purged: Vec<String> = self.dead_letters.iter().map(|e| e.key().clone()).collect();
        for id in &purged {
            self.dead_letters.remove(id);
            self.jobs
                .remove_if(id, |_, stored| stored.job.status == JobStatus::Failed);
        }
        Ok(purged.len() as u64)
    }

    async fn count(&self) -> Result<u64, GavelError> {
        Ok(self.dead_letters.iter().filter(|e| !e.1.released).count() as u64)
    }
}

#[async_trait]
impl AuditSink for MemoryStorage {
    async fn bulk_insert(&self, entries: &[AuditEntry]) -> Result<usize, GavelError> {
        self.audit.lock().extend_from_slice(entries);
        Ok(entries.len())
    }
}
