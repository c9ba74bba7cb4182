// SPDX-FileCopyrightText: 2026 Gavel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the queue, dead-letter and audit traits.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use gavel_config::model::StorageConfig;
use gavel_core::{
    AdapterType, AuditEntry, AuditSink, DeadLetterEntry, DeadLetterStore, FailOutcome,
    GavelError, HealthStatus, JobFilter, JobQueue, NewJob, PluginAdapter, QueueJob,
};

use crate::database::{Database, map_tr_err};
use crate::queries;

/// How long a dequeued job stays locked when not configured otherwise.
const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(600);

/// SQLite-backed storage for every durable engine collaborator.
///
/// One instance (cloned behind `Arc`s) serves as the job queue, the
/// dead-letter store and the audit sink; all of them share one writer.
pub struct SqliteStorage {
    db: Database,
    lock_timeout: Duration,
}

impl SqliteStorage {
    /// Open the configured database.
    pub async fn open(config: &StorageConfig) -> Result<Self, GavelError> {
        let db = Database::open(&config.database_path, config.wal_mode).await?;
        debug!(path = %config.database_path, "SQLite storage initialized");
        Ok(Self {
            db,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        })
    }

    /// Wrap an already opened database.
    pub fn from_database(db: Database) -> Self {
        Self {
            db,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// Set how long a dequeued job stays locked before `recover_stale` reclaims it.
    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    /// Return every active job to pending, regardless of its lock.
    ///
    /// Only safe before any worker of this deployment runs: a job still being
    /// processed elsewhere would be picked up twice.
    pub async fn recover_all_active(&self) -> Result<u64, GavelError> {
        let recovered = queries::jobs::recover(&self.db, true).await?;
        if recovered > 0 {
            info!(recovered, "returned jobs left active by a previous run to pending");
        }
        Ok(recovered)
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Newest audit entries first.
    pub async fn recent_audit(&self, limit: usize) -> Result<Vec<AuditEntry>, GavelError> {
        queries::audit::recent(&self.db, limit).await
    }
}

#[async_trait]
impl PluginAdapter for SqliteStorage {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Queue
    }

    async fn health_check(&self) -> Result<HealthStatus, GavelError> {
        self.db
            .connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), GavelError> {
        self.db.close().await
    }
}

#[async_trait]
impl JobQueue for SqliteStorage {
    async fn enqueue(&self, job: NewJob) -> Result<String, GavelError> {
        queries::jobs::enqueue(&self.db, job).await
    }

    async fn dequeue(&self, filter: &JobFilter) -> Result<Option<QueueJob>, GavelError> {
        queries::jobs::dequeue(&self.db, filter, self.lock_timeout).await
    }

    async fn ack(&self, job_id: &str) -> Result<(), GavelError> {
        queries::jobs::ack(&self.db, job_id).await
    }

    async fn fail(
        &self,
        job_id: &str,
        error: &str,
        retry_at: DateTime<Utc>,
    ) -> Result<FailOutcome, GavelError> {
        queries::jobs::fail(&self.db, job_id, error, retry_at).await
    }

    async fn requeue(&self, job_id: &str) -> Result<bool, GavelError> {
        queries::jobs::requeue(&self.db, job_id).await
    }

    async fn get(&self, job_id: &str) -> Result<Option<QueueJob>, GavelError> {
        queries::jobs::get(&self.db, job_id).await
    }

    async fn depth(&self) -> Result<BTreeMap<String, u64>, GavelError> {
        queries::jobs::depth(&self.db).await
    }

    async fn recover_stale(&self) -> Result<u64, GavelError> {
        queries::jobs::recover(&self.db, false).await
    }
}

#[async_trait]
impl DeadLetterStore for SqliteStorage {
    async fn quarantine(&self, entry: DeadLetterEntry) -> Result<(), GavelError> {
        queries::dead_letters::quarantine(&self.db, &entry).await
    }

    async fn list(&self, include_released: bool) -> Result<Vec<DeadLetterEntry>, GavelError> {
        queries::dead_letters::list(&self.db, include_released).await
    }

    async fn mark_released(&self, job_id: &str) -> Result<bool, GavelError> {
        queries::dead_letters::mark_released(&self.db, job_id).await
    }

    async fn purge(&self) -> Result<u64, GavelError> {
        queries::dead_letters::purge(&self.db).await
    }

    async fn count(&self) -> Result<u64, GavelError> {
        queries::dead_letters::count(&self.db).await
    }
}

#[async_trait]
impl AuditSink for SqliteStorage {
    async fn bulk_insert(&self, entries: &[AuditEntry]) -> Result<usize, GavelError> {
        queries::audit::bulk_insert(&self.db, entries).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn jobs_left_active_are_recovered_after_reopen() {
        let dir = tempdir().unwrap();
        let config = StorageConfig {
            database_path: dir.path().join("gavel.db").display().to_string(),
            wal_mode: true,
        };

        let storage = SqliteStorage::open(&config).await.unwrap();
        let id = storage
            .enqueue(NewJob {
                job_type: "SYNC_ROLES".into(),
                payload: serde_json::json!({}),
                max_attempts: 3,
                run_after: None,
            })
            .await
            .unwrap();
        storage.dequeue(&JobFilter::Any).await.unwrap().unwrap();
        storage.shutdown().await.unwrap();
        drop(storage);

        let reopened = SqliteStorage::open(&config).await.unwrap();
        assert!(reopened.dequeue(&JobFilter::Any).await.unwrap().is_none());
        assert_eq!(reopened.recover_all_active().await.unwrap(), 1);
        let job = reopened.dequeue(&JobFilter::Any).await.unwrap().unwrap();
        assert_eq!(job.id, id);
        assert_eq!(reopened.health_check().await.unwrap(), HealthStatus::Healthy);
    }
}
