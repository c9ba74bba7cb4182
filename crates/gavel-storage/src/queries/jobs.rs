// SPDX-FileCopyrightText: 2026 Gavel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable job queue operations.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use gavel_core::types::format_timestamp;
use gavel_core::{FailOutcome, GavelError, JobFilter, JobStatus, NewJob, QueueJob};
use rusqlite::{OptionalExtension, Row, params, params_from_iter};

use super::{json_err, parse_ts};
use crate::database::{Database, map_tr_err};

const JOB_COLUMNS: &str =
    "id, job_type, payload, status, attempts, max_attempts, enqueued_at, run_after, last_error";

fn row_to_job(row: &Row<'_>) -> Result<QueueJob, rusqlite::Error> {
    let payload: String = row.get(2)?;
    let status: String = row.get(3)?;
    let enqueued_at: String = row.get(6)?;
    let run_after: String = row.get(7)?;
    Ok(QueueJob {
        id: row.get(0)?,
        job_type: row.get(1)?,
        payload: serde_json::from_str(&payload).map_err(|e| json_err(2, e))?,
        status: JobStatus::from_str(&status).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
        })?,
        attempts: row.get(4)?,
        max_attempts: row.get(5)?,
        enqueued_at: parse_ts(6, &enqueued_at)?,
        run_after: parse_ts(7, &run_after)?,
        last_error: row.get(8)?,
    })
}

fn select_job(conn: &rusqlite::Connection, id: &str) -> Result<Option<QueueJob>, rusqlite::Error> {
    conn.query_row(
        &format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1"),
        params![id],
        row_to_job,
    )
    .optional()
}

/// Insert a pending job. Returns the generated job id.
pub async fn enqueue(db: &Database, job: NewJob) -> Result<String, GavelError> {
    let id = uuid::Uuid::new_v4().to_string();
    let now = Utc::now();
    let payload = serde_json::to_string(&job.payload)?;
    let run_after = format_timestamp(&job.run_after.unwrap_or(now));
    let now = format_timestamp(&now);
    let job_id = id.clone();

    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "INSERT INTO jobs (id, job_type, payload, status, attempts, max_attempts,
                                   enqueued_at, run_after, updated_at)
                 VALUES (?1, ?2, ?3, 'pending', 0, ?4, ?5, ?6, ?5)",
                params![job_id, job.job_type, payload, job.max_attempts, now, run_after],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;
    Ok(id)
}

/// Claim the oldest eligible pending job matching `filter`.
///
/// Selection and the `active` transition happen in one transaction, so two
/// workers never claim the same job.
pub async fn dequeue(
    db: &Database,
    filter: &JobFilter,
    lock_timeout: Duration,
) -> Result<Option<QueueJob>, GavelError> {
    let (clause, types) = match filter {
        JobFilter::Any => (String::new(), Vec::new()),
        JobFilter::Only(types) if types.is_empty() => return Ok(None),
        JobFilter::Only(types) => (
            format!(" AND job_type IN ({})", placeholders(types.len(), 2)),
            types.clone(),
        ),
        JobFilter::Except(types) if types.is_empty() => (String::new(), Vec::new()),
        JobFilter::Except(types) => (
            format!(" AND job_type NOT IN ({})", placeholders(types.len(), 2)),
            types.clone(),
        ),
    };
    let now = Utc::now();
    let lock_until = now
        + chrono::Duration::from_std(lock_timeout).unwrap_or_else(|_| chrono::Duration::minutes(10));
    let now = format_timestamp(&now);
    let lock_until = format_timestamp(&lock_until);

    db.connection()
        .call(move |conn| -> Result<Option<QueueJob>, rusqlite::Error> {
            let tx = conn.transaction()?;
            let sql = format!(
                "SELECT {JOB_COLUMNS} FROM jobs
                 WHERE status = 'pending' AND run_after <= ?1{clause}
                 ORDER BY rowid ASC
                 LIMIT 1"
            );
            let bound = std::iter::once(now.clone()).chain(types);
            let job = tx
                .query_row(&sql, params_from_iter(bound), row_to_job)
                .optional()?;

            let Some(job) = job else {
                tx.commit()?;
                return Ok(None);
            };
            tx.execute(
                "UPDATE jobs SET status = 'active', locked_until = ?1, updated_at = ?2
                 WHERE id = ?3",
                params![lock_until, now, job.id],
            )?;
            tx.commit()?;
            Ok(Some(QueueJob {
                status: JobStatus::Active,
                ..job
            }))
        })
        .await
        .map_err(map_tr_err)
}

fn placeholders(count: usize, first: usize) -> String {
    (first..first + count)
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Mark a job completed.
pub async fn ack(db: &Database, id: &str) -> Result<(), GavelError> {
    let id = id.to_string();
    let now = format_timestamp(&Utc::now());
    let updated = db
        .connection()
        .call(move |conn| -> Result<usize, rusqlite::Error> {
            conn.execute(
                "UPDATE jobs SET status = 'completed', locked_until = NULL, updated_at = ?1
                 WHERE id = ?2 AND status = 'active'",
                params![now, id],
            )
        })
        .await
        .map_err(map_tr_err)?;
    if updated == 0 {
        return Err(GavelError::Queue("ack on a job that is not active".into()));
    }
    Ok(())
}

/// Record a failed attempt.
///
/// Increments attempts. Below `max_attempts` the job goes back to pending with
/// `run_after = retry_at`; at `max_attempts` it is marked failed.
pub async fn fail(
    db: &Database,
    id: &str,
    error: &str,
    retry_at: DateTime<Utc>,
) -> Result<FailOutcome, GavelError> {
    let id = id.to_string();
    let error = error.to_string();
    let now = format_timestamp(&Utc::now());
    let run_after = format_timestamp(&retry_at);

    let outcome = db
        .connection()
        .call(move |conn| -> Result<Option<FailOutcome>, rusqlite::Error> {
            let tx = conn.transaction()?;
            let current: Option<(u32, u32)> = tx
                .query_row(
                    "SELECT attempts, max_attempts FROM jobs WHERE id = ?1 AND status = 'active'",
                    params![id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            let Some((attempts, max_attempts)) = current else {
                tx.commit()?;
                return Ok(None);
            };

            let attempts = attempts + 1;
            let outcome = if attempts >= max_attempts {
                tx.execute(
                    "UPDATE jobs SET status = 'failed', attempts = ?1, last_error = ?2,
                     locked_until = NULL, updated_at = ?3
                     WHERE id = ?4",
                    params![max_attempts, error, now, id],
                )?;
                let job = select_job(&tx, &id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)?;
                FailOutcome::Exhausted(job)
            } else {
                tx.execute(
                    "UPDATE jobs SET status = 'pending', attempts = ?1, last_error = ?2,
                     run_after = ?3, locked_until = NULL, updated_at = ?4
                     WHERE id = ?5",
                    params![attempts, error, run_after, now, id],
                )?;
                FailOutcome::Retrying {
                    attempts,
                    run_after: retry_at,
                }
            };
            tx.commit()?;
            Ok(Some(outcome))
        })
        .await
        .map_err(map_tr_err)?;

    outcome.ok_or_else(|| GavelError::Queue("fail on a job that is not active".into()))
}

/// Reset a failed job to pending with zero attempts.
pub async fn requeue(db: &Database, id: &str) -> Result<bool, GavelError> {
    let id = id.to_string();
    let now = format_timestamp(&Utc::now());
    let updated = db
        .connection()
        .call(move |conn| -> Result<usize, rusqlite::Error> {
            conn.execute(
                "UPDATE jobs SET status = 'pending', attempts = 0, last_error = NULL,
                 run_after = ?1, locked_until = NULL, updated_at = ?1
                 WHERE id = ?2 AND status = 'failed'",
                params![now, id],
            )
        })
        .await
        .map_err(map_tr_err)?;
    Ok(updated > 0)
}

/// Look up a job by id.
pub async fn get(db: &Database, id: &str) -> Result<Option<QueueJob>, GavelError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| select_job(conn, &id))
        .await
        .map_err(map_tr_err)
}

/// Pending and active job counts per job type.
pub async fn depth(db: &Database) -> Result<BTreeMap<String, u64>, GavelError> {
    db.connection()
        .call(|conn| -> Result<BTreeMap<String, u64>, rusqlite::Error> {
            let mut stmt = conn.prepare(
                "SELECT job_type, COUNT(*) FROM jobs
                 WHERE status IN ('pending', 'active')
                 GROUP BY job_type",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
            })?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Return active jobs to pending.
///
/// With `all_active` every active job is recovered (startup, when no worker
/// can still hold one); otherwise only those whose lock expired.
pub async fn recover(db: &Database, all_active: bool) -> Result<u64, GavelError> {
    let now = format_timestamp(&Utc::now());
    db.connection()
        .call(move |conn| -> Result<u64, rusqlite::Error> {
            let changed = conn.execute(
                "UPDATE jobs SET status = 'pending', locked_until = NULL, updated_at = ?1
                 WHERE status = 'active' AND (?2 OR locked_until IS NULL OR locked_until <= ?1)",
                params![now, all_active],
            )?;
            Ok(changed as u64)
        })
        .await
        .map_err(map_tr_err)
}
