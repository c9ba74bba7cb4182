// SPDX-FileCopyrightText: 2026 Gavel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Dead-letter entries. One row per job; re-quarantining replaces the row.

use gavel_core::types::format_timestamp;
use gavel_core::{DeadLetterEntry, GavelError};
use rusqlite::{Row, params};

use super::{json_err, parse_ts};
use crate::database::{Database, map_tr_err};

fn row_to_entry(row: &Row<'_>) -> Result<DeadLetterEntry, rusqlite::Error> {
    let job: String = row.get(0)?;
    let quarantined_at: String = row.get(2)?;
    Ok(DeadLetterEntry {
        job: serde_json::from_str(&job).map_err(|e| json_err(0, e))?,
        last_error: row.get(1)?,
        quarantined_at: parse_ts(2, &quarantined_at)?,
        released: row.get(3)?,
    })
}

pub async fn quarantine(db: &Database, entry: &DeadLetterEntry) -> Result<(), GavelError> {
    let job_id = entry.job.id.clone();
    let job = serde_json::to_string(&entry.job)?;
    let last_error = entry.last_error.clone();
    let quarantined_at = format_timestamp(&entry.quarantined_at);
    let released = entry.released;

    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "INSERT OR REPLACE INTO dead_letters (job_id, job, last_error, quarantined_at, released)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![job_id, job, last_error, quarantined_at, released],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn list(db: &Database, include_released: bool) -> Result<Vec<DeadLetterEntry>, GavelError> {
    db.connection()
        .call(move |conn| -> Result<Vec<DeadLetterEntry>, rusqlite::Error> {
            let mut stmt = conn.prepare(
                "SELECT job, last_error, quarantined_at, released FROM dead_letters
                 WHERE ?1 OR released = 0
                 ORDER BY quarantined_at ASC, rowid ASC",
            )?;
            let rows = stmt.query_map(params![include_released], row_to_entry)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn mark_released(db: &Database, job_id: &str) -> Result<bool, GavelError> {
    let job_id = job_id.to_string();
    let updated = db
        .connection()
        .call(move |conn| -> Result<usize, rusqlite::Error> {
            conn.execute(
                "UPDATE dead_letters SET released = 1 WHERE job_id = ?1 AND released = 0",
                params![job_id],
            )
        })
        .await
        .map_err(map_tr_err)?;
    Ok(updated > 0)
}

pub async fn purge(db: &Database) -> Result<u64, GavelError> {
    db.connection()
        .call(|conn| -> Result<u64, rusqlite::Error> {
            Ok(conn.execute("DELETE FROM dead_letters", [])? as u64)
        })
        .await
        .map_err(map_tr_err)
}

/// Number of unreleased entries.
pub async fn count(db: &Database) -> Result<u64, GavelError> {
    db.connection()
        .call(|conn| -> Result<u64, rusqlite::Error> {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM dead_letters WHERE released = 0",
                [],
                |row| row.get(0),
            )?;
            Ok(n as u64)
        })
        .await
        .map_err(map_tr_err)
}
