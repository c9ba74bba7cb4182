// SPDX-FileCopyrightText: 2026 Gavel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Audit log writes and reads.

use std::str::FromStr;

use gavel_core::{AuditEntry, GavelError, OperationSource};
use rusqlite::{Row, params};

use super::json_err;
use crate::database::{Database, map_tr_err};

/// Insert all entries in a single transaction.
pub async fn bulk_insert(db: &Database, entries: &[AuditEntry]) -> Result<usize, GavelError> {
    let rows = entries
        .iter()
        .map(|e| {
            Ok((
                e.id.clone(),
                e.guild_id.clone(),
                e.action.clone(),
                e.target.clone(),
                e.source.to_string(),
                e.success,
                e.error.clone(),
                serde_json::to_string(&e.detail)?,
                e.created_at.clone(),
            ))
        })
        .collect::<Result<Vec<_>, GavelError>>()?;

    db.connection()
        .call(move |conn| -> Result<usize, rusqlite::Error> {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO audit_log (id, guild_id, action, target, source, success,
                                            error, detail, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                )?;
                for row in &rows {
                    stmt.execute(params![
                        row.0, row.1, row.2, row.3, row.4, row.5, row.6, row.7, row.8
                    ])?;
                }
            }
            tx.commit()?;
            Ok(rows.len())
        })
        .await
        .map_err(map_tr_err)
}

fn row_to_entry(row: &Row<'_>) -> Result<AuditEntry, rusqlite::Error> {
    let source: String = row.get(4)?;
    let detail: String = row.get(7)?;
    Ok(AuditEntry {
        id: row.get(0)?,
        guild_id: row.get(1)?,
        action: row.get(2)?,
        target: row.get(3)?,
        source: OperationSource::from_str(&source).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
        })?,
        success: row.get(5)?,
        error: row.get(6)?,
        detail: serde_json::from_str(&detail).map_err(|e| json_err(7, e))?,
        created_at: row.get(8)?,
    })
}

/// Most recent entries, newest first.
pub async fn recent(db: &Database, limit: usize) -> Result<Vec<AuditEntry>, GavelError> {
    let limit = limit as i64;
    db.connection()
        .call(move |conn| -> Result<Vec<AuditEntry>, rusqlite::Error> {
            let mut stmt = conn.prepare(
                "SELECT id, guild_id, action, target, source, success, error, detail, created_at
                 FROM audit_log
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit], row_to_entry)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}
