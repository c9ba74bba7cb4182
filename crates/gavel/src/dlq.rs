// SPDX-FileCopyrightText: 2026 Gavel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `gavel dlq` subcommands.

use gavel_core::{DeadLetterEntry, GavelError};
use gavel_engine::DeadLetterQueue;

fn render(entries: &[DeadLetterEntry]) -> String {
    if entries.is_empty() {
        return "no dead-lettered jobs\n".to_string();
    }
    let mut out = String::new();
    for entry in entries {
        let job = &entry.job;
        out.push_str(&format!(
            "{}  {:<22} attempts={}/{}  quarantined={}{}\n    {}\n",
            job.id,
            job.job_type,
            job.attempts,
            job.max_attempts,
            entry.quarantined_at.format("%Y-%m-%d %H:%M:%S"),
            if entry.released { "  (released)" } else { "" },
            entry.last_error,
        ));
    }
    out
}

pub async fn list(dead_letters: &DeadLetterQueue, all: bool, json: bool) -> Result<(), GavelError> {
    let entries = if all {
        dead_letters.list_all().await?
    } else {
        dead_letters.list_quarantined().await?
    };
    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else {
        print!("{}", render(&entries));
    }
    Ok(())
}

pub async fn release(dead_letters: &DeadLetterQueue, job_id: &str) -> Result<(), GavelError> {
    if dead_letters.release(job_id).await? {
        println!("released {job_id}");
        Ok(())
    } else {
        Err(GavelError::Queue(format!("job {job_id} is not quarantined")))
    }
}

pub async fn purge(dead_letters: &DeadLetterQueue) -> Result<(), GavelError> {
    let purged = dead_letters.purge().await?;
    println!("purged {purged} dead-letter entr{}", if purged == 1 { "y" } else { "ies" });
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use gavel_core::{JobStatus, QueueJob};
    use serde_json::json;

    use super::*;

    fn entry(released: bool) -> DeadLetterEntry {
        DeadLetterEntry {
            job: QueueJob {
                id: "job-7".into(),
                job_type: "SYNC_ROLES".into(),
                payload: json!({"type": "SYNC_ROLES"}),
                attempts: 3,
                max_attempts: 3,
                status: JobStatus::Failed,
                enqueued_at: Utc::now(),
                run_after: Utc::now(),
                last_error: Some("boom".into()),
            },
            last_error: "boom".into(),
            quarantined_at: Utc::now(),
            released,
        }
    }

    #[test]
    fn render_lists_attempts_and_error() {
        let text = render(&[entry(false)]);
        assert!(text.starts_with("job-7  SYNC_ROLES"));
        assert!(text.contains("attempts=3/3"));
        assert!(text.contains("boom"));
        assert!(!text.contains("released"));
        assert!(render(&[entry(true)]).contains("(released)"));
        assert_eq!(render(&[]), "no dead-lettered jobs\n");
    }

    #[tokio::test]
    async fn releasing_unknown_job_is_an_error() {
        let storage = Arc::new(gavel_storage::MemoryStorage::new());
        let dead_letters =
            DeadLetterQueue::new(storage.clone(), storage, gavel_engine::EventBus::new(4));
        let err = release(&dead_letters, "missing").await.unwrap_err();
        assert!(err.to_string().contains("missing"));
    }
}
