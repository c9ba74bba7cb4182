// SPDX-FileCopyrightText: 2026 Gavel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable lane tests: processors, retries and the dead-letter queue.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::broadcast::Receiver;

use gavel_core::ops::*;
use gavel_core::{GavelError, JobQueue, JobStatus, QueueJob};
use gavel_engine::{BulkOutcome, EngineEvent, JobProcessor, ProcessorResult};
use gavel_test_utils::TestHarness;

const WAIT: Duration = Duration::from_secs(5);

/// First event accepted by `pick`, skipping everything else.
async fn wait_for<T>(
    events: &mut Receiver<EngineEvent>,
    mut pick: impl FnMut(&EngineEvent) -> Option<T>,
) -> T {
    tokio::time::timeout(WAIT, async {
        loop {
            if let Ok(event) = events.recv().await
                && let Some(found) = pick(&event)
            {
                return found;
            }
        }
    })
    .await
    .expect("event not observed in time")
}

fn completed(job_id: &str) -> impl FnMut(&EngineEvent) -> Option<Option<Value>> + '_ {
    move |event| match event {
        EngineEvent::JobCompleted { job_id: id, data, .. } if id == job_id => Some(data.clone()),
        _ => None,
    }
}

// ---- Bulk processors ----

#[tokio::test]
async fn bulk_partial_failure_records_each_item() {
    let harness = TestHarness::new().unwrap();
    let mut events = harness.engine.subscribe();
    harness.executor.fail_always(BAN_USER, Some("user:B"));

    let result = harness
        .submit(BULK_BAN, json!({"userIds": ["A", "B", "C"], "reason": "raid"}))
        .await
        .unwrap();
    let job_id = result.job_id.unwrap();

    let data = wait_for(&mut events, completed(&job_id)).await.unwrap();
    let outcome: BulkOutcome = serde_json::from_value(data).unwrap();
    assert_eq!(outcome.total, 3);
    assert_eq!(outcome.succeeded, 2);
    assert_eq!(outcome.failed, 1);
    assert_eq!(outcome.errors.len(), 1);
    assert_eq!(outcome.errors[0].item, "B");
    assert!(outcome.errors[0].error.contains("scripted failure"));

    // B was tried bulk_item_attempts (2) times; A and C once each.
    assert_eq!(harness.executor.call_count(BAN_USER), 4);
    let calls = harness.executor.calls();
    assert!(calls.iter().all(|c| c.payload.get("reason") == Some(&json!("raid"))));
    assert!(calls.iter().all(|c| !c.payload.contains_key("user_ids")));

    let job = harness.storage.get(&job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);

    harness.engine.flush_audit().await.unwrap();
    let audited: Vec<_> = harness
        .sink
        .entries()
        .into_iter()
        .filter(|e| e.action == BAN_USER)
        .collect();
    assert_eq!(audited.len(), 3);
    assert_eq!(audited.iter().filter(|e| !e.success).count(), 1);
    assert_eq!(audited[1].target.as_deref(), Some("user:B"));
}

#[tokio::test]
async fn bulk_job_with_every_item_failing_is_retried() {
    let harness = TestHarness::builder()
        .configure(|c| c.dispatch.default_max_attempts = 2)
        .build()
        .unwrap();
    let mut events = harness.engine.subscribe();
    harness.executor.fail_always(KICK_USER, None);

    let job_id = harness
        .submit(BULK_KICK, json!({"user_ids": ["1", "2"]}))
        .await
        .unwrap()
        .job_id
        .unwrap();

    let attempts = wait_for(&mut events, |event| match event {
        EngineEvent::JobRetryScheduled { job_id: id, attempts, .. } if *id == job_id => {
            Some(*attempts)
        }
        _ => None,
    })
    .await;
    assert_eq!(attempts, 1);
}

// ---- Dead-letter queue ----

#[tokio::test]
async fn job_is_dead_lettered_after_exhausting_attempts() {
    let harness = TestHarness::new().unwrap();
    let mut events = harness.engine.subscribe();
    harness.executor.fail_always(SYNC_ROLES, None);

    let job_id = harness
        .submit(SYNC_ROLES, json!({"source_role": "r"}))
        .await
        .unwrap()
        .job_id
        .unwrap();

    let mut retries = Vec::new();
    let dead_attempts = wait_for(&mut events, |event| match event {
        EngineEvent::JobRetryScheduled { job_id: id, attempts, .. } if *id == job_id => {
            retries.push(*attempts);
            None
        }
        EngineEvent::JobDeadLettered { job_id: id, attempts, .. } if *id == job_id => {
            Some(*attempts)
        }
        _ => None,
    })
    .await;
    assert_eq!(retries, vec![1, 2]);
    assert_eq!(dead_attempts, 3);
    assert_eq!(harness.executor.call_count(SYNC_ROLES), 3);

    let quarantined = harness.engine.dead_letters().list_quarantined().await.unwrap();
    assert_eq!(quarantined.len(), 1);
    assert_eq!(quarantined[0].job.id, job_id);
    assert_eq!(quarantined[0].job.attempts, 3);
    assert!(quarantined[0].last_error.contains("scripted failure"));
    assert_eq!(harness.engine.health().await.unwrap().dead_letters, 1);
}

#[tokio::test]
async fn released_job_runs_again() {
    let harness = TestHarness::builder()
        .configure(|c| c.dispatch.default_max_attempts = 1)
        .build()
        .unwrap();
    let mut events = harness.engine.subscribe();
    harness.executor.fail_always(PRUNE_MEMBERS, None);

    let job_id = harness
        .submit(PRUNE_MEMBERS, json!({"days": 30}))
        .await
        .unwrap()
        .job_id
        .unwrap();
    wait_for(&mut events, |event| match event {
        EngineEvent::JobDeadLettered { job_id: id, .. } if *id == job_id => Some(()),
        _ => None,
    })
    .await;

    harness.executor.clear_failures();
    assert!(harness.engine.dead_letters().release(&job_id).await.unwrap());
    wait_for(&mut events, completed(&job_id)).await;

    assert_eq!(harness.engine.dead_letters().count().await.unwrap(), 0);
    let job = harness.storage.get(&job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
}

#[tokio::test]
async fn purge_empties_the_dead_letter_queue() {
    let harness = TestHarness::builder()
        .configure(|c| c.dispatch.default_max_attempts = 1)
        .build()
        .unwrap();
    let mut events = harness.engine.subscribe();
    harness.executor.fail_always(SEND_ANNOUNCEMENT, None);

    harness
        .submit(SEND_ANNOUNCEMENT, json!({"channel_id": "news", "content": "hi"}))
        .await
        .unwrap();
    wait_for(&mut events, |event| match event {
        EngineEvent::JobDeadLettered { .. } => Some(()),
        _ => None,
    })
    .await;

    assert_eq!(harness.engine.dead_letters().purge().await.unwrap(), 1);
    assert!(harness.engine.dead_letters().list_all().await.unwrap().is_empty());
}

// ---- Routing ----

#[tokio::test]
async fn unknown_type_runs_through_fallback_processor() {
    let harness = TestHarness::new().unwrap();
    let mut events = harness.engine.subscribe();

    let result = harness
        .submit("warn_user", json!({"userId": "3", "note": "be nice"}))
        .await
        .unwrap();
    let job_id = result.job_id.unwrap();

    let data = wait_for(&mut events, completed(&job_id)).await.unwrap();
    assert_eq!(data["op_type"], json!("WARN_USER"));
    assert_eq!(data["target"], json!("user:3"));
}

struct CountingProcessor;

#[async_trait]
impl JobProcessor for CountingProcessor {
    fn name(&self) -> &str {
        "counting"
    }

    fn job_types(&self) -> Vec<String> {
        vec![BULK_KICK.to_string()]
    }

    async fn process(&self, job: &QueueJob) -> Result<ProcessorResult, GavelError> {
        let operation = job.operation()?;
        let count = operation.payload["user_ids"]
            .as_array()
            .map(Vec::len)
            .unwrap_or(0);
        Ok(ProcessorResult::succeeded(json!({"counted": count})))
    }
}

#[tokio::test]
async fn registered_processor_takes_precedence() {
    let harness = TestHarness::builder()
        .with_processor(Arc::new(CountingProcessor))
        .build()
        .unwrap();
    let mut events = harness.engine.subscribe();

    let job_id = harness
        .submit(BULK_KICK, json!({"user_ids": ["1", "2", "3"]}))
        .await
        .unwrap()
        .job_id
        .unwrap();

    let data = wait_for(&mut events, completed(&job_id)).await.unwrap();
    assert_eq!(data, json!({"counted": 3}));
    assert_eq!(harness.executor.call_count(KICK_USER), 0);
}

/// Panics on every job it is handed.
#[derive(Default)]
struct PanickingProcessor {
    calls: AtomicUsize,
}

#[async_trait]
impl JobProcessor for PanickingProcessor {
    fn name(&self) -> &str {
        "panicking"
    }

    fn job_types(&self) -> Vec<String> {
        vec![SYNC_ROLES.to_string()]
    }

    async fn process(&self, job: &QueueJob) -> Result<ProcessorResult, GavelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        panic!("corrupt payload in job {}", job.id);
    }
}

#[tokio::test]
async fn panicking_processor_exhausts_attempts_and_is_dead_lettered() {
    let processor = Arc::new(PanickingProcessor::default());
    let harness = TestHarness::builder()
        .with_processor(processor.clone())
        .build()
        .unwrap();
    let mut events = harness.engine.subscribe();

    let job_id = harness
        .submit(SYNC_ROLES, json!({"source_role": "r"}))
        .await
        .unwrap()
        .job_id
        .unwrap();

    let dead_attempts = wait_for(&mut events, |event| match event {
        EngineEvent::JobDeadLettered { job_id: id, attempts, .. } if *id == job_id => {
            Some(*attempts)
        }
        _ => None,
    })
    .await;
    assert_eq!(dead_attempts, 3);
    assert_eq!(processor.calls.load(Ordering::SeqCst), 3);

    let quarantined = harness.engine.dead_letters().list_quarantined().await.unwrap();
    assert_eq!(quarantined.len(), 1);
    assert_eq!(quarantined[0].job.attempts, 3);
    assert!(quarantined[0].last_error.contains("processor panicked: corrupt payload"));
    assert_eq!(
        harness.storage.get(&job_id).await.unwrap().unwrap().status,
        JobStatus::Failed
    );
}

#[tokio::test]
async fn worker_pool_drains_on_shutdown() {
    let harness = TestHarness::new().unwrap();
    harness.executor.set_delay(Duration::from_millis(100));

    harness
        .submit(SYNC_ROLES, json!({"guild_id": "g1"}))
        .await
        .unwrap();
    assert!(harness.executor.wait_for_calls(1, WAIT).await);
    harness.engine.shutdown().await.unwrap();

    // The running job finished before shutdown returned.
    assert!(harness.storage.depth().await.unwrap().is_empty());
}
