// SPDX-FileCopyrightText: 2026 Gavel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end tests of the submission pipeline.
//!
//! Each test builds an isolated TestHarness over in-memory storage and a
//! scripted mock executor. Tests are independent and order-insensitive.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use gavel_core::ops::*;
use gavel_core::{ExecutionMethod, GavelError, JobQueue, JobStatus};
use gavel_engine::{BulkItem, EngineEvent, SubmitOptions};
use gavel_test_utils::{MockExecutor, TestHarness};

const WAIT: Duration = Duration::from_secs(5);

fn gated_harness() -> TestHarness {
    TestHarness::builder()
        .with_executor(MockExecutor::gated())
        .configure(|c| c.dispatch.realtime_timeout_ms = 5_000)
        .build()
        .unwrap()
}

// ---- Idempotent replay ----

#[tokio::test]
async fn identical_request_within_ttl_is_served_from_cache() {
    let harness = TestHarness::new().unwrap();
    let payload = json!({"channelId": "c1", "content": "hello"});

    let first = harness.submit(SEND_MESSAGE, payload.clone()).await.unwrap();
    let second = harness.submit(SEND_MESSAGE, payload).await.unwrap();

    assert!(first.success);
    assert_eq!(first.method, ExecutionMethod::Realtime);
    assert_eq!(first, second);
    assert_eq!(harness.executor.call_count(SEND_MESSAGE), 1);
}

#[tokio::test]
async fn same_resource_with_different_payload_is_served_from_cache() {
    let harness = TestHarness::new().unwrap();
    let first = harness
        .submit(SEND_MESSAGE, json!({"channel_id": "c1", "content": "one"}))
        .await
        .unwrap();
    let second = harness
        .submit(SEND_MESSAGE, json!({"channel_id": "c1", "content": "two"}))
        .await
        .unwrap();
    assert_eq!(first, second);
    assert_eq!(harness.executor.call_count(SEND_MESSAGE), 1);

    // Another resource is a different key.
    harness
        .submit(SEND_MESSAGE, json!({"channel_id": "c2", "content": "two"}))
        .await
        .unwrap();
    assert_eq!(harness.executor.call_count(SEND_MESSAGE), 2);
}

#[tokio::test]
async fn failed_operation_is_not_cached() {
    let harness = TestHarness::new().unwrap();
    harness
        .executor
        .fail_times(DELETE_MESSAGE, Some("message:m1"), 1);

    let err = harness
        .submit(DELETE_MESSAGE, json!({"message_id": "m1"}))
        .await
        .unwrap_err();
    assert!(matches!(err, GavelError::Execution { .. }));

    let retry = harness
        .submit(DELETE_MESSAGE, json!({"message_id": "m1"}))
        .await
        .unwrap();
    assert!(retry.success);
    assert_eq!(harness.executor.call_count(DELETE_MESSAGE), 2);
}

// ---- Mutual exclusion ----

#[tokio::test]
async fn concurrent_identical_requests_execute_once() {
    let harness = gated_harness();
    let engine = Arc::clone(&harness.engine);
    let submit = |engine: Arc<gavel_engine::OperationEngine>| async move {
        engine
            .submit(BAN_USER, json!({"user_id": "1"}), SubmitOptions::api("g1"))
            .await
    };

    let first = tokio::spawn(submit(Arc::clone(&engine)));
    assert!(harness.executor.wait_for_calls(1, WAIT).await);
    let second = tokio::spawn(submit(Arc::clone(&engine)));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(engine.dedup().in_flight_count(), 1);

    harness.executor.release(1);
    let first = first.await.unwrap().unwrap();
    let second = second.await.unwrap().unwrap();

    assert_eq!(first, second);
    assert_eq!(first.method, ExecutionMethod::Hybrid);
    assert_eq!(harness.executor.call_count(BAN_USER), 1);
}

#[tokio::test]
async fn waiter_is_readmitted_after_in_flight_failure() {
    let harness = gated_harness();
    harness
        .executor
        .fail_times(DELETE_MESSAGE, Some("message:m1"), 1);
    let engine = Arc::clone(&harness.engine);
    let submit = |engine: Arc<gavel_engine::OperationEngine>| async move {
        engine
            .submit(DELETE_MESSAGE, json!({"message_id": "m1"}), SubmitOptions::api("g1"))
            .await
    };

    let first = tokio::spawn(submit(Arc::clone(&engine)));
    assert!(harness.executor.wait_for_calls(1, WAIT).await);
    let waiter = tokio::spawn(submit(Arc::clone(&engine)));
    tokio::time::sleep(Duration::from_millis(50)).await;

    harness.executor.release(2);
    assert!(matches!(
        first.await.unwrap(),
        Err(GavelError::Execution { .. })
    ));
    let retried = waiter.await.unwrap().unwrap();
    assert!(retried.success);
    assert_eq!(harness.executor.call_count(DELETE_MESSAGE), 2);
}

#[tokio::test]
async fn concurrent_requests_with_different_payloads_share_one_execution() {
    let harness = gated_harness();
    let engine = Arc::clone(&harness.engine);
    let submit = |engine: Arc<gavel_engine::OperationEngine>, reason: &'static str| async move {
        engine
            .submit(
                DELETE_MESSAGE,
                json!({"message_id": "m1", "reason": reason}),
                SubmitOptions::api("g1"),
            )
            .await
    };

    let first = tokio::spawn(submit(Arc::clone(&engine), "spam"));
    assert!(harness.executor.wait_for_calls(1, WAIT).await);
    let second = tokio::spawn(submit(Arc::clone(&engine), "duplicate"));
    tokio::time::sleep(Duration::from_millis(50)).await;

    harness.executor.release(2);
    let first = first.await.unwrap().unwrap();
    let second = second.await.unwrap().unwrap();
    assert_eq!(first, second);
    assert_eq!(harness.executor.call_count(DELETE_MESSAGE), 1);
}

#[tokio::test]
async fn waiter_times_out_while_in_flight_operation_is_stuck() {
    let harness = TestHarness::builder()
        .with_executor(MockExecutor::gated())
        .configure(|c| {
            c.dispatch.realtime_timeout_ms = 5_000;
            c.dedup.await_timeout_secs = 1;
        })
        .build()
        .unwrap();
    let engine = Arc::clone(&harness.engine);
    let submit = |engine: Arc<gavel_engine::OperationEngine>| async move {
        engine
            .submit(DELETE_MESSAGE, json!({"message_id": "m1"}), SubmitOptions::api("g1"))
            .await
    };

    let first = tokio::spawn(submit(Arc::clone(&engine)));
    assert!(harness.executor.wait_for_calls(1, WAIT).await);

    let err = submit(Arc::clone(&engine)).await.unwrap_err();
    assert!(matches!(err, GavelError::Timeout { duration } if duration == Duration::from_secs(1)));
    assert_eq!(engine.dedup().in_flight_count(), 1);

    harness.executor.release(1);
    assert!(first.await.unwrap().is_ok());
    assert_eq!(harness.executor.call_count(DELETE_MESSAGE), 1);
}

#[tokio::test]
async fn waiter_gives_up_once_await_retries_are_spent() {
    let harness = TestHarness::builder()
        .with_executor(MockExecutor::gated())
        .configure(|c| {
            c.dispatch.realtime_timeout_ms = 5_000;
            c.dedup.max_await_retries = 0;
        })
        .build()
        .unwrap();
    harness
        .executor
        .fail_times(DELETE_MESSAGE, Some("message:m1"), 1);
    let engine = Arc::clone(&harness.engine);
    let submit = |engine: Arc<gavel_engine::OperationEngine>| async move {
        engine
            .submit(DELETE_MESSAGE, json!({"message_id": "m1"}), SubmitOptions::api("g1"))
            .await
    };

    let first = tokio::spawn(submit(Arc::clone(&engine)));
    assert!(harness.executor.wait_for_calls(1, WAIT).await);
    let waiter = tokio::spawn(submit(Arc::clone(&engine)));
    tokio::time::sleep(Duration::from_millis(50)).await;

    harness.executor.release(1);
    assert!(first.await.unwrap().is_err());
    match waiter.await.unwrap() {
        Err(GavelError::Execution { message, .. }) => {
            assert!(message.contains("scripted failure"), "{message}")
        }
        other => panic!("expected execution error, got {other:?}"),
    }
    assert_eq!(harness.executor.call_count(DELETE_MESSAGE), 1);
}

#[tokio::test]
async fn several_waiters_elect_a_single_re_execution() {
    let harness = gated_harness();
    harness
        .executor
        .fail_times(DELETE_MESSAGE, Some("message:m1"), 1);
    let engine = Arc::clone(&harness.engine);
    let submit = |engine: Arc<gavel_engine::OperationEngine>| async move {
        engine
            .submit(DELETE_MESSAGE, json!({"message_id": "m1"}), SubmitOptions::api("g1"))
            .await
    };

    let first = tokio::spawn(submit(Arc::clone(&engine)));
    assert!(harness.executor.wait_for_calls(1, WAIT).await);
    let waiters: Vec<_> = (0..3)
        .map(|_| tokio::spawn(submit(Arc::clone(&engine))))
        .collect();
    tokio::time::sleep(Duration::from_millis(50)).await;

    harness.executor.release(4);
    assert!(first.await.unwrap().is_err());
    let mut results = Vec::new();
    for waiter in waiters {
        results.push(waiter.await.unwrap().unwrap());
    }
    assert!(results.iter().all(|r| r.success && *r == results[0]));
    assert_eq!(harness.executor.call_count(DELETE_MESSAGE), 2);
}

// ---- Conflict rejection ----

#[tokio::test]
async fn conflicting_operation_is_rejected_in_both_directions() {
    let harness = gated_harness();
    let engine = Arc::clone(&harness.engine);

    let ban = tokio::spawn({
        let engine = Arc::clone(&engine);
        async move {
            engine
                .submit(BAN_USER, json!({"user_id": "1"}), SubmitOptions::api("g1"))
                .await
        }
    });
    assert!(harness.executor.wait_for_calls(1, WAIT).await);
    let err = harness
        .submit(UNBAN_USER, json!({"user_id": "1"}))
        .await
        .unwrap_err();
    assert!(matches!(err, GavelError::Conflict { .. }), "{err}");

    let unban = tokio::spawn({
        let engine = Arc::clone(&engine);
        async move {
            engine
                .submit(UNBAN_USER, json!({"user_id": "2"}), SubmitOptions::api("g1"))
                .await
        }
    });
    assert!(harness.executor.wait_for_calls(2, WAIT).await);
    let err = harness
        .submit(BAN_USER, json!({"user_id": "2"}))
        .await
        .unwrap_err();
    assert!(matches!(err, GavelError::Conflict { .. }), "{err}");

    harness.executor.release(2);
    assert!(ban.await.unwrap().is_ok());
    assert!(unban.await.unwrap().is_ok());
    // Rejected requests never reached the executor.
    assert_eq!(harness.executor.calls().len(), 2);
}

// ---- Lanes ----

#[tokio::test]
async fn realtime_call_past_deadline_times_out() {
    let harness = TestHarness::builder()
        .configure(|c| c.dispatch.realtime_timeout_ms = 20)
        .build()
        .unwrap();
    harness.executor.set_delay(Duration::from_millis(500));

    let err = harness
        .submit(PIN_MESSAGE, json!({"message_id": "m1"}))
        .await
        .unwrap_err();
    assert!(matches!(err, GavelError::Timeout { .. }));
}

#[tokio::test]
async fn durable_operation_is_acknowledged_with_job_reference() {
    let harness = TestHarness::builder().without_workers().build().unwrap();

    let result = harness
        .submit(BULK_KICK, json!({"userIds": ["1", "2"]}))
        .await
        .unwrap();
    assert!(result.success);
    assert_eq!(result.method, ExecutionMethod::Durable);

    let job_id = result.job_id.unwrap();
    let job = harness.storage.get(&job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.job_type, BULK_KICK);
    assert_eq!(job.max_attempts, 3);
    assert_eq!(harness.executor.calls().len(), 0);
}

#[tokio::test]
async fn hybrid_falls_back_to_queue_and_completes_asynchronously() {
    let harness = TestHarness::new().unwrap();
    let mut events = harness.engine.subscribe();
    harness.executor.fail_times(KICK_USER, Some("user:7"), 1);

    let result = harness
        .submit(KICK_USER, json!({"user_id": "7"}))
        .await
        .unwrap();
    assert_eq!(result.method, ExecutionMethod::Hybrid);
    let job_id = result.job_id.clone().unwrap();

    let completed = tokio::time::timeout(WAIT, async {
        loop {
            if let Ok(EngineEvent::JobCompleted { job_id: id, .. }) = events.recv().await
                && id == job_id
            {
                return id;
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(completed, job_id);
    assert_eq!(harness.executor.call_count(KICK_USER), 2);
}

#[tokio::test]
async fn hybrid_success_returns_realtime_data() {
    let harness = TestHarness::new().unwrap();
    let result = harness
        .submit(ADD_ROLE, json!({"user_id": "1", "role_id": "r"}))
        .await
        .unwrap();
    assert_eq!(result.method, ExecutionMethod::Hybrid);
    assert!(result.job_id.is_none());
    assert_eq!(result.data.unwrap()["target"], json!("user:1"));
}

// ---- Validation ----

#[tokio::test]
async fn invalid_request_never_reaches_queue_or_executor() {
    let harness = TestHarness::builder().without_workers().build().unwrap();

    let err = harness
        .submit(BULK_BAN, json!({"user_ids": []}))
        .await
        .unwrap_err();
    assert!(matches!(err, GavelError::Validation { .. }));
    let err = harness.submit("", json!({})).await.unwrap_err();
    assert!(matches!(err, GavelError::Validation { .. }));

    assert!(harness.storage.depth().await.unwrap().is_empty());
    assert!(harness.executor.calls().is_empty());
}

// ---- Capacity ----

#[tokio::test]
async fn capacity_error_when_in_flight_map_is_full() {
    let harness = TestHarness::builder()
        .with_executor(MockExecutor::gated())
        .configure(|c| {
            c.dispatch.realtime_timeout_ms = 5_000;
            c.dedup.max_in_flight = 2;
        })
        .build()
        .unwrap();

    let mut held = Vec::new();
    for channel in ["a", "b"] {
        let engine = Arc::clone(&harness.engine);
        held.push(tokio::spawn(async move {
            engine
                .submit(
                    SEND_MESSAGE,
                    json!({"channel_id": channel, "content": "x"}),
                    SubmitOptions::api("g1"),
                )
                .await
        }));
    }
    assert!(harness.executor.wait_for_calls(2, WAIT).await);

    let err = harness
        .submit(SEND_MESSAGE, json!({"channel_id": "c", "content": "x"}))
        .await
        .unwrap_err();
    assert!(matches!(err, GavelError::Capacity { limit: 2 }));

    harness.executor.release(2);
    for task in held {
        assert!(task.await.unwrap().is_ok());
    }
}

// ---- Bulk submission ----

#[tokio::test]
async fn bulk_submission_reports_per_item_results_and_summary() {
    let harness = TestHarness::builder().without_workers().build().unwrap();
    harness.executor.fail_always(BAN_USER, None);

    let submission = harness
        .engine
        .submit_bulk(
            vec![
                BulkItem::new(SEND_MESSAGE, json!({"channelId": "c1", "content": "hi"})),
                BulkItem::new(BAN_USER, json!({"userId": "9"})),
                BulkItem::new(BAN_USER, json!({})),
            ],
            SubmitOptions::api("g1"),
        )
        .await;

    assert_eq!(submission.results.len(), 3);
    assert!(submission.results[0].is_ok());
    assert!(submission.results[1].as_ref().unwrap().job_id.is_some());
    assert!(matches!(
        submission.results[2],
        Err(GavelError::Validation { .. })
    ));

    let summary = submission.summary;
    assert_eq!(summary.total, 3);
    assert_eq!(summary.successful, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.method_counts.get(&ExecutionMethod::Realtime), Some(&1));
    assert_eq!(summary.method_counts.get(&ExecutionMethod::Hybrid), Some(&1));
}

// ---- Audit batching ----

#[tokio::test]
async fn realtime_dispatches_are_audited_and_flushed_at_size() {
    let harness = TestHarness::builder()
        .configure(|c| c.batch.flush_size = 2)
        .build()
        .unwrap();

    harness
        .submit(SEND_MESSAGE, json!({"channel_id": "c1", "content": "a"}))
        .await
        .unwrap();
    assert!(harness.sink.batches().is_empty());

    harness
        .submit(SEND_MESSAGE, json!({"channel_id": "c2", "content": "b"}))
        .await
        .unwrap();
    let batches = harness.sink.batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].len(), 2);
    assert_eq!(batches[0][0].target.as_deref(), Some("channel:c1"));
    assert_eq!(batches[0][0].guild_id.as_deref(), Some("g1"));
}

#[tokio::test]
async fn failed_audit_flush_keeps_entries_pending() {
    let harness = TestHarness::new().unwrap();
    harness.sink.set_failing(true);
    harness
        .submit(SEND_MESSAGE, json!({"channel_id": "c1", "content": "a"}))
        .await
        .unwrap();

    assert!(harness.engine.flush_audit().await.is_err());
    assert_eq!(harness.engine.health().await.unwrap().batch_pending, 1);

    harness.sink.set_failing(false);
    assert_eq!(harness.engine.flush_audit().await.unwrap(), 1);
    assert_eq!(harness.sink.entries().len(), 1);
}

// ---- Introspection ----

#[tokio::test]
async fn lanes_and_health_are_exposed() {
    let harness = TestHarness::builder().without_workers().build().unwrap();
    let lanes = harness.engine.lanes();
    assert!(lanes.realtime.contains(&SEND_MESSAGE.to_string()));
    assert!(lanes.durable.contains(&BULK_BAN.to_string()));
    assert!(lanes.hybrid.contains(&BAN_USER.to_string()));

    harness
        .submit(PRUNE_MEMBERS, json!({"days": 30}))
        .await
        .unwrap();
    let health = harness.engine.health().await.unwrap();
    assert_eq!(health.in_flight, 0);
    assert_eq!(health.cache_size, 1);
    assert_eq!(health.queue_depth.get(PRUNE_MEMBERS), Some(&1));
    assert_eq!(health.dead_letters, 0);
    // Storage plays queue and dead-letter store, listed once.
    assert_eq!(health.collaborators.len(), 3);
}

// ---- Shutdown ----

#[tokio::test]
async fn shutdown_rejects_waiters_and_new_submissions() {
    let harness = gated_harness();
    let engine = Arc::clone(&harness.engine);

    let first = tokio::spawn({
        let engine = Arc::clone(&engine);
        async move {
            engine
                .submit(KICK_USER, json!({"user_id": "1"}), SubmitOptions::api("g1"))
                .await
        }
    });
    assert!(harness.executor.wait_for_calls(1, WAIT).await);
    let waiter = tokio::spawn({
        let engine = Arc::clone(&engine);
        async move {
            engine
                .submit(KICK_USER, json!({"user_id": "1"}), SubmitOptions::api("g1"))
                .await
        }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    engine.shutdown().await.unwrap();
    assert!(matches!(
        waiter.await.unwrap(),
        Err(GavelError::ShuttingDown)
    ));
    assert!(matches!(
        harness.submit(KICK_USER, json!({"user_id": "2"})).await,
        Err(GavelError::ShuttingDown)
    ));

    harness.executor.release(1);
    assert!(first.await.unwrap().is_ok());
    // Second call is a no-op.
    engine.shutdown().await.unwrap();
}
