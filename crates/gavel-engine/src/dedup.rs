// SPDX-FileCopyrightText: 2026 Gavel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! At-most-one-in-flight admission control and the short-lived result cache.
//!
//! Every operation passes through [`Deduplicator::admit_attempt`] before it is
//! dispatched. The in-flight map and the result cache share one mutex, so the
//! check-then-register step is atomic per `(type, guild, resource)` key. An
//! admitted operation holds a [`Ticket`]; completing, failing or dropping the
//! ticket removes the in-flight entry and publishes the outcome to waiters in
//! the same critical section.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::Shared;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use gavel_config::model::DedupConfig;
use gavel_core::{GavelError, Operation, OperationResult, ResourceKey};

use crate::conflicts::conflicting_types;
use crate::telemetry;

/// Serialization key for admission.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub op_type: String,
    pub guild_id: Option<String>,
    pub resource: ResourceKey,
    /// Set only for global keys, so unrelated identifier-less payloads do not collide.
    pub global_fingerprint: Option<u64>,
}

impl DedupKey {
    pub fn for_operation(operation: &Operation) -> Self {
        let global_fingerprint = operation
            .resource_key
            .is_global()
            .then(|| operation.fingerprint());
        Self {
            op_type: operation.op_type.clone(),
            guild_id: operation.guild_id.clone(),
            resource: operation.resource_key.clone(),
            global_fingerprint,
        }
    }

    fn with_type(&self, op_type: &str) -> Self {
        Self {
            op_type: op_type.to_string(),
            ..self.clone()
        }
    }
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{}/{}",
            self.op_type,
            self.guild_id.as_deref().unwrap_or("-"),
            self.resource
        )?;
        if let Some(fp) = self.global_fingerprint {
            write!(f, "#{fp:016x}")?;
        }
        Ok(())
    }
}

/// How an in-flight operation ended, as seen by its waiters.
#[derive(Debug, Clone, PartialEq)]
pub enum Settlement {
    Completed(OperationResult),
    Failed(String),
    /// The ticket was dropped unsettled or reclaimed by the max-age sweep.
    Abandoned,
    ShuttingDown,
}

type SettledFuture = Shared<oneshot::Receiver<Settlement>>;

/// A handle on another caller's in-flight operation.
pub struct InFlightWait {
    pub operation_id: String,
    settled: SettledFuture,
}

impl fmt::Debug for InFlightWait {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InFlightWait")
            .field("operation_id", &self.operation_id)
            .finish()
    }
}

impl InFlightWait {
    /// Resolve once the in-flight operation settles.
    pub async fn settled(self) -> Settlement {
        self.settled.await.unwrap_or(Settlement::Abandoned)
    }
}

/// Decision returned by [`Deduplicator::admit_attempt`].
#[derive(Debug)]
pub enum Admission {
    /// New in-flight operation. The caller must dispatch it and settle the ticket.
    Admitted(Ticket),
    /// A fresh cached result for the same key.
    Duplicate(OperationResult),
    /// The same key is already in flight.
    AwaitExisting(InFlightWait),
    /// A conflicting type is in flight on the same resource.
    Conflict(GavelError),
}

impl Admission {
    /// Short label used for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Admission::Admitted(_) => "admitted",
            Admission::Duplicate(_) => "duplicate",
            Admission::AwaitExisting(_) => "await",
            Admission::Conflict(_) => "conflict",
        }
    }
}

/// What a sweep reclaimed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub reclaimed_in_flight: usize,
    pub expired_results: usize,
}

struct InFlightEntry {
    operation_id: String,
    started_at: Instant,
    /// Waits the admitted caller sat through before it won the key.
    retry_count: u32,
    token: u64,
    sender: oneshot::Sender<Settlement>,
    settled: SettledFuture,
}

struct CachedResult {
    result: OperationResult,
    stored_at: Instant,
}

#[derive(Default)]
struct DedupState {
    in_flight: HashMap<DedupKey, InFlightEntry>,
    cache: HashMap<DedupKey, CachedResult>,
    next_token: u64,
    shut_down: bool,
}

struct DedupInner {
    state: Mutex<DedupState>,
    result_ttl: Duration,
    max_in_flight: usize,
    max_age: Duration,
    sweep_interval: Duration,
}

/// Owner of the in-flight map and the result cache.
#[derive(Clone)]
pub struct Deduplicator {
    inner: Arc<DedupInner>,
}

impl fmt::Debug for Deduplicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deduplicator")
            .field("in_flight", &self.in_flight_count())
            .field("cache_size", &self.cache_size())
            .finish()
    }
}

impl Deduplicator {
    pub fn new(config: &DedupConfig) -> Self {
        Self {
            inner: Arc::new(DedupInner {
                state: Mutex::new(DedupState::default()),
                result_ttl: Duration::from_secs(config.result_ttl_secs),
                max_in_flight: config.max_in_flight,
                max_age: Duration::from_secs(config.in_flight_max_age_secs),
                sweep_interval: Duration::from_secs(config.sweep_interval_secs),
            }),
        }
    }

    /// Admit a first attempt.
    pub fn admit(&self, operation: &Operation) -> Result<Admission, GavelError> {
        self.admit_attempt(operation, 0)
    }

    /// Admit `operation`, recording `retry_count` previous waits on the same key.
    ///
    /// Fails with [`GavelError::Capacity`] when the in-flight map is full even
    /// after an eager sweep, and with [`GavelError::ShuttingDown`] after
    /// [`shutdown`](Self::shutdown).
    pub fn admit_attempt(
        &self,
        operation: &Operation,
        retry_count: u32,
    ) -> Result<Admission, GavelError> {
        let key = DedupKey::for_operation(operation);
        let now = Instant::now();

        let mut state = self.inner.state.lock();
        if state.shut_down {
            return Err(GavelError::ShuttingDown);
        }

        // The key alone decides reuse. Global keys already carry the payload fingerprint.
        if let Some(cached) = state.cache.get(&key) {
            if now.duration_since(cached.stored_at) >= self.inner.result_ttl {
                state.cache.remove(&key);
            } else {
                let result = cached.result.clone();
                drop(state);
                telemetry::dedup("duplicate");
                debug!(%key, "serving cached result");
                return Ok(Admission::Duplicate(result));
            }
        }

        if let Some(entry) = state.in_flight.get(&key) {
            if now.duration_since(entry.started_at) >= self.inner.max_age {
                warn!(%key, operation_id = %entry.operation_id, "reclaiming in-flight operation past max age");
                if let Some(stale) = state.in_flight.remove(&key) {
                    let _ = stale.sender.send(Settlement::Abandoned);
                }
            } else {
                let entry_retries = entry.retry_count;
                let wait = InFlightWait {
                    operation_id: entry.operation_id.clone(),
                    settled: entry.settled.clone(),
                };
                drop(state);
                telemetry::dedup("await");
                debug!(
                    %key,
                    in_flight = %wait.operation_id,
                    in_flight_retries = entry_retries,
                    "awaiting in-flight operation"
                );
                return Ok(Admission::AwaitExisting(wait));
            }
        }

        if !key.resource.is_global() {
            for other in conflicting_types(&key.op_type) {
                let other_key = key.with_type(other);
                if let Some(entry) = state.in_flight.get(&other_key)
                    && now.duration_since(entry.started_at) < self.inner.max_age
                {
                    drop(state);
                    telemetry::dedup("conflict");
                    info!(%key, in_flight = other, "rejecting conflicting operation");
                    return Ok(Admission::Conflict(GavelError::Conflict {
                        requested: key.op_type.clone(),
                        in_flight: other.to_string(),
                        resource: key.resource.to_string(),
                    }));
                }
            }
        }

        if state.in_flight.len() >= self.inner.max_in_flight {
            let report = self.sweep_locked(&mut state, now);
            debug!(?report, "eager sweep at capacity");
            if state.in_flight.len() >= self.inner.max_in_flight {
                drop(state);
                telemetry::dedup("capacity");
                warn!(limit = self.inner.max_in_flight, "in-flight capacity exceeded");
                return Err(GavelError::Capacity {
                    limit: self.inner.max_in_flight,
                });
            }
        }

        let (sender, receiver) = oneshot::channel();
        state.next_token += 1;
        let token = state.next_token;
        state.in_flight.insert(
            key.clone(),
            InFlightEntry {
                operation_id: operation.id.clone(),
                started_at: now,
                retry_count,
                token,
                sender,
                settled: receiver.shared(),
            },
        );
        let (in_flight, cache_size) = (state.in_flight.len(), state.cache.len());
        drop(state);

        telemetry::dedup("admitted");
        telemetry::dedup_gauges(in_flight, cache_size);
        Ok(Admission::Admitted(Ticket {
            inner: Arc::clone(&self.inner),
            key,
            token,
            operation_id: operation.id.clone(),
            settled: false,
        }))
    }

    /// Reclaim in-flight entries past their max age and drop expired results.
    pub fn sweep(&self) -> SweepReport {
        let mut state = self.inner.state.lock();
        let report = self.sweep_locked(&mut state, Instant::now());
        telemetry::dedup_gauges(state.in_flight.len(), state.cache.len());
        report
    }

    fn sweep_locked(&self, state: &mut DedupState, now: Instant) -> SweepReport {
        let max_age = self.inner.max_age;
        let stale: Vec<DedupKey> = state
            .in_flight
            .iter()
            .filter(|(_, e)| now.duration_since(e.started_at) >= max_age)
            .map(|(k, _)| k.clone())
            .collect();
        for key in &stale {
            if let Some(entry) = state.in_flight.remove(key) {
                warn!(%key, operation_id = %entry.operation_id, "reclaimed leaked in-flight operation");
                let _ = entry.sender.send(Settlement::Abandoned);
            }
        }

        let ttl = self.inner.result_ttl;
        let before = state.cache.len();
        state
            .cache
            .retain(|_, c| now.duration_since(c.stored_at) < ttl);

        SweepReport {
            reclaimed_in_flight: stale.len(),
            expired_results: before - state.cache.len(),
        }
    }

    /// Run [`sweep`](Self::sweep) every `sweep_interval` until `cancel` fires.
    pub fn spawn_sweeper(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let dedup = self.clone();
        let period = self.inner.sweep_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let report = dedup.sweep();
                        if report != SweepReport::default() {
                            debug!(?report, "dedup sweep");
                        }
                    }
                }
            }
            debug!("dedup sweeper stopped");
        })
    }

    /// Reject every pending waiter with [`Settlement::ShuttingDown`] and refuse
    /// further admissions. Returns how many in-flight operations were pending.
    pub fn shutdown(&self) -> usize {
        let mut state = self.inner.state.lock();
        state.shut_down = true;
        let pending = state.in_flight.len();
        for (_, entry) in state.in_flight.drain() {
            let _ = entry.sender.send(Settlement::ShuttingDown);
        }
        state.cache.clear();
        if pending > 0 {
            info!(pending, "rejected in-flight operations at shutdown");
        }
        pending
    }

    pub fn in_flight_count(&self) -> usize {
        self.inner.state.lock().in_flight.len()
    }

    pub fn cache_size(&self) -> usize {
        self.inner.state.lock().cache.len()
    }
}

impl DedupInner {
    /// Remove the entry owned by `token` and publish `settlement` to its waiters.
    fn settle(&self, key: &DedupKey, token: u64, settlement: Settlement) {
        let mut state = self.state.lock();
        let owned = state
            .in_flight
            .get(key)
            .is_some_and(|entry| entry.token == token);
        if !owned {
            debug!(%key, "ticket settled after its entry was reclaimed");
            return;
        }
        let Some(entry) = state.in_flight.remove(key) else {
            return;
        };

        if let Settlement::Completed(result) = &settlement
            && result.success
            && !state.shut_down
        {
            // A completed action makes cached results of its opposite stale.
            if !key.resource.is_global() {
                for other in conflicting_types(&key.op_type) {
                    state.cache.remove(&key.with_type(other));
                }
            }
            state.cache.insert(
                key.clone(),
                CachedResult {
                    result: result.clone(),
                    stored_at: Instant::now(),
                },
            );
        }

        let _ = entry.sender.send(settlement);
        telemetry::dedup_gauges(state.in_flight.len(), state.cache.len());
    }
}

/// Proof of admission. Settles its in-flight entry exactly once.
///
/// Dropping an unsettled ticket releases the key with [`Settlement::Abandoned`].
pub struct Ticket {
    inner: Arc<DedupInner>,
    key: DedupKey,
    token: u64,
    operation_id: String,
    settled: bool,
}

impl fmt::Debug for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ticket")
            .field("key", &self.key)
            .field("operation_id", &self.operation_id)
            .finish()
    }
}

impl Ticket {
    pub fn key(&self) -> &DedupKey {
        &self.key
    }

    pub fn operation_id(&self) -> &str {
        &self.operation_id
    }

    /// Publish a result. Successful results are cached for the TTL.
    pub fn complete(mut self, result: OperationResult) {
        self.settle(Settlement::Completed(result));
    }

    /// Publish a terminal failure. Failures are not cached.
    pub fn fail(mut self, error: &GavelError) {
        self.settle(Settlement::Failed(error.to_string()));
    }

    fn settle(&mut self, settlement: Settlement) {
        if self.settled {
            return;
        }
        self.settled = true;
        self.inner.settle(&self.key, self.token, settlement);
    }
}

impl Drop for Ticket {
    fn drop(&mut self) {
        if !self.settled {
            debug!(key = %self.key, "ticket dropped unsettled");
            self.settle(Settlement::Abandoned);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gavel_core::ops::*;
    use gavel_core::{ExecutionMethod, OperationSource};
    use serde_json::json;

    fn config() -> DedupConfig {
        DedupConfig {
            result_ttl_secs: 300,
            max_in_flight: 3,
            in_flight_max_age_secs: 120,
            sweep_interval_secs: 60,
            await_timeout_secs: 30,
            max_await_retries: 3,
        }
    }

    fn op(op_type: &str, payload: serde_json::Value) -> Operation {
        Operation::new(
            op_type,
            payload.as_object().cloned().unwrap(),
            OperationSource::Api,
            Some("g1".into()),
        )
    }

    fn ok_result() -> OperationResult {
        OperationResult::executed(ExecutionMethod::Realtime, json!({"ok": true}), 3)
    }

    fn admitted(admission: Admission) -> Ticket {
        match admission {
            Admission::Admitted(ticket) => ticket,
            other => panic!("expected admission, got {}", other.label()),
        }
    }

    #[tokio::test]
    async fn completed_result_is_served_from_cache() {
        let dedup = Deduplicator::new(&config());
        let ban = op(BAN_USER, json!({"user_id": "1"}));
        admitted(dedup.admit(&ban).unwrap()).complete(ok_result());

        let replay = op(BAN_USER, json!({"user_id": "1"}));
        match dedup.admit(&replay).unwrap() {
            Admission::Duplicate(result) => assert_eq!(result.data, Some(json!({"ok": true}))),
            other => panic!("expected duplicate, got {}", other.label()),
        }
        assert_eq!(dedup.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn cached_result_is_served_for_any_payload_on_the_same_key() {
        let dedup = Deduplicator::new(&config());
        let first = op(BAN_USER, json!({"user_id": "1", "reason": "spam"}));
        admitted(dedup.admit(&first).unwrap()).complete(ok_result());

        let second = op(BAN_USER, json!({"user_id": "1", "reason": "raid"}));
        assert!(matches!(dedup.admit(&second).unwrap(), Admission::Duplicate(_)));
    }

    #[tokio::test]
    async fn waiter_with_other_payload_shares_in_flight_result() {
        let dedup = Deduplicator::new(&config());
        let ticket = admitted(
            dedup
                .admit(&op(TIMEOUT_USER, json!({"user_id": "1", "duration_secs": 60})))
                .unwrap(),
        );
        let Admission::AwaitExisting(wait) = dedup
            .admit(&op(TIMEOUT_USER, json!({"user_id": "1", "duration_secs": 600})))
            .unwrap()
        else {
            panic!("expected await");
        };
        ticket.complete(ok_result());
        assert!(matches!(wait.settled().await, Settlement::Completed(r) if r.success));
    }

    #[tokio::test]
    async fn waiter_observes_completion() {
        let dedup = Deduplicator::new(&config());
        let ticket = admitted(dedup.admit(&op(KICK_USER, json!({"user_id": "1"}))).unwrap());

        let Admission::AwaitExisting(wait) = dedup
            .admit(&op(KICK_USER, json!({"user_id": "1"})))
            .unwrap()
        else {
            panic!("expected await");
        };
        ticket.complete(ok_result());

        match wait.settled().await {
            Settlement::Completed(result) => assert!(result.success),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn failure_is_published_but_not_cached() {
        let dedup = Deduplicator::new(&config());
        let ticket = admitted(dedup.admit(&op(KICK_USER, json!({"user_id": "1"}))).unwrap());
        let Admission::AwaitExisting(wait) = dedup
            .admit(&op(KICK_USER, json!({"user_id": "1"})))
            .unwrap()
        else {
            panic!("expected await");
        };
        ticket.fail(&GavelError::execution("gateway down"));

        assert!(matches!(wait.settled().await, Settlement::Failed(e) if e.contains("gateway down")));
        assert_eq!(dedup.cache_size(), 0);
        assert!(matches!(
            dedup.admit(&op(KICK_USER, json!({"user_id": "1"}))).unwrap(),
            Admission::Admitted(_)
        ));
    }

    #[tokio::test]
    async fn dropped_ticket_releases_key() {
        let dedup = Deduplicator::new(&config());
        let ticket = admitted(dedup.admit(&op(KICK_USER, json!({"user_id": "1"}))).unwrap());
        let Admission::AwaitExisting(wait) = dedup
            .admit(&op(KICK_USER, json!({"user_id": "1"})))
            .unwrap()
        else {
            panic!("expected await");
        };
        drop(ticket);
        assert_eq!(wait.settled().await, Settlement::Abandoned);
        assert_eq!(dedup.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn conflicts_are_rejected_in_both_directions() {
        let dedup = Deduplicator::new(&config());
        let ban = admitted(dedup.admit(&op(BAN_USER, json!({"user_id": "1"}))).unwrap());
        match dedup.admit(&op(UNBAN_USER, json!({"user_id": "1"}))).unwrap() {
            Admission::Conflict(GavelError::Conflict { requested, in_flight, .. }) => {
                assert_eq!(requested, UNBAN_USER);
                assert_eq!(in_flight, BAN_USER);
            }
            other => panic!("expected conflict, got {}", other.label()),
        }
        drop(ban);

        let unban = admitted(dedup.admit(&op(UNBAN_USER, json!({"user_id": "1"}))).unwrap());
        assert!(matches!(
            dedup.admit(&op(BAN_USER, json!({"user_id": "1"}))).unwrap(),
            Admission::Conflict(_)
        ));
        // Different user, no conflict.
        assert!(matches!(
            dedup.admit(&op(BAN_USER, json!({"user_id": "2"}))).unwrap(),
            Admission::Admitted(_)
        ));
        drop(unban);
    }

    #[tokio::test]
    async fn completion_invalidates_conflicting_cached_result() {
        let dedup = Deduplicator::new(&config());
        admitted(dedup.admit(&op(BAN_USER, json!({"user_id": "1"}))).unwrap()).complete(ok_result());
        admitted(dedup.admit(&op(UNBAN_USER, json!({"user_id": "1"}))).unwrap()).complete(ok_result());

        assert!(matches!(
            dedup.admit(&op(BAN_USER, json!({"user_id": "1"}))).unwrap(),
            Admission::Admitted(_)
        ));
    }

    #[tokio::test]
    async fn guilds_do_not_collide() {
        let dedup = Deduplicator::new(&config());
        let _a = admitted(dedup.admit(&op(BAN_USER, json!({"user_id": "1"}))).unwrap());
        let mut other_guild = op(BAN_USER, json!({"user_id": "1"}));
        other_guild.guild_id = Some("g2".into());
        assert!(matches!(dedup.admit(&other_guild).unwrap(), Admission::Admitted(_)));
    }

    #[tokio::test]
    async fn global_operations_only_dedupe_identical_payloads() {
        let dedup = Deduplicator::new(&config());
        let _a = admitted(dedup.admit(&op(PRUNE_MEMBERS, json!({"days": 7}))).unwrap());
        assert!(matches!(
            dedup.admit(&op(PRUNE_MEMBERS, json!({"days": 30}))).unwrap(),
            Admission::Admitted(_)
        ));
        assert!(matches!(
            dedup.admit(&op(PRUNE_MEMBERS, json!({"days": 7}))).unwrap(),
            Admission::AwaitExisting(_)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn capacity_error_when_sweep_reclaims_nothing() {
        let dedup = Deduplicator::new(&config());
        let _held: Vec<Ticket> = (0..3)
            .map(|i| admitted(dedup.admit(&op(KICK_USER, json!({"user_id": i}))).unwrap()))
            .collect();
        let err = dedup.admit(&op(KICK_USER, json!({"user_id": 99}))).unwrap_err();
        assert!(matches!(err, GavelError::Capacity { limit: 3 }));
    }

    #[tokio::test(start_paused = true)]
    async fn capacity_recovers_after_stale_entries_age_out() {
        let dedup = Deduplicator::new(&config());
        let _held: Vec<Ticket> = (0..3)
            .map(|i| admitted(dedup.admit(&op(KICK_USER, json!({"user_id": i}))).unwrap()))
            .collect();
        tokio::time::advance(Duration::from_secs(121)).await;
        assert!(matches!(
            dedup.admit(&op(KICK_USER, json!({"user_id": 99}))).unwrap(),
            Admission::Admitted(_)
        ));
        assert_eq!(dedup.in_flight_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cached_results_expire_after_ttl() {
        let dedup = Deduplicator::new(&config());
        admitted(dedup.admit(&op(BAN_USER, json!({"user_id": "1"}))).unwrap()).complete(ok_result());
        tokio::time::advance(Duration::from_secs(299)).await;
        assert!(matches!(
            dedup.admit(&op(BAN_USER, json!({"user_id": "1"}))).unwrap(),
            Admission::Duplicate(_)
        ));

        tokio::time::advance(Duration::from_secs(2)).await;
        let report = dedup.sweep();
        assert_eq!(report.expired_results, 1);
        assert!(matches!(
            dedup.admit(&op(BAN_USER, json!({"user_id": "1"}))).unwrap(),
            Admission::Admitted(_)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn reclaimed_ticket_cannot_settle_newer_entry() {
        let dedup = Deduplicator::new(&config());
        let old = admitted(dedup.admit(&op(KICK_USER, json!({"user_id": "1"}))).unwrap());
        tokio::time::advance(Duration::from_secs(121)).await;
        let fresh = admitted(dedup.admit(&op(KICK_USER, json!({"user_id": "1"}))).unwrap());

        old.complete(ok_result());
        assert_eq!(dedup.in_flight_count(), 1);
        assert_eq!(dedup.cache_size(), 0);
        fresh.complete(ok_result());
        assert_eq!(dedup.cache_size(), 1);
    }

    #[tokio::test]
    async fn shutdown_rejects_waiters_and_admissions() {
        let dedup = Deduplicator::new(&config());
        let ticket = admitted(dedup.admit(&op(KICK_USER, json!({"user_id": "1"}))).unwrap());
        let Admission::AwaitExisting(wait) = dedup
            .admit(&op(KICK_USER, json!({"user_id": "1"})))
            .unwrap()
        else {
            panic!("expected await");
        };

        assert_eq!(dedup.shutdown(), 1);
        assert_eq!(wait.settled().await, Settlement::ShuttingDown);
        assert!(matches!(
            dedup.admit(&op(KICK_USER, json!({"user_id": "2"}))),
            Err(GavelError::ShuttingDown)
        ));
        // Settling after shutdown is a no-op.
        ticket.complete(ok_result());
        assert_eq!(dedup.cache_size(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_task_stops_on_cancel() {
        let dedup = Deduplicator::new(&config());
        let cancel = CancellationToken::new();
        let handle = dedup.spawn_sweeper(cancel.clone());
        let _t = admitted(dedup.admit(&op(KICK_USER, json!({"user_id": "1"}))).unwrap());

        tokio::time::sleep(Duration::from_secs(181)).await;
        assert_eq!(dedup.in_flight_count(), 0);

        cancel.cancel();
        handle.await.unwrap();
    }
}
