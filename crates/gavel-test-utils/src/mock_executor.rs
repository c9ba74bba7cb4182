// SPDX-FileCopyrightText: 2026 Gavel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock live-connection executor for deterministic testing.
//!
//! `MockExecutor` records every call and succeeds unless a failure was
//! scripted for the operation type (optionally narrowed to one target such
//! as `user:42`). Calls can be slowed down or held at a gate until the test
//! releases them.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::Semaphore;

use gavel_core::{
    AdapterType, GavelError, HealthStatus, Payload, PluginAdapter, RealtimeExecutor, ResourceKey,
};

/// One observed `execute` call.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub op_type: String,
    pub guild_id: Option<String>,
    pub target: Option<String>,
    pub payload: Payload,
}

/// Remaining scripted failures per `(op_type, target)`; `None` target matches any.
type FailureScript = HashMap<(String, Option<String>), u32>;

pub struct MockExecutor {
    calls: Mutex<Vec<RecordedCall>>,
    failures: Mutex<FailureScript>,
    delay: Mutex<Duration>,
    gate: Option<Arc<Semaphore>>,
}

impl Default for MockExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl MockExecutor {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
            delay: Mutex::new(Duration::ZERO),
            gate: None,
        }
    }

    /// An executor whose calls block until [`release`](Self::release) is called.
    pub fn gated() -> Self {
        Self {
            gate: Some(Arc::new(Semaphore::new(0))),
            ..Self::new()
        }
    }

    /// Let `n` held calls proceed.
    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    /// Fail the next `times` calls of `op_type`, on `target` only if given.
    pub fn fail_times(&self, op_type: &str, target: Option<&str>, times: u32) {
        self.failures
            .lock()
            .insert((op_type.to_string(), target.map(str::to_string)), times);
    }

    /// Fail every call of `op_type`, on `target` only if given.
    pub fn fail_always(&self, op_type: &str, target: Option<&str>) {
        self.fail_times(op_type, target, u32::MAX);
    }

    /// Drop every scripted failure.
    pub fn clear_failures(&self) {
        self.failures.lock().clear();
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self, op_type: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.op_type == op_type)
            .count()
    }

    /// Poll until at least `n` calls were recorded. Returns false after `timeout`.
    pub async fn wait_for_calls(&self, n: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if self.calls.lock().len() >= n {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        self.calls.lock().len() >= n
    }

    fn take_failure(&self, op_type: &str, target: Option<&str>) -> bool {
        let mut failures = self.failures.lock();
        let keys = [
            (op_type.to_string(), target.map(str::to_string)),
            (op_type.to_string(), None),
        ];
        for key in keys {
            if let Some(remaining) = failures.get_mut(&key)
                && *remaining > 0
            {
                if *remaining != u32::MAX {
                    *remaining -= 1;
                }
                return true;
            }
        }
        false
    }
}

#[async_trait]
impl PluginAdapter for MockExecutor {
    fn name(&self) -> &str {
        "mock-executor"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Executor
    }

    async fn health_check(&self) -> Result<HealthStatus, GavelError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), GavelError> {
        Ok(())
    }
}

#[async_trait]
impl RealtimeExecutor for MockExecutor {
    async fn execute(
        &self,
        op_type: &str,
        guild_id: Option<&str>,
        payload: &Payload,
    ) -> Result<Value, GavelError> {
        let target = match ResourceKey::derive(payload) {
            ResourceKey::Global => None,
            key => Some(key.to_string()),
        };
        self.calls.lock().push(RecordedCall {
            op_type: op_type.to_string(),
            guild_id: guild_id.map(str::to_string),
            target: target.clone(),
            payload: payload.clone(),
        });

        if let Some(gate) = &self.gate {
            let permit = gate
                .acquire()
                .await
                .map_err(|_| GavelError::Internal("executor gate closed".into()))?;
            permit.forget();
        }
        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.take_failure(op_type, target.as_deref()) {
            return Err(GavelError::execution(format!(
                "scripted failure for {op_type} on {}",
                target.as_deref().unwrap_or("global")
            )));
        }
        Ok(json!({"op_type": op_type, "target": target}))
    }
}
