// SPDX-FileCopyrightText: 2026 Gavel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end engine tests.
//!
//! `TestHarness` wires an [`OperationEngine`] to a [`MockExecutor`], an
//! in-memory queue and dead-letter store, and a [`FlakyAuditSink`].

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use gavel_config::GavelConfig;
use gavel_core::{GavelError, OperationResult};
use gavel_engine::{EngineBuilder, JobProcessor, OperationEngine, SubmitOptions};
use gavel_storage::MemoryStorage;

use crate::mock_executor::MockExecutor;
use crate::mock_sink::FlakyAuditSink;

/// Defaults tightened so retries, polling and pacing finish in milliseconds.
pub fn test_config() -> GavelConfig {
    let mut config = GavelConfig::default();
    config.dispatch.realtime_timeout_ms = 200;
    config.worker.poll_interval_ms = 10;
    config.worker.backoff_base_ms = 5;
    config.worker.backoff_max_ms = 20;
    config.worker.bulk_item_delay_ms = 1;
    config.worker.drain_timeout_secs = 5;
    config.dedup.await_timeout_secs = 5;
    config
}

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    config: GavelConfig,
    executor: MockExecutor,
    processors: Vec<Arc<dyn JobProcessor>>,
    start_workers: bool,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            config: test_config(),
            executor: MockExecutor::new(),
            processors: Vec::new(),
            start_workers: true,
        }
    }

    /// Adjust the configuration before the engine is built.
    pub fn configure(mut self, f: impl FnOnce(&mut GavelConfig)) -> Self {
        f(&mut self.config);
        self
    }

    pub fn with_executor(mut self, executor: MockExecutor) -> Self {
        self.executor = executor;
        self
    }

    pub fn with_processor(mut self, processor: Arc<dyn JobProcessor>) -> Self {
        self.processors.push(processor);
        self
    }

    /// Leave durable jobs in the queue for the test to inspect.
    pub fn without_workers(mut self) -> Self {
        self.start_workers = false;
        self
    }

    pub fn build(self) -> Result<TestHarness, GavelError> {
        let executor = Arc::new(self.executor);
        let storage = Arc::new(MemoryStorage::new());
        let sink = Arc::new(FlakyAuditSink::new());

        let mut builder = EngineBuilder::new(self.config)
            .executor(executor.clone())
            .queue(storage.clone())
            .dead_letter_store(storage.clone())
            .audit_sink(sink.clone());
        for processor in self.processors {
            builder = builder.processor(processor);
        }
        let engine = builder.build()?;
        if self.start_workers {
            engine.start();
        }

        Ok(TestHarness {
            engine: Arc::new(engine),
            executor,
            storage,
            sink,
        })
    }
}

/// A complete engine over mocks and in-memory storage.
pub struct TestHarness {
    pub engine: Arc<OperationEngine>,
    pub executor: Arc<MockExecutor>,
    pub storage: Arc<MemoryStorage>,
    pub sink: Arc<FlakyAuditSink>,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Default harness with workers running.
    pub fn new() -> Result<Self, GavelError> {
        Self::builder().build()
    }

    /// Submit in guild `g1` from the API.
    pub async fn submit(&self, op_type: &str, payload: Value) -> Result<OperationResult, GavelError> {
        self.engine
            .submit(op_type, payload, SubmitOptions::api("g1"))
            .await
    }

    /// Wait until the engine reports no queued or running jobs.
    pub async fn wait_for_idle_queue(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            match self.engine.health().await {
                Ok(health) if health.queue_depth.is_empty() => return true,
                _ => tokio::time::sleep(Duration::from_millis(10)).await,
            }
        }
        false
    }
}
