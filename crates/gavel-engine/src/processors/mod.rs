// SPDX-FileCopyrightText: 2026 Gavel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable job handlers run by the worker pool.

pub mod bulk;
pub mod direct;

use async_trait::async_trait;
use serde_json::Value;

use gavel_core::{GavelError, QueueJob};

pub use bulk::{BULK_SPECS, BulkItemError, BulkOutcome, BulkProcessor, BulkSpec};
pub use direct::DirectProcessor;

/// What a processor made of one job.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessorResult {
    pub success: bool,
    pub data: Option<Value>,
    pub error: Option<String>,
}

impl ProcessorResult {
    pub fn succeeded(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// A handled failure. The job is retried like an error return.
    pub fn failed(error: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            success: false,
            data,
            error: Some(error.into()),
        }
    }
}

/// Handler for one or more durable job types.
#[async_trait]
pub trait JobProcessor: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Job types routed to this processor.
    fn job_types(&self) -> Vec<String>;

    /// Process one claimed job. An `Err` or an unsuccessful result counts
    /// as a failed attempt.
    async fn process(&self, job: &QueueJob) -> Result<ProcessorResult, GavelError>;
}
