// SPDX-FileCopyrightText: 2026 Gavel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error taxonomy shared by every Gavel crate.

use std::time::Duration;

use thiserror::Error;

/// The primary error type used across the engine, its collaborators and storage.
#[derive(Debug, Error)]
pub enum GavelError {
    /// Malformed request, rejected before admission.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// A semantically incompatible operation is already in flight on the same resource.
    #[error("conflict: {requested} rejected while {in_flight} is in flight for {resource}")]
    Conflict {
        requested: String,
        in_flight: String,
        resource: String,
    },

    /// Too many in-flight operations; the caller may retry later.
    #[error("capacity exceeded: {limit} operations already in flight")]
    Capacity { limit: usize },

    /// A realtime call or an awaited in-flight operation exceeded its deadline.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    /// Processor or executor failure on a single item.
    #[error("execution error: {message}")]
    Execution {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A durable job used up its retry budget and was routed to the dead-letter queue.
    #[error("job {job_id} exhausted {attempts} attempts: {last_error}")]
    ExhaustedRetries {
        job_id: String,
        attempts: u32,
        last_error: String,
    },

    /// The engine is shutting down and no longer accepts or completes work.
    #[error("system shutting down")]
    ShuttingDown,

    /// Storage backend errors (connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Durable queue backend errors that are not storage failures (unknown job, bad state).
    #[error("queue error: {0}")]
    Queue(String),

    /// Configuration errors.
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl GavelError {
    /// Shorthand for a [`GavelError::Validation`].
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Shorthand for a [`GavelError::Execution`] without an underlying source.
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution {
            message: message.into(),
            source: None,
        }
    }

    /// Whether a caller could reasonably try the same request again later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GavelError::Capacity { .. }
                | GavelError::Timeout { .. }
                | GavelError::Execution { .. }
                | GavelError::Storage { .. }
                | GavelError::Queue(_)
        )
    }

    /// Stable machine-readable code, used in bulk summaries and logs.
    pub fn code(&self) -> &'static str {
        match self {
            GavelError::Validation { .. } => "validation",
            GavelError::Conflict { .. } => "conflict",
            GavelError::Capacity { .. } => "capacity",
            GavelError::Timeout { .. } => "timeout",
            GavelError::Execution { .. } => "execution",
            GavelError::ExhaustedRetries { .. } => "exhausted_retries",
            GavelError::ShuttingDown => "shutting_down",
            GavelError::Storage { .. } => "storage",
            GavelError::Queue(_) => "queue",
            GavelError::Config(_) => "config",
            GavelError::Internal(_) => "internal",
        }
    }
}

impl From<serde_json::Error> for GavelError {
    fn from(err: serde_json::Error) -> Self {
        GavelError::Storage {
            source: Box::new(err),
        }
    }
}
