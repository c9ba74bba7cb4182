// SPDX-FileCopyrightText: 2026 Gavel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Gavel operation engine.
//!
//! This crate provides the error taxonomy, the canonical operation and job
//! types, and the collaborator traits (live-connection executor, durable
//! queue, dead-letter store, audit sink) the engine is written against.

pub mod error;
pub mod ops;
pub mod traits;
pub mod types;

pub use error::GavelError;
pub use types::{
    AdapterType, AuditEntry, DeadLetterEntry, ExecutionMethod, FailOutcome, HealthStatus,
    JobFilter, JobStatus, Lane, NewJob, Operation, OperationResult, OperationSource, Payload,
    QueueJob, ResourceKey,
};

pub use traits::{AuditSink, DeadLetterStore, JobQueue, PluginAdapter, RealtimeExecutor};
