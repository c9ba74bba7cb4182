// SPDX-FileCopyrightText: 2026 Gavel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Operation dispatch, deduplication and queue processing for Gavel.
//!
//! Requests flow through the [`RequestNormalizer`], the
//! [`OperationClassifier`] and the [`Deduplicator`] before the
//! [`Dispatcher`] runs them on the live connection or persists them as
//! durable jobs. The [`WorkerPool`] drains the durable queue, quarantining
//! exhausted jobs in the [`DeadLetterQueue`]. Audit records go through the
//! [`BatchWriteBuffer`]. [`OperationEngine`] ties the pieces together.

pub mod batch;
pub mod classifier;
pub mod conflicts;
pub mod dead_letter;
pub mod dedup;
pub mod dispatcher;
pub mod engine;
pub mod events;
pub mod normalizer;
pub mod processors;
pub mod shutdown;
mod telemetry;
pub mod worker;

pub use batch::BatchWriteBuffer;
pub use classifier::{LaneTable, OperationClassifier};
pub use conflicts::{CONFLICTING_TYPES, conflicts};
pub use dead_letter::DeadLetterQueue;
pub use dedup::{Admission, DedupKey, Deduplicator, Settlement, Ticket};
pub use dispatcher::Dispatcher;
pub use engine::{
    BulkSubmission, BulkSummary, CollaboratorHealth, EngineBuilder, EngineHealth, OperationEngine,
};
pub use events::{EngineEvent, EventBus};
pub use normalizer::{BulkItem, InboundRequest, RequestNormalizer, SubmitOptions};
pub use processors::{BulkOutcome, JobProcessor, ProcessorResult};
pub use worker::WorkerPool;
