// SPDX-FileCopyrightText: 2026 Gavel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Collaborator traits consumed by the engine.
//!
//! All collaborators extend the [`PluginAdapter`] base trait and use
//! `#[async_trait]` so they can be held as trait objects.

pub mod adapter;
pub mod audit;
pub mod dead_letter;
pub mod executor;
pub mod queue;

pub use adapter::PluginAdapter;
pub use audit::AuditSink;
pub use dead_letter::DeadLetterStore;
pub use executor::RealtimeExecutor;
pub use queue::JobQueue;
