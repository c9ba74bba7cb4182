// SPDX-FileCopyrightText: 2026 Gavel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Gavel integration tests.
//!
//! Provides mock collaborators and a harness that wires a complete engine
//! over in-memory storage, for fast deterministic tests.
//!
//! # Components
//!
//! - [`MockExecutor`] - Scripted live-connection executor with failure injection
//! - [`FlakyAuditSink`] - Audit sink that can be switched to fail
//! - [`TestHarness`] - Engine plus mocks, ready to submit operations

pub mod harness;
pub mod mock_executor;
pub mod mock_sink;

pub use harness::{TestHarness, TestHarnessBuilder, test_config};
pub use mock_executor::{MockExecutor, RecordedCall};
pub use mock_sink::FlakyAuditSink;
