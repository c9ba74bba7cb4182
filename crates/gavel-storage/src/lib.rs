// SPDX-FileCopyrightText: 2026 Gavel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistence layer for the Gavel engine.
//!
//! [`SqliteStorage`] keeps the durable job queue, dead-letter entries and the
//! audit log in one WAL-mode SQLite file behind a single `tokio-rusqlite`
//! writer. [`MemoryStorage`] implements the same traits without persistence.

pub mod adapter;
pub mod database;
pub mod memory;
pub mod queries;

pub use adapter::SqliteStorage;
pub use database::Database;
pub use memory::MemoryStorage;
