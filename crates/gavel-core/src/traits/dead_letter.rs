// SPDX-FileCopyrightText: 2026 Gavel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage for quarantined jobs.

use async_trait::async_trait;

use crate::error::GavelError;
use crate::traits::adapter::PluginAdapter;
use crate::types::DeadLetterEntry;

/// Keeps one dead-letter entry per job until it is purged.
#[async_trait]
pub trait DeadLetterStore: PluginAdapter {
    /// Store an entry, replacing any previous entry for the same job.
    async fn quarantine(&self, entry: DeadLetterEntry) -> Result<(), GavelError>;

    /// Entries ordered by quarantine time, oldest first.
    async fn list(&self, include_released: bool) -> Result<Vec<DeadLetterEntry>, GavelError>;

    /// Mark the entry for `job_id` released. Returns false if there is no unreleased entry.
    async fn mark_released(&self, job_id: &str) -> Result<bool, GavelError>;

    /// Delete every entry, returning how many were removed.
    async fn purge(&self) -> Result<u64, GavelError>;

    /// Number of unreleased entries.
    async fn count(&self) -> Result<u64, GavelError>;
}
