// SPDX-FileCopyrightText: 2026 Gavel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistence sink for batched audit entries.

use async_trait::async_trait;

use crate::error::GavelError;
use crate::traits::adapter::PluginAdapter;
use crate::types::AuditEntry;

#[async_trait]
pub trait AuditSink: PluginAdapter {
    /// Write all entries in one bulk operation. Either all are written or none.
    async fn bulk_insert(&self, entries: &[AuditEntry]) -> Result<usize, GavelError>;
}
