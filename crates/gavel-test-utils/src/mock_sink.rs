// SPDX-FileCopyrightText: 2026 Gavel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Audit sink with switchable failure injection.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use gavel_core::{AdapterType, AuditEntry, AuditSink, GavelError, HealthStatus, PluginAdapter};

/// Records every successful bulk insert as one batch.
#[derive(Default)]
pub struct FlakyAuditSink {
    batches: Mutex<Vec<Vec<AuditEntry>>>,
    failing: AtomicBool,
}

impl FlakyAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent inserts fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn batches(&self) -> Vec<Vec<AuditEntry>> {
        self.batches.lock().clone()
    }

    /// Every written entry, in write order.
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.batches.lock().iter().flatten().cloned().collect()
    }
}

#[async_trait]
impl PluginAdapter for FlakyAuditSink {
    fn name(&self) -> &str {
        "flaky-audit-sink"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::AuditSink
    }

    async fn health_check(&self) -> Result<HealthStatus, GavelError> {
        if self.failing.load(Ordering::SeqCst) {
            Ok(HealthStatus::Degraded("inserts failing".into()))
        } else {
            Ok(HealthStatus::Healthy)
        }
    }

    async fn shutdown(&self) -> Result<(), GavelError> {
        Ok(())
    }
}

#[async_trait]
impl AuditSink for FlakyAuditSink {
    async fn bulk_insert(&self, entries: &[AuditEntry]) -> Result<usize, GavelError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(GavelError::Internal("audit sink unavailable".into()));
        }
        self.batches.lock().push(entries.to_vec());
        Ok(entries.len())
    }
}
