// SPDX-FileCopyrightText: 2026 Gavel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Base trait shared by every engine collaborator.

use async_trait::async_trait;

use crate::error::GavelError;
use crate::types::{AdapterType, HealthStatus};

/// Identity, lifecycle and health of a collaborator (executor, queue, sink, ...).
#[async_trait]
pub trait PluginAdapter: Send + Sync + 'static {
    /// Human-readable name of this collaborator instance.
    fn name(&self) -> &str;

    /// Semantic version of the implementation.
    fn version(&self) -> semver::Version;

    fn adapter_type(&self) -> AdapterType;

    /// Current health of the collaborator.
    async fn health_check(&self) -> Result<HealthStatus, GavelError>;

    /// Release held resources. Called once, after the engine stopped using it.
    async fn shutdown(&self) -> Result<(), GavelError>;
}
