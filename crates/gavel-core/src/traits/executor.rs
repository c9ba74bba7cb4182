// SPDX-FileCopyrightText: 2026 Gavel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Live-connection executor used by the realtime lane and by processors.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::GavelError;
use crate::traits::adapter::PluginAdapter;
use crate::types::Payload;

/// Performs a single action against the chat platform over a live connection.
///
/// Implementations own the platform client. The engine bounds every call with
/// its own deadline, so implementations need not time out themselves.
#[async_trait]
pub trait RealtimeExecutor: PluginAdapter {
    /// Execute `op_type` with a canonical payload, returning platform data.
    async fn execute(
        &self,
        op_type: &str,
        guild_id: Option<&str>,
        payload: &Payload,
    ) -> Result<Value, GavelError>;
}
