// SPDX-FileCopyrightText: 2026 Gavel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Turns heterogeneous inbound requests into canonical [`Operation`]s.
//!
//! Pure: no I/O, no clock other than the request timestamp.

use serde::Deserialize;
use serde_json::Value;

use gavel_core::ops::*;
use gavel_core::{GavelError, Operation, OperationSource, Payload};

/// Caller-supplied context for a submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SubmitOptions {
    #[serde(default, alias = "guildId")]
    pub guild_id: Option<String>,
    #[serde(default)]
    pub source: OperationSource,
}

impl SubmitOptions {
    pub fn api(guild_id: impl Into<String>) -> Self {
        Self {
            guild_id: Some(guild_id.into()),
            source: OperationSource::Api,
        }
    }
}

/// One entry of a bulk HTTP submission.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BulkItem {
    pub operation: String,
    #[serde(default)]
    pub data: Value,
}

impl BulkItem {
    pub fn new(operation: impl Into<String>, data: Value) -> Self {
        Self {
            operation: operation.into(),
            data,
        }
    }
}

/// Every inbound shape the engine accepts.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundRequest {
    /// A single HTTP or slash-command request.
    Single {
        op_type: String,
        payload: Value,
        options: SubmitOptions,
    },
    /// One item of a bulk submission, sharing the batch options.
    BulkItem {
        item: BulkItem,
        options: SubmitOptions,
    },
    /// An internal scheduled trigger. Always sourced `scheduled`.
    Scheduled {
        trigger: String,
        payload: Value,
        guild_id: Option<String>,
    },
}

/// camelCase spellings accepted for canonical snake_case payload fields.
const FIELD_ALIASES: &[(&str, &str)] = &[
    ("userId", "user_id"),
    ("targetUserId", "user_id"),
    ("target_user_id", "user_id"),
    ("channelId", "channel_id"),
    ("messageId", "message_id"),
    ("roleId", "role_id"),
    ("guildId", "guild_id"),
    ("userIds", "user_ids"),
    ("messageIds", "message_ids"),
    ("durationSecs", "duration_secs"),
];

/// Payload fields an operation type cannot run without.
const REQUIRED_FIELDS: &[(&str, &[&str])] = &[
    (BAN_USER, &["user_id"]),
    (UNBAN_USER, &["user_id"]),
    (KICK_USER, &["user_id"]),
    (TIMEOUT_USER, &["user_id", "duration_secs"]),
    (UNTIMEOUT_USER, &["user_id"]),
    (ADD_ROLE, &["user_id", "role_id"]),
    (REMOVE_ROLE, &["user_id", "role_id"]),
    (SEND_MESSAGE, &["channel_id", "content"]),
    (EDIT_MESSAGE, &["message_id", "content"]),
    (DELETE_MESSAGE, &["message_id"]),
    (PIN_MESSAGE, &["message_id"]),
    (UNPIN_MESSAGE, &["message_id"]),
    (ADD_REACTION, &["message_id", "emoji"]),
    (REMOVE_REACTION, &["message_id", "emoji"]),
    (CREATE_CHANNEL, &["name"]),
    (UPDATE_CHANNEL, &["channel_id"]),
    (DELETE_CHANNEL, &["channel_id"]),
    (LOCK_CHANNEL, &["channel_id"]),
    (UNLOCK_CHANNEL, &["channel_id"]),
    (SET_SLOWMODE, &["channel_id", "seconds"]),
    (BULK_BAN, &["user_ids"]),
    (BULK_KICK, &["user_ids"]),
    (BULK_TIMEOUT, &["user_ids", "duration_secs"]),
    (BULK_DELETE_MESSAGES, &["channel_id", "message_ids"]),
    (SEND_ANNOUNCEMENT, &["channel_id", "content"]),
];

/// Required payload fields for `op_type`; empty for unknown types.
pub fn required_fields(op_type: &str) -> &'static [&'static str] {
    REQUIRED_FIELDS
        .iter()
        .find(|(t, _)| *t == op_type)
        .map(|(_, fields)| *fields)
        .unwrap_or(&[])
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RequestNormalizer;

impl RequestNormalizer {
    pub fn new() -> Self {
        Self
    }

    /// Normalize any inbound shape into an [`Operation`].
    pub fn normalize(&self, request: InboundRequest) -> Result<Operation, GavelError> {
        match request {
            InboundRequest::Single {
                op_type,
                payload,
                options,
            } => self.build(&op_type, payload, options.guild_id, options.source),
            InboundRequest::BulkItem { item, options } => {
                self.build(&item.operation, item.data, options.guild_id, options.source)
            }
            InboundRequest::Scheduled {
                trigger,
                payload,
                guild_id,
            } => self.build(&trigger, payload, guild_id, OperationSource::Scheduled),
        }
    }

    fn build(
        &self,
        op_type: &str,
        payload: Value,
        guild_id: Option<String>,
        source: OperationSource,
    ) -> Result<Operation, GavelError> {
        let op_type = canonical_type(op_type)?;
        let mut payload = match payload {
            Value::Object(map) => map,
            Value::Null => Payload::new(),
            other => {
                return Err(GavelError::validation(format!(
                    "{op_type}: payload must be an object, got {}",
                    json_kind(&other)
                )));
            }
        };
        canonicalize_fields(&mut payload);

        let missing: Vec<&str> = required_fields(&op_type)
            .iter()
            .copied()
            .filter(|field| !is_present(payload.get(*field)))
            .collect();
        if !missing.is_empty() {
            return Err(GavelError::validation(format!(
                "{op_type}: missing required field(s): {}",
                missing.join(", ")
            )));
        }

        // Explicit options win over a guild id carried in the payload.
        let guild_id = guild_id
            .filter(|g| !g.trim().is_empty())
            .or_else(|| match payload.get("guild_id") {
                Some(Value::String(g)) if !g.trim().is_empty() => Some(g.clone()),
                Some(Value::Number(n)) => Some(n.to_string()),
                _ => None,
            });

        Ok(Operation::new(op_type, payload, source, guild_id))
    }
}

fn canonical_type(op_type: &str) -> Result<String, GavelError> {
    let trimmed = op_type.trim();
    if trimmed.is_empty() {
        return Err(GavelError::validation("operation type is required"));
    }
    if !trimmed
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(GavelError::validation(format!(
            "operation type `{trimmed}` contains invalid characters"
        )));
    }
    Ok(type_name(trimmed))
}

/// Canonical spelling of an operation type: trimmed, `-` as `_`, uppercase.
pub(crate) fn type_name(op_type: &str) -> String {
    op_type.trim().replace('-', "_").to_ascii_uppercase()
}

/// Rewrite alias keys to their canonical names. A canonical key already present wins.
fn canonicalize_fields(payload: &mut Payload) {
    for (alias, canonical) in FIELD_ALIASES {
        if let Some(value) = payload.remove(*alias)
            && !payload.contains_key(*canonical)
        {
            payload.insert((*canonical).to_string(), value);
        }
    }
}

fn is_present(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(Value::Array(items)) => !items.is_empty(),
        Some(_) => true,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
