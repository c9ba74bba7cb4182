// SPDX-FileCopyrightText: 2026 Gavel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared by the engine, its collaborators and storage backends.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumString};

use crate::error::GavelError;

/// Opaque operation payload as received from callers.
pub type Payload = serde_json::Map<String, Value>;

/// Timestamp format used for persisted and displayed timestamps.
///
/// Fixed width so that lexicographic order equals chronological order.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Format a UTC timestamp with [`TIMESTAMP_FORMAT`].
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Where a submitted operation came from.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OperationSource {
    #[default]
    Api,
    Internal,
    Scheduled,
}

/// Execution path assigned to an operation type.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Lane {
    /// Executed synchronously over the live connection.
    Realtime,
    /// Persisted as a queue job and executed by the worker pool.
    Durable,
    /// Realtime first, durable on failure or timeout.
    Hybrid,
}

/// How an [`OperationResult`] was produced.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMethod {
    Realtime,
    Durable,
    Hybrid,
}

impl From<Lane> for ExecutionMethod {
    fn from(lane: Lane) -> Self {
        match lane {
            Lane::Realtime => ExecutionMethod::Realtime,
            Lane::Durable => ExecutionMethod::Durable,
            Lane::Hybrid => ExecutionMethod::Hybrid,
        }
    }
}

/// The resource an operation acts on, used to scope deduplication and conflicts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ResourceKey {
    User(String),
    Channel(String),
    Message(String),
    Role(String),
    /// No identifier could be extracted from the payload.
    Global,
}

/// Payload fields inspected for a resource identifier, highest priority first.
pub const RESOURCE_ID_FIELDS: &[&str] = &["user_id", "channel_id", "message_id", "role_id"];

impl ResourceKey {
    /// Derive the resource key from a canonical (snake_case) payload.
    ///
    /// Takes the first present identifier in [`RESOURCE_ID_FIELDS`] order.
    /// Numeric ids are accepted as well as strings; empty strings are ignored.
    pub fn derive(payload: &Payload) -> Self {
        for field in RESOURCE_ID_FIELDS {
            let id = match payload.get(*field) {
                Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
                Some(Value::Number(n)) => n.to_string(),
                _ => continue,
            };
            return match *field {
                "user_id" => ResourceKey::User(id),
                "channel_id" => ResourceKey::Channel(id),
                "message_id" => ResourceKey::Message(id),
                _ => ResourceKey::Role(id),
            };
        }
        ResourceKey::Global
    }

    /// Whether no identifier was found.
    pub fn is_global(&self) -> bool {
        matches!(self, ResourceKey::Global)
    }
}

impl std::fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKey::User(id) => write!(f, "user:{id}"),
            ResourceKey::Channel(id) => write!(f, "channel:{id}"),
            ResourceKey::Message(id) => write!(f, "message:{id}"),
            ResourceKey::Role(id) => write!(f, "role:{id}"),
            ResourceKey::Global => write!(f, "global"),
        }
    }
}

/// Stable hash of a payload, independent of map iteration order.
pub fn payload_fingerprint(payload: &Payload) -> u64 {
    let mut hasher = DefaultHasher::new();
    hash_object(payload, &mut hasher);
    hasher.finish()
}

fn hash_object(map: &Payload, hasher: &mut DefaultHasher) {
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();
    keys.len().hash(hasher);
    for key in keys {
        key.hash(hasher);
        hash_value(&map[key.as_str()], hasher);
    }
}

fn hash_value(value: &Value, hasher: &mut DefaultHasher) {
    match value {
        Value::Null => 0u8.hash(hasher),
        Value::Bool(b) => {
            1u8.hash(hasher);
            b.hash(hasher);
        }
        Value::Number(n) => {
            2u8.hash(hasher);
            n.to_string().hash(hasher);
        }
        Value::String(s) => {
            3u8.hash(hasher);
            s.hash(hasher);
        }
        Value::Array(items) => {
            4u8.hash(hasher);
            items.len().hash(hasher);
            for item in items {
                hash_value(item, hasher);
            }
        }
        Value::Object(map) => {
            5u8.hash(hasher);
            hash_object(map, hasher);
        }
    }
}

/// Canonical operation produced by the request normalizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub id: String,
    #[serde(rename = "type")]
    pub op_type: String,
    pub resource_key: ResourceKey,
    pub payload: Payload,
    pub source: OperationSource,
    pub guild_id: Option<String>,
    pub requested_at: DateTime<Utc>,
}

impl Operation {
    /// Build an operation, deriving its resource key from the payload.
    pub fn new(
        op_type: impl Into<String>,
        payload: Payload,
        source: OperationSource,
        guild_id: Option<String>,
    ) -> Self {
        let resource_key = ResourceKey::derive(&payload);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            op_type: op_type.into(),
            resource_key,
            payload,
            source,
            guild_id,
            requested_at: Utc::now(),
        }
    }

    /// Fingerprint of the payload, see [`payload_fingerprint`].
    pub fn fingerprint(&self) -> u64 {
        payload_fingerprint(&self.payload)
    }

    /// Identifier of the acted-on entity, if any, for audit records.
    pub fn target(&self) -> Option<String> {
        match &self.resource_key {
            ResourceKey::Global => None,
            key => Some(key.to_string()),
        }
    }
}

/// Outcome of a dispatched operation, reusable within the dedup cache TTL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationResult {
    pub success: bool,
    pub method: ExecutionMethod,
    pub job_id: Option<String>,
    pub execution_time_ms: u64,
    pub error: Option<String>,
    pub data: Option<Value>,
    pub completed_at: DateTime<Utc>,
}

impl OperationResult {
    /// A completed live-connection execution.
    pub fn executed(method: ExecutionMethod, data: Value, execution_time_ms: u64) -> Self {
        Self {
            success: true,
            method,
            job_id: None,
            execution_time_ms,
            error: None,
            data: Some(data),
            completed_at: Utc::now(),
        }
    }

    /// An accepted durable job. The action has not necessarily happened yet.
    pub fn accepted(method: ExecutionMethod, job_id: String, execution_time_ms: u64) -> Self {
        Self {
            success: true,
            method,
            job_id: Some(job_id),
            execution_time_ms,
            error: None,
            data: None,
            completed_at: Utc::now(),
        }
    }

    /// A terminal failure.
    pub fn failed(method: ExecutionMethod, error: &GavelError, execution_time_ms: u64) -> Self {
        Self {
            success: false,
            method,
            job_id: None,
            execution_time_ms,
            error: Some(error.to_string()),
            data: None,
            completed_at: Utc::now(),
        }
    }
}

/// Lifecycle status of a durable queue job.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Active,
    Completed,
    Failed,
}

/// A persisted durable job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueJob {
    pub id: String,
    pub job_type: String,
    pub payload: Value,
    pub attempts: u32,
    pub max_attempts: u32,
    pub status: JobStatus,
    pub enqueued_at: DateTime<Utc>,
    /// Earliest time the job may be picked up (backoff).
    pub run_after: DateTime<Utc>,
    pub last_error: Option<String>,
}

impl QueueJob {
    /// Whether the retry budget is used up.
    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }

    /// Decode the operation this job was enqueued for.
    pub fn operation(&self) -> Result<Operation, GavelError> {
        serde_json::from_value(self.payload.clone()).map_err(|e| GavelError::Execution {
            message: format!("job {} carries an undecodable operation", self.id),
            source: Some(Box::new(e)),
        })
    }
}

/// A job to be enqueued.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub job_type: String,
    pub payload: Value,
    pub max_attempts: u32,
    /// Delay the first pickup until this time.
    pub run_after: Option<DateTime<Utc>>,
}

impl NewJob {
    /// Build a job carrying the serialized operation.
    pub fn for_operation(operation: &Operation, max_attempts: u32) -> Result<Self, GavelError> {
        Ok(Self {
            job_type: operation.op_type.clone(),
            payload: serde_json::to_value(operation)?,
            max_attempts: max_attempts.max(1),
            run_after: None,
        })
    }
}

/// Selects which job types a dequeue may return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobFilter {
    /// Any pending job.
    Any,
    /// Only jobs whose type is listed.
    Only(Vec<String>),
    /// Any job whose type is not listed.
    Except(Vec<String>),
}

impl JobFilter {
    /// Whether a job type passes the filter.
    pub fn matches(&self, job_type: &str) -> bool {
        match self {
            JobFilter::Any => true,
            JobFilter::Only(types) => types.iter().any(|t| t == job_type),
            JobFilter::Except(types) => !types.iter().any(|t| t == job_type),
        }
    }
}

/// What a queue backend did with a failed job.
#[derive(Debug, Clone, PartialEq)]
pub enum FailOutcome {
    /// Back to pending, eligible again at `run_after`.
    Retrying {
        attempts: u32,
        run_after: DateTime<Utc>,
    },
    /// `attempts` reached `max_attempts`; the job is now `failed`.
    Exhausted(QueueJob),
}

/// A job quarantined after exhausting its retry budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    pub job: QueueJob,
    pub last_error: String,
    pub quarantined_at: DateTime<Utc>,
    pub released: bool,
}

/// A moderation/audit log record, buffered in memory until a batch flush.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: String,
    pub guild_id: Option<String>,
    pub action: String,
    pub target: Option<String>,
    pub source: OperationSource,
    pub success: bool,
    pub error: Option<String>,
    pub detail: Value,
    pub created_at: String,
}

impl AuditEntry {
    /// Create an audit record for an action taken on behalf of an operation.
    pub fn for_operation(
        operation: &Operation,
        action: &str,
        target: Option<String>,
        outcome: Result<&Value, &GavelError>,
    ) -> Self {
        let (success, error, detail) = match outcome {
            Ok(data) => (true, None, data.clone()),
            Err(e) => (false, Some(e.to_string()), Value::Null),
        };
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            guild_id: operation.guild_id.clone(),
            action: action.to_string(),
            target,
            source: operation.source,
            success,
            error,
            detail,
            created_at: format_timestamp(&Utc::now()),
        }
    }
}

/// Health status reported by collaborator health checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    /// Fully operational.
    Healthy,
    /// Operational but experiencing issues.
    Degraded(String),
    /// Not operational.
    Unhealthy(String),
}

/// Identifies the kind of collaborator behind a trait object.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Executor,
    Queue,
    DeadLetterStore,
    AuditSink,
    Observability,
}
