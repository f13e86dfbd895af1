//! Durable operation log entries (spec §3 "Transaction operation", §4.9
//! "Durable workflows add a log").

use chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OperationType {
    Insert,
    Update,
    Delete,
    ApiCall,
    Custom(String),
}

impl std::fmt::Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationType::Insert => write!(f, "insert"),
            OperationType::Update => write!(f, "update"),
            OperationType::Delete => write!(f, "delete"),
            OperationType::ApiCall => write!(f, "api_call"),
            OperationType::Custom(name) => write!(f, "{name}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationStatus {
    Pending,
    Committed,
    Undone,
    Failed,
}

/// One attempted side-effectful operation, appended *before* its effect is
/// attempted — the log is the source of truth for recovery (spec §4.9).
#[derive(Debug, Clone)]
pub struct OperationRecord {
    pub workflow_id: Uuid,
    /// Monotone and dense per workflow (spec §3).
    pub operation_index: u32,
    pub operation_type: OperationType,
    pub resource_type: String,
    pub resource_id: String,
    pub operation_data: Option<serde_json::Value>,
    pub undo_data: Option<serde_json::Value>,
    pub status: OperationStatus,
    /// Set when `status` is `Failed`.
    pub failure_reason: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl OperationRecord {
    pub fn new(
        workflow_id: Uuid,
        operation_index: u32,
        operation_type: OperationType,
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
        operation_data: Option<serde_json::Value>,
        undo_data: Option<serde_json::Value>,
    ) -> Self {
        Self {
            workflow_id,
            operation_index,
            operation_type,
            resource_type: resource_type.into(),
            resource_id: resource_id.into(),
            operation_data,
            undo_data,
            status: OperationStatus::Pending,
            failure_reason: None,
            recorded_at: Utc::now(),
        }
    }
}
