//! Durable workflow state store (spec §5 "Operation log / state store:
//! owned exclusively by persistence; all accesses via repository
//! contracts"). Grounded on the teacher's `WorkflowEventStore`/
//! `InMemoryWorkflowEventStore` pair: an async trait seam plus an
//! in-memory implementation used for tests, not a production store.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use thiserror::Error;
use uuid::Uuid;

use crate::operation::{OperationRecord, OperationStatus};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("workflow not found: {0}")]
    WorkflowNotFound(Uuid),
    #[error("operation {0} not found for workflow {1}")]
    OperationNotFound(u32, Uuid),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Workflow-state row status (spec §3 "Workflow state").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowRowStatus {
    Started,
    Committed,
    Failed,
    Undone,
}

#[derive(Debug, Clone)]
pub struct WorkflowRecord {
    pub workflow_id: Uuid,
    pub name: String,
    pub status: WorkflowRowStatus,
    pub failed_at_operation: Option<u32>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub retry_count: u32,
}

#[async_trait]
pub trait WorkflowStore: Send + Sync {
    async fn create_workflow(&self, workflow_id: Uuid, name: &str) -> Result<(), StoreError>;

    async fn get_workflow(&self, workflow_id: Uuid) -> Result<WorkflowRecord, StoreError>;

    async fn append_operation(&self, record: OperationRecord) -> Result<(), StoreError>;

    async fn update_operation_status(
        &self,
        workflow_id: Uuid,
        operation_index: u32,
        status: OperationStatus,
        failure_reason: Option<String>,
    ) -> Result<(), StoreError>;

    async fn list_operations(&self, workflow_id: Uuid) -> Result<Vec<OperationRecord>, StoreError>;

    async fn mark_committed(&self, workflow_id: Uuid) -> Result<(), StoreError>;

    async fn mark_failed(&self, workflow_id: Uuid, failed_at_operation: u32, error: &str) -> Result<(), StoreError>;

    async fn mark_undone(&self, workflow_id: Uuid) -> Result<(), StoreError>;

    async fn increment_retry_count(&self, workflow_id: Uuid) -> Result<u32, StoreError>;

    /// Workflows in `Failed` status whose retry counter is below
    /// `max_retries`, oldest first, capped at `batch_size` (spec §4.9
    /// "Background recovery job").
    async fn list_recoverable(&self, max_retries: u32, batch_size: usize) -> Result<Vec<WorkflowRecord>, StoreError>;
}

struct WorkflowEntry {
    record: WorkflowRecord,
    operations: Vec<OperationRecord>,
}

#[derive(Default)]
pub struct InMemoryWorkflowStore {
    workflows: RwLock<HashMap<Uuid, WorkflowEntry>>,
}

impl InMemoryWorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkflowStore for InMemoryWorkflowStore {
    async fn create_workflow(&self, workflow_id: Uuid, name: &str) -> Result<(), StoreError> {
        self.workflows.write().insert(
            workflow_id,
            WorkflowEntry {
                record: WorkflowRecord {
                    workflow_id,
                    name: name.to_string(),
                    status: WorkflowRowStatus::Started,
                    failed_at_operation: None,
                    error: None,
                    created_at: Utc::now(),
                    completed_at: None,
                    retry_count: 0,
                },
                operations: Vec::new(),
            },
        );
        Ok(())
    }

    async fn get_workflow(&self, workflow_id: Uuid) -> Result<WorkflowRecord, StoreError> {
        self.workflows
            .read()
            .get(&workflow_id)
            .map(|entry| entry.record.clone())
            .ok_or(StoreError::WorkflowNotFound(workflow_id))
    }

    async fn append_operation(&self, record: OperationRecord) -> Result<(), StoreError> {
        let mut workflows = self.workflows.write();
        let entry = workflows
            .get_mut(&record.workflow_id)
            .ok_or(StoreError::WorkflowNotFound(record.workflow_id))?;
        entry.operations.push(record);
        Ok(())
    }

    async fn update_operation_status(
        &self,
        workflow_id: Uuid,
        operation_index: u32,
        status: OperationStatus,
        failure_reason: Option<String>,
    ) -> Result<(), StoreError> {
        let mut workflows = self.workflows.write();
        let entry = workflows.get_mut(&workflow_id).ok_or(StoreError::WorkflowNotFound(workflow_id))?;
        let op = entry
            .operations
            .iter_mut()
            .find(|op| op.operation_index == operation_index)
            .ok_or(StoreError::OperationNotFound(operation_index, workflow_id))?;
        op.status = status;
        op.failure_reason = failure_reason;
        Ok(())
    }

    async fn list_operations(&self, workflow_id: Uuid) -> Result<Vec<OperationRecord>, StoreError> {
        self.workflows
            .read()
            .get(&workflow_id)
            .map(|entry| entry.operations.clone())
            .ok_or(StoreError::WorkflowNotFound(workflow_id))
    }

    async fn mark_committed(&self, workflow_id: Uuid) -> Result<(), StoreError> {
        let mut workflows = self.workflows.write();
        let entry = workflows.get_mut(&workflow_id).ok_or(StoreError::WorkflowNotFound(workflow_id))?;
        entry.record.status = WorkflowRowStatus::Committed;
        entry.record.completed_at = Some(Utc::now());
        for op in &mut entry.operations {
            op.status = OperationStatus::Committed;
        }
        Ok(())
    }

    async fn mark_failed(&self, workflow_id: Uuid, failed_at_operation: u32, error: &str) -> Result<(), StoreError> {
        let mut workflows = self.workflows.write();
        let entry = workflows.get_mut(&workflow_id).ok_or(StoreError::WorkflowNotFound(workflow_id))?;
        entry.record.status = WorkflowRowStatus::Failed;
        entry.record.failed_at_operation = Some(failed_at_operation);
        entry.record.error = Some(error.to_string());
        Ok(())
    }

    async fn mark_undone(&self, workflow_id: Uuid) -> Result<(), StoreError> {
        let mut workflows = self.workflows.write();
        let entry = workflows.get_mut(&workflow_id).ok_or(StoreError::WorkflowNotFound(workflow_id))?;
        entry.record.status = WorkflowRowStatus::Undone;
        entry.record.completed_at = Some(Utc::now());
        Ok(())
    }

    async fn increment_retry_count(&self, workflow_id: Uuid) -> Result<u32, StoreError> {
        let mut workflows = self.workflows.write();
        let entry = workflows.get_mut(&workflow_id).ok_or(StoreError::WorkflowNotFound(workflow_id))?;
        entry.record.retry_count += 1;
        Ok(entry.record.retry_count)
    }

    async fn list_recoverable(&self, max_retries: u32, batch_size: usize) -> Result<Vec<WorkflowRecord>, StoreError> {
        let workflows = self.workflows.read();
        let mut candidates: Vec<WorkflowRecord> = workflows
            .values()
            .filter(|entry| entry.record.status == WorkflowRowStatus::Failed && entry.record.retry_count < max_retries)
            .map(|entry| entry.record.clone())
            .collect();
        candidates.sort_by_key(|record| record.created_at);
        candidates.truncate(batch_size);
        Ok(candidates)
    }
}
