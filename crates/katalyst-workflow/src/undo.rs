//! Undo strategy registry and the engine that drives recovery (spec §4.9
//! "a recovery actor invokes the `UndoEngine` on the operation list in
//! reverse (LIFO) order").

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::operation::{OperationRecord, OperationStatus, OperationType};
use crate::store::{StoreError, WorkflowStore};

#[async_trait]
pub trait UndoStrategy: Send + Sync {
    async fn undo(&self, operation: &OperationRecord) -> Result<(), String>;
}

/// Resolves to success without doing anything. An operation type with no
/// registered strategy falls back to this so the remainder of the undo
/// continues (spec §4.9 "an unknown type resolves to a no-op strategy that
/// returns success").
struct NoopUndoStrategy;

#[async_trait]
impl UndoStrategy for NoopUndoStrategy {
    async fn undo(&self, _operation: &OperationRecord) -> Result<(), String> {
        Ok(())
    }
}

/// Selects an [`UndoStrategy`] by operation type and drives best-effort,
/// order-preserving undo across a workflow's operation log.
pub struct UndoEngine {
    strategies: HashMap<OperationType, Arc<dyn UndoStrategy>>,
}

impl Default for UndoEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl UndoEngine {
    pub fn new() -> Self {
        Self {
            strategies: HashMap::new(),
        }
    }

    pub fn register(&mut self, operation_type: OperationType, strategy: Arc<dyn UndoStrategy>) {
        self.strategies.insert(operation_type, strategy);
    }

    fn strategy_for(&self, operation_type: &OperationType) -> Arc<dyn UndoStrategy> {
        self.strategies
            .get(operation_type)
            .cloned()
            .unwrap_or_else(|| Arc::new(NoopUndoStrategy))
    }

    /// Undoes every operation of `workflow_id` in reverse (LIFO) order.
    /// Each operation's success/failure is independent: one failure is
    /// logged and recorded but never halts the remaining undos.
    pub async fn undo_workflow(
        &self,
        store: &dyn WorkflowStore,
        workflow_id: uuid::Uuid,
    ) -> Result<UndoReport, StoreError> {
        let mut operations = store.list_operations(workflow_id).await?;
        operations.sort_by_key(|op| op.operation_index);

        let mut report = UndoReport::default();
        for operation in operations.iter().rev() {
            if operation.status != OperationStatus::Committed && operation.status != OperationStatus::Pending {
                continue;
            }
            let strategy = self.strategy_for(&operation.operation_type);
            match strategy.undo(operation).await {
                Ok(()) => {
                    store
                        .update_operation_status(workflow_id, operation.operation_index, OperationStatus::Undone, None)
                        .await?;
                    report.undone += 1;
                }
                Err(reason) => {
                    warn!(
                        workflow_id = %workflow_id,
                        operation_index = operation.operation_index,
                        reason = %reason,
                        "undo failed for operation"
                    );
                    store
                        .update_operation_status(
                            workflow_id,
                            operation.operation_index,
                            OperationStatus::Failed,
                            Some(reason.clone()),
                        )
                        .await?;
                    report.failed += 1;
                    report.errors.push(reason);
                }
            }
        }

        store.mark_undone(workflow_id).await?;
        Ok(report)
    }
}

#[derive(Debug, Default)]
pub struct UndoReport {
    pub undone: u32,
    pub failed: u32,
    pub errors: Vec<String>,
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;
    use uuid::Uuid;

    use super::*;
    use crate::operation::OperationRecord;
    use crate::store::InMemoryWorkflowStore;

    struct FailingUndo;

    #[async_trait]
    impl UndoStrategy for FailingUndo {
        async fn undo(&self, _operation: &OperationRecord) -> Result<(), String> {
            Err("downstream unavailable".to_string())
        }
    }

    #[tokio::test]
    async fn unknown_operation_type_falls_back_to_noop_and_continues() {
        let store = InMemoryWorkflowStore::new();
        let workflow_id = Uuid::now_v7();
        store.create_workflow(workflow_id, "wf").await.unwrap();
        store
            .append_operation(OperationRecord::new(
                workflow_id,
                0,
                OperationType::Custom("exotic".to_string()),
                "resource",
                "r1",
                Some(json!({})),
                None,
            ))
            .await
            .unwrap();

        let engine = UndoEngine::new();
        let report = engine.undo_workflow(&store, workflow_id).await.unwrap();
        assert_eq!(report.undone, 1);
        assert_eq!(report.failed, 0);
    }

    #[tokio::test]
    async fn one_failed_undo_does_not_stop_the_others() {
        let store = InMemoryWorkflowStore::new();
        let workflow_id = Uuid::now_v7();
        store.create_workflow(workflow_id, "wf").await.unwrap();

        let attempts = Arc::new(AtomicUsize::new(0));
        for i in 0..3 {
            store
                .append_operation(OperationRecord::new(
                    workflow_id,
                    i,
                    OperationType::ApiCall,
                    "resource",
                    format!("r{i}"),
                    None,
                    None,
                ))
                .await
                .unwrap();
        }

        let mut engine = UndoEngine::new();
        engine.register(OperationType::ApiCall, Arc::new(FailingUndo));

        let report = engine.undo_workflow(&store, workflow_id).await.unwrap();
        attempts.fetch_add(report.failed as usize, Ordering::SeqCst);
        assert_eq!(report.failed, 3);
        assert_eq!(report.undone, 0);

        let ops = store.list_operations(workflow_id).await.unwrap();
        assert!(ops.iter().all(|op| op.status == OperationStatus::Failed));
    }
}
