//! Durable workflow execution: appends to the operation log before each
//! effect is attempted, retries per-activity, and leaves a failed workflow
//! in `Failed` status for the background recovery job to undo (spec §4.9).

use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};
use uuid::Uuid;

use crate::activity::{Activity, ActivityOptions};
use crate::circuit_breaker::CircuitBreaker;
use crate::error::WorkflowError;
use crate::operation::{OperationRecord, OperationStatus};
use crate::store::{StoreError, WorkflowStore};

/// One step of a durable workflow: an activity plus its input and
/// per-activity options.
pub struct DurableStep {
    pub activity: Arc<dyn Activity>,
    pub input: serde_json::Value,
    pub options: ActivityOptions,
    pub resource_id: String,
    pub breaker: Option<Arc<CircuitBreaker>>,
}

pub struct DurableWorkflowEngine {
    store: Arc<dyn WorkflowStore>,
}

impl DurableWorkflowEngine {
    pub fn new(store: Arc<dyn WorkflowStore>) -> Self {
        Self { store }
    }

    /// Runs `steps` in order against a freshly created workflow. On the
    /// first unrecoverable activity failure, the workflow is left in
    /// `Failed` status (not undone inline) — recovery is the background
    /// job's responsibility (spec §4.9 "a recovery actor invokes the
    /// `UndoEngine`").
    pub async fn run(&self, workflow_name: &str, steps: Vec<DurableStep>) -> Result<Uuid, WorkflowError> {
        let workflow_id = Uuid::now_v7();
        self.store
            .create_workflow(workflow_id, workflow_name)
            .await
            .map_err(store_error_to_workflow_error)?;

        for (index, step) in steps.into_iter().enumerate() {
            let operation_index = index as u32;
            let record = OperationRecord::new(
                workflow_id,
                operation_index,
                step.activity.operation_type(),
                step.activity.resource_type(),
                step.resource_id.clone(),
                Some(step.input.clone()),
                None,
            );
            self.store.append_operation(record).await.map_err(store_error_to_workflow_error)?;

            match self.execute_with_retry(&step).await {
                Ok(result) => {
                    self.store
                        .update_operation_status(workflow_id, operation_index, OperationStatus::Committed, None)
                        .await
                        .map_err(store_error_to_workflow_error)?;
                    info!(workflow_id = %workflow_id, operation_index, resource_id = %result.resource_id, "operation committed");
                }
                Err(reason) => {
                    self.store
                        .update_operation_status(
                            workflow_id,
                            operation_index,
                            OperationStatus::Failed,
                            Some(reason.clone()),
                        )
                        .await
                        .map_err(store_error_to_workflow_error)?;
                    self.store
                        .mark_failed(workflow_id, operation_index, &reason)
                        .await
                        .map_err(store_error_to_workflow_error)?;
                    return Err(WorkflowError::StepFailure {
                        step: format!("operation-{operation_index}"),
                        reason,
                    });
                }
            }
        }

        self.store.mark_committed(workflow_id).await.map_err(store_error_to_workflow_error)?;
        Ok(workflow_id)
    }

    async fn execute_with_retry(&self, step: &DurableStep) -> Result<crate::activity::ActivityResult, String> {
        let mut attempt: u32 = 0;
        loop {
            let permit = match &step.breaker {
                Some(breaker) => match breaker.allow() {
                    Ok(permit) => Some(permit),
                    Err(_) => return Err("circuit breaker is open".to_string()),
                },
                None => None,
            };

            let start = Instant::now();
            let outcome = tokio::time::timeout(step.options.timeout, step.activity.execute(&step.input)).await;
            let result = match outcome {
                Ok(inner) => inner,
                Err(_) => Err("activity execution timeout".to_string()),
            };

            match result {
                Ok(value) => {
                    if let Some(permit) = permit {
                        permit.success();
                    }
                    return Ok(value);
                }
                Err(reason) => {
                    if let Some(permit) = permit {
                        permit.failure();
                    }
                    warn!(resource_type = %step.activity.resource_type(), attempt, elapsed_ms = start.elapsed().as_millis() as u64, reason = %reason, "activity attempt failed");

                    if !step.options.retry.should_retry(&reason) || !step.options.retry.has_attempts_remaining(attempt + 1) {
                        return Err(reason);
                    }
                    let delay = step.options.retry.delay_for_attempt(attempt + 1);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
            }
        }
    }
}

fn store_error_to_workflow_error(err: StoreError) -> WorkflowError {
    WorkflowError::StepFailure {
        step: "<workflow-store>".to_string(),
        reason: err.to_string(),
    }
}
