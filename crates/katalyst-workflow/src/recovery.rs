//! Background recovery job: periodically scans `Failed` workflows under
//! the retry ceiling and drives their undo (spec §4.9 "Background recovery
//! job"). Structurally the same shape as the teacher's worker pool —
//! "claim a batch, process each independently, report outcome" — applied
//! to recovering failed workflows instead of claiming queued tasks
//! (`durable/src/worker/pool.rs`, `worker/poller.rs`).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{info, warn};

use crate::store::WorkflowStore;
use crate::undo::UndoEngine;

#[derive(Debug, Clone, Copy, Default)]
pub struct ScanMetrics {
    pub total_scans: u64,
    pub workflows_found: usize,
    pub success_rate: f64,
}

pub struct RecoveryJobConfig {
    pub max_retries: u32,
    pub batch_size: usize,
    pub scan_interval: Duration,
}

impl Default for RecoveryJobConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            batch_size: 20,
            scan_interval: Duration::from_secs(30),
        }
    }
}

pub struct RecoveryJob {
    store: Arc<dyn WorkflowStore>,
    undo_engine: Arc<UndoEngine>,
    config: RecoveryJobConfig,
    total_scans: AtomicU64,
}

impl RecoveryJob {
    pub fn new(store: Arc<dyn WorkflowStore>, undo_engine: Arc<UndoEngine>, config: RecoveryJobConfig) -> Self {
        Self {
            store,
            undo_engine,
            config,
            total_scans: AtomicU64::new(0),
        }
    }

    /// Runs a single scan-and-recover pass. One workflow's failure to
    /// undo never affects another's (spec §4.9 "Failures in one workflow
    /// never affect others").
    pub async fn scan_once(&self) -> ScanMetrics {
        let total_scans = self.total_scans.fetch_add(1, Ordering::SeqCst) + 1;

        let candidates = match self
            .store
            .list_recoverable(self.config.max_retries, self.config.batch_size)
            .await
        {
            Ok(candidates) => candidates,
            Err(err) => {
                warn!(error = %err, "recovery scan failed to list candidates");
                return ScanMetrics {
                    total_scans,
                    workflows_found: 0,
                    success_rate: 0.0,
                };
            }
        };

        let workflows_found = candidates.len();
        let mut successes = 0usize;

        for workflow in &candidates {
            if let Err(err) = self.store.increment_retry_count(workflow.workflow_id).await {
                warn!(workflow_id = %workflow.workflow_id, error = %err, "failed to increment retry count");
                continue;
            }

            match self.undo_engine.undo_workflow(self.store.as_ref(), workflow.workflow_id).await {
                Ok(report) => {
                    if report.failed == 0 {
                        successes += 1;
                    }
                    info!(
                        workflow_id = %workflow.workflow_id,
                        undone = report.undone,
                        failed = report.failed,
                        "recovery undo pass completed"
                    );
                }
                Err(err) => {
                    warn!(workflow_id = %workflow.workflow_id, error = %err, "recovery undo pass failed");
                }
            }
        }

        let success_rate = if workflows_found == 0 {
            1.0
        } else {
            successes as f64 / workflows_found as f64
        };

        let metrics = ScanMetrics {
            total_scans,
            workflows_found,
            success_rate,
        };
        info!(
            total_scans = metrics.total_scans,
            workflows_found = metrics.workflows_found,
            success_rate = metrics.success_rate,
            "recovery scan complete"
        );
        metrics
    }

    /// Spawns the periodic loop. The returned sender stops the loop
    /// (idempotent, next suspension point) without waiting for an
    /// in-flight scan to finish early.
    pub fn spawn(self: Arc<Self>) -> (tokio::task::JoinHandle<()>, watch::Sender<bool>) {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let interval = self.config.scan_interval;

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {
                        self.scan_once().await;
                    }
                    _ = stop_rx.changed() => {
                        if *stop_rx.borrow() {
                            return;
                        }
                    }
                }
            }
        });

        (handle, stop_tx)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use uuid::Uuid;

    use super::*;
    use crate::operation::{OperationRecord, OperationType};
    use crate::store::InMemoryWorkflowStore;

    #[tokio::test]
    async fn scan_recovers_failed_workflows_below_retry_ceiling() {
        let store = Arc::new(InMemoryWorkflowStore::new());
        let workflow_id = Uuid::now_v7();
        store.create_workflow(workflow_id, "wf").await.unwrap();
        store
            .append_operation(OperationRecord::new(
                workflow_id,
                0,
                OperationType::Insert,
                "resource",
                "r0",
                Some(json!({})),
                None,
            ))
            .await
            .unwrap();
        store.mark_failed(workflow_id, 0, "boom").await.unwrap();

        let undo_engine = Arc::new(UndoEngine::new());
        let job = RecoveryJob::new(store.clone(), undo_engine, RecoveryJobConfig::default());

        let metrics = job.scan_once().await;
        assert_eq!(metrics.total_scans, 1);
        assert_eq!(metrics.workflows_found, 1);
        assert_eq!(metrics.success_rate, 1.0);

        let record = store.get_workflow(workflow_id).await.unwrap();
        assert_eq!(record.retry_count, 1);
    }

    #[tokio::test]
    async fn workflows_past_the_retry_ceiling_are_excluded() {
        let store = Arc::new(InMemoryWorkflowStore::new());
        let workflow_id = Uuid::now_v7();
        store.create_workflow(workflow_id, "wf").await.unwrap();
        store.mark_failed(workflow_id, 0, "boom").await.unwrap();
        store.increment_retry_count(workflow_id).await.unwrap();

        let undo_engine = Arc::new(UndoEngine::new());
        let config = RecoveryJobConfig {
            max_retries: 1,
            ..Default::default()
        };
        let job = RecoveryJob::new(store, undo_engine, config);

        let metrics = job.scan_once().await;
        assert_eq!(metrics.workflows_found, 0);
    }
}
