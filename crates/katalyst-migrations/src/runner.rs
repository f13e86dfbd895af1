//! Migration runner: baseline phase, filtering, checksum guard, ordered
//! execution (spec §4.8).

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use katalyst_contracts::persistence::{IsolationLevel, TransactionHost};
use tracing::{info, warn};

use crate::error::MigrationError;
use crate::history::{HistoryError, HistoryRow, HistoryStatus, HistoryStore, DEFAULT_HISTORY_TABLE};
use crate::migration::Migration;

/// Opaque hook invoked once, if configured, immediately after the baseline
/// phase and before execution begins. Its contract is deliberately
/// unspecified beyond "ran and reported"; the runner only logs the result
/// (spec §9 open question: `SchemaDiffService`'s concrete contract is not
/// reproduced here, only its invocation point).
#[async_trait]
pub trait SchemaDiffHook: Send + Sync {
    async fn run(&self) -> Result<(), String>;
}

#[derive(Clone)]
pub struct RunnerConfig {
    pub history_table: String,
    /// Migrations with `id <= baseline_version` not already in history are
    /// recorded as `BASELINED` and never executed.
    pub baseline_version: Option<String>,
    pub include_tags: BTreeSet<String>,
    pub exclude_tags: BTreeSet<String>,
    pub target_version: Option<String>,
    pub dry_run: bool,
    /// Runner-wide switch; a migration only aborts the whole run on failure
    /// when both this and the migration's own `blocking` flag are set.
    pub stop_on_failure: bool,
    pub schema_diff_hook: Option<Arc<dyn SchemaDiffHook>>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            history_table: DEFAULT_HISTORY_TABLE.to_string(),
            baseline_version: None,
            include_tags: BTreeSet::new(),
            exclude_tags: BTreeSet::new(),
            target_version: None,
            dry_run: false,
            stop_on_failure: true,
            schema_diff_hook: None,
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct RunOutcome {
    pub baselined: Vec<String>,
    pub executed: Vec<String>,
    pub skipped: Vec<String>,
    /// Failures that were logged and continued past (non-blocking, or
    /// `stop_on_failure` disabled).
    pub failed: Vec<String>,
}

pub struct MigrationRunner {
    history: Arc<dyn HistoryStore>,
    host: Option<Arc<dyn TransactionHost>>,
}

impl MigrationRunner {
    pub fn new(history: Arc<dyn HistoryStore>) -> Self {
        Self { history, host: None }
    }

    pub fn with_transaction_host(mut self, host: Arc<dyn TransactionHost>) -> Self {
        self.host = Some(host);
        self
    }

    pub async fn run(&self, migrations: &[Migration], config: &RunnerConfig) -> Result<RunOutcome, MigrationError> {
        self.history
            .ensure_table(&config.history_table)
            .await
            .map_err(|e| history_error(None, e))?;

        let mut ordered: Vec<&Migration> = migrations.iter().collect();
        ordered.sort_by(|a, b| (a.order, &a.id).cmp(&(b.order, &b.id)));

        let mut outcome = RunOutcome::default();
        let mut baselined_ids = BTreeSet::new();

        if let Some(baseline) = &config.baseline_version {
            for migration in &ordered {
                if &migration.id > baseline {
                    continue;
                }
                if self
                    .history
                    .get(&migration.id)
                    .await
                    .map_err(|e| history_error(Some(&migration.id), e))?
                    .is_some()
                {
                    continue;
                }
                self.history
                    .insert(HistoryRow {
                        migration_id: migration.id.clone(),
                        checksum: migration.checksum().to_string(),
                        description: migration.description.clone(),
                        execution_ms: 0,
                        executed_at: Utc::now(),
                        tags: migration.tags.clone(),
                        status: HistoryStatus::Baselined,
                    })
                    .await
                    .map_err(|e| history_error(Some(&migration.id), e))?;
                baselined_ids.insert(migration.id.clone());
                outcome.baselined.push(migration.id.clone());
                info!(migration = %migration.id, "baselined");
            }
        }

        if let Some(hook) = &config.schema_diff_hook {
            match hook.run().await {
                Ok(()) => info!("schema diff hook completed"),
                Err(reason) => warn!(reason = %reason, "schema diff hook reported a problem"),
            }
        }

        for migration in ordered {
            if baselined_ids.contains(&migration.id) {
                continue;
            }
            if !config.include_tags.is_empty() && migration.tags.is_disjoint(&config.include_tags) {
                continue;
            }
            if !config.exclude_tags.is_empty() && !migration.tags.is_disjoint(&config.exclude_tags) {
                continue;
            }
            if let Some(target) = &config.target_version {
                if &migration.id > target {
                    continue;
                }
            }

            let computed = migration.checksum().to_string();
            if let Some(existing) = self
                .history
                .get(&migration.id)
                .await
                .map_err(|e| history_error(Some(&migration.id), e))?
            {
                if existing.checksum != computed {
                    return Err(MigrationError::ChecksumMismatch {
                        id: migration.id.clone(),
                        stored: existing.checksum,
                        computed,
                    });
                }
                outcome.skipped.push(migration.id.clone());
                continue;
            }

            if config.dry_run {
                info!(migration = %migration.id, "dry run: would execute");
                outcome.skipped.push(migration.id.clone());
                continue;
            }

            let start = Instant::now();
            let result = if migration.transactional {
                self.run_transactional(migration).await
            } else {
                migration.up().await
            };
            let elapsed = start.elapsed();

            match result {
                Ok(()) => {
                    self.history
                        .insert(HistoryRow {
                            migration_id: migration.id.clone(),
                            checksum: computed,
                            description: migration.description.clone(),
                            execution_ms: elapsed.as_millis() as u64,
                            executed_at: Utc::now(),
                            tags: migration.tags.clone(),
                            status: HistoryStatus::Success,
                        })
                        .await
                        .map_err(|e| history_error(Some(&migration.id), e))?;
                    outcome.executed.push(migration.id.clone());
                    info!(migration = %migration.id, duration_ms = elapsed.as_millis() as u64, "executed");
                }
                Err(reason) => {
                    warn!(migration = %migration.id, reason = %reason, "migration failed");
                    outcome.failed.push(migration.id.clone());
                    if migration.blocking && config.stop_on_failure {
                        return Err(MigrationError::ExecutionFailure {
                            id: migration.id.clone(),
                            reason,
                        });
                    }
                }
            }
        }

        Ok(outcome)
    }

    async fn run_transactional(&self, migration: &Migration) -> Result<(), String> {
        let Some(host) = &self.host else {
            return migration.up().await;
        };

        let handle = host
            .begin(IsolationLevel::ReadCommitted)
            .await
            .map_err(|e| e.to_string())?;

        match migration.up().await {
            Ok(()) => host.commit(handle).await.map_err(|e| e.to_string()),
            Err(reason) => {
                if let Err(rollback_err) = host.rollback(handle).await {
                    warn!(migration = %migration.id, error = %rollback_err, "rollback after failed migration also failed");
                }
                Err(reason)
            }
        }
    }
}

fn history_error(id: Option<&str>, err: HistoryError) -> MigrationError {
    MigrationError::HistoryWriteFailure {
        id: id.unwrap_or("<table>").to_string(),
        reason: err.to_string(),
    }
}
