//! Transaction demarcation, the adapter pipeline, and retry/backoff around
//! transaction bodies (spec §4.5).

use std::any::Any;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

use katalyst_contracts::{IsolationLevel, RetryPolicy, TransactionHandle, TransactionHost};

use crate::bus::EventBus;
use crate::error::TransactionError;
use crate::event::EventKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionPhase {
    BeforeBegin,
    AfterBegin,
    BeforeCommit,
    AfterCommit,
    OnRollback,
    AfterRollback,
}

/// One adapter's result for one phase of one transaction (spec §4.5).
#[derive(Debug, Clone)]
pub struct AdapterOutcome {
    pub adapter: String,
    pub phase: TransactionPhase,
    pub success: bool,
    pub error: Option<String>,
    pub duration: Duration,
}

/// A module-supplied hook that participates in transaction phases (spec
/// GLOSSARY "Adapter"). Ordered by descending priority; `critical` adapters
/// failing in `BeforeCommit` with `fail_fast` force a rollback.
#[async_trait]
pub trait TransactionAdapter: Send + Sync {
    fn name(&self) -> &str;
    fn priority(&self) -> i32;
    fn critical(&self) -> bool {
        false
    }
    async fn on_phase(&self, phase: TransactionPhase, ctx: &TransactionContext) -> Result<(), TransactionError>;
}

/// Per-transaction state visible to the body and to adapters.
pub struct TransactionContext {
    pub id: Uuid,
    pub workflow_id: Option<String>,
    pending_events: Mutex<Vec<(EventKey, Arc<dyn Any + Send + Sync>)>>,
}

impl TransactionContext {
    fn new(workflow_id: Option<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            workflow_id,
            pending_events: Mutex::new(Vec::new()),
        }
    }

    /// Enqueues an event instead of publishing it immediately; the events
    /// adapter drains this queue at `AfterCommit` (spec §4.6 "Pending
    /// event").
    pub fn enqueue_event<E: Send + Sync + 'static>(&self, event: E) {
        self.pending_events
            .lock()
            .push((EventKey::of::<E>(), Arc::new(event)));
    }

    fn drain_pending(&self) -> Vec<(EventKey, Arc<dyn Any + Send + Sync>)> {
        std::mem::take(&mut self.pending_events.lock())
    }

    fn clear_pending(&self) {
        self.pending_events.lock().clear();
    }
}

#[derive(Debug, Clone)]
pub struct TransactionConfig {
    pub isolation: IsolationLevel,
    pub timeout: Duration,
    pub fail_fast: bool,
    pub retry: RetryPolicy,
    pub workflow_id: Option<String>,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            isolation: IsolationLevel::ReadCommitted,
            timeout: Duration::from_secs(30),
            fail_fast: true,
            retry: RetryPolicy::no_retry(),
            workflow_id: None,
        }
    }
}

/// Per-transaction metrics emitted to every registered exporter (spec
/// §4.5). Exporter failures are logged and never propagate.
#[derive(Debug, Clone)]
pub struct TransactionMetrics {
    pub id: Uuid,
    pub workflow_id: Option<String>,
    pub status: &'static str,
    pub duration: Duration,
    pub event_count: usize,
    pub retry_count: u32,
    pub adapter_executions: Vec<AdapterOutcome>,
    pub errors: Vec<String>,
}

pub trait MetricsExporter: Send + Sync {
    fn export(&self, metrics: &TransactionMetrics);
}

/// Drives transaction demarcation, the adapter pipeline, retry/backoff, and
/// pending-event draining (spec §4.5).
pub struct TransactionManager {
    host: Arc<dyn TransactionHost>,
    bus: Arc<EventBus>,
    adapters: Mutex<Vec<Arc<dyn TransactionAdapter>>>,
    exporters: Mutex<Vec<Arc<dyn MetricsExporter>>>,
}

impl TransactionManager {
    pub fn new(host: Arc<dyn TransactionHost>, bus: Arc<EventBus>) -> Self {
        Self {
            host,
            bus,
            adapters: Mutex::new(Vec::new()),
            exporters: Mutex::new(Vec::new()),
        }
    }

    /// Adds an adapter and re-sorts the pipeline descending by priority.
    /// Rust's sort is stable, so ties keep registration order - the
    /// copy-on-write re-sort-on-insert the spec calls for (§5).
    pub fn register_adapter(&self, adapter: Arc<dyn TransactionAdapter>) {
        let mut adapters = self.adapters.lock();
        adapters.push(adapter);
        adapters.sort_by(|a, b| b.priority().cmp(&a.priority()));
    }

    pub fn register_exporter(&self, exporter: Arc<dyn MetricsExporter>) {
        self.exporters.lock().push(exporter);
    }

    async fn run_phase(&self, phase: TransactionPhase, ctx: &TransactionContext, config: &TransactionConfig) -> (Vec<AdapterOutcome>, bool) {
        let adapters = self.adapters.lock().clone();
        let mut outcomes = Vec::with_capacity(adapters.len());
        let mut force_rollback = false;

        for adapter in adapters {
            let start = Instant::now();
            let result = adapter.on_phase(phase, ctx).await;
            let duration = start.elapsed();

            match result {
                Ok(()) => outcomes.push(AdapterOutcome {
                    adapter: adapter.name().to_string(),
                    phase,
                    success: true,
                    error: None,
                    duration,
                }),
                Err(err) => {
                    let is_critical = adapter.critical();
                    warn!(adapter = adapter.name(), phase = ?phase, error = %err, critical = is_critical, "adapter failed");
                    outcomes.push(AdapterOutcome {
                        adapter: adapter.name().to_string(),
                        phase,
                        success: false,
                        error: Some(err.to_string()),
                        duration,
                    });
                    if is_critical && phase == TransactionPhase::BeforeCommit && config.fail_fast {
                        force_rollback = true;
                    }
                }
            }
        }

        (outcomes, force_rollback)
    }

    /// Runs `body` inside a demarcated transaction with the full phase
    /// sequence, retrying per `config.retry` on retryable failures.
    pub async fn transaction<T, F, Fut>(&self, config: TransactionConfig, body: F) -> Result<T, TransactionError>
    where
        F: Fn(Arc<TransactionContext>) -> Fut,
        Fut: std::future::Future<Output = Result<T, TransactionError>>,
    {
        let attempts = AtomicU32::new(0);
        let mut last_error;

        loop {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst);
            let ctx = Arc::new(TransactionContext::new(config.workflow_id.clone()));
            let start = Instant::now();
            let mut outcomes = Vec::new();

            let (before_begin, _) = self.run_phase(TransactionPhase::BeforeBegin, &ctx, &config).await;
            outcomes.extend(before_begin);

            let handle_result = self.host.begin(config.isolation).await;
            let handle: Box<dyn TransactionHandle> = match handle_result {
                Ok(h) => h,
                Err(err) => {
                    last_error = TransactionError::from(err);
                    if self.should_retry(&config, &last_error, attempt) {
                        self.sleep_before_retry(&config, attempt).await;
                        continue;
                    }
                    self.emit_metrics(&ctx, "begin_failed", start.elapsed(), 0, attempt, outcomes, vec![last_error.to_string()]);
                    return Err(last_error);
                }
            };

            let (after_begin, _) = self.run_phase(TransactionPhase::AfterBegin, &ctx, &config).await;
            outcomes.extend(after_begin);

            let body_result = tokio::time::timeout(config.timeout, body(ctx.clone())).await;

            let outcome = match body_result {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(err)) => Err(err),
                Err(_elapsed) => Err(TransactionError::Timeout),
            };

            match outcome {
                Ok(value) => {
                    let (before_commit, force_rollback) =
                        self.run_phase(TransactionPhase::BeforeCommit, &ctx, &config).await;
                    outcomes.extend(before_commit);

                    if force_rollback {
                        last_error = TransactionError::AdapterCritical {
                            adapter: "pipeline".into(),
                            phase: TransactionPhase::BeforeCommit,
                            reason: "critical adapter failed with fail_fast enabled".into(),
                        };
                        self.rollback(&ctx, &config, handle, &mut outcomes).await;
                        self.emit_metrics(&ctx, "rolled_back", start.elapsed(), 0, attempt, outcomes, vec![last_error.to_string()]);
                        return Err(last_error);
                    }

                    if let Err(err) = self.host.commit(handle).await {
                        last_error = TransactionError::from(err);
                        if self.should_retry(&config, &last_error, attempt) {
                            self.sleep_before_retry(&config, attempt).await;
                            continue;
                        }
                        self.emit_metrics(&ctx, "commit_failed", start.elapsed(), 0, attempt, outcomes, vec![last_error.to_string()]);
                        return Err(last_error);
                    }

                    let (after_commit, _) = self.run_phase(TransactionPhase::AfterCommit, &ctx, &config).await;
                    outcomes.extend(after_commit);

                    let pending = ctx.drain_pending();
                    let event_count = pending.len();
                    for (key, event) in pending {
                        if let Err(err) = self.bus.dispatch(&key, event).await {
                            error!(event = %key, error = %err, "post-commit event dispatch failed");
                        }
                    }

                    self.emit_metrics(&ctx, "committed", start.elapsed(), event_count, attempt, outcomes, Vec::new());
                    return Ok(value);
                }
                Err(err) => {
                    last_error = err;
                    self.rollback(&ctx, &config, handle, &mut outcomes).await;

                    if self.should_retry(&config, &last_error, attempt) {
                        self.sleep_before_retry(&config, attempt).await;
                        continue;
                    }

                    self.emit_metrics(&ctx, "rolled_back", start.elapsed(), 0, attempt, outcomes, vec![last_error.to_string()]);
                    return Err(last_error);
                }
            }
        }
    }

    /// Runs `body` without a mutation-intent transaction wrapper around
    /// demarcation (still goes through `BeforeBegin`/`AfterBegin` so
    /// adapters observe it, but never commits/rolls back).
    pub async fn read_only<T, F, Fut>(&self, body: F) -> Result<T, TransactionError>
    where
        F: FnOnce(Arc<TransactionContext>) -> Fut,
        Fut: std::future::Future<Output = Result<T, TransactionError>>,
    {
        let ctx = Arc::new(TransactionContext::new(None));
        let config = TransactionConfig::default();
        self.run_phase(TransactionPhase::BeforeBegin, &ctx, &config).await;
        self.run_phase(TransactionPhase::AfterBegin, &ctx, &config).await;
        body(ctx).await
    }

    async fn rollback(
        &self,
        ctx: &Arc<TransactionContext>,
        config: &TransactionConfig,
        handle: Box<dyn TransactionHandle>,
        outcomes: &mut Vec<AdapterOutcome>,
    ) {
        let (on_rollback, _) = self.run_phase(TransactionPhase::OnRollback, ctx, config).await;
        outcomes.extend(on_rollback);
        ctx.clear_pending();
        if let Err(err) = self.host.rollback(handle).await {
            warn!(transaction = %ctx.id, error = %err, "transaction host rollback failed");
        }
        let (after_rollback, _) = self.run_phase(TransactionPhase::AfterRollback, ctx, config).await;
        outcomes.extend(after_rollback);
    }

    fn should_retry(&self, config: &TransactionConfig, error: &TransactionError, attempt: u32) -> bool {
        config.retry.should_retry(error.kind()) && config.retry.has_attempts_remaining(attempt + 1)
    }

    async fn sleep_before_retry(&self, config: &TransactionConfig, attempt: u32) {
        let delay = config.retry.delay_for_attempt(attempt + 1);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn emit_metrics(
        &self,
        ctx: &TransactionContext,
        status: &'static str,
        duration: Duration,
        event_count: usize,
        retry_count: u32,
        adapter_executions: Vec<AdapterOutcome>,
        errors: Vec<String>,
    ) {
        let metrics = TransactionMetrics {
            id: ctx.id,
            workflow_id: ctx.workflow_id.clone(),
            status,
            duration,
            event_count,
            retry_count,
            adapter_executions,
            errors,
        };
        info!(transaction = %ctx.id, status, duration_ms = duration.as_millis() as u64, "transaction finished");
        for exporter in self.exporters.lock().iter() {
            exporter.export(&metrics);
        }
    }
}
