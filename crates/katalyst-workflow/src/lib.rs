//! Durable workflow and saga engine (spec §4.9): a non-durable in-memory
//! saga for simple multi-step compensation, and a durable workflow engine
//! backed by an append-only operation log, retries, a circuit breaker, and
//! a background recovery job that drives undo for failed workflows.

pub mod activity;
pub mod circuit_breaker;
pub mod engine;
pub mod error;
pub mod operation;
pub mod recovery;
pub mod saga;
pub mod state_machine;
pub mod store;
pub mod undo;

pub mod prelude {
    pub use crate::activity::{Activity, ActivityOptions, ActivityResult};
    pub use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitState, Permit};
    pub use crate::engine::{DurableStep, DurableWorkflowEngine};
    pub use crate::error::WorkflowError;
    pub use crate::operation::{OperationRecord, OperationStatus, OperationType};
    pub use crate::recovery::{RecoveryJob, RecoveryJobConfig, ScanMetrics};
    pub use crate::saga::{Saga, SagaContext, SagaRun, Step};
    pub use crate::state_machine::{TransitionListener, WorkflowState, WorkflowStateMachine};
    pub use crate::store::{InMemoryWorkflowStore, StoreError, WorkflowRecord, WorkflowRowStatus, WorkflowStore};
    pub use crate::undo::{UndoEngine, UndoReport, UndoStrategy};
}
