//! Error taxonomy for the event bus and transaction manager (spec §7).

use thiserror::Error;

use crate::transaction::TransactionPhase;

#[derive(Debug, Error, Clone)]
pub enum EventError {
    #[error("event failed validation: {0}")]
    Validation(String),
    #[error("event serialization failed: {0}")]
    Serialization(String),
    #[error("event deserialization failed: {0}")]
    Deserialization(String),
    #[error("handler failed: {0}")]
    Handler(String),
    #[error("no route for event: {0}")]
    Routing(String),
    #[error("publish failed: {0}")]
    Publish(String),
}

#[derive(Debug, Error, Clone)]
pub enum TransactionError {
    #[error("transaction exceeded its wall-clock timeout")]
    Timeout,
    #[error("deadlock detected by the transaction host")]
    Deadlock,
    #[error("transaction host unavailable: {0}")]
    Unavailable(String),
    #[error("transaction failed permanently: {0}")]
    Permanent(String),
    #[error("critical adapter `{adapter}` failed during {phase:?}: {reason}")]
    AdapterCritical {
        adapter: String,
        phase: TransactionPhase,
        reason: String,
    },
}

impl TransactionError {
    /// Retry classification key, matching `katalyst_contracts::RetryPolicy::should_retry`.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Deadlock => "deadlock",
            Self::Unavailable(_) => "unavailable",
            Self::Permanent(_) => "permanent",
            Self::AdapterCritical { .. } => "permanent",
        }
    }
}

impl From<katalyst_contracts::HostError> for TransactionError {
    fn from(err: katalyst_contracts::HostError) -> Self {
        match err {
            katalyst_contracts::HostError::Timeout => Self::Timeout,
            katalyst_contracts::HostError::Deadlock => Self::Deadlock,
            katalyst_contracts::HostError::Unavailable(reason) => Self::Unavailable(reason),
            katalyst_contracts::HostError::Permanent(reason) => Self::Permanent(reason),
        }
    }
}
