//! The undo-capable operation primitive durable workflows are built from
//! (SPEC_FULL §4.9 "Activities"). An `Activity` realizes the spec's §3
//! "Transaction operation" as a concrete, durably-logged unit of work.

use async_trait::async_trait;
use katalyst_contracts::RetryPolicy;
use std::time::Duration;

use crate::operation::OperationType;

#[derive(Clone)]
pub struct ActivityOptions {
    pub retry: RetryPolicy,
    pub timeout: Duration,
    pub priority: i32,
}

impl Default for ActivityOptions {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::no_retry(),
            timeout: Duration::from_secs(30),
            priority: 0,
        }
    }
}

impl ActivityOptions {
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

/// A durable operation: `execute` performs the effect and returns
/// `undo_data`, persisted on the resulting [`crate::operation::OperationRecord`]
/// for later compensation. Undo itself runs through a separately-registered
/// [`crate::undo::UndoStrategy`] keyed by [`OperationType`] rather than a
/// method on this trait, since recovery replays persisted operation records
/// and may run in a different process than the one that called `execute`.
#[async_trait]
pub trait Activity: Send + Sync {
    fn operation_type(&self) -> OperationType;

    fn resource_type(&self) -> &str;

    async fn execute(&self, input: &serde_json::Value) -> Result<ActivityResult, String>;
}

#[derive(Debug, Clone)]
pub struct ActivityResult {
    pub resource_id: String,
    pub operation_data: Option<serde_json::Value>,
    pub undo_data: Option<serde_json::Value>,
}
