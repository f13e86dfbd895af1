//! Transactional event bus and adapter-driven transaction manager.
//!
//! [`bus::EventBus`] fans domain events out to handlers; [`transaction::TransactionManager`]
//! demarcates transaction bodies through the full phase sequence and drives
//! the adapter pipeline. A transaction's pending-events queue is how the two
//! halves connect: publishing inside an open transaction enqueues instead of
//! dispatching, and the queue is drained through the bus at `AfterCommit`
//! (or discarded on rollback).

pub mod bus;
pub mod error;
pub mod event;
pub mod transaction;

pub mod prelude {
    pub use crate::bus::EventBus;
    pub use crate::error::{EventError, TransactionError};
    pub use crate::event::{EventHandler, EventKey, EventMessagingPublisher, SealedEvent};
    pub use crate::transaction::{
        AdapterOutcome, MetricsExporter, TransactionAdapter, TransactionConfig, TransactionContext,
        TransactionManager, TransactionMetrics, TransactionPhase,
    };
}
