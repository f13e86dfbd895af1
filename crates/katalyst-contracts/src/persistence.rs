//! Persistence-facing contracts consumed from external collaborators
//! (spec §6): `Repository` and `PersistenceDriver`/`TransactionHost`.
//!
//! The core never introspects row structure; mapping is always an explicit
//! function supplied by the repository implementation (spec §9 open
//! question: the legacy reflection-based field-to-column mapper is not
//! reproduced here).

use async_trait::async_trait;
use thiserror::Error;

/// Isolation levels a `TransactionHost` may be asked to honor (spec §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationLevel {
    ReadUncommitted,
    #[default]
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

/// Errors a `TransactionHost` demarcation primitive may report.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HostError {
    #[error("transaction timed out")]
    Timeout,
    #[error("deadlock detected")]
    Deadlock,
    #[error("resource unavailable: {0}")]
    Unavailable(String),
    #[error("permanent failure: {0}")]
    Permanent(String),
}

impl HostError {
    /// Error-kind string used by `RetryPolicy` classification (spec §4.5).
    pub fn kind(&self) -> &'static str {
        match self {
            HostError::Timeout => "timeout",
            HostError::Deadlock => "deadlock",
            HostError::Unavailable(_) => "unavailable",
            HostError::Permanent(_) => "permanent",
        }
    }
}

/// Opaque handle to an open transaction, supplied by whatever
/// `PersistenceDriver` opened it. The core never inspects its contents.
pub trait TransactionHandle: Send + Sync {}

/// Demarcation primitives a concrete persistence driver must provide.
///
/// This is the seam between the framework core and a concrete SQL/ORM
/// layer; the core only ever calls through this trait.
#[async_trait]
pub trait TransactionHost: Send + Sync {
    async fn begin(&self, isolation: IsolationLevel) -> Result<Box<dyn TransactionHandle>, HostError>;
    async fn commit(&self, handle: Box<dyn TransactionHandle>) -> Result<(), HostError>;
    async fn rollback(&self, handle: Box<dyn TransactionHandle>) -> Result<(), HostError>;
}

/// A repository contract the core wires into the DI container by capability
/// (spec §4.4, role `Repository`), without ever introspecting row shape.
pub trait Repository: Send + Sync {
    /// Opaque reference to the backing table/collection (e.g. a table name
    /// or a driver-specific handle); the core treats it as inert data.
    fn table_reference(&self) -> &str;
}
