//! Migration history persistence (spec §3 "History row", §5 "Persisted
//! state"). `HistoryStore` is the seam to a concrete schema-history table;
//! [`InMemoryHistoryStore`] is the in-memory implementation used for tests
//! and embedders without a persistence driver wired in yet.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HistoryError {
    #[error("history store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryStatus {
    Success,
    Baselined,
}

/// One row of the schema-migration history table (spec §5 column list).
#[derive(Debug, Clone)]
pub struct HistoryRow {
    pub migration_id: String,
    pub checksum: String,
    pub description: String,
    pub execution_ms: u64,
    pub executed_at: DateTime<Utc>,
    pub tags: BTreeSet<String>,
    pub status: HistoryStatus,
}

/// The history table itself: configurable name, single writer at startup
/// (spec §5 "Migration history table: single writer at startup").
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Ensures the backing table exists. Idempotent.
    async fn ensure_table(&self, table_name: &str) -> Result<(), HistoryError>;

    async fn get(&self, migration_id: &str) -> Result<Option<HistoryRow>, HistoryError>;

    async fn insert(&self, row: HistoryRow) -> Result<(), HistoryError>;

    async fn all(&self) -> Result<Vec<HistoryRow>, HistoryError>;
}

/// In-memory `HistoryStore`, primarily for tests (mirrors the teacher's
/// in-memory workflow event store: same trait, no backing database).
#[derive(Default)]
pub struct InMemoryHistoryStore {
    rows: RwLock<Vec<HistoryRow>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn ensure_table(&self, _table_name: &str) -> Result<(), HistoryError> {
        Ok(())
    }

    async fn get(&self, migration_id: &str) -> Result<Option<HistoryRow>, HistoryError> {
        Ok(self.rows.read().iter().find(|r| r.migration_id == migration_id).cloned())
    }

    async fn insert(&self, row: HistoryRow) -> Result<(), HistoryError> {
        self.rows.write().push(row);
        Ok(())
    }

    async fn all(&self) -> Result<Vec<HistoryRow>, HistoryError> {
        Ok(self.rows.read().clone())
    }
}

/// Default history table identifier (spec §4.8 "a fixed identifier").
pub const DEFAULT_HISTORY_TABLE: &str = "katalyst_schema_history";
