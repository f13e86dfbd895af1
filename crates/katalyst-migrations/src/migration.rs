//! Migration descriptor and checksum computation (spec §3, §4.8).

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

/// The user-supplied body of a migration. Opaque to the runner beyond its
/// `Result` — the same "don't introspect the action" posture the container
/// takes toward component factories.
#[async_trait]
pub trait MigrationAction: Send + Sync {
    async fn up(&self) -> Result<(), String>;
}

#[async_trait]
impl<F, Fut> MigrationAction for F
where
    F: Fn() -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<(), String>> + Send,
{
    async fn up(&self) -> Result<(), String> {
        (self)().await
    }
}

/// A single ordered, checksum-guarded schema or data change (spec §3).
#[derive(Clone)]
pub struct Migration {
    pub id: String,
    pub description: String,
    pub tags: BTreeSet<String>,
    pub blocking: bool,
    pub transactional: bool,
    /// Secondary sort key ahead of `id` in execution order (spec §4.8:
    /// "stable sort by `(order, id)` ascending").
    pub order: i64,
    /// Stable hash of the migration's defining content (spec §4.8: "for SQL
    /// migrations, the concatenation of statements with explicit
    /// separators; whitespace is significant").
    checksum: String,
    action: Arc<dyn MigrationAction>,
}

impl Migration {
    pub fn new(id: impl Into<String>, statements: &[&str], action: Arc<dyn MigrationAction>) -> Self {
        Self {
            id: id.into(),
            description: String::new(),
            tags: BTreeSet::new(),
            blocking: true,
            transactional: true,
            order: 0,
            checksum: checksum_of(statements),
            action,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_tags(mut self, tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_blocking(mut self, blocking: bool) -> Self {
        self.blocking = blocking;
        self
    }

    pub fn with_transactional(mut self, transactional: bool) -> Self {
        self.transactional = transactional;
        self
    }

    pub fn with_order(mut self, order: i64) -> Self {
        self.order = order;
        self
    }

    pub fn checksum(&self) -> &str {
        &self.checksum
    }

    pub async fn up(&self) -> Result<(), String> {
        self.action.up().await
    }
}

impl std::fmt::Debug for Migration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Migration")
            .field("id", &self.id)
            .field("description", &self.description)
            .field("tags", &self.tags)
            .field("blocking", &self.blocking)
            .field("transactional", &self.transactional)
            .field("order", &self.order)
            .field("checksum", &self.checksum)
            .finish()
    }
}

/// Separator chosen to never plausibly occur inside a SQL statement, so
/// concatenation stays unambiguous.
const STATEMENT_SEPARATOR: &str = "\u{1}";

fn checksum_of(statements: &[&str]) -> String {
    let joined = statements.join(STATEMENT_SEPARATOR);
    let digest = Sha256::digest(joined.as_bytes());
    hex::encode(digest)
}
