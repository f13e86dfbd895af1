//! Error taxonomy for the migration runner (spec §7).

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MigrationError {
    #[error("migration {id}: stored checksum {stored} does not match computed checksum {computed}")]
    ChecksumMismatch { id: String, stored: String, computed: String },

    #[error("migration {id} failed: {reason}")]
    ExecutionFailure { id: String, reason: String },

    #[error("failed to write history row for migration {id}: {reason}")]
    HistoryWriteFailure { id: String, reason: String },
}
