//! The schema history contract.

use std::time::Duration;

use crate::migration::{AppliedMigration, MigrationKind};
use crate::version::MigrationVersion;

/// A row about to be appended to the schema history.
///
/// The store assigns `installed_rank`, `installed_by` and `installed_on`.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub version: Option<MigrationVersion>,
    pub description: String,
    pub kind: MigrationKind,
    pub script: String,
    pub checksum: Option<i32>,
    pub execution_time_ms: i64,
    pub success: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("failed to acquire the schema history lock within {0:?}")]
    LockTimeout(Duration),

    #[error("schema history error: {0}")]
    Db(#[from] anyhow::Error),
}

/// Append-only store of applied migrations, doubling as the cross-process
/// mutual exclusion point for concurrent engine instances.
///
/// `acquire_lock`/`release_lock` must be re-entrant within one store
/// instance: a second acquisition by the holder succeeds immediately and
/// the lock is released when releases balance acquisitions.
#[async_trait::async_trait]
pub trait SchemaHistory: Send + Sync {
    async fn exists(&self) -> Result<bool, HistoryError>;

    async fn create(&self) -> Result<(), HistoryError>;

    /// All rows, ordered by `installed_rank`.
    async fn all_applied(&self) -> Result<Vec<AppliedMigration>, HistoryError>;

    /// Append a row with the next `installed_rank`. Must be called with the
    /// lock held.
    async fn append(&self, entry: HistoryEntry) -> Result<(), HistoryError>;

    async fn acquire_lock(&self) -> Result<(), HistoryError>;

    async fn release_lock(&self) -> Result<(), HistoryError>;
}
