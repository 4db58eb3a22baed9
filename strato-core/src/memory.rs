//! In-memory schema history for tests and embedded use.

use chrono::Utc;
use parking_lot::RwLock;

use crate::history::{HistoryEntry, HistoryError, SchemaHistory};
use crate::migration::AppliedMigration;

/// A [`SchemaHistory`] held entirely in memory.
///
/// There is no cross-process story here; the lock is a plain re-entrancy
/// counter satisfying the contract for a single engine instance.
#[derive(Debug, Default)]
pub struct MemoryHistory {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    created: bool,
    rows: Vec<AppliedMigration>,
    lock_depth: u32,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with pre-existing rows, e.g. to simulate an earlier run.
    pub fn with_rows(rows: Vec<AppliedMigration>) -> Self {
        Self {
            inner: RwLock::new(Inner {
                created: true,
                rows,
                lock_depth: 0,
            }),
        }
    }

    /// Snapshot of the stored rows.
    pub fn rows(&self) -> Vec<AppliedMigration> {
        self.inner.read().rows.clone()
    }
}

#[async_trait::async_trait]
impl SchemaHistory for MemoryHistory {
    async fn exists(&self) -> Result<bool, HistoryError> {
        Ok(self.inner.read().created)
    }

    async fn create(&self) -> Result<(), HistoryError> {
        self.inner.write().created = true;
        Ok(())
    }

    async fn all_applied(&self) -> Result<Vec<AppliedMigration>, HistoryError> {
        Ok(self.inner.read().rows.clone())
    }

    async fn append(&self, entry: HistoryEntry) -> Result<(), HistoryError> {
        let mut inner = self.inner.write();
        let installed_rank = inner
            .rows
            .iter()
            .map(|r| r.installed_rank)
            .max()
            .unwrap_or(0)
            + 1;

        inner.rows.push(AppliedMigration {
            installed_rank,
            version: entry.version,
            description: entry.description,
            kind: entry.kind,
            script: entry.script,
            checksum: entry.checksum,
            installed_by: "local".to_owned(),
            installed_on: Utc::now(),
            execution_time_ms: entry.execution_time_ms,
            success: entry.success,
        });

        Ok(())
    }

    async fn acquire_lock(&self) -> Result<(), HistoryError> {
        self.inner.write().lock_depth += 1;
        Ok(())
    }

    async fn release_lock(&self) -> Result<(), HistoryError> {
        let mut inner = self.inner.write();
        inner.lock_depth = inner.lock_depth.saturating_sub(1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::MigrationKind;
    use crate::version::MigrationVersion;

    fn entry(version: &str, success: bool) -> HistoryEntry {
        HistoryEntry {
            version: Some(MigrationVersion::parse(version).unwrap()),
            description: "test".to_owned(),
            kind: MigrationKind::Sql,
            script: format!("V{version}__test.sql"),
            checksum: Some(7),
            execution_time_ms: 1,
            success,
        }
    }

    #[tokio::test]
    async fn ranks_are_dense_and_increasing() {
        let history = MemoryHistory::new();
        history.create().await.unwrap();
        history.append(entry("1", true)).await.unwrap();
        history.append(entry("2", true)).await.unwrap();
        history.append(entry("3", false)).await.unwrap();

        let rows = history.all_applied().await.unwrap();
        let ranks: Vec<i32> = rows.iter().map(|r| r.installed_rank).collect();
        assert_eq!(ranks, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn lock_is_reentrant() {
        let history = MemoryHistory::new();
        history.acquire_lock().await.unwrap();
        history.acquire_lock().await.unwrap();
        history.release_lock().await.unwrap();
        history.release_lock().await.unwrap();
    }
}
