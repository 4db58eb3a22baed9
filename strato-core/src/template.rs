//! Transactional boundaries around a migration group.
//!
//! JDBC-style auto-commit does not exist in this stack; "auto-commit off"
//! is modeled as an explicit transaction open on the migration connection.
//! The template owns that mapping so the engine only decides *whether* a
//! group is transactional, never *how*.

use crate::adapter::{AdapterError, MigrationConnection};

/// Wraps the execution of one group in the correct boundary.
#[derive(Debug, Clone, Copy)]
pub struct TransactionTemplate {
    transactional: bool,
}

impl TransactionTemplate {
    pub fn new(transactional: bool) -> Self {
        Self { transactional }
    }

    /// Open the boundary. A no-op for non-transactional groups.
    pub async fn enter(&self, conn: &mut dyn MigrationConnection) -> Result<(), AdapterError> {
        if self.transactional {
            conn.begin().await?;
        }
        Ok(())
    }

    /// Close the boundary: commit on success, roll back on failure.
    /// Non-transactional groups never attempt a rollback.
    pub async fn exit(
        &self,
        conn: &mut dyn MigrationConnection,
        success: bool,
    ) -> Result<(), AdapterError> {
        if !self.transactional {
            return Ok(());
        }
        if success {
            conn.commit().await
        } else {
            conn.rollback().await
        }
    }
}

/// Single-connection quirk: when the schema-history lock forced a
/// transaction open on the shared connection, a non-transactional migration
/// body must still run outside of it. Commits the open transaction and
/// reports whether one was open.
pub async fn suspend_transaction(
    conn: &mut dyn MigrationConnection,
) -> Result<bool, AdapterError> {
    if conn.in_transaction() {
        conn.commit().await?;
        Ok(true)
    } else {
        Ok(false)
    }
}

/// Restore the transaction suspended by [`suspend_transaction`].
pub async fn resume_transaction(conn: &mut dyn MigrationConnection) -> Result<(), AdapterError> {
    conn.begin().await
}
