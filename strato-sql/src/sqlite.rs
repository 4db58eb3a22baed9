//! SQLite adapter.

use sqlx::pool::PoolConnection;
use sqlx::{Executor, Sqlite, SqlitePool};
use tracing::debug;

use strato_core::{AdapterError, DatabaseAdapter, MigrationConnection};

/// SQLite capability record and connection factory.
///
/// SQLite is an embedded single-writer database: DDL is transactional, and
/// the engine treats history and user statements as sharing one physical
/// connection for transaction purposes.
#[derive(Debug, Clone)]
pub struct SqliteAdapter {
    pool: SqlitePool,
}

impl SqliteAdapter {
    pub fn new(pool: &SqlitePool) -> Self {
        Self { pool: pool.clone() }
    }
}

#[async_trait::async_trait]
impl DatabaseAdapter for SqliteAdapter {
    fn name(&self) -> &str {
        "SQLite"
    }

    fn supports_ddl_transactions(&self) -> bool {
        true
    }

    fn use_single_connection(&self) -> bool {
        true
    }

    async fn migration_connection(&self) -> Result<Box<dyn MigrationConnection>, AdapterError> {
        let conn = self.pool.acquire().await.map_err(db_err)?;
        Ok(Box::new(SqliteMigrationConnection { conn, open: false }))
    }
}

pub struct SqliteMigrationConnection {
    conn: PoolConnection<Sqlite>,
    open: bool,
}

fn db_err(err: impl Into<anyhow::Error>) -> AdapterError {
    AdapterError::Db(err.into())
}

#[async_trait::async_trait]
impl MigrationConnection for SqliteMigrationConnection {
    async fn execute(&mut self, sql: &str) -> Result<(), AdapterError> {
        Executor::execute(&mut *self.conn, sqlx::raw_sql(sql))
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn begin(&mut self) -> Result<(), AdapterError> {
        self.conn.execute("BEGIN").await.map_err(db_err)?;
        self.open = true;
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), AdapterError> {
        self.conn.execute("COMMIT").await.map_err(db_err)?;
        self.open = false;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), AdapterError> {
        self.conn.execute("ROLLBACK").await.map_err(db_err)?;
        self.open = false;
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.open
    }

    /// SQLite has no per-session variables worth resetting.
    async fn restore_original_state(&mut self) -> Result<(), AdapterError> {
        Ok(())
    }

    /// There is only the main database; attached schemas are out of scope.
    async fn change_current_schema(&mut self, schema: &str) -> Result<(), AdapterError> {
        debug!("SQLite has a single schema; ignoring switch to {schema}");
        Ok(())
    }
}
