//! PostgreSQL adapter.

use sqlx::pool::PoolConnection;
use sqlx::{Executor, PgPool, Postgres};
use tracing::debug;

use strato_core::parser::ParsingContext;
use strato_core::{AdapterError, DatabaseAdapter, MigrationConnection};

/// PostgreSQL capability record and connection factory.
#[derive(Debug, Clone)]
pub struct PgAdapter {
    pool: PgPool,
}

impl PgAdapter {
    pub fn new(pool: &PgPool) -> Self {
        Self { pool: pool.clone() }
    }

    /// Major server version, e.g. `14`. `None` when the server cannot be
    /// queried; the parser then falls back to its conservative defaults.
    pub async fn server_version_major(&self) -> Option<u32> {
        let version: Result<String, _> = sqlx::query_scalar("SHOW server_version_num")
            .fetch_one(&self.pool)
            .await;

        match version {
            Ok(num) => num.parse::<u32>().ok().map(|n| n / 10_000),
            Err(err) => {
                debug!("unable to determine server version: {err}");
                None
            }
        }
    }

    /// Parsing context for scripts targeting this database.
    pub async fn parsing_context(&self) -> ParsingContext {
        ParsingContext {
            database_version: self.server_version_major().await,
            ..ParsingContext::default()
        }
    }
}

#[async_trait::async_trait]
impl DatabaseAdapter for PgAdapter {
    fn name(&self) -> &str {
        "PostgreSQL"
    }

    fn supports_ddl_transactions(&self) -> bool {
        true
    }

    async fn migration_connection(&self) -> Result<Box<dyn MigrationConnection>, AdapterError> {
        let mut conn = self.pool.acquire().await.map_err(db_err)?;

        let original_search_path: String = sqlx::query_scalar("SHOW search_path")
            .fetch_one(&mut *conn)
            .await
            .map_err(db_err)?;

        Ok(Box::new(PgMigrationConnection {
            conn,
            original_search_path,
            open: false,
        }))
    }
}

/// The user-objects connection: session state captured at connect time is
/// restored between migrations.
pub struct PgMigrationConnection {
    conn: PoolConnection<Postgres>,
    original_search_path: String,
    open: bool,
}

fn db_err(err: impl Into<anyhow::Error>) -> AdapterError {
    AdapterError::Db(err.into())
}

#[async_trait::async_trait]
impl MigrationConnection for PgMigrationConnection {
    async fn execute(&mut self, sql: &str) -> Result<(), AdapterError> {
        Executor::execute(&mut *self.conn, sqlx::raw_sql(sql))
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn copy_in(&mut self, sql: &str, data: &str) -> Result<(), AdapterError> {
        let mut copy = self.conn.copy_in_raw(sql).await.map_err(db_err)?;
        copy.send(data.as_bytes()).await.map_err(db_err)?;
        copy.finish().await.map_err(db_err)?;
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

    /// Put the session back the way we found it: migrations may have
    /// changed the search path or set a role.
    async fn restore_original_state(&mut self) -> Result<(), AdapterError> {
        self.conn.execute("RESET ROLE").await.map_err(db_err)?;
        let sql = format!("SET search_path = {}", self.original_search_path);
        self.conn.execute(sql.as_str()).await.map_err(db_err)?;
        Ok(())
    }

    async fn change_current_schema(&mut self, schema: &str) -> Result<(), AdapterError> {
        let sql = format!("SET search_path TO \"{schema}\"");
        self.conn.execute(sql.as_str()).await.map_err(db_err)?;
        Ok(())
    }
}
