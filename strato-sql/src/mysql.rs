//! MySQL / MariaDB adapter.

use sqlx::pool::PoolConnection;
use sqlx::{Executor, MySql, MySqlPool};
use tracing::debug;

use strato_core::{AdapterError, DatabaseAdapter, MigrationConnection};

const USER_VARIABLES_TABLE: &str = "performance_schema.user_variables_by_thread";

/// MySQL capability record and connection factory.
///
/// MySQL DDL commits implicitly, so groups cannot be rolled back as a unit;
/// the engine records failed rows instead.
#[derive(Debug, Clone)]
pub struct MySqlAdapter {
    pool: MySqlPool,
}

impl MySqlAdapter {
    pub fn new(pool: &MySqlPool) -> Self {
        Self { pool: pool.clone() }
    }
}

#[async_trait::async_trait]
impl DatabaseAdapter for MySqlAdapter {
    fn name(&self) -> &str {
        "MySQL"
    }

    fn supports_ddl_transactions(&self) -> bool {
        false
    }

    async fn migration_connection(&self) -> Result<Box<dyn MigrationConnection>, AdapterError> {
        let mut conn = self.pool.acquire().await.map_err(db_err)?;

        let original_foreign_key_checks: i64 =
            sqlx::query_scalar("SELECT @@foreign_key_checks")
                .fetch_one(&mut *conn)
                .await
                .map_err(db_err)?;
        let original_sql_safe_updates: i64 = sqlx::query_scalar("SELECT @@sql_safe_updates")
            .fetch_one(&mut *conn)
            .await
            .map_err(db_err)?;

        // The current user needs a SELECT grant on performance_schema for
        // user variable reset; probe once and remember the answer.
        let user_variables_query = format!(
            "SELECT variable_name FROM {USER_VARIABLES_TABLE} WHERE variable_value IS NOT NULL"
        );
        let can_reset_user_variables = sqlx::query_scalar::<_, String>(&user_variables_query)
            .fetch_all(&mut *conn)
            .await
            .map(|_| true)
            .unwrap_or_else(|err| {
                debug!("disabled user variable reset: {USER_VARIABLES_TABLE} cannot be queried ({err})");
                false
            });

        Ok(Box::new(MySqlMigrationConnection {
            conn,
            original_foreign_key_checks,
            original_sql_safe_updates,
            user_variables_query,
            can_reset_user_variables,
            open: false,
        }))
    }
}

pub struct MySqlMigrationConnection {
    conn: PoolConnection<MySql>,
    original_foreign_key_checks: i64,
    original_sql_safe_updates: i64,
    user_variables_query: String,
    can_reset_user_variables: bool,
    open: bool,
}

impl MySqlMigrationConnection {
    /// Null out user-defined variables so they cannot leak between
    /// migrations.
    async fn reset_user_variables(&mut self) -> Result<(), AdapterError> {
        if !self.can_reset_user_variables {
            return Ok(());
        }

        let user_variables: Vec<String> = sqlx::query_scalar(&self.user_variables_query)
            .fetch_all(&mut *self.conn)
            .await
            .map_err(db_err)?;

        if user_variables.is_empty() {
            return Ok(());
        }

        let assignments: Vec<String> = user_variables
            .iter()
            .map(|name| format!("@{name}=NULL"))
            .collect();
        let sql = format!("SET {}", assignments.join(","));
        self.conn.execute(sql.as_str()).await.map_err(db_err)?;

        Ok(())
    }
}

fn db_err(err: impl Into<anyhow::Error>) -> AdapterError {
    AdapterError::Db(err.into())
}

#[async_trait::async_trait]
impl MigrationConnection for MySqlMigrationConnection {
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

    async fn restore_original_state(&mut self) -> Result<(), AdapterError> {
        self.reset_user_variables().await?;
        let sql = format!(
            "SET foreign_key_checks={}, sql_safe_updates={}",
            self.original_foreign_key_checks, self.original_sql_safe_updates
        );
        self.conn.execute(sql.as_str()).await.map_err(db_err)?;
        Ok(())
    }

    async fn change_current_schema(&mut self, schema: &str) -> Result<(), AdapterError> {
        let sql = format!("USE `{schema}`");
        self.conn.execute(sql.as_str()).await.map_err(db_err)?;
        Ok(())
    }
}
