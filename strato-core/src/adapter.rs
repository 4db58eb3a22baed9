//! Database capability seams.
//!
//! The engine never talks to a driver directly; it goes through
//! [`DatabaseAdapter`] for dialect facts and through [`MigrationConnection`]
//! for everything executed on the user-objects connection. Backends live in
//! `strato-sql`, one per database feature.

#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("database error: {0}")]
    Db(#[from] anyhow::Error),

    #[error("{0}")]
    Unsupported(String),
}

/// The connection used to run user migrations.
///
/// Exclusively owned by the engine for the duration of a run. Transaction
/// control is explicit: an open transaction is the moral equivalent of
/// "auto-commit off" on the wire.
#[async_trait::async_trait]
pub trait MigrationConnection: Send {
    /// Execute a single SQL statement.
    async fn execute(&mut self, sql: &str) -> Result<(), AdapterError>;

    /// Transmit an inline bulk payload for a `COPY ... FROM STDIN`
    /// statement. Only PostgreSQL supports this.
    async fn copy_in(&mut self, _sql: &str, _data: &str) -> Result<(), AdapterError> {
        Err(AdapterError::Unsupported(
            "bulk copy is not supported by this database".to_owned(),
        ))
    }

    async fn begin(&mut self) -> Result<(), AdapterError>;

    async fn commit(&mut self) -> Result<(), AdapterError>;

    async fn rollback(&mut self) -> Result<(), AdapterError>;

    /// Whether an explicit transaction is currently open on this connection.
    fn in_transaction(&self) -> bool;

    /// Reset session state that a migration may have changed: user-defined
    /// variables, session flags, the search path. Called between migrations.
    async fn restore_original_state(&mut self) -> Result<(), AdapterError>;

    /// Point the connection at the target schema.
    async fn change_current_schema(&mut self, schema: &str) -> Result<(), AdapterError>;
}

/// Per-database facts and connection factory.
#[async_trait::async_trait]
pub trait DatabaseAdapter: Send + Sync {
    /// Product name for log lines and results, e.g. `PostgreSQL`.
    fn name(&self) -> &str;

    /// Whether DDL participates in transactions. Groups on databases
    /// without DDL transactions cannot be rolled back as a unit.
    fn supports_ddl_transactions(&self) -> bool;

    /// Whether history and user statements share one physical connection
    /// (embedded databases). Changes how non-transactional migrations
    /// interact with the surrounding history transaction.
    fn use_single_connection(&self) -> bool {
        false
    }

    /// Open the user-objects connection for a run.
    async fn migration_connection(&self) -> Result<Box<dyn MigrationConnection>, AdapterError>;
}
