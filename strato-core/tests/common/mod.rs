//! Shared fixtures: a scripted database adapter and migration executors.

use std::sync::Arc;

use parking_lot::Mutex;

use strato_core::{
    AdapterError, DatabaseAdapter, MigrationConnection, MigrationContext, MigrationExecutor,
    MigrationKind, MigrationVersion, ResolvedMigration,
};

/// Everything the fake database observed, in order.
pub type Log = Arc<Mutex<Vec<String>>>;

pub fn new_log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

/// An adapter whose connections record every operation into a shared log.
pub struct StubAdapter {
    pub supports_ddl_transactions: bool,
    pub single_connection: bool,
    pub log: Log,
}

impl StubAdapter {
    pub fn new(log: Log) -> Self {
        Self {
            supports_ddl_transactions: true,
            single_connection: false,
            log,
        }
    }

    pub fn without_ddl_transactions(mut self) -> Self {
        self.supports_ddl_transactions = false;
        self
    }
}

#[async_trait::async_trait]
impl DatabaseAdapter for StubAdapter {
    fn name(&self) -> &str {
        "StubDB"
    }

    fn supports_ddl_transactions(&self) -> bool {
        self.supports_ddl_transactions
    }

    fn use_single_connection(&self) -> bool {
        self.single_connection
    }

    async fn migration_connection(&self) -> Result<Box<dyn MigrationConnection>, AdapterError> {
        Ok(Box::new(StubConnection {
            log: self.log.clone(),
            open: false,
        }))
    }
}

pub struct StubConnection {
    log: Log,
    open: bool,
}

#[async_trait::async_trait]
impl MigrationConnection for StubConnection {
    async fn execute(&mut self, sql: &str) -> Result<(), AdapterError> {
        self.log.lock().push(sql.to_owned());
        Ok(())
    }

    async fn begin(&mut self) -> Result<(), AdapterError> {
        self.open = true;
        self.log.lock().push("BEGIN".to_owned());
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), AdapterError> {
        self.open = false;
        self.log.lock().push("COMMIT".to_owned());
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), AdapterError> {
        self.open = false;
        self.log.lock().push("ROLLBACK".to_owned());
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.open
    }

    async fn restore_original_state(&mut self) -> Result<(), AdapterError> {
        Ok(())
    }

    async fn change_current_schema(&mut self, _schema: &str) -> Result<(), AdapterError> {
        Ok(())
    }
}

/// Executes one statement against the context connection, or fails.
pub struct ScriptedExecutor {
    pub sql: String,
    pub in_transaction: bool,
    pub fail: bool,
}

#[async_trait::async_trait]
impl MigrationExecutor for ScriptedExecutor {
    fn can_execute_in_transaction(&self) -> bool {
        self.in_transaction
    }

    async fn migrate(&self, ctx: &mut MigrationContext<'_>) -> anyhow::Result<()> {
        ctx.connection.execute(&self.sql).await?;
        if self.fail {
            anyhow::bail!("statement raised an error");
        }
        Ok(())
    }
}

pub fn versioned(version: &str, description: &str) -> ResolvedMigration {
    versioned_with(version, description, true, false)
}

pub fn versioned_with(
    version: &str,
    description: &str,
    in_transaction: bool,
    fail: bool,
) -> ResolvedMigration {
    ResolvedMigration {
        version: Some(MigrationVersion::parse(version).unwrap()),
        description: description.to_owned(),
        kind: MigrationKind::Sql,
        script: format!("V{version}__{description}.sql"),
        checksum: Some(version.len() as i32 * 31),
        executor: Arc::new(ScriptedExecutor {
            sql: format!("APPLY V{version}"),
            in_transaction,
            fail,
        }),
    }
}

pub fn repeatable(description: &str, checksum: i32) -> ResolvedMigration {
    ResolvedMigration {
        version: None,
        description: description.to_owned(),
        kind: MigrationKind::Sql,
        script: format!("R__{description}.sql"),
        checksum: Some(checksum),
        executor: Arc::new(ScriptedExecutor {
            sql: format!("APPLY R {description}"),
            in_transaction: true,
            fail: false,
        }),
    }
}
