//! Structured output of a migration run.

use crate::info::MigrationInfo;
use crate::migration::MigrationKind;

/// One attempted migration in a [`MigrateResult`].
#[derive(Debug, Clone, serde::Serialize)]
pub struct MigrateOutput {
    /// Empty for repeatable migrations.
    pub version: String,
    pub description: String,
    pub kind: MigrationKind,
    pub filepath: String,
    pub execution_time_ms: i64,
    /// `Success`, `Failed`, or `Rolled back` after a group rollback.
    pub state: String,
}

/// Everything a caller needs to know about one `migrate()` invocation.
#[derive(Debug, Clone, serde::Serialize)]
pub struct MigrateResult {
    pub initial_schema_version: Option<String>,
    pub target_schema_version: Option<String>,
    pub schema_name: String,
    pub migrations_executed: u32,
    /// One entry per attempted migration, in execution order.
    pub migrations: Vec<MigrateOutput>,
    pub warnings: Vec<String>,
    pub success: bool,
    pub database: String,
    pub engine_version: String,
}

impl MigrateResult {
    pub fn new(database: impl Into<String>, schema: impl Into<String>) -> Self {
        Self {
            initial_schema_version: None,
            target_schema_version: None,
            schema_name: schema.into(),
            migrations_executed: 0,
            migrations: Vec::new(),
            warnings: Vec::new(),
            success: false,
            database: database.into(),
            engine_version: env!("CARGO_PKG_VERSION").to_owned(),
        }
    }

    pub fn add_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    pub(crate) fn put_successful(&mut self, migration: &MigrationInfo, execution_time_ms: i64) {
        self.migrations
            .push(output(migration, execution_time_ms, "Success"));
    }

    pub(crate) fn put_failed(&mut self, migration: &MigrationInfo, execution_time_ms: i64) {
        self.migrations
            .push(output(migration, execution_time_ms, "Failed"));
    }

    /// Rewrite previously successful entries after a group rollback.
    pub(crate) fn mark_rolled_back(&mut self) {
        for output in &mut self.migrations {
            if output.state == "Success" {
                output.state = "Rolled back".to_owned();
            }
        }
    }

    /// The highest version actually reached, read backwards off the
    /// attempted migrations.
    pub(crate) fn last_versioned(&self) -> Option<String> {
        self.migrations
            .iter()
            .rev()
            .map(|m| &m.version)
            .find(|v| !v.is_empty())
            .cloned()
    }
}

fn output(migration: &MigrationInfo, execution_time_ms: i64, state: &str) -> MigrateOutput {
    MigrateOutput {
        version: migration
            .version()
            .map(|v| v.as_str().to_owned())
            .unwrap_or_default(),
        description: migration.description().to_owned(),
        kind: migration.kind(),
        filepath: migration.script().to_owned(),
        execution_time_ms,
        state: state.to_owned(),
    }
}
