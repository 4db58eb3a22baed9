//! SQL script migrations.

use std::sync::Arc;

use tracing::debug;

use strato_core::parser::{
    Dialect, ParseError, ParsedStatement, Parser, ParsingContext, StatementType,
};
use strato_core::{
    MigrationContext, MigrationExecutor, MigrationKind, MigrationVersion, ResolvedMigration,
};

/// A migration backed by a SQL script, parsed once at resolve time.
///
/// The migration-level transactionality is the conjunction of the
/// per-statement classification: one non-transactional statement makes the
/// whole script non-transactional.
#[derive(Debug)]
pub struct SqlScriptMigration {
    statements: Vec<ParsedStatement>,
    in_transaction: bool,
}

impl SqlScriptMigration {
    pub fn parse(
        script: &str,
        dialect: Arc<dyn Dialect>,
        context: ParsingContext,
    ) -> Result<Self, ParseError> {
        let statements = Parser::new(dialect, context).parse(script)?;
        let in_transaction = statements.iter().all(|s| s.can_execute_in_transaction());

        Ok(Self {
            statements,
            in_transaction,
        })
    }

    pub fn statements(&self) -> &[ParsedStatement] {
        &self.statements
    }

    /// Wrap into a versioned [`ResolvedMigration`].
    pub fn versioned(
        self,
        version: MigrationVersion,
        description: impl Into<String>,
        script_name: impl Into<String>,
        checksum: Option<i32>,
    ) -> ResolvedMigration {
        ResolvedMigration {
            version: Some(version),
            description: description.into(),
            kind: MigrationKind::Sql,
            script: script_name.into(),
            checksum,
            executor: Arc::new(self),
        }
    }

    /// Wrap into a repeatable [`ResolvedMigration`].
    pub fn repeatable(
        self,
        description: impl Into<String>,
        script_name: impl Into<String>,
        checksum: Option<i32>,
    ) -> ResolvedMigration {
        ResolvedMigration {
            version: None,
            description: description.into(),
            kind: MigrationKind::Sql,
            script: script_name.into(),
            checksum,
            executor: Arc::new(self),
        }
    }
}

#[async_trait::async_trait]
impl MigrationExecutor for SqlScriptMigration {
    fn can_execute_in_transaction(&self) -> bool {
        self.in_transaction
    }

    async fn migrate(&self, ctx: &mut MigrationContext<'_>) -> anyhow::Result<()> {
        for statement in &self.statements {
            debug!(
                "executing statement at line {}, column {}",
                statement.line, statement.col
            );
            match statement.kind {
                StatementType::CopyFromStdin => {
                    let data = statement.copy_data.as_deref().unwrap_or("");
                    ctx.connection.copy_in(&statement.sql, data).await?;
                }
                StatementType::Generic => {
                    ctx.connection.execute(&statement.sql).await?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strato_core::parser::{GenericDialect, PostgresDialect};

    #[test]
    fn script_transactionality_is_the_conjunction() {
        let script = "CREATE TABLE t (id INT);\nCREATE INDEX CONCURRENTLY i ON t (id);";
        let migration = SqlScriptMigration::parse(
            script,
            Arc::new(PostgresDialect),
            ParsingContext::default(),
        )
        .unwrap();

        assert!(!migration.can_execute_in_transaction());
        assert_eq!(migration.statements().len(), 2);
    }

    #[test]
    fn plain_script_stays_transactional() {
        let script = "CREATE TABLE t (id INT);\nINSERT INTO t VALUES (1);";
        let migration = SqlScriptMigration::parse(
            script,
            Arc::new(GenericDialect),
            ParsingContext::default(),
        )
        .unwrap();

        assert!(migration.can_execute_in_transaction());
    }

    #[test]
    fn parse_errors_surface_position() {
        let err = SqlScriptMigration::parse(
            "SELECT 'unterminated",
            Arc::new(GenericDialect),
            ParsingContext::default(),
        )
        .unwrap_err();

        assert_eq!(err.line, 1);
        assert!(err.message.contains("unterminated"));
    }
}
