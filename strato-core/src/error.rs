//! Error taxonomy of the engine.

use crate::adapter::AdapterError;
use crate::history::HistoryError;
use crate::parser::ParseError;
use crate::result::MigrateResult;
use crate::version::MigrationVersion;

/// Context captured when a migration body fails, so the orchestrator can
/// populate the structured result and pick the rollback or forward-log path.
#[derive(Debug)]
pub struct MigrationFailure {
    /// Human-readable identification including the schema name.
    pub migration: String,
    pub version: Option<MigrationVersion>,
    pub description: String,
    pub script: String,
    pub kind: crate::migration::MigrationKind,
    pub checksum: Option<i32>,
    pub execution_time_ms: i64,
    pub in_transaction: bool,
    pub out_of_order: bool,
    /// The result accumulated up to the failure.
    pub result: Option<MigrateResult>,
    pub source: anyhow::Error,
}

#[derive(Debug, thiserror::Error)]
pub enum MigrateError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(
        "detected both transactional and non-transactional migrations within the same \
         migration group (even though mixed is false); first offending migration: {migration}"
    )]
    MixedTransactional { migration: String },

    #[error("schema {schema} contains a failed migration {migration}; repair it before migrating")]
    FailedMigrationPresent { schema: String, migration: String },

    #[error("migration of {} failed: {}", .0.migration, .0.source)]
    MigrationFailed(Box<MigrationFailure>),

    #[error("unable to acquire the schema history lock")]
    LockAcquisition(#[source] HistoryError),

    #[error(transparent)]
    History(#[from] HistoryError),

    #[error(transparent)]
    Adapter(#[from] AdapterError),

    #[error("migration resolver failed: {0}")]
    Resolver(#[source] anyhow::Error),

    #[error("callback {event} failed: {source}")]
    Callback {
        event: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl MigrateError {
    /// The structured result accumulated before the failure, when the error
    /// kind carries one.
    pub fn migrate_result(&self) -> Option<&MigrateResult> {
        match self {
            MigrateError::MigrationFailed(failure) => failure.result.as_ref(),
            _ => None,
        }
    }
}
