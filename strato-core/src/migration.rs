//! Resolved and applied migrations, and the executor contract.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::adapter::MigrationConnection;
use crate::config::MigrateConfig;
use crate::version::MigrationVersion;

/// How a migration is expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MigrationKind {
    /// A SQL script.
    Sql,
    /// A procedural migration written in Rust.
    Code,
    /// A baseline marker; never executed.
    Baseline,
}

impl MigrationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MigrationKind::Sql => "SQL",
            MigrationKind::Code => "CODE",
            MigrationKind::Baseline => "BASELINE",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "SQL" => Some(MigrationKind::Sql),
            "CODE" => Some(MigrationKind::Code),
            "BASELINE" => Some(MigrationKind::Baseline),
            _ => None,
        }
    }
}

impl fmt::Display for MigrationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Execution context handed to a migration body.
pub struct MigrationContext<'a> {
    pub config: &'a MigrateConfig,
    /// Live connection bound to the target schema.
    pub connection: &'a mut dyn MigrationConnection,
}

/// The executable side of a resolved migration.
///
/// Implementations decide up front whether their statements may run inside
/// a transaction; the planner reduces this over a group to pick the
/// transactional boundary.
#[async_trait::async_trait]
pub trait MigrationExecutor: Send + Sync {
    fn can_execute_in_transaction(&self) -> bool;

    async fn migrate(&self, ctx: &mut MigrationContext<'_>) -> anyhow::Result<()>;
}

/// A migration produced by the resolver, immutable for the duration of a run.
#[derive(Clone)]
pub struct ResolvedMigration {
    /// Absent for repeatable migrations.
    pub version: Option<MigrationVersion>,
    pub description: String,
    pub kind: MigrationKind,
    /// Script identifier, e.g. a file name.
    pub script: String,
    pub checksum: Option<i32>,
    pub executor: Arc<dyn MigrationExecutor>,
}

impl ResolvedMigration {
    pub fn is_repeatable(&self) -> bool {
        self.version.is_none()
    }

    /// Identifier used in log lines and error messages: the version for
    /// versioned migrations, the description for repeatables.
    pub fn identifier(&self) -> String {
        match &self.version {
            Some(version) => version.to_string(),
            None => self.description.clone(),
        }
    }
}

impl fmt::Debug for ResolvedMigration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedMigration")
            .field("version", &self.version)
            .field("description", &self.description)
            .field("kind", &self.kind)
            .field("script", &self.script)
            .field("checksum", &self.checksum)
            .finish_non_exhaustive()
    }
}

impl PartialEq for ResolvedMigration {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version
            && self.description == other.description
            && self.kind == other.kind
            && self.script == other.script
            && self.checksum == other.checksum
    }
}

/// A row of the schema history table.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedMigration {
    pub installed_rank: i32,
    pub version: Option<MigrationVersion>,
    pub description: String,
    pub kind: MigrationKind,
    pub script: String,
    pub checksum: Option<i32>,
    pub installed_by: String,
    pub installed_on: DateTime<Utc>,
    pub execution_time_ms: i64,
    pub success: bool,
}

impl AppliedMigration {
    /// A stored NULL checksum matches any resolved checksum (baseline and
    /// repair rows are recorded without one).
    pub fn checksum_matches(&self, resolved: Option<i32>) -> bool {
        match self.checksum {
            None => true,
            Some(stored) => Some(stored) == resolved,
        }
    }
}
