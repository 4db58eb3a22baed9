//! Run configuration.

use std::time::Duration;

use crate::migration::ResolvedMigration;
use crate::version::{MigrationVersion, Target};

/// Default wait bound for the schema history lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(60);

/// Default name of the schema history table.
pub const DEFAULT_HISTORY_TABLE: &str = "strato_history";

/// Selector restricting which resolved migrations count as pending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CherryPick {
    Version(MigrationVersion),
    /// Matches repeatable migrations by description.
    Description(String),
}

impl CherryPick {
    pub fn matches(&self, migration: &ResolvedMigration) -> bool {
        match self {
            CherryPick::Version(version) => migration.version.as_ref() == Some(version),
            CherryPick::Description(description) => {
                migration.version.is_none() && migration.description == *description
            }
        }
    }
}

/// A `kind:status` pattern downgrading a reported state to a warning,
/// e.g. `*:future` or `repeatable:missing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IgnorePattern {
    kind: PatternKind,
    status: PatternStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PatternKind {
    Versioned,
    Repeatable,
    Any,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PatternStatus {
    Missing,
    Future,
    Ignored,
    Pending,
    Failed,
    Any,
}

#[derive(Debug, thiserror::Error)]
#[error("invalid ignore pattern {pattern:?}: expected <kind>:<status>")]
pub struct IgnorePatternError {
    pub pattern: String,
}

impl IgnorePattern {
    pub fn parse(pattern: &str) -> Result<Self, IgnorePatternError> {
        let err = || IgnorePatternError {
            pattern: pattern.to_owned(),
        };

        let (kind, status) = pattern.split_once(':').ok_or_else(err)?;
        let kind = match kind.to_ascii_lowercase().as_str() {
            "versioned" => PatternKind::Versioned,
            "repeatable" => PatternKind::Repeatable,
            "*" => PatternKind::Any,
            _ => return Err(err()),
        };
        let status = match status.to_ascii_lowercase().as_str() {
            "missing" => PatternStatus::Missing,
            "future" => PatternStatus::Future,
            "ignored" => PatternStatus::Ignored,
            "pending" => PatternStatus::Pending,
            "failed" => PatternStatus::Failed,
            "*" => PatternStatus::Any,
            _ => return Err(err()),
        };

        Ok(Self { kind, status })
    }

    fn covers_kind(&self, versioned: bool) -> bool {
        match self.kind {
            PatternKind::Versioned => versioned,
            PatternKind::Repeatable => !versioned,
            PatternKind::Any => true,
        }
    }

    fn covers_status(&self, status: PatternStatus) -> bool {
        self.status == status || self.status == PatternStatus::Any
    }
}

/// Whether `*:future`-style patterns cover future migrations of any kind.
pub(crate) fn is_future_ignored(patterns: &[IgnorePattern]) -> bool {
    patterns
        .iter()
        .any(|p| p.covers_kind(true) && p.covers_status(PatternStatus::Future))
}

/// Configuration consumed by the planner and the engine.
#[derive(Debug, Clone)]
pub struct MigrateConfig {
    /// Target schema name, used in messages and for `change_current_schema`.
    pub schema: String,
    /// Schema history table name.
    pub table: String,
    /// Run every group of this invocation inside one history lock and, if
    /// the group is transactional, one transaction.
    pub group: bool,
    /// Allow transactional and non-transactional migrations in one group.
    pub mixed: bool,
    /// Allow applying pending versions below the current version.
    pub out_of_order: bool,
    pub target: Target,
    /// Empty means no restriction.
    pub cherry_pick: Vec<CherryPick>,
    /// Record migrations in history without executing them.
    pub skip_executing_migrations: bool,
    pub ignore_patterns: Vec<IgnorePattern>,
    /// Recorded in `installed_by`; defaults to the database user.
    pub installed_by: Option<String>,
    pub lock_timeout: Duration,
}

impl Default for MigrateConfig {
    fn default() -> Self {
        Self {
            schema: "public".to_owned(),
            table: DEFAULT_HISTORY_TABLE.to_owned(),
            group: false,
            mixed: false,
            out_of_order: false,
            target: Target::Latest,
            cherry_pick: Vec::new(),
            skip_executing_migrations: false,
            ignore_patterns: Vec::new(),
            installed_by: None,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }
}

impl MigrateConfig {
    pub fn builder() -> MigrateConfigBuilder {
        MigrateConfigBuilder::new()
    }
}

/// Builder for [`MigrateConfig`].
#[derive(Debug, Default)]
pub struct MigrateConfigBuilder {
    config: MigrateConfig,
}

impl MigrateConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: MigrateConfig::default(),
        }
    }

    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.config.schema = schema.into();
        self
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.config.table = table.into();
        self
    }

    pub fn group(mut self, group: bool) -> Self {
        self.config.group = group;
        self
    }

    pub fn mixed(mut self, mixed: bool) -> Self {
        self.config.mixed = mixed;
        self
    }

    pub fn out_of_order(mut self, out_of_order: bool) -> Self {
        self.config.out_of_order = out_of_order;
        self
    }

    pub fn target(mut self, target: Target) -> Self {
        self.config.target = target;
        self
    }

    pub fn cherry_pick(mut self, picks: Vec<CherryPick>) -> Self {
        self.config.cherry_pick = picks;
        self
    }

    pub fn skip_executing_migrations(mut self, skip: bool) -> Self {
        self.config.skip_executing_migrations = skip;
        self
    }

    pub fn ignore_patterns(mut self, patterns: Vec<IgnorePattern>) -> Self {
        self.config.ignore_patterns = patterns;
        self
    }

    pub fn installed_by(mut self, user: impl Into<String>) -> Self {
        self.config.installed_by = Some(user.into());
        self
    }

    pub fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.config.lock_timeout = timeout;
        self
    }

    pub fn build(self) -> MigrateConfig {
        self.config
    }
}
