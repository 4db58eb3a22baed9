//! Derived per-migration states.

use std::fmt;

/// The state of a migration as seen by the info service.
///
/// A state is a pure function of the (resolved, applied) pair and the
/// run configuration; it is recomputed on every refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationState {
    /// Resolved and not yet applied; will run.
    Pending,
    /// Resolved with a version above the configured target; will not run.
    AboveTarget,
    /// Resolved with a version at or below the baseline; will never run.
    BelowBaseline,
    /// The row (or version) marking the schema baseline.
    Baseline,
    /// Resolved and skipped, e.g. an older version with out-of-order disabled.
    Ignored,
    /// Resolved but excluded by the cherry-pick selection.
    Available,
    /// Applied successfully, but no resolved migration matches it anymore.
    MissingSuccess,
    /// Failed when applied, and no resolved migration matches it anymore.
    MissingFailed,
    /// Applied successfully by a newer catalog than the one resolved here.
    FutureSuccess,
    /// Failed when applied by a newer catalog than the one resolved here.
    FutureFailed,
    /// Applied successfully.
    Success,
    /// Applied and failed.
    Failed,
    /// Applied successfully, but after a higher version had already run.
    OutOfOrder,
    /// Applied repeatable whose checksum no longer matches the resolved one.
    Outdated,
    /// Applied repeatable that has since been re-applied with a newer checksum.
    Superseded,
}

impl MigrationState {
    pub fn display_name(self) -> &'static str {
        match self {
            MigrationState::Pending => "Pending",
            MigrationState::AboveTarget => "Above Target",
            MigrationState::BelowBaseline => "Below Baseline",
            MigrationState::Baseline => "Baseline",
            MigrationState::Ignored => "Ignored",
            MigrationState::Available => "Available",
            MigrationState::MissingSuccess => "Missing",
            MigrationState::MissingFailed => "Missing (Failed)",
            MigrationState::FutureSuccess => "Future",
            MigrationState::FutureFailed => "Future (Failed)",
            MigrationState::Success => "Success",
            MigrationState::Failed => "Failed",
            MigrationState::OutOfOrder => "Out of Order",
            MigrationState::Outdated => "Outdated",
            MigrationState::Superseded => "Superseded",
        }
    }

    /// Whether a history row exists for this migration.
    pub fn is_applied(self) -> bool {
        matches!(
            self,
            MigrationState::Baseline
                | MigrationState::MissingSuccess
                | MigrationState::MissingFailed
                | MigrationState::FutureSuccess
                | MigrationState::FutureFailed
                | MigrationState::Success
                | MigrationState::Failed
                | MigrationState::OutOfOrder
                | MigrationState::Outdated
                | MigrationState::Superseded
        )
    }

    pub fn is_failed(self) -> bool {
        matches!(
            self,
            MigrationState::MissingFailed | MigrationState::FutureFailed | MigrationState::Failed
        )
    }

    /// Whether the migration is known to the resolver.
    pub fn is_resolved(self) -> bool {
        matches!(
            self,
            MigrationState::Pending
                | MigrationState::AboveTarget
                | MigrationState::BelowBaseline
                | MigrationState::Ignored
                | MigrationState::Available
                | MigrationState::Success
                | MigrationState::Failed
                | MigrationState::OutOfOrder
                | MigrationState::Outdated
                | MigrationState::Superseded
        )
    }
}

impl fmt::Display for MigrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}
