//! Joining resolved migrations with the schema history.
//!
//! The service materializes a snapshot: every resolved and/or applied
//! migration, each with a derived [`MigrationState`]. States are a pure
//! function of the snapshot inputs and the run configuration; a fresh
//! service is built for every planning iteration.

use crate::config::MigrateConfig;
use crate::migration::{AppliedMigration, MigrationKind, ResolvedMigration};
use crate::state::MigrationState;
use crate::version::{MigrationVersion, Target};

/// A resolved and/or applied migration with its derived state.
#[derive(Debug, Clone)]
pub struct MigrationInfo {
    pub resolved: Option<ResolvedMigration>,
    pub applied: Option<AppliedMigration>,
    pub state: MigrationState,
}

impl MigrationInfo {
    pub fn version(&self) -> Option<&MigrationVersion> {
        self.resolved
            .as_ref()
            .and_then(|r| r.version.as_ref())
            .or_else(|| self.applied.as_ref().and_then(|a| a.version.as_ref()))
    }

    pub fn description(&self) -> &str {
        match (&self.resolved, &self.applied) {
            (Some(resolved), _) => &resolved.description,
            (None, Some(applied)) => &applied.description,
            (None, None) => "",
        }
    }

    pub fn script(&self) -> &str {
        match (&self.resolved, &self.applied) {
            (Some(resolved), _) => &resolved.script,
            (None, Some(applied)) => &applied.script,
            (None, None) => "",
        }
    }

    pub fn kind(&self) -> MigrationKind {
        match (&self.resolved, &self.applied) {
            (Some(resolved), _) => resolved.kind,
            (None, Some(applied)) => applied.kind,
            (None, None) => MigrationKind::Sql,
        }
    }

    pub fn checksum(&self) -> Option<i32> {
        self.resolved.as_ref().and_then(|r| r.checksum)
    }

    /// Identifier for messages: version, or description for repeatables.
    pub fn identifier(&self) -> String {
        match self.version() {
            Some(version) => version.to_string(),
            None => self.description().to_owned(),
        }
    }

    pub fn can_execute_in_transaction(&self) -> bool {
        self.resolved
            .as_ref()
            .map(|r| r.executor.can_execute_in_transaction())
            .unwrap_or(true)
    }
}

/// The refreshed snapshot with its pure queries.
#[derive(Debug)]
pub struct MigrationInfoService {
    infos: Vec<MigrationInfo>,
    current_version: MigrationVersion,
}

impl MigrationInfoService {
    /// Join `resolved` and `applied` and derive every state.
    pub fn new(
        resolved: Vec<ResolvedMigration>,
        applied: Vec<AppliedMigration>,
        config: &MigrateConfig,
    ) -> Self {
        let mut versioned: Vec<&ResolvedMigration> =
            resolved.iter().filter(|r| r.version.is_some()).collect();
        versioned.sort_by(|a, b| a.version.cmp(&b.version));
        let repeatable: Vec<&ResolvedMigration> =
            resolved.iter().filter(|r| r.version.is_none()).collect();

        let max_resolved_version = versioned.iter().filter_map(|r| r.version.clone()).max();

        let baseline_version = applied
            .iter()
            .filter(|a| a.kind == MigrationKind::Baseline && a.success)
            .filter_map(|a| a.version.clone())
            .max();

        let current_version = applied
            .iter()
            .filter(|a| a.success)
            .filter_map(|a| a.version.clone())
            .max()
            .unwrap_or_else(MigrationVersion::empty);

        let target_bound: Option<MigrationVersion> = match &config.target {
            Target::Version(version) => Some(version.clone()),
            Target::Current => Some(current_version.clone()),
            Target::Latest | Target::Next => None,
        };

        let mut infos = Vec::new();

        // Applied versioned rows, joined by version.
        for row in applied.iter().filter(|a| a.version.is_some()) {
            let version = row.version.as_ref().expect("filtered on version");
            let matching = versioned
                .iter()
                .find(|r| r.version.as_ref() == Some(version))
                .map(|r| (*r).clone());

            let beyond_catalog = match &max_resolved_version {
                Some(max) => version > max,
                None => true,
            };

            let state = if row.kind == MigrationKind::Baseline {
                if row.success {
                    MigrationState::Baseline
                } else {
                    MigrationState::Failed
                }
            } else if !row.success {
                match (&matching, beyond_catalog) {
                    (Some(_), _) => MigrationState::Failed,
                    (None, true) => MigrationState::FutureFailed,
                    (None, false) => MigrationState::MissingFailed,
                }
            } else {
                match (&matching, beyond_catalog) {
                    (None, true) => MigrationState::FutureSuccess,
                    (None, false) => MigrationState::MissingSuccess,
                    (Some(_), _) => {
                        if applied_out_of_order(row, &applied) {
                            MigrationState::OutOfOrder
                        } else {
                            MigrationState::Success
                        }
                    }
                }
            };

            infos.push(MigrationInfo {
                resolved: matching,
                applied: Some(row.clone()),
                state,
            });
        }

        // Resolved versioned migrations without a history row.
        for migration in &versioned {
            let version = migration.version.as_ref().expect("versioned");
            let already_applied = applied
                .iter()
                .any(|a| a.version.as_ref() == Some(version));
            if already_applied {
                continue;
            }

            let state = if baseline_version
                .as_ref()
                .is_some_and(|baseline| version <= baseline)
            {
                MigrationState::BelowBaseline
            } else if target_bound
                .as_ref()
                .is_some_and(|bound| version > bound)
            {
                MigrationState::AboveTarget
            } else if !config.cherry_pick.is_empty()
                && !config.cherry_pick.iter().any(|p| p.matches(migration))
            {
                MigrationState::Available
            } else if *version < current_version && !config.out_of_order {
                MigrationState::Ignored
            } else {
                MigrationState::Pending
            };

            infos.push(MigrationInfo {
                resolved: Some((*migration).clone()),
                applied: None,
                state,
            });
        }

        // Applied repeatable rows, joined by description.
        for row in applied.iter().filter(|a| a.version.is_none()) {
            let latest = applied
                .iter()
                .filter(|a| a.version.is_none() && a.description == row.description)
                .map(|a| a.installed_rank)
                .max()
                == Some(row.installed_rank);
            let matching = repeatable
                .iter()
                .find(|r| r.description == row.description)
                .map(|r| (*r).clone());

            let state = if !latest {
                MigrationState::Superseded
            } else if !row.success {
                if matching.is_some() {
                    MigrationState::Failed
                } else {
                    MigrationState::MissingFailed
                }
            } else {
                match &matching {
                    None => MigrationState::MissingSuccess,
                    Some(resolved) => {
                        if row.checksum_matches(resolved.checksum) {
                            MigrationState::Success
                        } else {
                            MigrationState::Outdated
                        }
                    }
                }
            };

            infos.push(MigrationInfo {
                resolved: matching,
                applied: Some(row.clone()),
                state,
            });
        }

        // Repeatables that still need a run: never applied, or the stored
        // checksum no longer matches.
        for migration in &repeatable {
            let latest = applied
                .iter()
                .filter(|a| a.version.is_none() && a.description == migration.description)
                .max_by_key(|a| a.installed_rank);

            let needs_run = match latest {
                None => true,
                Some(row) => !row.checksum_matches(migration.checksum),
            };
            if !needs_run {
                continue;
            }

            let state = if !config.cherry_pick.is_empty()
                && !config.cherry_pick.iter().any(|p| p.matches(migration))
            {
                MigrationState::Available
            } else {
                MigrationState::Pending
            };

            infos.push(MigrationInfo {
                resolved: Some((*migration).clone()),
                applied: None,
                state,
            });
        }

        // Versioned by version, then repeatables by description; applied
        // repeatable rows precede the synthesized pending entry.
        infos.sort_by(|a, b| {
            let key = |info: &MigrationInfo| {
                (
                    info.version().is_none(),
                    info.version().cloned().unwrap_or_else(MigrationVersion::empty),
                    info.description().to_owned(),
                    info.applied
                        .as_ref()
                        .map(|a| a.installed_rank)
                        .unwrap_or(i32::MAX),
                )
            };
            key(a).cmp(&key(b))
        });

        Self {
            infos,
            current_version,
        }
    }

    pub fn all(&self) -> &[MigrationInfo] {
        &self.infos
    }

    /// The latest successful versioned applied migration.
    pub fn current(&self) -> Option<&MigrationInfo> {
        if self.current_version.is_empty() {
            return None;
        }
        self.infos.iter().find(|info| {
            info.applied
                .as_ref()
                .is_some_and(|a| a.success && a.version.as_ref() == Some(&self.current_version))
        })
    }

    pub fn current_version(&self) -> &MigrationVersion {
        &self.current_version
    }

    /// Resolved migrations awaiting execution, in execution order.
    pub fn pending(&self) -> Vec<&MigrationInfo> {
        self.infos
            .iter()
            .filter(|info| info.state == MigrationState::Pending)
            .collect()
    }

    /// Applied rows with no matching resolved migration and a version above
    /// the resolved catalog.
    pub fn future(&self) -> Vec<&MigrationInfo> {
        self.infos
            .iter()
            .filter(|info| {
                matches!(
                    info.state,
                    MigrationState::FutureSuccess | MigrationState::FutureFailed
                )
            })
            .collect()
    }

    /// Failed history rows, ordered by installed rank.
    pub fn failed(&self) -> Vec<&MigrationInfo> {
        let mut failed: Vec<&MigrationInfo> = self
            .infos
            .iter()
            .filter(|info| info.state.is_failed())
            .collect();
        failed.sort_by_key(|info| {
            info.applied
                .as_ref()
                .map(|a| a.installed_rank)
                .unwrap_or(i32::MAX)
        });
        failed
    }

    /// Everything the resolver knows about, in version order with
    /// repeatables last.
    pub fn resolved(&self) -> Vec<&MigrationInfo> {
        self.infos
            .iter()
            .filter(|info| info.state.is_resolved())
            .collect()
    }
}

/// A successful versioned row applied after a higher version had already
/// been recorded.
fn applied_out_of_order(row: &AppliedMigration, applied: &[AppliedMigration]) -> bool {
    let version = match &row.version {
        Some(version) => version,
        None => return false,
    };
    applied.iter().any(|other| {
        other.installed_rank < row.installed_rank
            && other.version.as_ref().is_some_and(|v| v > version)
    })
}
