//! Group planning: which pending migrations run next, and how.

use tracing::{debug, error, warn};

use crate::config::{self, MigrateConfig};
use crate::error::MigrateError;
use crate::info::{MigrationInfo, MigrationInfoService};
use crate::migration::ResolvedMigration;
use crate::state::MigrationState;
use crate::version::MigrationVersion;

/// One planned migration and whether it runs out of order.
#[derive(Debug, Clone)]
pub struct GroupEntry {
    pub info: MigrationInfo,
    pub out_of_order: bool,
}

/// An ordered batch of migrations; insertion order is execution order.
#[derive(Debug, Clone, Default)]
pub struct MigrationGroup {
    entries: Vec<GroupEntry>,
}

impl MigrationGroup {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[GroupEntry] {
        &self.entries
    }
}

/// Select the next group from the pending snapshot.
///
/// Entries already applied earlier in this run (tracked in
/// `applied_resolved`) are skipped so repeated planning over a stale
/// snapshot cannot re-run them. Without `group`, at most one migration is
/// selected per iteration.
pub(crate) fn plan_group(
    service: &MigrationInfoService,
    applied_resolved: &[ResolvedMigration],
    config: &MigrateConfig,
    current_version: &MigrationVersion,
) -> MigrationGroup {
    let mut group = MigrationGroup::default();

    for pending in service.pending() {
        let resolved = match &pending.resolved {
            Some(resolved) => resolved,
            None => continue,
        };
        if applied_resolved.contains(resolved) {
            continue;
        }

        let out_of_order = resolved
            .version
            .as_ref()
            .is_some_and(|version| version < current_version);

        group.entries.push(GroupEntry {
            info: pending.clone(),
            out_of_order,
        });

        if !config.group {
            break;
        }
    }

    group
}

/// Reduce per-migration transactionality to the group's transactional mode.
///
/// Returns `true` for a transactional group. A mix of transactional and
/// non-transactional members is an error unless `mixed` is set, in which
/// case the whole group runs non-transactionally.
pub(crate) fn group_transaction_mode(
    group: &MigrationGroup,
    config: &MigrateConfig,
) -> Result<bool, MigrateError> {
    let mut execute_in_transaction = true;
    let mut first = true;

    for entry in group.entries() {
        let in_transaction = entry.info.can_execute_in_transaction();

        if first {
            execute_in_transaction = in_transaction;
            first = false;
            continue;
        }

        if !config.mixed && execute_in_transaction != in_transaction {
            return Err(MigrateError::MixedTransactional {
                migration: offending_label(&entry.info, in_transaction),
            });
        }

        execute_in_transaction &= in_transaction;
    }

    Ok(execute_in_transaction)
}

fn offending_label(info: &MigrationInfo, in_transaction: bool) -> String {
    let version = info
        .version()
        .map(|v| v.as_str().to_owned())
        .unwrap_or_default();
    let description = info.description();
    let name = if description.is_empty() {
        version
    } else if version.is_empty() {
        description.to_owned()
    } else {
        format!("{version} {description}")
    };
    if in_transaction {
        format!("\"{name}\"")
    } else {
        format!("\"{name}\" [non-transactional]")
    }
}

/// Policy checks raised before any execution: unresolvable future rows are
/// logged, unignored failures abort the run.
pub(crate) fn preflight(
    service: &MigrationInfoService,
    config: &MigrateConfig,
) -> Result<(), MigrateError> {
    let schema = &config.schema;
    let future_ignored = config::is_future_ignored(&config.ignore_patterns);

    let future = service.future();
    if !future.is_empty() {
        let latest_resolved = service
            .resolved()
            .iter()
            .rev()
            .find_map(|info| info.version().cloned());

        match latest_resolved {
            None => error!(
                "Schema {} has version {}, but no migration could be resolved \
                 in the configured locations!",
                schema,
                service.current_version()
            ),
            Some(latest) if future_ignored => debug!(
                "Schema {} has a version ({}) that is newer than the latest available \
                 migration ({}); ignored by pattern",
                schema,
                service.current_version(),
                latest
            ),
            Some(latest) => warn!(
                "Schema {} has a version ({}) that is newer than the latest available \
                 migration ({})!",
                schema,
                service.current_version(),
                latest
            ),
        }
    }

    let failed = service.failed();
    if !failed.is_empty() {
        let only_ignored_future = failed.len() == 1
            && failed[0].state == MigrationState::FutureFailed
            && future_ignored;

        if only_ignored_future {
            warn!(
                "Schema {} contains a failed future migration to version {}!",
                schema,
                failed[0].identifier()
            );
        } else {
            let first = failed[0];
            let migration = match first.version() {
                Some(version) => format!("to version {version}"),
                None => format!("(repeatable \"{}\")", first.description()),
            };
            return Err(MigrateError::FailedMigrationPresent {
                schema: schema.clone(),
                migration,
            });
        }
    }

    Ok(())
}
