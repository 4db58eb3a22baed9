//! The migration engine loop.
//!
//! Orchestrates one `migrate()` invocation: schema history lock scope,
//! iterative group planning and execution, history writes, lifecycle
//! callbacks and assembly of the structured result. All per-run mutable
//! state lives in a [`RunState`] value threaded through the loop, so
//! concurrent invocations of separate engines are independent by
//! construction.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info, warn};

use crate::adapter::{DatabaseAdapter, MigrationConnection};
use crate::callback::{Callback, CallbackEvent, CallbackExecutor};
use crate::config::MigrateConfig;
use crate::error::{MigrateError, MigrationFailure};
use crate::history::{HistoryEntry, SchemaHistory};
use crate::info::{MigrationInfo, MigrationInfoService};
use crate::migration::MigrationContext;
use crate::migration::ResolvedMigration;
use crate::plan::{self, MigrationGroup};
use crate::resolver::MigrationResolver;
use crate::result::MigrateResult;
use crate::template::{self, TransactionTemplate};
use crate::version::Target;

/// The engine. One instance may be reused for multiple runs; each run is
/// fully independent.
pub struct Migrator {
    database: Arc<dyn DatabaseAdapter>,
    history: Arc<dyn SchemaHistory>,
    resolver: Arc<dyn MigrationResolver>,
    callbacks: CallbackExecutor,
    config: MigrateConfig,
}

/// Mutable state of one run.
struct RunState {
    result: MigrateResult,
    /// Resolved migrations applied by this run, so re-planning over a stale
    /// snapshot cannot pick them again.
    applied_resolved: Vec<ResolvedMigration>,
    /// Tracks the versioned→repeatable boundary for the callback pair.
    is_previous_versioned: bool,
    total: u32,
}

impl Migrator {
    pub fn new(
        database: Arc<dyn DatabaseAdapter>,
        history: Arc<dyn SchemaHistory>,
        resolver: Arc<dyn MigrationResolver>,
        config: MigrateConfig,
    ) -> Self {
        Self {
            database,
            history,
            resolver,
            callbacks: CallbackExecutor::default(),
            config,
        }
    }

    pub fn callbacks(mut self, callbacks: Vec<Arc<dyn Callback>>) -> Self {
        self.callbacks = CallbackExecutor::new(callbacks);
        self
    }

    /// Advance the schema to the configured target, recording every applied
    /// migration in the schema history.
    pub async fn migrate(&self) -> Result<MigrateResult, MigrateError> {
        self.fire(CallbackEvent::BeforeMigrate).await?;

        let mut state = RunState {
            result: MigrateResult::new(self.database.name(), &self.config.schema),
            applied_resolved: Vec::new(),
            is_previous_versioned: true,
            total: 0,
        };

        match self.run(&mut state).await {
            Ok(()) => {
                state.result.target_schema_version = state.result.last_versioned();
                state.result.migrations_executed = state.total;
                state.result.success = true;
                self.log_summary(&state);

                if state.total > 0 {
                    self.fire(CallbackEvent::AfterMigrateApplied).await?;
                }
                self.fire(CallbackEvent::AfterMigrate).await?;

                Ok(state.result)
            }
            Err(mut err) => {
                // Best effort only; the original failure stays the error.
                let _ = self.fire(CallbackEvent::AfterMigrateError).await;
                let _ = self.fire(CallbackEvent::AfterMigrate).await;

                state.result.migrations_executed = state.total;
                if let MigrateError::MigrationFailed(failure) = &mut err {
                    failure.result = Some(state.result);
                }
                Err(err)
            }
        }
    }

    async fn run(&self, state: &mut RunState) -> Result<(), MigrateError> {
        if !self.history.exists().await? {
            info!(
                "Creating schema history table {} in schema {}",
                self.config.table, self.config.schema
            );
            self.history.create().await?;
        }

        let mut conn = self.database.migration_connection().await?;

        if self.config.group {
            // One lock for the whole run keeps every history change of the
            // run inside a single mutual exclusion span.
            self.lock_history().await?;
            let outcome = self.migrate_all(state, conn.as_mut()).await;
            let released = self.history.release_lock().await;
            match (outcome, released) {
                (Ok(()), Ok(())) => Ok(()),
                (Ok(()), Err(release_err)) => Err(release_err.into()),
                (Err(err), Ok(())) => Err(err),
                (Err(err), Err(release_err)) => {
                    warn!("also failed to release the schema history lock: {release_err}");
                    Err(err)
                }
            }
        } else {
            self.migrate_all(state, conn.as_mut()).await
        }
    }

    async fn migrate_all(
        &self,
        state: &mut RunState,
        conn: &mut dyn MigrationConnection,
    ) -> Result<(), MigrateError> {
        if self.config.group && !self.database.supports_ddl_transactions() {
            let warning = format!(
                "Enabling the 'group' option is recommended only for databases that \
                 support DDL transactions; using it with {} may cause undefined behavior",
                self.database.name()
            );
            warn!("{warning}");
            state.result.add_warning(warning);
        }

        loop {
            let first_run = state.total == 0;
            let count = if self.config.group {
                // The lock is already held for the whole run.
                self.migrate_group(state, conn, first_run).await?
            } else {
                self.lock_history().await?;
                let outcome = self.migrate_group(state, conn, first_run).await;
                let released = self.history.release_lock().await;
                match (outcome, released) {
                    (Ok(count), Ok(())) => count,
                    (Ok(_), Err(release_err)) => return Err(release_err.into()),
                    (Err(err), Ok(())) => return Err(err),
                    (Err(err), Err(release_err)) => {
                        warn!("also failed to release the schema history lock: {release_err}");
                        return Err(err);
                    }
                }
            };

            state.total += count;
            if count == 0 {
                break;
            }
            if self.config.target == Target::Next {
                break;
            }
        }

        if state.is_previous_versioned {
            self.fire(CallbackEvent::AfterVersioned).await?;
        }

        Ok(())
    }

    /// Plan and apply one group. Returns the number of applied migrations;
    /// zero means the schema is up to date.
    async fn migrate_group(
        &self,
        state: &mut RunState,
        conn: &mut dyn MigrationConnection,
        first_run: bool,
    ) -> Result<u32, MigrateError> {
        let resolved = self.resolver.resolve().map_err(MigrateError::Resolver)?;
        let applied = self.history.all_applied().await?;
        let service = MigrationInfoService::new(resolved, applied, &self.config);
        let current_version = service.current_version().clone();

        if first_run {
            info!(
                "Current version of schema {}: {}",
                self.config.schema, current_version
            );
            state.result.initial_schema_version = Some(current_version.as_str().to_owned());

            if self.config.out_of_order {
                let warning = format!(
                    "outOfOrder mode is active. Migration of schema {} may not be reproducible.",
                    self.config.schema
                );
                warn!("{warning}");
                state.result.add_warning(warning);
            }
        }

        plan::preflight(&service, &self.config)?;

        let group = plan::plan_group(&service, &state.applied_resolved, &self.config, &current_version);
        if group.is_empty() {
            return Ok(0);
        }

        let count = group.len() as u32;
        self.apply_group(state, conn, group).await?;
        Ok(count)
    }

    async fn apply_group(
        &self,
        state: &mut RunState,
        conn: &mut dyn MigrationConnection,
        group: MigrationGroup,
    ) -> Result<(), MigrateError> {
        let transactional = plan::group_transaction_mode(&group, &self.config)?;
        let template = TransactionTemplate::new(transactional);

        // Rows for a transactional group are held back until the commit so
        // the history mirrors the all-or-nothing outcome of the group.
        let mut rows: Vec<HistoryEntry> = Vec::new();

        template.enter(conn).await?;
        match self
            .do_migrate_group(state, conn, &group, transactional, &mut rows)
            .await
        {
            Ok(()) => {
                template.exit(conn, true).await?;
                for row in rows {
                    self.history.append(row).await?;
                }
                Ok(())
            }
            Err(err) => {
                if let Err(rollback_err) = template.exit(conn, false).await {
                    warn!("rollback after failed migration also failed: {rollback_err}");
                }

                if let MigrateError::MigrationFailed(failure) = &err {
                    if self.database.supports_ddl_transactions() && transactional {
                        error!(
                            "Migration of {} failed! Changes successfully rolled back.",
                            failure.migration
                        );
                        state.result.mark_rolled_back();
                    } else {
                        error!(
                            "Migration of {} failed! Please restore backups and roll back \
                             database and code!",
                            failure.migration
                        );
                        // Earlier members of the group did run; keep their
                        // rows, then record the failure for the next run.
                        for row in std::mem::take(&mut rows) {
                            self.history.append(row).await?;
                        }
                        self.history
                            .append(HistoryEntry {
                                version: failure.version.clone(),
                                description: failure.description.clone(),
                                kind: failure.kind,
                                script: failure.script.clone(),
                                checksum: failure.checksum,
                                execution_time_ms: failure.execution_time_ms,
                                success: false,
                            })
                            .await?;
                    }
                }

                Err(err)
            }
        }
    }

    async fn do_migrate_group(
        &self,
        state: &mut RunState,
        conn: &mut dyn MigrationConnection,
        group: &MigrationGroup,
        transactional: bool,
        rows: &mut Vec<HistoryEntry>,
    ) -> Result<(), MigrateError> {
        debug!("Executing group of {} migration(s)", group.len());

        for entry in group.entries() {
            let migration = &entry.info;
            let out_of_order = entry.out_of_order;
            let resolved = migration
                .resolved
                .clone()
                .expect("planned migrations always carry a resolved side");
            let in_transaction = migration.can_execute_in_transaction();
            let text = self.migration_text(migration, in_transaction, out_of_order);

            if state.is_previous_versioned && migration.version().is_none() {
                self.fire(CallbackEvent::AfterVersioned).await?;
                self.fire(CallbackEvent::BeforeRepeatables).await?;
                state.is_previous_versioned = false;
            }

            let started = Instant::now();

            if self.config.skip_executing_migrations {
                debug!("Skipping execution of migration of {text}");
            } else {
                debug!("Starting migration of {text} ...");

                conn.restore_original_state().await?;
                conn.change_current_schema(&self.config.schema).await?;

                self.fire_each(CallbackEvent::BeforeEachMigrate, migration).await?;
                info!("Migrating {text}");

                // With single connection databases the transaction opened
                // for history changes must be stepped out of for a
                // non-transactional migration body.
                let suspended = if self.database.use_single_connection() && !transactional {
                    template::suspend_transaction(conn).await?
                } else {
                    false
                };

                let outcome = {
                    let mut ctx = MigrationContext {
                        config: &self.config,
                        connection: conn,
                    };
                    resolved.executor.migrate(&mut ctx).await
                };

                match outcome {
                    Ok(()) => {
                        if suspended {
                            template::resume_transaction(conn).await?;
                        }
                        state.applied_resolved.push(resolved.clone());
                    }
                    Err(source) => {
                        let _ = self
                            .fire_each(CallbackEvent::AfterEachMigrateError, migration)
                            .await;

                        let execution_time_ms = started.elapsed().as_millis() as i64;
                        state.result.put_failed(migration, execution_time_ms);

                        return Err(MigrateError::MigrationFailed(Box::new(MigrationFailure {
                            migration: text,
                            version: migration.version().cloned(),
                            description: migration.description().to_owned(),
                            script: migration.script().to_owned(),
                            kind: migration.kind(),
                            checksum: migration.checksum(),
                            execution_time_ms,
                            in_transaction,
                            out_of_order,
                            result: None,
                            source,
                        })));
                    }
                }

                debug!("Successfully completed migration of {text}");
                self.fire_each(CallbackEvent::AfterEachMigrate, migration).await?;
            }

            let execution_time_ms = started.elapsed().as_millis() as i64;
            state.result.put_successful(migration, execution_time_ms);

            let row = HistoryEntry {
                version: migration.version().cloned(),
                description: migration.description().to_owned(),
                kind: migration.kind(),
                script: migration.script().to_owned(),
                checksum: resolved.checksum,
                execution_time_ms,
                success: true,
            };
            if transactional {
                rows.push(row);
            } else {
                self.history.append(row).await?;
            }
        }

        Ok(())
    }

    async fn lock_history(&self) -> Result<(), MigrateError> {
        self.history
            .acquire_lock()
            .await
            .map_err(MigrateError::LockAcquisition)
    }

    async fn fire(&self, event: CallbackEvent) -> Result<(), MigrateError> {
        self.callbacks
            .on_event(event)
            .await
            .map_err(|source| MigrateError::Callback {
                event: event.id(),
                source,
            })
    }

    async fn fire_each(
        &self,
        event: CallbackEvent,
        migration: &MigrationInfo,
    ) -> Result<(), MigrateError> {
        self.callbacks
            .on_each(event, migration)
            .await
            .map_err(|source| MigrateError::Callback {
                event: event.id(),
                source,
            })
    }

    fn migration_text(
        &self,
        migration: &MigrationInfo,
        in_transaction: bool,
        out_of_order: bool,
    ) -> String {
        let schema = &self.config.schema;
        let non_transactional = if in_transaction {
            ""
        } else {
            " [non-transactional]"
        };

        match migration.version() {
            Some(version) => {
                let description = migration.description();
                let name = if description.is_empty() {
                    version.to_string()
                } else {
                    format!("{version} - {description}")
                };
                let out_of_order = if out_of_order { " [out of order]" } else { "" };
                format!("schema {schema} to version \"{name}\"{out_of_order}{non_transactional}")
            }
            None => format!(
                "schema {schema} with repeatable migration \"{}\"{non_transactional}",
                migration.description()
            ),
        }
    }

    fn log_summary(&self, state: &RunState) {
        let schema = &self.config.schema;
        if state.total == 0 {
            info!("Schema {schema} is up to date. No migration necessary.");
            return;
        }

        let now_at = state
            .result
            .target_schema_version
            .as_ref()
            .map(|v| format!(", now at version v{v}"))
            .unwrap_or_default();
        let plural = if state.total == 1 { "" } else { "s" };
        info!(
            "Successfully applied {} migration{plural} to schema {schema}{now_at}",
            state.total
        );
    }
}
