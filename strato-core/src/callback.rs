//! Lifecycle events fired around and during a migration run.

use std::sync::Arc;

use crate::info::MigrationInfo;

/// The event points of one `migrate()` invocation, in firing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackEvent {
    BeforeMigrate,
    BeforeEachMigrate,
    AfterEachMigrate,
    AfterEachMigrateError,
    /// Fired once, when the last versioned migration of the run is behind us.
    AfterVersioned,
    /// Fired once, right before the first repeatable migration.
    BeforeRepeatables,
    /// Fired when at least one migration was executed.
    AfterMigrateApplied,
    AfterMigrateError,
    /// Always fired, even after an error.
    AfterMigrate,
}

impl CallbackEvent {
    pub fn id(self) -> &'static str {
        match self {
            CallbackEvent::BeforeMigrate => "beforeMigrate",
            CallbackEvent::BeforeEachMigrate => "beforeEachMigrate",
            CallbackEvent::AfterEachMigrate => "afterEachMigrate",
            CallbackEvent::AfterEachMigrateError => "afterEachMigrateError",
            CallbackEvent::AfterVersioned => "afterVersioned",
            CallbackEvent::BeforeRepeatables => "beforeRepeatables",
            CallbackEvent::AfterMigrateApplied => "afterMigrateApplied",
            CallbackEvent::AfterMigrateError => "afterMigrateError",
            CallbackEvent::AfterMigrate => "afterMigrate",
        }
    }
}

/// A lifecycle hook. Registered callbacks run in registration order; a
/// failing callback aborts the run.
#[async_trait::async_trait]
pub trait Callback: Send + Sync {
    fn supports(&self, _event: CallbackEvent) -> bool {
        true
    }

    async fn handle(
        &self,
        event: CallbackEvent,
        migration: Option<&MigrationInfo>,
    ) -> anyhow::Result<()>;
}

/// Fans events out to the registered callbacks.
#[derive(Clone, Default)]
pub struct CallbackExecutor {
    callbacks: Vec<Arc<dyn Callback>>,
}

impl CallbackExecutor {
    pub fn new(callbacks: Vec<Arc<dyn Callback>>) -> Self {
        Self { callbacks }
    }

    pub async fn on_event(&self, event: CallbackEvent) -> anyhow::Result<()> {
        for callback in &self.callbacks {
            if callback.supports(event) {
                callback.handle(event, None).await?;
            }
        }
        Ok(())
    }

    pub async fn on_each(
        &self,
        event: CallbackEvent,
        migration: &MigrationInfo,
    ) -> anyhow::Result<()> {
        for callback in &self.callbacks {
            if callback.supports(event) {
                callback.handle(event, Some(migration)).await?;
            }
        }
        Ok(())
    }
}
