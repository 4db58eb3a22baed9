//! Core engine of the strato schema-migration library.
//!
//! Given a catalog of versioned and repeatable migrations and a target
//! database, the engine advances the schema from its recorded state to the
//! requested target, recording every applied migration in a persistent
//! schema history table so that runs are idempotent and auditable.
//!
//! # Core Concepts
//!
//! ## Migrations
//!
//! A [`ResolvedMigration`] is either *versioned* (applied at most once, in
//! version order) or *repeatable* (versionless, re-applied whenever its
//! checksum changes). Resolvers produce them; the engine plans and executes
//! them through the [`MigrationExecutor`] trait.
//!
//! ## Schema history
//!
//! The [`SchemaHistory`] trait is the append-only record of applied
//! migrations and the cross-process lock serializing concurrent engine
//! instances. `strato-sql` provides the SQL-backed store; [`MemoryHistory`]
//! is an in-memory stand-in for tests and embedded use.
//!
//! ## Planning
//!
//! Each iteration joins the resolved catalog with the history into a
//! [`MigrationInfoService`] snapshot, derives a [`MigrationState`] per
//! migration, and selects the next [group](plan::MigrationGroup) honoring
//! the target, cherry-pick, out-of-order and mixed-transaction policy.
//!
//! ## Execution
//!
//! [`Migrator::migrate`] drives the loop: it acquires the history lock,
//! wraps each group in the correct transactional boundary, fires lifecycle
//! [callbacks](Callback), and returns a structured [`MigrateResult`].
//!
//! ```rust,ignore
//! use strato_core::{MigrateConfig, Migrator};
//!
//! let migrator = Migrator::new(database, history, resolver, MigrateConfig::default());
//! let result = migrator.migrate().await?;
//! assert!(result.success);
//! ```
//!
//! ## Statement parsing
//!
//! The [`parser`] module splits SQL scripts into statements, handling
//! dialect quoting (e.g. PostgreSQL dollar-quoting), block constructs
//! (`BEGIN ATOMIC`), inline `COPY` payloads, and the per-statement
//! transactionality classification the planner builds on.

pub mod adapter;
pub mod callback;
pub mod config;
pub mod engine;
pub mod error;
pub mod history;
pub mod info;
pub mod memory;
pub mod migration;
pub mod parser;
pub mod plan;
pub mod resolver;
pub mod result;
pub mod state;
pub mod template;
pub mod version;

pub use adapter::{AdapterError, DatabaseAdapter, MigrationConnection};
pub use callback::{Callback, CallbackEvent, CallbackExecutor};
pub use config::{CherryPick, IgnorePattern, MigrateConfig, MigrateConfigBuilder};
pub use engine::Migrator;
pub use error::{MigrateError, MigrationFailure};
pub use history::{HistoryEntry, HistoryError, SchemaHistory};
pub use info::{MigrationInfo, MigrationInfoService};
pub use memory::MemoryHistory;
pub use migration::{
    AppliedMigration, MigrationContext, MigrationExecutor, MigrationKind, ResolvedMigration,
};
pub use resolver::{MigrationResolver, StaticResolver};
pub use result::{MigrateOutput, MigrateResult};
pub use state::MigrationState;
pub use version::{MigrationVersion, Target, VersionError};
