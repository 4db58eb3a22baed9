//! SQL backends for the strato schema-migration engine.
//!
//! This crate supplies the pieces of the engine that talk to a real
//! database, supporting PostgreSQL, MySQL and SQLite through feature flags:
//!
//! - [`SqlHistory`]: the schema history table and its cross-process lock,
//!   built with sea-query and executed through sqlx.
//! - [`SqlScriptMigration`]: a [`MigrationExecutor`](strato_core::MigrationExecutor)
//!   over a parsed SQL script, including PostgreSQL `COPY ... FROM STDIN`
//!   payload transmission.
//! - Per-database adapters ([`PgAdapter`], [`MySqlAdapter`],
//!   [`SqliteAdapter`]) implementing the connection and session operations
//!   the engine needs.
//!
//! # Features
//!
//! - **`postgres`** - PostgreSQL support
//! - **`mysql`** - MySQL / MariaDB support
//! - **`sqlite`** - SQLite support
//!
//! All features are enabled by default.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use strato_core::{MigrateConfig, Migrator, StaticResolver};
//! use strato_sql::{SqlHistory, SqliteAdapter};
//!
//! let pool = sqlx::SqlitePool::connect("sqlite:app.db").await?;
//! let migrator = Migrator::new(
//!     Arc::new(SqliteAdapter::new(&pool)),
//!     Arc::new(SqlHistory::<sqlx::Sqlite>::new(&pool)),
//!     Arc::new(StaticResolver::new(migrations)),
//!     MigrateConfig::default(),
//! );
//! let result = migrator.migrate().await?;
//! ```

mod history;
mod script;

#[cfg(feature = "mysql")]
mod mysql;
#[cfg(feature = "postgres")]
mod postgres;
#[cfg(feature = "sqlite")]
mod sqlite;

pub use history::{SqlAppliedRow, SqlHistory};
pub use script::SqlScriptMigration;

#[cfg(feature = "mysql")]
pub use mysql::{MySqlAdapter, MySqlMigrationConnection};
#[cfg(feature = "postgres")]
pub use postgres::{PgAdapter, PgMigrationConnection};
#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteAdapter, SqliteMigrationConnection};

/// History store over PostgreSQL.
#[cfg(feature = "postgres")]
pub type PostgresHistory = SqlHistory<sqlx::Postgres>;

/// History store over MySQL.
#[cfg(feature = "mysql")]
pub type MySqlHistory = SqlHistory<sqlx::MySql>;

/// History store over SQLite.
#[cfg(feature = "sqlite")]
pub type SqliteHistory = SqlHistory<sqlx::Sqlite>;
