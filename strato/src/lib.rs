//! strato: a schema-migration engine for SQL databases.
//!
//! See `strato-core` for the engine and `strato-sql` for the database
//! backends; this crate re-exports both.

// Re-export everything from strato-core, including the statement parser
pub use strato_core::*;

// Re-export SQL backends when a database feature is enabled
#[cfg(any(feature = "sqlite", feature = "mysql", feature = "postgres"))]
pub use strato_sql as sql;

#[cfg(feature = "postgres")]
pub use strato_sql::{PgAdapter, PostgresHistory};

#[cfg(feature = "mysql")]
pub use strato_sql::{MySqlAdapter, MySqlHistory};

#[cfg(feature = "sqlite")]
pub use strato_sql::{SqliteAdapter, SqliteHistory};

#[cfg(any(feature = "sqlite", feature = "mysql", feature = "postgres"))]
pub use strato_sql::{SqlHistory, SqlScriptMigration};
