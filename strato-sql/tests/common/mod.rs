//! Shared helpers for the database integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use strato_core::parser::{Dialect, GenericDialect, ParsingContext};
use strato_core::{MigrationVersion, ResolvedMigration};
use strato_sql::SqlScriptMigration;

pub fn versioned_script(version: &str, description: &str, sql: &str) -> ResolvedMigration {
    versioned_script_with_dialect(version, description, sql, Arc::new(GenericDialect))
}

pub fn versioned_script_with_dialect(
    version: &str,
    description: &str,
    sql: &str,
    dialect: Arc<dyn Dialect>,
) -> ResolvedMigration {
    SqlScriptMigration::parse(sql, dialect, ParsingContext::default())
        .expect("test script parses")
        .versioned(
            MigrationVersion::parse(version).unwrap(),
            description,
            format!("V{version}__{description}.sql"),
            Some(checksum_of(sql)),
        )
}

pub fn repeatable_script(description: &str, sql: &str) -> ResolvedMigration {
    SqlScriptMigration::parse(sql, Arc::new(GenericDialect), ParsingContext::default())
        .expect("test script parses")
        .repeatable(
            description,
            format!("R__{description}.sql"),
            Some(checksum_of(sql)),
        )
}

/// Deterministic stand-in for the resolver's checksum.
pub fn checksum_of(sql: &str) -> i32 {
    sql.bytes()
        .fold(0i32, |acc, b| acc.wrapping_mul(31).wrapping_add(b as i32))
}
