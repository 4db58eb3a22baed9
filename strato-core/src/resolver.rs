//! The resolver contract and a static resolver for embedded migrations.

use crate::migration::ResolvedMigration;

/// Produces the catalog of available migrations.
///
/// File discovery, checksum computation and script loading happen behind
/// this seam; the engine only consumes the resolved list. Called once per
/// planning iteration.
pub trait MigrationResolver: Send + Sync {
    fn resolve(&self) -> anyhow::Result<Vec<ResolvedMigration>>;
}

/// A resolver over a fixed, pre-built migration list.
///
/// Useful for migrations compiled into the binary and for tests.
#[derive(Debug, Default)]
pub struct StaticResolver {
    migrations: Vec<ResolvedMigration>,
}

impl StaticResolver {
    pub fn new(migrations: Vec<ResolvedMigration>) -> Self {
        Self { migrations }
    }

    pub fn push(&mut self, migration: ResolvedMigration) {
        self.migrations.push(migration);
    }
}

impl MigrationResolver for StaticResolver {
    fn resolve(&self) -> anyhow::Result<Vec<ResolvedMigration>> {
        Ok(self.migrations.clone())
    }
}
