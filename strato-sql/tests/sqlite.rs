//! Engine and history store against in-memory SQLite.

mod common;

use std::sync::Arc;

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use common::{repeatable_script, versioned_script};
use strato_core::{
    HistoryEntry, MigrateConfig, MigrateError, MigrationKind, MigrationVersion, Migrator,
    SchemaHistory, StaticResolver,
};
use strato_sql::{SqliteAdapter, SqliteHistory};

/// Shared-cache named memory databases survive across the pool's
/// connections but stay private to the test process.
async fn pool(name: &str) -> anyhow::Result<SqlitePool> {
    let url = format!("sqlite:file:{name}?mode=memory&cache=shared");
    Ok(SqlitePoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .connect(&url)
        .await?)
}

fn migrator(pool: &SqlitePool, migrations: Vec<strato_core::ResolvedMigration>) -> Migrator {
    migrator_with_config(pool, migrations, MigrateConfig::default())
}

fn migrator_with_config(
    pool: &SqlitePool,
    migrations: Vec<strato_core::ResolvedMigration>,
    config: MigrateConfig,
) -> Migrator {
    Migrator::new(
        Arc::new(SqliteAdapter::new(pool)),
        Arc::new(SqliteHistory::new(pool)),
        Arc::new(StaticResolver::new(migrations)),
        config,
    )
}

#[tokio::test]
async fn history_table_round_trips() -> anyhow::Result<()> {
    let pool = pool("history_round_trip").await?;
    let history = SqliteHistory::new(&pool).installed_by("tester");

    assert!(!history.exists().await?);
    history.create().await?;
    assert!(history.exists().await?);

    history
        .append(HistoryEntry {
            version: Some(MigrationVersion::parse("1.2")?),
            description: "create accounts".to_owned(),
            kind: MigrationKind::Sql,
            script: "V1.2__create_accounts.sql".to_owned(),
            checksum: Some(77),
            execution_time_ms: 12,
            success: true,
        })
        .await?;
    history
        .append(HistoryEntry {
            version: None,
            description: "views".to_owned(),
            kind: MigrationKind::Sql,
            script: "R__views.sql".to_owned(),
            checksum: None,
            execution_time_ms: 3,
            success: false,
        })
        .await?;

    let rows = history.all_applied().await?;
    assert_eq!(rows.len(), 2);

    assert_eq!(rows[0].installed_rank, 1);
    assert_eq!(rows[0].version.as_ref().unwrap().as_str(), "1.2");
    assert_eq!(rows[0].description, "create accounts");
    assert_eq!(rows[0].kind, MigrationKind::Sql);
    assert_eq!(rows[0].checksum, Some(77));
    assert_eq!(rows[0].installed_by, "tester");
    assert_eq!(rows[0].execution_time_ms, 12);
    assert!(rows[0].success);

    assert_eq!(rows[1].installed_rank, 2);
    assert!(rows[1].version.is_none());
    assert_eq!(rows[1].checksum, None);
    assert!(!rows[1].success);

    Ok(())
}

#[tokio::test]
async fn lock_pair_is_reentrant() -> anyhow::Result<()> {
    let pool = pool("lock_reentrant").await?;
    let history = SqliteHistory::new(&pool);

    history.acquire_lock().await?;
    history.acquire_lock().await?;
    history.release_lock().await?;
    history.release_lock().await?;

    Ok(())
}

#[tokio::test]
async fn migrate_applies_scripts_and_records_history() -> anyhow::Result<()> {
    let pool = pool("migrate_happy").await?;

    let result = migrator(
        &pool,
        vec![
            versioned_script("1", "create_accounts", "CREATE TABLE accounts (id INTEGER PRIMARY KEY, name TEXT NOT NULL);"),
            versioned_script("2", "seed_accounts", "INSERT INTO accounts (name) VALUES ('a');\nINSERT INTO accounts (name) VALUES ('b');"),
        ],
    )
    .migrate()
    .await?;

    assert!(result.success);
    assert_eq!(result.migrations_executed, 2);
    assert_eq!(result.initial_schema_version.as_deref(), Some(""));
    assert_eq!(result.target_schema_version.as_deref(), Some("2"));
    assert_eq!(result.database, "SQLite");

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM accounts")
        .fetch_one(&pool)
        .await?;
    assert_eq!(count, 2);

    let history = SqliteHistory::new(&pool);
    let rows = history.all_applied().await?;
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r.success));
    assert_eq!(
        rows.iter().map(|r| r.installed_rank).collect::<Vec<_>>(),
        vec![1, 2]
    );

    Ok(())
}

#[tokio::test]
async fn rerun_is_idempotent() -> anyhow::Result<()> {
    let pool = pool("migrate_idempotent").await?;
    let migrations =
        || vec![versioned_script("1", "t", "CREATE TABLE t (id INTEGER PRIMARY KEY);")];

    migrator(&pool, migrations()).migrate().await?;
    let result = migrator(&pool, migrations()).migrate().await?;

    assert!(result.success);
    assert_eq!(result.migrations_executed, 0);
    assert_eq!(result.initial_schema_version.as_deref(), Some("1"));

    Ok(())
}

#[tokio::test]
async fn failed_script_rolls_back_its_transaction() -> anyhow::Result<()> {
    let pool = pool("migrate_rollback").await?;

    let err = migrator(
        &pool,
        vec![versioned_script(
            "1",
            "broken",
            "CREATE TABLE t (id INTEGER PRIMARY KEY);\nINSERT INTO missing_table VALUES (1);",
        )],
    )
    .migrate()
    .await
    .unwrap_err();

    assert!(matches!(err, MigrateError::MigrationFailed(_)));

    // DDL is transactional on SQLite: the table was rolled back and no
    // history row exists for the failed attempt.
    let table: Option<String> = sqlx::query_scalar(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 't'",
    )
    .fetch_optional(&pool)
    .await?;
    assert!(table.is_none());

    let rows = SqliteHistory::new(&pool).all_applied().await?;
    assert!(rows.is_empty());

    Ok(())
}

#[tokio::test]
async fn repeatable_script_reruns_on_checksum_change() -> anyhow::Result<()> {
    let pool = pool("migrate_repeatable").await?;

    migrator(
        &pool,
        vec![
            versioned_script("1", "base", "CREATE TABLE raw (id INTEGER PRIMARY KEY);"),
            repeatable_script("view", "DROP VIEW IF EXISTS v; CREATE VIEW v AS SELECT id FROM raw;"),
        ],
    )
    .migrate()
    .await?;

    // Changed repeatable body: reapplied on the next run.
    let result = migrator(
        &pool,
        vec![
            versioned_script("1", "base", "CREATE TABLE raw (id INTEGER PRIMARY KEY);"),
            repeatable_script(
                "view",
                "DROP VIEW IF EXISTS v; CREATE VIEW v AS SELECT id, id * 2 AS twice FROM raw;",
            ),
        ],
    )
    .migrate()
    .await?;

    assert_eq!(result.migrations_executed, 1);
    assert_eq!(result.migrations[0].version, "");

    let rows = SqliteHistory::new(&pool).all_applied().await?;
    assert_eq!(rows.len(), 3);

    Ok(())
}

#[tokio::test]
async fn grouped_run_commits_all_or_nothing() -> anyhow::Result<()> {
    let pool = pool("migrate_grouped").await?;
    let config = MigrateConfig::builder().group(true).build();

    let err = migrator_with_config(
        &pool,
        vec![
            versioned_script("1", "a", "CREATE TABLE a (id INTEGER PRIMARY KEY);"),
            versioned_script("2", "b", "INSERT INTO nowhere VALUES (1);"),
        ],
        config,
    )
    .migrate()
    .await
    .unwrap_err();

    let failure = match &err {
        MigrateError::MigrationFailed(failure) => failure,
        other => panic!("unexpected error: {other}"),
    };
    let result = failure.result.as_ref().unwrap();
    assert_eq!(result.migrations[0].state, "Rolled back");
    assert_eq!(result.migrations[1].state, "Failed");

    let table: Option<String> = sqlx::query_scalar(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'a'",
    )
    .fetch_optional(&pool)
    .await?;
    assert!(table.is_none(), "first migration must be rolled back too");

    assert!(SqliteHistory::new(&pool).all_applied().await?.is_empty());

    Ok(())
}
