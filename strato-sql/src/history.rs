//! SQL-backed schema history store.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

#[cfg(feature = "mysql")]
use sea_query::MysqlQueryBuilder;
#[cfg(feature = "postgres")]
use sea_query::PostgresQueryBuilder;
#[cfg(feature = "sqlite")]
use sea_query::SqliteQueryBuilder;
use sea_query::{Alias, ColumnDef, Expr, Iden, Index, Query, Table, Value};
use sea_query_binder::{SqlxBinder, SqlxValues};
use sqlx::pool::PoolConnection;
use sqlx::{Database, Pool};

use strato_core::history::{HistoryEntry, HistoryError, SchemaHistory};
use strato_core::{AppliedMigration, MigrationKind, MigrationVersion};

/// Columns of the schema history table.
#[derive(Iden, Clone, Copy)]
enum History {
    InstalledRank,
    Version,
    Description,
    Type,
    Script,
    Checksum,
    InstalledBy,
    InstalledOn,
    ExecutionTime,
    Success,
}

/// Schema history stored in a SQL table, generic over the sqlx database.
///
/// The table layout is `installed_rank, version, description, type, script,
/// checksum, installed_by, installed_on, execution_time, success`, indexed
/// on `success`. Cross-process mutual exclusion uses a PostgreSQL advisory
/// lock or a MySQL named lock held on a dedicated connection; SQLite needs
/// neither, its single writer serializes engines on its own.
pub struct SqlHistory<DB: Database> {
    pool: Pool<DB>,
    table: String,
    installed_by: String,
    lock_timeout: Duration,
    lock_depth: AtomicU32,
    lock_conn: tokio::sync::Mutex<Option<PoolConnection<DB>>>,
}

impl<DB: Database> SqlHistory<DB> {
    pub fn new(pool: &Pool<DB>) -> Self {
        Self {
            pool: pool.clone(),
            table: strato_core::config::DEFAULT_HISTORY_TABLE.to_owned(),
            installed_by: "strato".to_owned(),
            lock_timeout: strato_core::config::DEFAULT_LOCK_TIMEOUT,
            lock_depth: AtomicU32::new(0),
            lock_conn: tokio::sync::Mutex::new(None),
        }
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    pub fn installed_by(mut self, user: impl Into<String>) -> Self {
        self.installed_by = user.into();
        self
    }

    pub fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    fn table_ref(&self) -> Alias {
        Alias::new(&self.table)
    }

    /// Advisory lock key derived from the table name, so engines pointed at
    /// different history tables do not serialize against each other.
    fn lock_key(&self) -> i64 {
        self.table
            .bytes()
            .fold(0x7374_7261_746f_i64, |acc, b| {
                acc.wrapping_mul(31).wrapping_add(i64::from(b))
            })
    }

    fn build_sqlx<S: SqlxBinder>(statement: &S) -> (String, SqlxValues) {
        match DB::NAME {
            #[cfg(feature = "postgres")]
            "PostgreSQL" => statement.build_sqlx(PostgresQueryBuilder),
            #[cfg(feature = "mysql")]
            "MySQL" => statement.build_sqlx(MysqlQueryBuilder),
            #[cfg(feature = "sqlite")]
            "SQLite" => statement.build_sqlx(SqliteQueryBuilder),
            name => panic!("'{name}' is not a supported database"),
        }
    }
}

fn db_err(err: impl Into<anyhow::Error>) -> HistoryError {
    HistoryError::Db(err.into())
}

/// `AppliedMigration` decoded from a history row.
pub struct SqlAppliedRow(pub AppliedMigration);

impl<R: sqlx::Row> sqlx::FromRow<'_, R> for SqlAppliedRow
where
    String: sqlx::Type<R::Database> + for<'r> sqlx::Decode<'r, R::Database>,
    i32: sqlx::Type<R::Database> + for<'r> sqlx::Decode<'r, R::Database>,
    i64: sqlx::Type<R::Database> + for<'r> sqlx::Decode<'r, R::Database>,
    bool: sqlx::Type<R::Database> + for<'r> sqlx::Decode<'r, R::Database>,
    chrono::DateTime<chrono::Utc>: sqlx::Type<R::Database> + for<'r> sqlx::Decode<'r, R::Database>,
    for<'r> &'r str: sqlx::ColumnIndex<R>,
{
    fn from_row(row: &R) -> Result<Self, sqlx::Error> {
        let version: Option<String> = row.try_get("version")?;
        let version = version
            .map(|v| MigrationVersion::parse(&v))
            .transpose()
            .map_err(|err| sqlx::Error::Decode(Box::new(err)))?;

        let kind: String = row.try_get("type")?;
        let kind = MigrationKind::from_str(&kind).ok_or_else(|| {
            sqlx::Error::Decode(format!("unknown migration type {kind:?}").into())
        })?;

        Ok(SqlAppliedRow(AppliedMigration {
            installed_rank: row.try_get("installed_rank")?,
            version,
            description: row.try_get("description")?,
            kind,
            script: row.try_get("script")?,
            checksum: row.try_get("checksum")?,
            installed_by: row.try_get("installed_by")?,
            installed_on: row.try_get("installed_on")?,
            execution_time_ms: row.try_get("execution_time")?,
            success: row.try_get("success")?,
        }))
    }
}

#[async_trait::async_trait]
impl<DB> SchemaHistory for SqlHistory<DB>
where
    DB: Database,
    for<'c> &'c mut DB::Connection: sqlx::Executor<'c, Database = DB>,
    SqlxValues: for<'q> sqlx::IntoArguments<'q, DB>,
    for<'q> DB::Arguments<'q>: sqlx::IntoArguments<'q, DB>,
    String: sqlx::Type<DB> + for<'r> sqlx::Decode<'r, DB>,
    i32: sqlx::Type<DB> + for<'r> sqlx::Decode<'r, DB>,
    i64: sqlx::Type<DB> + for<'r> sqlx::Decode<'r, DB>,
    bool: sqlx::Type<DB> + for<'r> sqlx::Decode<'r, DB>,
    chrono::DateTime<chrono::Utc>: sqlx::Type<DB> + for<'r> sqlx::Decode<'r, DB>,
    usize: sqlx::ColumnIndex<DB::Row>,
    for<'r> &'r str: sqlx::ColumnIndex<DB::Row>,
{
    async fn exists(&self) -> Result<bool, HistoryError> {
        let statement = match DB::NAME {
            #[cfg(feature = "sqlite")]
            "SQLite" => Query::select()
                .column(Alias::new("name"))
                .from(Alias::new("sqlite_master"))
                .and_where(Expr::col(Alias::new("type")).eq("table"))
                .and_where(Expr::col(Alias::new("name")).eq(self.table.clone()))
                .limit(1)
                .to_owned(),
            _ => Query::select()
                .column(Alias::new("table_name"))
                .from((Alias::new("information_schema"), Alias::new("tables")))
                .and_where(Expr::col(Alias::new("table_name")).eq(self.table.clone()))
                .limit(1)
                .to_owned(),
        };

        let (sql, values) = Self::build_sqlx(&statement);

        let found = sqlx::query_scalar_with::<DB, String, _>(&sql, values)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(found.is_some())
    }

    async fn create(&self) -> Result<(), HistoryError> {
        let table = Table::create()
            .table(self.table_ref())
            .if_not_exists()
            .col(
                ColumnDef::new(History::InstalledRank)
                    .integer()
                    .not_null()
                    .primary_key(),
            )
            .col(ColumnDef::new(History::Version).string().string_len(50))
            .col(
                ColumnDef::new(History::Description)
                    .string()
                    .string_len(200)
                    .not_null(),
            )
            .col(
                ColumnDef::new(History::Type)
                    .string()
                    .string_len(20)
                    .not_null(),
            )
            .col(
                ColumnDef::new(History::Script)
                    .string()
                    .string_len(1000)
                    .not_null(),
            )
            .col(ColumnDef::new(History::Checksum).integer())
            .col(
                ColumnDef::new(History::InstalledBy)
                    .string()
                    .string_len(100)
                    .not_null(),
            )
            .col(
                ColumnDef::new(History::InstalledOn)
                    .timestamp_with_time_zone()
                    .not_null()
                    .default(Expr::current_timestamp()),
            )
            .col(
                ColumnDef::new(History::ExecutionTime)
                    .big_integer()
                    .not_null(),
            )
            .col(ColumnDef::new(History::Success).boolean().not_null())
            .to_owned();

        let success_idx = Index::create()
            .if_not_exists()
            .name(format!("{}_s_idx", self.table))
            .table(self.table_ref())
            .col(History::Success)
            .to_owned();

        let (table_sql, index_sql) = match DB::NAME {
            #[cfg(feature = "postgres")]
            "PostgreSQL" => (
                table.to_string(PostgresQueryBuilder),
                success_idx.to_string(PostgresQueryBuilder),
            ),
            #[cfg(feature = "mysql")]
            "MySQL" => (
                table.to_string(MysqlQueryBuilder),
                success_idx.to_string(MysqlQueryBuilder),
            ),
            #[cfg(feature = "sqlite")]
            "SQLite" => (
                table.to_string(SqliteQueryBuilder),
                success_idx.to_string(SqliteQueryBuilder),
            ),
            name => panic!("'{name}' is not a supported database"),
        };

        sqlx::query(&table_sql)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        sqlx::query(&index_sql)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(())
    }

    async fn all_applied(&self) -> Result<Vec<AppliedMigration>, HistoryError> {
        let statement = Query::select()
            .columns([
                History::InstalledRank,
                History::Version,
                History::Description,
                History::Type,
                History::Script,
                History::Checksum,
                History::InstalledBy,
                History::InstalledOn,
                History::ExecutionTime,
                History::Success,
            ])
            .from(self.table_ref())
            .order_by(History::InstalledRank, sea_query::Order::Asc)
            .to_owned();

        let (sql, values) = Self::build_sqlx(&statement);

        let rows = sqlx::query_as_with::<DB, SqlAppliedRow, _>(&sql, values)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(rows.into_iter().map(|row| row.0).collect())
    }

    async fn append(&self, entry: HistoryEntry) -> Result<(), HistoryError> {
        let rank_query = Query::select()
            .expr(Expr::col(History::InstalledRank).max())
            .from(self.table_ref())
            .to_owned();
        let (sql, values) = Self::build_sqlx(&rank_query);
        let max_rank: Option<i32> = sqlx::query_scalar_with::<DB, Option<i32>, _>(&sql, values)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        let installed_rank = max_rank.unwrap_or(0) + 1;

        let statement = Query::insert()
            .into_table(self.table_ref())
            .columns([
                History::InstalledRank,
                History::Version,
                History::Description,
                History::Type,
                History::Script,
                History::Checksum,
                History::InstalledBy,
                History::InstalledOn,
                History::ExecutionTime,
                History::Success,
            ])
            .values_panic([
                installed_rank.into(),
                entry
                    .version
                    .as_ref()
                    .map(|v| v.as_str().to_owned())
                    .into(),
                entry.description.clone().into(),
                entry.kind.as_str().into(),
                entry.script.clone().into(),
                entry.checksum.into(),
                self.installed_by.clone().into(),
                chrono::Utc::now().into(),
                entry.execution_time_ms.into(),
                entry.success.into(),
            ])
            .to_owned();

        let (sql, values) = Self::build_sqlx(&statement);

        sqlx::query_with::<DB, _>(&sql, values)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(())
    }

    async fn acquire_lock(&self) -> Result<(), HistoryError> {
        let mut guard = self.lock_conn.lock().await;

        if self.lock_depth.load(Ordering::SeqCst) > 0 {
            self.lock_depth.fetch_add(1, Ordering::SeqCst);
            return Ok(());
        }

        let mut conn = self.pool.acquire().await.map_err(db_err)?;

        match DB::NAME {
            #[cfg(feature = "postgres")]
            "PostgreSQL" => {
                // Session-scoped advisory lock; poll so we can honor the
                // configured timeout.
                let statement = Query::select()
                    .expr(Expr::cust_with_values(
                        "pg_try_advisory_lock(?)",
                        [Value::from(self.lock_key())],
                    ))
                    .to_owned();
                let started = Instant::now();
                loop {
                    let (sql, values) = Self::build_sqlx(&statement);
                    let acquired = sqlx::query_scalar_with::<DB, bool, _>(&sql, values)
                        .fetch_one(&mut *conn)
                        .await
                        .map_err(db_err)?;
                    if acquired {
                        break;
                    }
                    if started.elapsed() >= self.lock_timeout {
                        return Err(HistoryError::LockTimeout(self.lock_timeout));
                    }
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
            #[cfg(feature = "mysql")]
            "MySQL" => {
                let statement = Query::select()
                    .expr(Expr::cust_with_values(
                        "GET_LOCK(?, ?)",
                        [
                            Value::from(self.table.clone()),
                            Value::from(self.lock_timeout.as_secs() as i64),
                        ],
                    ))
                    .to_owned();
                let (sql, values) = Self::build_sqlx(&statement);
                let acquired = sqlx::query_scalar_with::<DB, i64, _>(&sql, values)
                    .fetch_one(&mut *conn)
                    .await
                    .map_err(db_err)?;
                if acquired != 1 {
                    return Err(HistoryError::LockTimeout(self.lock_timeout));
                }
            }
            // A single SQLite writer serializes concurrent engines already.
            _ => {}
        }

        *guard = Some(conn);
        self.lock_depth.store(1, Ordering::SeqCst);
        Ok(())
    }

    async fn release_lock(&self) -> Result<(), HistoryError> {
        let mut guard = self.lock_conn.lock().await;

        let depth = self.lock_depth.load(Ordering::SeqCst);
        if depth > 1 {
            self.lock_depth.store(depth - 1, Ordering::SeqCst);
            return Ok(());
        }
        self.lock_depth.store(0, Ordering::SeqCst);

        if let Some(mut conn) = guard.take() {
            match DB::NAME {
                #[cfg(feature = "postgres")]
                "PostgreSQL" => {
                    let statement = Query::select()
                        .expr(Expr::cust_with_values(
                            "pg_advisory_unlock(?)",
                            [Value::from(self.lock_key())],
                        ))
                        .to_owned();
                    let (sql, values) = Self::build_sqlx(&statement);
                    sqlx::query_with::<DB, _>(&sql, values)
                        .execute(&mut *conn)
                        .await
                        .map_err(db_err)?;
                }
                #[cfg(feature = "mysql")]
                "MySQL" => {
                    let statement = Query::select()
                        .expr(Expr::cust_with_values(
                            "RELEASE_LOCK(?)",
                            [Value::from(self.table.clone())],
                        ))
                        .to_owned();
                    let (sql, values) = Self::build_sqlx(&statement);
                    sqlx::query_with::<DB, _>(&sql, values)
                        .execute(&mut *conn)
                        .await
                        .map_err(db_err)?;
                }
                _ => {}
            }
        }

        Ok(())
    }
}
