use crate::transaction::SqliteTx;
use async_trait::async_trait;
use sqlbridge_core::{
    DbConfig, Dialect, Error, Execer, Logger, Result, SqlDb, SqlRow, SqlTx, SqlValue,
};
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteArguments, SqlitePoolOptions, SqliteRow};
use sqlx::query::Query;
use sqlx::{Column, Executor, Row, Sqlite, SqlitePool, TypeInfo, Value, ValueRef};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Opens a pooled SQLite database. SQLite is embedded, so there is little to
/// retry against; failures are still classified so the establisher can retry
/// the rare lock contention on a shared file.
pub async fn connect(config: &DbConfig) -> Result<SqliteDb> {
    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.url)
        .await
        .map_err(connect_error)?;
    Ok(SqliteDb {
        pool,
        dialect: config.dialect,
        logger: Arc::new(Logger::new()),
    })
}

fn connect_error(error: sqlx::Error) -> Error {
    let retryable = matches!(
        error,
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::Tls(_)
    );
    Error::connect(error.to_string(), retryable)
}

pub struct SqliteDb {
    pool: SqlitePool,
    dialect: Dialect,
    logger: Arc<Logger>,
}

#[async_trait]
impl Execer for SqliteDb {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn logger(&self) -> &Logger {
        &self.logger
    }

    fn is_tx(&self) -> bool {
        false
    }

    async fn begin(&self) -> Result<Box<dyn SqlTx>> {
        let tx = self.pool.begin().await.map_err(Error::driver)?;
        Ok(Box::new(SqliteTx::new(
            tx,
            self.dialect,
            self.logger.clone(),
        )))
    }

    async fn query(&self, sql: &str, args: &[SqlValue]) -> Result<Vec<SqlRow>> {
        query_on(&self.pool, &self.dialect, &self.logger, sql, args).await
    }

    async fn exec(&self, sql: &str, args: &[SqlValue]) -> Result<u64> {
        exec_on(&self.pool, &self.dialect, &self.logger, sql, args).await
    }

    async fn insert(&self, sql: &str, pk: &str, args: &[SqlValue]) -> Result<i64> {
        insert_on(&self.pool, &self.dialect, &self.logger, sql, pk, args).await
    }

    async fn prepare(&self, sql: &str) -> Result<()> {
        let sql = self.dialect.replace_placeholders(sql);
        self.pool
            .prepare(&sql)
            .await
            .map_err(|e| Error::query(sql.as_ref(), &[] as &[SqlValue], e))?;
        Ok(())
    }
}

#[async_trait]
impl SqlDb for SqliteDb {
    fn as_execer(&self) -> &dyn Execer {
        self
    }

    async fn acquire(&self) -> Result<Box<dyn Execer>> {
        let conn = self.pool.acquire().await.map_err(Error::driver)?;
        Ok(Box::new(SqliteConn {
            conn: Mutex::new(conn),
            dialect: self.dialect,
            logger: self.logger.clone(),
        }))
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(Error::driver)?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// A single checked-out connection; returned to the pool on drop. Statements
/// prepared here stay on this session.
pub struct SqliteConn {
    conn: Mutex<PoolConnection<Sqlite>>,
    dialect: Dialect,
    logger: Arc<Logger>,
}

#[async_trait]
impl Execer for SqliteConn {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn logger(&self) -> &Logger {
        &self.logger
    }

    fn is_tx(&self) -> bool {
        false
    }

    async fn begin(&self) -> Result<Box<dyn SqlTx>> {
        Err(Error::Unsupported(
            "begin transactions on the database handle, not a checked-out connection".into(),
        ))
    }

    async fn query(&self, sql: &str, args: &[SqlValue]) -> Result<Vec<SqlRow>> {
        let mut conn = self.conn.lock().await;
        query_on(&mut **conn, &self.dialect, &self.logger, sql, args).await
    }

    async fn exec(&self, sql: &str, args: &[SqlValue]) -> Result<u64> {
        let mut conn = self.conn.lock().await;
        exec_on(&mut **conn, &self.dialect, &self.logger, sql, args).await
    }

    async fn insert(&self, sql: &str, pk: &str, args: &[SqlValue]) -> Result<i64> {
        let mut conn = self.conn.lock().await;
        insert_on(&mut **conn, &self.dialect, &self.logger, sql, pk, args).await
    }

    async fn prepare(&self, sql: &str) -> Result<()> {
        let sql = self.dialect.replace_placeholders(sql);
        let mut conn = self.conn.lock().await;
        (&mut **conn)
            .prepare(&sql)
            .await
            .map_err(|e| Error::query(sql.as_ref(), &[] as &[SqlValue], e))?;
        Ok(())
    }
}

fn bind_args<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    args: &[SqlValue],
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    let mut flat = Vec::with_capacity(args.len());
    for arg in args {
        arg.flatten_into(&mut flat);
    }
    for arg in flat {
        query = match arg {
            SqlValue::Null => query.bind(Option::<i64>::None),
            SqlValue::Bool(v) => query.bind(v),
            SqlValue::Int(v) => query.bind(v),
            SqlValue::UInt(v) => query.bind(v as i64),
            SqlValue::Float(v) => query.bind(v),
            SqlValue::Text(v) => query.bind(v),
            SqlValue::Blob(v) => query.bind(v),
            SqlValue::List(_) => query,
        };
    }
    query
}

fn decode_row(row: &SqliteRow) -> Result<SqlRow> {
    let mut columns = Vec::with_capacity(row.columns().len());
    for column in row.columns() {
        let raw = row.try_get_raw(column.ordinal()).map_err(Error::driver)?;
        let owned = ValueRef::to_owned(&raw);
        let value = if owned.is_null() {
            SqlValue::Null
        } else {
            match owned.type_info().name() {
                "BOOLEAN" => SqlValue::Bool(owned.try_decode().map_err(Error::driver)?),
                "INTEGER" => SqlValue::Int(owned.try_decode().map_err(Error::driver)?),
                "REAL" | "NUMERIC" => SqlValue::Float(owned.try_decode().map_err(Error::driver)?),
                "TEXT" | "DATE" | "TIME" | "DATETIME" => {
                    SqlValue::Text(owned.try_decode().map_err(Error::driver)?)
                }
                "BLOB" => SqlValue::Blob(owned.try_decode().map_err(Error::driver)?),
                other => {
                    return Err(Error::Driver(format!(
                        "unhandled sqlite type {} in column {}",
                        other,
                        column.name()
                    )));
                }
            }
        };
        columns.push((column.name().to_string(), value));
    }
    Ok(SqlRow::new(columns))
}

pub(crate) async fn query_on<'c, E>(
    executor: E,
    dialect: &Dialect,
    logger: &Logger,
    sql: &str,
    args: &[SqlValue],
) -> Result<Vec<SqlRow>>
where
    E: Executor<'c, Database = Sqlite>,
{
    let sql = dialect.replace_placeholders(sql);
    logger.log_query(&sql, args);
    let rows = bind_args(sqlx::query(&sql), args)
        .fetch_all(executor)
        .await
        .map_err(|e| {
            logger.log_error(&sql, &e);
            Error::query(sql.as_ref(), args, e)
        })?;
    rows.iter().map(decode_row).collect()
}

pub(crate) async fn exec_on<'c, E>(
    executor: E,
    dialect: &Dialect,
    logger: &Logger,
    sql: &str,
    args: &[SqlValue],
) -> Result<u64>
where
    E: Executor<'c, Database = Sqlite>,
{
    let sql = dialect.replace_placeholders(sql);
    logger.log_query(&sql, args);
    let result = bind_args(sqlx::query(&sql), args)
        .execute(executor)
        .await
        .map_err(|e| {
            logger.log_error(&sql, &e);
            Error::query(sql.as_ref(), args, e)
        })?;
    Ok(result.rows_affected())
}

// SQLite reports the generated key out of band, so pk goes unused here.
pub(crate) async fn insert_on<'c, E>(
    executor: E,
    dialect: &Dialect,
    logger: &Logger,
    sql: &str,
    _pk: &str,
    args: &[SqlValue],
) -> Result<i64>
where
    E: Executor<'c, Database = Sqlite>,
{
    let sql = dialect.replace_placeholders(sql);
    logger.log_query(&sql, args);
    let result = bind_args(sqlx::query(&sql), args)
        .execute(executor)
        .await
        .map_err(|e| {
            logger.log_error(&sql, &e);
            Error::query(sql.as_ref(), args, e)
        })?;
    Ok(result.last_insert_rowid())
}
