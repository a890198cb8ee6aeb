use crate::transaction::PostgresTx;
use async_trait::async_trait;
use sqlbridge_core::{
    DbConfig, Dialect, Error, Execer, Logger, Result, SqlDb, SqlRow, SqlTx, SqlValue,
};
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgArguments, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{Column, Executor, PgPool, Postgres, Row, TypeInfo, Value, ValueRef};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Opens a pooled PostgreSQL database. Network failures, pool exhaustion and
/// the server's own "the database system is starting up" state (SQLSTATE
/// 57P03) are retryable.
pub async fn connect(config: &DbConfig) -> Result<PostgresDb> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.url)
        .await
        .map_err(connect_error)?;
    Ok(PostgresDb {
        pool,
        dialect: config.dialect,
        logger: Arc::new(Logger::new()),
    })
}

fn connect_error(error: sqlx::Error) -> Error {
    let retryable = match &error {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut => true,
        sqlx::Error::Database(db) => db.code().as_deref() == Some("57P03"),
        _ => false,
    };
    Error::connect(error.to_string(), retryable)
}

pub struct PostgresDb {
    pool: PgPool,
    dialect: Dialect,
    logger: Arc<Logger>,
}

#[async_trait]
impl Execer for PostgresDb {
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
        Ok(Box::new(PostgresTx::new(
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
impl SqlDb for PostgresDb {
    fn as_execer(&self) -> &dyn Execer {
        self
    }

    async fn acquire(&self) -> Result<Box<dyn Execer>> {
        let conn = self.pool.acquire().await.map_err(Error::driver)?;
        Ok(Box::new(PostgresConn {
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

/// A single checked-out connection; returned to the pool on drop.
pub struct PostgresConn {
    conn: Mutex<PoolConnection<Postgres>>,
    dialect: Dialect,
    logger: Arc<Logger>,
}

#[async_trait]
impl Execer for PostgresConn {
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
    mut query: Query<'q, Postgres, PgArguments>,
    args: &[SqlValue],
) -> Query<'q, Postgres, PgArguments> {
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

fn decode_row(row: &PgRow) -> Result<SqlRow> {
    let mut columns = Vec::with_capacity(row.columns().len());
    for column in row.columns() {
        let raw = row.try_get_raw(column.ordinal()).map_err(Error::driver)?;
        let owned = ValueRef::to_owned(&raw);
        let value = if owned.is_null() {
            SqlValue::Null
        } else {
            match owned.type_info().name() {
                "BOOL" => SqlValue::Bool(owned.try_decode().map_err(Error::driver)?),
                "INT2" => {
                    SqlValue::Int(owned.try_decode::<i16>().map_err(Error::driver)? as i64)
                }
                "INT4" => {
                    SqlValue::Int(owned.try_decode::<i32>().map_err(Error::driver)? as i64)
                }
                "INT8" => SqlValue::Int(owned.try_decode().map_err(Error::driver)?),
                "FLOAT4" => {
                    SqlValue::Float(owned.try_decode::<f32>().map_err(Error::driver)? as f64)
                }
                "FLOAT8" => SqlValue::Float(owned.try_decode().map_err(Error::driver)?),
                "TEXT" | "VARCHAR" | "CHAR" | "BPCHAR" | "NAME" => {
                    SqlValue::Text(owned.try_decode().map_err(Error::driver)?)
                }
                "BYTEA" => SqlValue::Blob(owned.try_decode().map_err(Error::driver)?),
                other => {
                    return Err(Error::Driver(format!(
                        "unhandled postgres type {} in column {}",
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
    E: Executor<'c, Database = Postgres>,
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
    E: Executor<'c, Database = Postgres>,
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

/// PostgreSQL has no last-insert-id, so the statement is extended with a
/// RETURNING phrase for the key column and the key read from the single row.
pub(crate) async fn insert_on<'c, E>(
    executor: E,
    dialect: &Dialect,
    logger: &Logger,
    sql: &str,
    pk: &str,
    args: &[SqlValue],
) -> Result<i64>
where
    E: Executor<'c, Database = Postgres>,
{
    let mut sql = dialect.replace_placeholders(sql).into_owned();
    sql.push_str(" RETURNING ");
    dialect.quoter().write_quoted(&mut sql, pk);
    logger.log_query(&sql, args);
    let row = bind_args(sqlx::query(&sql), args)
        .fetch_one(executor)
        .await
        .map_err(|e| {
            logger.log_error(&sql, &e);
            Error::query(sql.as_str(), args, e)
        })?;
    let decoded = decode_row(&row)?;
    match decoded.at(0).and_then(SqlValue::as_i64) {
        Some(id) => Ok(id),
        None => Err(Error::Driver(format!(
            "insert did not return an integer key for column {}",
            pk
        ))),
    }
}
