use crate::transaction::MysqlTx;
use async_trait::async_trait;
use sqlbridge_core::{
    DbConfig, Dialect, Error, Execer, Logger, Result, SqlDb, SqlRow, SqlTx, SqlValue,
};
use sqlx::mysql::{MySqlArguments, MySqlPoolOptions, MySqlRow};
use sqlx::pool::PoolConnection;
use sqlx::query::Query;
use sqlx::{Column, Executor, MySql, MySqlPool, Row, TypeInfo, Value, ValueRef};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Opens a pooled MySQL database. Network and pool-exhaustion failures are
/// retryable; authentication and TLS configuration failures are not.
pub async fn connect(config: &DbConfig) -> Result<MysqlDb> {
    let pool = MySqlPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.url)
        .await
        .map_err(connect_error)?;
    Ok(MysqlDb {
        pool,
        dialect: config.dialect,
        logger: Arc::new(Logger::new()),
    })
}

fn connect_error(error: sqlx::Error) -> Error {
    let retryable = matches!(error, sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut);
    Error::connect(error.to_string(), retryable)
}

pub struct MysqlDb {
    pool: MySqlPool,
    dialect: Dialect,
    logger: Arc<Logger>,
}

#[async_trait]
impl Execer for MysqlDb {
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
        Ok(Box::new(MysqlTx::new(tx, self.dialect, self.logger.clone())))
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
impl SqlDb for MysqlDb {
    fn as_execer(&self) -> &dyn Execer {
        self
    }

    async fn acquire(&self) -> Result<Box<dyn Execer>> {
        let conn = self.pool.acquire().await.map_err(Error::driver)?;
        Ok(Box::new(MysqlConn {
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
pub struct MysqlConn {
    conn: Mutex<PoolConnection<MySql>>,
    dialect: Dialect,
    logger: Arc<Logger>,
}

#[async_trait]
impl Execer for MysqlConn {
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
    mut query: Query<'q, MySql, MySqlArguments>,
    args: &[SqlValue],
) -> Query<'q, MySql, MySqlArguments> {
    let mut flat = Vec::with_capacity(args.len());
    for arg in args {
        arg.flatten_into(&mut flat);
    }
    for arg in flat {
        query = match arg {
            SqlValue::Null => query.bind(Option::<i64>::None),
            SqlValue::Bool(v) => query.bind(v),
            SqlValue::Int(v) => query.bind(v),
            SqlValue::UInt(v) => query.bind(v),
            SqlValue::Float(v) => query.bind(v),
            SqlValue::Text(v) => query.bind(v),
            SqlValue::Blob(v) => query.bind(v),
            SqlValue::List(_) => query,
        };
    }
    query
}

fn decode_row(row: &MySqlRow) -> Result<SqlRow> {
    let mut columns = Vec::with_capacity(row.columns().len());
    for column in row.columns() {
        let raw = row.try_get_raw(column.ordinal()).map_err(Error::driver)?;
        let owned = ValueRef::to_owned(&raw);
        let value = if owned.is_null() {
            SqlValue::Null
        } else {
            match owned.type_info().name() {
                "BOOLEAN" => SqlValue::Bool(owned.try_decode().map_err(Error::driver)?),
                "TINYINT" => {
                    SqlValue::Int(owned.try_decode::<i8>().map_err(Error::driver)? as i64)
                }
                "SMALLINT" => {
                    SqlValue::Int(owned.try_decode::<i16>().map_err(Error::driver)? as i64)
                }
                "INT" | "MEDIUMINT" => {
                    SqlValue::Int(owned.try_decode::<i32>().map_err(Error::driver)? as i64)
                }
                "BIGINT" => SqlValue::Int(owned.try_decode().map_err(Error::driver)?),
                "TINYINT UNSIGNED" => {
                    SqlValue::UInt(owned.try_decode::<u8>().map_err(Error::driver)? as u64)
                }
                "SMALLINT UNSIGNED" => {
                    SqlValue::UInt(owned.try_decode::<u16>().map_err(Error::driver)? as u64)
                }
                "INT UNSIGNED" | "MEDIUMINT UNSIGNED" => {
                    SqlValue::UInt(owned.try_decode::<u32>().map_err(Error::driver)? as u64)
                }
                "BIGINT UNSIGNED" => SqlValue::UInt(owned.try_decode().map_err(Error::driver)?),
                "FLOAT" => {
                    SqlValue::Float(owned.try_decode::<f32>().map_err(Error::driver)? as f64)
                }
                "DOUBLE" => SqlValue::Float(owned.try_decode().map_err(Error::driver)?),
                "CHAR" | "VARCHAR" | "TEXT" | "TINYTEXT" | "MEDIUMTEXT" | "LONGTEXT" | "ENUM" => {
                    SqlValue::Text(owned.try_decode().map_err(Error::driver)?)
                }
                "BINARY" | "VARBINARY" | "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" => {
                    SqlValue::Blob(owned.try_decode().map_err(Error::driver)?)
                }
                other => {
                    return Err(Error::Driver(format!(
                        "unhandled mysql type {} in column {}",
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
    E: Executor<'c, Database = MySql>,
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
    E: Executor<'c, Database = MySql>,
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

// MySQL reports the generated key out of band, so pk goes unused here.
pub(crate) async fn insert_on<'c, E>(
    executor: E,
    dialect: &Dialect,
    logger: &Logger,
    sql: &str,
    _pk: &str,
    args: &[SqlValue],
) -> Result<i64>
where
    E: Executor<'c, Database = MySql>,
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
    Ok(result.last_insert_id() as i64)
}
