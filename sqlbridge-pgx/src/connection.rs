use crate::config::PgEnv;
use crate::transaction::PgxTx;
use crate::value::PgValue;
use async_trait::async_trait;
use deadpool_postgres::{ManagerConfig, Object, Pool, PoolConfig, PoolError, RecyclingMethod, Runtime};
use sqlbridge_core::{
    DbConfig, Dialect, Error, Execer, Logger, Result, SqlDb, SqlRow, SqlTx, SqlValue,
};
use std::error::Error as StdError;
use std::sync::Arc;
use tokio_postgres::error::SqlState;
use tokio_postgres::types::ToSql;
use tokio_postgres::{NoTls, Row};

/// Opens a pooled PostgreSQL database over tokio-postgres, the endpoint
/// taken from `env`. Pool creation is lazy, so one connection is checked out
/// immediately to surface unreachable or still-starting servers to the
/// establisher's retry loop.
pub async fn connect(env: &PgEnv, config: &DbConfig) -> Result<PgxDb> {
    let mut pg = deadpool_postgres::Config::new();
    pg.host = Some(env.host.clone());
    pg.port = Some(env.port);
    pg.dbname = Some(env.dbname.clone());
    pg.user = Some(env.user.clone());
    pg.password = Some(env.password.clone());
    pg.ssl_mode = Some(env.ssl_mode());
    pg.manager = Some(ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    });
    if config.max_connections > 0 {
        pg.pool = Some(PoolConfig::new(config.max_connections as usize));
    }
    let pool = pg
        .create_pool(Some(Runtime::Tokio1), NoTls)
        .map_err(|e| Error::connect(e.to_string(), false))?;
    pool.get().await.map_err(pool_error)?;
    Ok(PgxDb {
        pool,
        dialect: config.dialect,
        logger: Arc::new(Logger::new()),
    })
}

fn pool_error(error: PoolError) -> Error {
    let retryable = match &error {
        PoolError::Timeout(_) => true,
        PoolError::Backend(backend) => transient(backend),
        _ => false,
    };
    Error::connect(error.to_string(), retryable)
}

// "The database system is starting up" and plain socket failures both mean
// try again; everything else (bad credentials, missing database) is final.
fn transient(error: &tokio_postgres::Error) -> bool {
    if error.code() == Some(&SqlState::CANNOT_CONNECT_NOW) {
        return true;
    }
    let mut source = error.source();
    while let Some(cause) = source {
        if cause.is::<std::io::Error>() {
            return true;
        }
        source = cause.source();
    }
    false
}

pub struct PgxDb {
    pool: Pool,
    dialect: Dialect,
    logger: Arc<Logger>,
}

#[async_trait]
impl Execer for PgxDb {
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
        let client = self.pool.get().await.map_err(pool_error)?;
        client.batch_execute("BEGIN").await.map_err(Error::driver)?;
        Ok(Box::new(PgxTx::new(client, self.dialect, self.logger.clone())))
    }

    async fn query(&self, sql: &str, args: &[SqlValue]) -> Result<Vec<SqlRow>> {
        let client = self.pool.get().await.map_err(pool_error)?;
        query_on(&client, &self.dialect, &self.logger, sql, args).await
    }

    async fn exec(&self, sql: &str, args: &[SqlValue]) -> Result<u64> {
        let client = self.pool.get().await.map_err(pool_error)?;
        exec_on(&client, &self.dialect, &self.logger, sql, args).await
    }

    async fn insert(&self, sql: &str, pk: &str, args: &[SqlValue]) -> Result<i64> {
        let client = self.pool.get().await.map_err(pool_error)?;
        insert_on(&client, &self.dialect, &self.logger, sql, pk, args).await
    }

    async fn prepare(&self, sql: &str) -> Result<()> {
        let sql = self.dialect.replace_placeholders(sql);
        let client = self.pool.get().await.map_err(pool_error)?;
        client
            .prepare_cached(&sql)
            .await
            .map_err(|e| Error::query(sql.as_ref(), &[] as &[SqlValue], e))?;
        Ok(())
    }
}

#[async_trait]
impl SqlDb for PgxDb {
    fn as_execer(&self) -> &dyn Execer {
        self
    }

    async fn acquire(&self) -> Result<Box<dyn Execer>> {
        let client = self.pool.get().await.map_err(pool_error)?;
        Ok(Box::new(PgxConn {
            client,
            dialect: self.dialect,
            logger: self.logger.clone(),
        }))
    }

    async fn ping(&self) -> Result<()> {
        let client = self.pool.get().await.map_err(pool_error)?;
        client
            .batch_execute("SELECT 1")
            .await
            .map_err(Error::driver)?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close();
    }
}

/// A single checked-out client; returned to the pool on drop. Statements
/// prepared here stay in this session's cache.
pub struct PgxConn {
    client: Object,
    dialect: Dialect,
    logger: Arc<Logger>,
}

#[async_trait]
impl Execer for PgxConn {
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
        query_on(&self.client, &self.dialect, &self.logger, sql, args).await
    }

    async fn exec(&self, sql: &str, args: &[SqlValue]) -> Result<u64> {
        exec_on(&self.client, &self.dialect, &self.logger, sql, args).await
    }

    async fn insert(&self, sql: &str, pk: &str, args: &[SqlValue]) -> Result<i64> {
        insert_on(&self.client, &self.dialect, &self.logger, sql, pk, args).await
    }

    async fn prepare(&self, sql: &str) -> Result<()> {
        let sql = self.dialect.replace_placeholders(sql);
        self.client
            .prepare_cached(&sql)
            .await
            .map_err(|e| Error::query(sql.as_ref(), &[] as &[SqlValue], e))?;
        Ok(())
    }
}

fn to_params(args: &[SqlValue]) -> Vec<PgValue> {
    let mut flat = Vec::with_capacity(args.len());
    for arg in args {
        arg.flatten_into(&mut flat);
    }
    flat.into_iter().map(PgValue).collect()
}

fn decode_row(row: &Row) -> Result<SqlRow> {
    let mut columns = Vec::with_capacity(row.len());
    for (i, column) in row.columns().iter().enumerate() {
        let value = match column.type_().name() {
            "bool" => row
                .try_get::<_, Option<bool>>(i)
                .map_err(Error::driver)?
                .map(SqlValue::Bool),
            "int2" => row
                .try_get::<_, Option<i16>>(i)
                .map_err(Error::driver)?
                .map(|v| SqlValue::Int(v as i64)),
            "int4" => row
                .try_get::<_, Option<i32>>(i)
                .map_err(Error::driver)?
                .map(|v| SqlValue::Int(v as i64)),
            "int8" => row
                .try_get::<_, Option<i64>>(i)
                .map_err(Error::driver)?
                .map(SqlValue::Int),
            "float4" => row
                .try_get::<_, Option<f32>>(i)
                .map_err(Error::driver)?
                .map(|v| SqlValue::Float(v as f64)),
            "float8" => row
                .try_get::<_, Option<f64>>(i)
                .map_err(Error::driver)?
                .map(SqlValue::Float),
            "text" | "varchar" | "bpchar" | "name" => row
                .try_get::<_, Option<String>>(i)
                .map_err(Error::driver)?
                .map(SqlValue::Text),
            "bytea" => row
                .try_get::<_, Option<Vec<u8>>>(i)
                .map_err(Error::driver)?
                .map(SqlValue::Blob),
            other => {
                return Err(Error::Driver(format!(
                    "unhandled postgres type {} in column {}",
                    other,
                    column.name()
                )));
            }
        };
        columns.push((column.name().to_string(), value.unwrap_or(SqlValue::Null)));
    }
    Ok(SqlRow::new(columns))
}

pub(crate) async fn query_on(
    client: &deadpool_postgres::ClientWrapper,
    dialect: &Dialect,
    logger: &Logger,
    sql: &str,
    args: &[SqlValue],
) -> Result<Vec<SqlRow>> {
    let sql = dialect.replace_placeholders(sql);
    logger.log_query(&sql, args);
    let statement = client
        .prepare_cached(&sql)
        .await
        .map_err(|e| Error::query(sql.as_ref(), args, e))?;
    let params = to_params(args);
    let refs: Vec<&(dyn ToSql + Sync)> = params.iter().map(|p| p as _).collect();
    let rows = client.query(&statement, &refs).await.map_err(|e| {
        logger.log_error(&sql, &e);
        Error::query(sql.as_ref(), args, e)
    })?;
    rows.iter().map(decode_row).collect()
}

pub(crate) async fn exec_on(
    client: &deadpool_postgres::ClientWrapper,
    dialect: &Dialect,
    logger: &Logger,
    sql: &str,
    args: &[SqlValue],
) -> Result<u64> {
    let sql = dialect.replace_placeholders(sql);
    logger.log_query(&sql, args);
    let statement = client
        .prepare_cached(&sql)
        .await
        .map_err(|e| Error::query(sql.as_ref(), args, e))?;
    let params = to_params(args);
    let refs: Vec<&(dyn ToSql + Sync)> = params.iter().map(|p| p as _).collect();
    client.execute(&statement, &refs).await.map_err(|e| {
        logger.log_error(&sql, &e);
        Error::query(sql.as_ref(), args, e)
    })
}

/// PostgreSQL has no last-insert-id, so the statement is extended with a
/// RETURNING phrase for the key column and the key read from the single row.
pub(crate) async fn insert_on(
    client: &deadpool_postgres::ClientWrapper,
    dialect: &Dialect,
    logger: &Logger,
    sql: &str,
    pk: &str,
    args: &[SqlValue],
) -> Result<i64> {
    let mut sql = dialect.replace_placeholders(sql).into_owned();
    sql.push_str(" RETURNING ");
    dialect.quoter().write_quoted(&mut sql, pk);
    logger.log_query(&sql, args);
    let statement = client
        .prepare_cached(&sql)
        .await
        .map_err(|e| Error::query(sql.as_str(), args, e))?;
    let params = to_params(args);
    let refs: Vec<&(dyn ToSql + Sync)> = params.iter().map(|p| p as _).collect();
    let row = client.query_one(&statement, &refs).await.map_err(|e| {
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
