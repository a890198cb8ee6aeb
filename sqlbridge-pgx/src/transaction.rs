use crate::connection::{exec_on, insert_on, query_on};
use async_trait::async_trait;
use deadpool_postgres::Object;
use sqlbridge_core::{Dialect, Error, Execer, Logger, Result, SqlRow, SqlTx, SqlValue};
use std::sync::Arc;

/// A transaction pinned to one pooled client, driven over the wire with
/// explicit BEGIN/COMMIT/ROLLBACK. The slot empties on commit or rollback;
/// any use after that reports [`Error::TransactionClosed`]. A transaction
/// dropped without finishing, or whose COMMIT/ROLLBACK fails on the wire,
/// detaches its client from the pool: the connection closes and the server
/// aborts the open transaction, so no later checkout sees its state.
pub struct PgxTx {
    client: Option<Object>,
    dialect: Dialect,
    logger: Arc<Logger>,
}

impl PgxTx {
    pub(crate) fn new(client: Object, dialect: Dialect, logger: Arc<Logger>) -> Self {
        PgxTx {
            client: Some(client),
            dialect,
            logger,
        }
    }

    fn live(&self) -> Result<&Object> {
        self.client.as_ref().ok_or(Error::TransactionClosed)
    }

    async fn finish(mut self: Box<Self>, command: &str) -> Result<()> {
        let client = self.client.take().ok_or(Error::TransactionClosed)?;
        match client.batch_execute(command).await {
            Ok(()) => Ok(()),
            Err(error) => {
                // The connection is stuck mid-transaction; it must not go
                // back into the pool.
                let _ = Object::take(client);
                Err(Error::driver(error))
            }
        }
    }
}

impl Drop for PgxTx {
    fn drop(&mut self) {
        if let Some(client) = self.client.take() {
            let _ = Object::take(client);
        }
    }
}

#[async_trait]
impl Execer for PgxTx {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn logger(&self) -> &Logger {
        &self.logger
    }

    fn is_tx(&self) -> bool {
        true
    }

    async fn begin(&self) -> Result<Box<dyn SqlTx>> {
        Err(Error::Unsupported(
            "nested transactions are not supported; reuse the open one".into(),
        ))
    }

    async fn query(&self, sql: &str, args: &[SqlValue]) -> Result<Vec<SqlRow>> {
        query_on(self.live()?, &self.dialect, &self.logger, sql, args).await
    }

    async fn exec(&self, sql: &str, args: &[SqlValue]) -> Result<u64> {
        exec_on(self.live()?, &self.dialect, &self.logger, sql, args).await
    }

    async fn insert(&self, sql: &str, pk: &str, args: &[SqlValue]) -> Result<i64> {
        insert_on(self.live()?, &self.dialect, &self.logger, sql, pk, args).await
    }

    async fn prepare(&self, sql: &str) -> Result<()> {
        let sql = self.dialect.replace_placeholders(sql);
        self.live()?
            .prepare_cached(&sql)
            .await
            .map_err(|e| Error::query(sql.as_ref(), &[] as &[SqlValue], e))?;
        Ok(())
    }
}

#[async_trait]
impl SqlTx for PgxTx {
    fn as_execer(&self) -> &dyn Execer {
        self
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.finish("COMMIT").await
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.finish("ROLLBACK").await
    }
}
