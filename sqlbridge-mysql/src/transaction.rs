use crate::connection::{exec_on, insert_on, query_on};
use async_trait::async_trait;
use sqlbridge_core::{Dialect, Error, Execer, Logger, Result, SqlRow, SqlTx, SqlValue};
use sqlx::{Executor, MySql, Transaction};
use std::sync::Arc;
use tokio::sync::Mutex;

/// An open MySQL transaction. The slot empties on commit or rollback; any
/// use after that reports [`Error::TransactionClosed`].
pub struct MysqlTx {
    tx: Mutex<Option<Transaction<'static, MySql>>>,
    dialect: Dialect,
    logger: Arc<Logger>,
}

impl MysqlTx {
    pub(crate) fn new(
        tx: Transaction<'static, MySql>,
        dialect: Dialect,
        logger: Arc<Logger>,
    ) -> Self {
        MysqlTx {
            tx: Mutex::new(Some(tx)),
            dialect,
            logger,
        }
    }
}

#[async_trait]
impl Execer for MysqlTx {
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
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().ok_or(Error::TransactionClosed)?;
        query_on(&mut **tx, &self.dialect, &self.logger, sql, args).await
    }

    async fn exec(&self, sql: &str, args: &[SqlValue]) -> Result<u64> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().ok_or(Error::TransactionClosed)?;
        exec_on(&mut **tx, &self.dialect, &self.logger, sql, args).await
    }

    async fn insert(&self, sql: &str, pk: &str, args: &[SqlValue]) -> Result<i64> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().ok_or(Error::TransactionClosed)?;
        insert_on(&mut **tx, &self.dialect, &self.logger, sql, pk, args).await
    }

    async fn prepare(&self, sql: &str) -> Result<()> {
        let sql = self.dialect.replace_placeholders(sql);
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().ok_or(Error::TransactionClosed)?;
        (&mut **tx)
            .prepare(&sql)
            .await
            .map_err(|e| Error::query(sql.as_ref(), &[] as &[SqlValue], e))?;
        Ok(())
    }
}

#[async_trait]
impl SqlTx for MysqlTx {
    fn as_execer(&self) -> &dyn Execer {
        self
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let tx = self
            .tx
            .lock()
            .await
            .take()
            .ok_or(Error::TransactionClosed)?;
        tx.commit().await.map_err(Error::driver)
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        let tx = self
            .tx
            .lock()
            .await
            .take()
            .ok_or(Error::TransactionClosed)?;
        tx.rollback().await.map_err(Error::driver)
    }
}
