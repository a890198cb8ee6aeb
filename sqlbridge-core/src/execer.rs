use crate::{Dialect, Error, Logger, Result, SqlValue};
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;

/// A fetched row: column names paired with decoded values, in select order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlRow {
    pub columns: Vec<(String, SqlValue)>,
}

impl SqlRow {
    pub fn new(columns: Vec<(String, SqlValue)>) -> Self {
        Self { columns }
    }

    /// The value of the named column, or `None` when the row has no such
    /// column. A column that is present but NULL yields `Some(&SqlValue::Null)`.
    pub fn get(&self, name: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .find(|(column, _)| column == name)
            .map(|(_, value)| value)
    }

    /// The value at the given position in select order.
    pub fn at(&self, index: usize) -> Option<&SqlValue> {
        self.columns.get(index).map(|(_, value)| value)
    }
}

/// The common execution surface of databases, pooled connections and open
/// transactions. Statement text uses neutral `?` placeholders; implementations
/// rewrite them through [`Dialect::replace_placeholders`] before dispatch.
#[async_trait]
pub trait Execer: Send + Sync {
    fn dialect(&self) -> Dialect;

    fn logger(&self) -> &Logger;

    /// Whether this handle already sits inside an open transaction.
    fn is_tx(&self) -> bool;

    /// Opens a transaction on this handle. Implementations backed by an
    /// already-open transaction return [`Error::Unsupported`]; use
    /// [`transact`] instead, which joins the enclosing transaction.
    async fn begin(&self) -> Result<Box<dyn SqlTx>>;

    async fn query(&self, sql: &str, args: &[SqlValue]) -> Result<Vec<SqlRow>>;

    /// The first row of the result set, or `None` when it is empty.
    async fn query_row(&self, sql: &str, args: &[SqlValue]) -> Result<Option<SqlRow>> {
        let mut rows = self.query(sql, args).await?;
        if rows.is_empty() {
            Ok(None)
        } else {
            Ok(Some(rows.swap_remove(0)))
        }
    }

    /// Runs a statement and returns the number of affected rows.
    async fn exec(&self, sql: &str, args: &[SqlValue]) -> Result<u64>;

    /// Runs an INSERT and returns the generated key of column `pk`. On
    /// last-insert-id dialects `pk` is ignored; on RETURNING dialects the
    /// statement is extended with a RETURNING phrase for it.
    async fn insert(&self, sql: &str, pk: &str, args: &[SqlValue]) -> Result<i64>;

    /// Sends the statement to the server for parse-time validation without
    /// running it.
    async fn prepare(&self, sql: &str) -> Result<()>;
}

/// A database handle backed by a connection pool.
#[async_trait]
pub trait SqlDb: Execer {
    /// This database viewed as a plain execution handle.
    fn as_execer(&self) -> &dyn Execer;

    /// Checks out a single connection. Use [`single_conn`] to scope the
    /// checkout to a closure.
    async fn acquire(&self) -> Result<Box<dyn Execer>>;

    async fn ping(&self) -> Result<()>;

    async fn close(&self);
}

/// An open transaction. Committing or rolling back consumes the handle; a
/// second finish attempt on a driver-level transaction reports
/// [`Error::TransactionClosed`].
#[async_trait]
pub trait SqlTx: Execer {
    /// This transaction viewed as a plain execution handle.
    fn as_execer(&self) -> &dyn Execer;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Runs `f` inside a transaction on `execer`.
///
/// When `execer` is already a transaction, `f` simply joins it: no nested
/// transaction is opened and the enclosing caller stays in charge of the
/// final commit or rollback. Otherwise a transaction is opened and committed
/// on `Ok`, rolled back on `Err`, and rolled back on panic with the panic
/// converted into [`Error::TransactionAborted`] carrying a captured
/// backtrace. The panic never crosses this function.
pub async fn transact<'e, T, F>(execer: &'e dyn Execer, f: F) -> Result<T>
where
    T: Send,
    F: for<'a> FnOnce(&'a dyn Execer) -> BoxFuture<'a, Result<T>> + Send + 'e,
{
    if execer.is_tx() {
        return f(execer).await;
    }
    let tx = execer.begin().await?;
    let outcome = AssertUnwindSafe(f(tx.as_execer())).catch_unwind().await;
    match outcome {
        Ok(Ok(value)) => {
            tx.commit().await?;
            Ok(value)
        }
        Ok(Err(error)) => {
            if let Err(rollback) = tx.rollback().await {
                log::error!("rollback failed: {}", rollback);
            }
            Err(error)
        }
        Err(panic) => {
            if let Err(rollback) = tx.rollback().await {
                log::error!("rollback failed: {}", rollback);
            }
            let message = panic_message(panic);
            let backtrace = std::backtrace::Backtrace::capture().to_string();
            log::error!("transaction aborted by panic: {}", message);
            Err(Error::TransactionAborted { message, backtrace })
        }
    }
}

/// Checks out one connection from `db`, runs `f` on it, and returns it to the
/// pool when the boxed handle drops.
pub async fn single_conn<'d, T, F>(db: &'d dyn SqlDb, f: F) -> Result<T>
where
    T: Send,
    F: for<'a> FnOnce(&'a dyn Execer) -> BoxFuture<'a, Result<T>> + Send + 'd,
{
    let conn = db.acquire().await?;
    f(conn.as_ref()).await
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_lookup() {
        let row = SqlRow::new(vec![
            ("id".to_string(), SqlValue::Int(7)),
            ("name".to_string(), SqlValue::Text("Ada".to_string())),
            ("nick".to_string(), SqlValue::Null),
        ]);
        assert_eq!(row.get("id"), Some(&SqlValue::Int(7)));
        assert_eq!(row.get("nick"), Some(&SqlValue::Null));
        assert_eq!(row.get("missing"), None);
        assert_eq!(row.at(1), Some(&("Ada".into())));
    }
}
