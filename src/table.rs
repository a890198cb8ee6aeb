use crate::support;
use sqlbridge_core::{
    Expression, Execer, Requirement, Result, SqlValue, TableName,
};

/// A table pinned to an execution handle, for the recurring small jobs that
/// do not deserve hand-written SQL at every call site. Works the same on a
/// database, a checked-out connection or an open transaction.
pub struct Table<'a> {
    name: TableName,
    execer: &'a dyn Execer,
}

impl<'a> Table<'a> {
    pub fn new(execer: &'a dyn Execer, name: TableName) -> Self {
        Table { name, execer }
    }

    pub fn name(&self) -> &TableName {
        &self.name
    }

    pub async fn count(&self) -> Result<u64> {
        self.count_where(&Expression::NoOp).await
    }

    pub async fn count_where(&self, filter: &Expression) -> Result<u64> {
        let dialect = self.execer.dialect();
        let (where_sql, args) = filter.build(&dialect);
        let mut sql = format!("SELECT COUNT(*) FROM {}", self.name.quoted(&dialect));
        if !where_sql.is_empty() {
            sql.push(' ');
            sql.push_str(&where_sql);
        }
        let count = support::select_i64(self.execer, &sql, &args).await?;
        Ok(count as u64)
    }

    /// The values of one integer column, filtered and in select order.
    pub async fn select_i64s(&self, column: &str, filter: &Expression) -> Result<Vec<i64>> {
        let dialect = self.execer.dialect();
        let (where_sql, args) = filter.build(&dialect);
        let mut sql = format!(
            "SELECT {} FROM {}",
            dialect.quote(column),
            self.name.quoted(&dialect)
        );
        if !where_sql.is_empty() {
            sql.push(' ');
            sql.push_str(&where_sql);
        }
        support::select_i64s(self.execer, &sql, &args).await
    }

    /// Deletes the matching rows, checking the count against `requirement`.
    /// Returns how many went away.
    pub async fn delete(&self, filter: &Expression, requirement: Requirement) -> Result<u64> {
        let dialect = self.execer.dialect();
        let (where_sql, args) = filter.build(&dialect);
        let mut sql = format!("DELETE FROM {}", self.name.quoted(&dialect));
        if !where_sql.is_empty() {
            sql.push(' ');
            sql.push_str(&where_sql);
        }
        support::exec_with(self.execer, requirement, &sql, &args).await
    }

    /// Runs a statement on this table's handle with an affected-count
    /// requirement.
    pub async fn exec_with(
        &self,
        requirement: Requirement,
        sql: &str,
        args: &[SqlValue],
    ) -> Result<u64> {
        support::exec_with(self.execer, requirement, sql, args).await
    }

    /// Runs a query against this table's handle with a row-count requirement.
    pub async fn query_with(
        &self,
        requirement: Requirement,
        sql: &str,
        args: &[SqlValue],
    ) -> Result<Vec<sqlbridge_core::SqlRow>> {
        support::query_with(self.execer, requirement, sql, args).await
    }
}
