use sqlbridge_core::{Error, Execer, Requirement, Result, SqlRow, SqlValue};

/// Runs a query and checks the fetched row count against `requirement`.
pub async fn query_with(
    execer: &dyn Execer,
    requirement: Requirement,
    sql: &str,
    args: &[SqlValue],
) -> Result<Vec<SqlRow>> {
    let rows = execer.query(sql, args).await?;
    requirement.check_query(rows.len() as u64)?;
    Ok(rows)
}

/// Runs a statement and checks the affected row count against `requirement`.
pub async fn exec_with(
    execer: &dyn Execer,
    requirement: Requirement,
    sql: &str,
    args: &[SqlValue],
) -> Result<u64> {
    let affected = execer.exec(sql, args).await?;
    requirement.check_exec(affected)?;
    Ok(affected)
}

/// Fetches the first column of every row as an integer.
pub async fn select_i64s(
    execer: &dyn Execer,
    sql: &str,
    args: &[SqlValue],
) -> Result<Vec<i64>> {
    let rows = execer.query(sql, args).await?;
    let mut out = Vec::with_capacity(rows.len());
    for row in &rows {
        match row.at(0).and_then(SqlValue::as_i64) {
            Some(value) => out.push(value),
            None => {
                return Err(Error::Driver(format!(
                    "non-integer first column in: {}",
                    sql
                )));
            }
        }
    }
    Ok(out)
}

/// Fetches exactly one row and returns its first column as an integer.
pub async fn select_i64(execer: &dyn Execer, sql: &str, args: &[SqlValue]) -> Result<i64> {
    let values = select_i64s(execer, sql, args).await?;
    Requirement::One.check_query(values.len() as u64)?;
    Ok(values[0])
}
