use crate::{Dialect, Error, Execer, FieldSpec, Result, SqlValue, TableName};
use std::collections::BTreeSet;
use std::fmt::Write;

/// Referential action run by the database when a referenced row changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consequence {
    NoAction,
    Restrict,
    Cascade,
    SetNull,
    SetDefault,
}

impl Consequence {
    pub fn sql(&self) -> &'static str {
        match self {
            Consequence::NoAction => "no action",
            Consequence::Restrict => "restrict",
            Consequence::Cascade => "cascade",
            Consequence::SetNull => "set null",
            Consequence::SetDefault => "set default",
        }
    }
}

/// Target of a foreign key: the parent table and the referenced column.
/// The table name here is unprefixed; the child table's prefix is applied
/// when the constraint is rendered, the two tables living side by side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub table_name: String,
    pub column: String,
}

/// One side of a parent/child relationship, pinned to a concrete table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    pub table_name: TableName,
    pub column: String,
}

/// A foreign key from one column of a child table to a column of its parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FkConstraint {
    pub column: String,
    pub parent: Reference,
    pub on_update: Option<Consequence>,
    pub on_delete: Option<Consequence>,
}

impl FkConstraint {
    pub fn new(
        column: impl Into<String>,
        parent_table: impl Into<String>,
        parent_column: impl Into<String>,
    ) -> Self {
        FkConstraint {
            column: column.into(),
            parent: Reference {
                table_name: parent_table.into(),
                column: parent_column.into(),
            },
            on_update: None,
            on_delete: None,
        }
    }

    pub fn on_update(mut self, consequence: Consequence) -> Self {
        self.on_update = Some(consequence);
        self
    }

    pub fn on_delete(mut self, consequence: Consequence) -> Self {
        self.on_delete = Some(consequence);
        self
    }

    /// The constraint a field declares, if any.
    pub fn of_field(field: &FieldSpec) -> Option<FkConstraint> {
        field.foreign_key.as_ref().map(|reference| FkConstraint {
            column: field.name.clone(),
            parent: reference.clone(),
            on_update: field.on_update,
            on_delete: field.on_delete,
        })
    }

    fn check_columns(&self) -> Result<()> {
        if self.column.is_empty() {
            return Err(Error::BlankColumn {
                side: "child",
                constraint: format!("-> {}.{}", self.parent.table_name, self.parent.column),
            });
        }
        if self.parent.column.is_empty() {
            return Err(Error::BlankColumn {
                side: "parent",
                constraint: format!("{} -> {}", self.column, self.parent.table_name),
            });
        }
        Ok(())
    }

    /// Renders the table-level constraint clause for CREATE TABLE, named
    /// after the child table and its position in the constraint list. The
    /// parent table inherits the child's prefix.
    pub fn constraint_sql(
        &self,
        dialect: &Dialect,
        table: &TableName,
        index: usize,
    ) -> Result<String> {
        self.check_columns()?;
        let parent = TableName::new(table.prefix.as_str(), self.parent.table_name.as_str());
        let mut out = String::with_capacity(96);
        out.push_str("CONSTRAINT ");
        dialect.quoter().write_quoted(&mut out, &format!("{}_c{}", table, index));
        out.push_str(" foreign key (");
        dialect.quoter().write_quoted(&mut out, &self.column);
        out.push_str(") references ");
        out.push_str(&parent.quoted(dialect));
        out.push_str(" (");
        dialect.quoter().write_quoted(&mut out, &self.parent.column);
        out.push(')');
        if let Some(consequence) = self.on_update {
            let _ = write!(out, " on update {}", consequence.sql());
        }
        if let Some(consequence) = self.on_delete {
            let _ = write!(out, " on delete {}", consequence.sql());
        }
        Ok(out)
    }

    /// The relationship this constraint establishes when declared on `child`.
    /// The parent table takes the child's prefix.
    pub fn relationship_with(&self, child: &TableName) -> Relationship {
        Relationship {
            parent: Part {
                table_name: TableName::new(
                    child.prefix.as_str(),
                    self.parent.table_name.as_str(),
                ),
                column: self.parent.column.clone(),
            },
            child: Part {
                table_name: child.clone(),
                column: self.column.clone(),
            },
        }
    }
}

/// A resolved parent/child link, ready to query for which parent ids the
/// child table references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    pub parent: Part,
    pub child: Part,
}

impl Relationship {
    fn check_columns(&self) -> Result<()> {
        if self.parent.column.is_empty() {
            return Err(Error::BlankColumn {
                side: "parent",
                constraint: format!("{} -> {}", self.parent.table_name, self.child.table_name),
            });
        }
        if self.child.column.is_empty() {
            return Err(Error::BlankColumn {
                side: "child",
                constraint: format!("{} -> {}", self.parent.table_name, self.child.table_name),
            });
        }
        Ok(())
    }

    fn join_sql(&self, dialect: &Dialect, join: &str, tail: &str) -> String {
        let quoter = dialect.quoter();
        let mut out = String::with_capacity(128);
        out.push_str("SELECT DISTINCT a.");
        quoter.write_quoted(&mut out, &self.parent.column);
        out.push_str(" FROM ");
        out.push_str(&self.parent.table_name.quoted(dialect));
        out.push_str(" a ");
        out.push_str(join);
        out.push(' ');
        out.push_str(&self.child.table_name.quoted(dialect));
        out.push_str(" b ON a.");
        quoter.write_quoted(&mut out, &self.parent.column);
        out.push_str(" = b.");
        quoter.write_quoted(&mut out, &self.child.column);
        out.push_str(tail);
        out
    }

    /// Parent ids that at least one child row references.
    pub async fn ids_used_as_foreign_keys(&self, execer: &dyn Execer) -> Result<BTreeSet<i64>> {
        self.check_columns()?;
        let sql = self.join_sql(&execer.dialect(), "INNER JOIN", "");
        collect_ids(execer, &sql).await
    }

    /// Parent ids that no child row references.
    pub async fn ids_unused_as_foreign_keys(&self, execer: &dyn Execer) -> Result<BTreeSet<i64>> {
        self.check_columns()?;
        let dialect = execer.dialect();
        let quoter = dialect.quoter();
        let mut tail = String::from(" WHERE b.");
        quoter.write_quoted(&mut tail, &self.child.column);
        tail.push_str(" IS NULL");
        let sql = self.join_sql(&dialect, "LEFT OUTER JOIN", &tail);
        collect_ids(execer, &sql).await
    }
}

async fn collect_ids(execer: &dyn Execer, sql: &str) -> Result<BTreeSet<i64>> {
    let rows = execer.query(sql, &[]).await?;
    let mut ids = BTreeSet::new();
    for row in rows {
        match row.at(0) {
            Some(SqlValue::Null) | None => {}
            Some(value) => match value.as_i64() {
                Some(id) => {
                    ids.insert(id);
                }
                None => {
                    return Err(Error::Driver(format!(
                        "non-integer key in: {}",
                        sql
                    )));
                }
            },
        }
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SqlType;

    fn persons() -> TableName {
        TableName::new("pfx_", "persons")
    }

    #[test]
    fn constraint_clause() {
        let fk = FkConstraint::new("addresspk", "addresses", "identity")
            .on_update(Consequence::Restrict)
            .on_delete(Consequence::Cascade);
        let sql = fk
            .constraint_sql(&Dialect::postgres(), &persons(), 0)
            .unwrap();
        assert_eq!(
            sql,
            "CONSTRAINT \"pfx_persons_c0\" foreign key (\"addresspk\") \
             references \"pfx_addresses\" (\"identity\") \
             on update restrict on delete cascade"
        );
    }

    #[test]
    fn constraint_clause_without_consequences() {
        let fk = FkConstraint::new("addresspk", "addresses", "identity");
        let sql = fk
            .constraint_sql(&Dialect::sqlite(), &persons(), 2)
            .unwrap();
        assert_eq!(
            sql,
            "CONSTRAINT \"pfx_persons_c2\" foreign key (\"addresspk\") \
             references \"pfx_addresses\" (\"identity\")"
        );
    }

    #[test]
    fn blank_columns_are_rejected() {
        let fk = FkConstraint::new("", "addresses", "identity");
        let err = fk
            .constraint_sql(&Dialect::sqlite(), &persons(), 0)
            .unwrap_err();
        assert!(matches!(err, Error::BlankColumn { side: "child", .. }));

        let fk = FkConstraint::new("addresspk", "addresses", "");
        let rel = fk.relationship_with(&persons());
        assert!(rel.check_columns().is_err());
    }

    #[test]
    fn relationship_carries_the_prefix_over() {
        let fk = FkConstraint::new("addresspk", "addresses", "identity");
        let rel = fk.relationship_with(&persons());
        assert_eq!(rel.parent.table_name.to_string(), "pfx_addresses");
        assert_eq!(rel.parent.column, "identity");
        assert_eq!(rel.child.table_name.to_string(), "pfx_persons");
        assert_eq!(rel.child.column, "addresspk");
    }

    #[test]
    fn join_queries() {
        let fk = FkConstraint::new("addresspk", "addresses", "identity");
        let rel = fk.relationship_with(&persons());
        let used = rel.join_sql(&Dialect::postgres(), "INNER JOIN", "");
        assert_eq!(
            used,
            "SELECT DISTINCT a.\"identity\" FROM \"pfx_addresses\" a \
             INNER JOIN \"pfx_persons\" b ON a.\"identity\" = b.\"addresspk\""
        );
    }

    #[test]
    fn field_declared_constraint() {
        let field = FieldSpec::new("addresspk", SqlType::Int64)
            .references("addresses", "identity")
            .on_delete(Consequence::SetNull);
        let fk = FkConstraint::of_field(&field).unwrap();
        assert_eq!(fk.column, "addresspk");
        assert_eq!(fk.parent.table_name, "addresses");
        assert_eq!(fk.on_delete, Some(Consequence::SetNull));
        assert!(FkConstraint::of_field(&FieldSpec::new("plain", SqlType::Text)).is_none());
    }
}
