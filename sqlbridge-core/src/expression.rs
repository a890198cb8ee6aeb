use crate::{Dialect, SqlValue};

/// Joins the children of a [`Expression::Clause`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conjunction {
    And,
    Or,
}

impl Conjunction {
    fn sql(self) -> &'static str {
        match self {
            Conjunction::And => " AND ",
            Conjunction::Or => " OR ",
        }
    }
}

/// An immutable tree of boolean predicates.
///
/// Rendering is purely a function of the tree and the dialect, so a built
/// expression can be reused across dialects and connections. `and`/`or`
/// always produce a new `Clause` wrapping the operands; the original values
/// are never mutated (cloning is how reuse works).
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Expression {
    /// Renders to nothing: no `WHERE` keyword, no args.
    #[default]
    NoOp,
    /// A single `column predicate` leaf, e.g. `"age">=?` with one arg.
    Condition {
        column: String,
        predicate: String,
        args: Vec<SqlValue>,
    },
    Clause {
        wheres: Vec<Expression>,
        conjunction: Conjunction,
    },
    Not(Box<Expression>),
}

fn condition(column: &str, predicate: impl Into<String>, args: Vec<SqlValue>) -> Expression {
    Expression::Condition {
        column: column.to_owned(),
        predicate: predicate.into(),
        args,
    }
}

pub fn eq(column: &str, value: impl Into<SqlValue>) -> Expression {
    condition(column, "=?", vec![value.into()])
}

pub fn not_eq(column: &str, value: impl Into<SqlValue>) -> Expression {
    condition(column, "<>?", vec![value.into()])
}

pub fn gt(column: &str, value: impl Into<SqlValue>) -> Expression {
    condition(column, ">?", vec![value.into()])
}

pub fn gt_eq(column: &str, value: impl Into<SqlValue>) -> Expression {
    condition(column, ">=?", vec![value.into()])
}

pub fn lt(column: &str, value: impl Into<SqlValue>) -> Expression {
    condition(column, "<?", vec![value.into()])
}

pub fn lt_eq(column: &str, value: impl Into<SqlValue>) -> Expression {
    condition(column, "<=?", vec![value.into()])
}

pub fn like(column: &str, pattern: impl Into<String>) -> Expression {
    condition(column, " LIKE ?", vec![SqlValue::Text(pattern.into())])
}

pub fn between(column: &str, lo: impl Into<SqlValue>, hi: impl Into<SqlValue>) -> Expression {
    condition(column, " BETWEEN ? AND ?", vec![lo.into(), hi.into()])
}

pub fn null(column: &str) -> Expression {
    condition(column, " IS NULL", vec![])
}

pub fn not_null(column: &str) -> Expression {
    condition(column, " IS NOT NULL", vec![])
}

/// `column IN (?,?,...)` with one placeholder per value. The values travel as
/// a single `List` argument and are flattened into positional args when the
/// expression is built. An empty list renders as `IN (NULL)`, which matches
/// no row.
pub fn in_list<T: Into<SqlValue>>(column: &str, values: impl IntoIterator<Item = T>) -> Expression {
    let values: Vec<SqlValue> = values.into_iter().map(Into::into).collect();
    if values.is_empty() {
        return condition(column, " IN (NULL)", vec![]);
    }
    let mut predicate = String::with_capacity(values.len() * 2 + 5);
    predicate.push_str(" IN (");
    for i in 0..values.len() {
        if i > 0 {
            predicate.push(',');
        }
        predicate.push('?');
    }
    predicate.push(')');
    condition(column, predicate, vec![SqlValue::List(values)])
}

/// A verbatim predicate fragment with explicit args; the escape hatch for
/// vendor expressions the builders do not cover. `?` placeholders only.
pub fn literal(fragment: impl Into<String>, args: Vec<SqlValue>) -> Expression {
    Expression::Condition {
        column: String::new(),
        predicate: fragment.into(),
        args,
    }
}

impl Expression {
    pub fn and(self, other: Expression) -> Expression {
        Expression::conjoin(Conjunction::And, self, other)
    }

    pub fn or(self, other: Expression) -> Expression {
        Expression::conjoin(Conjunction::Or, self, other)
    }

    pub fn not(self) -> Expression {
        if self.is_empty() {
            return Expression::NoOp;
        }
        Expression::Not(Box::new(self))
    }

    fn conjoin(conjunction: Conjunction, lhs: Expression, rhs: Expression) -> Expression {
        match (lhs.is_empty(), rhs.is_empty()) {
            (true, true) => Expression::NoOp,
            (true, false) => rhs,
            (false, true) => lhs,
            (false, false) => Expression::Clause {
                wheres: vec![lhs, rhs],
                conjunction,
            },
        }
    }

    /// True when rendering produces nothing: `NoOp`, or a clause whose
    /// children are all empty.
    pub fn is_empty(&self) -> bool {
        match self {
            Expression::NoOp => true,
            Expression::Condition { .. } => false,
            Expression::Clause { wheres, .. } => wheres.iter().all(Expression::is_empty),
            Expression::Not(inner) => inner.is_empty(),
        }
    }

    /// Renders the tree as a `WHERE ...` fragment with the dialect's
    /// placeholder syntax, plus the flattened argument list. An empty tree
    /// yields `("", [])` with no `WHERE` keyword.
    pub fn build(&self, dialect: &Dialect) -> (String, Vec<SqlValue>) {
        let (body, args) = self.build_expression(dialect);
        if body.is_empty() {
            return (body, args);
        }
        let sql = dialect
            .replace_placeholders(&format!("WHERE {}", body))
            .into_owned();
        (sql, args)
    }

    /// Renders the bare predicate in neutral `?` form, for embedding into a
    /// larger statement that is placeholder-rewritten as a whole.
    pub fn build_expression(&self, dialect: &Dialect) -> (String, Vec<SqlValue>) {
        let mut sql = String::new();
        let mut args = Vec::new();
        self.write(dialect, &mut sql, &mut args);
        (sql, args)
    }

    fn write(&self, dialect: &Dialect, out: &mut String, args: &mut Vec<SqlValue>) {
        match self {
            Expression::NoOp => {}
            Expression::Condition {
                column,
                predicate,
                args: own,
            } => {
                if !column.is_empty() {
                    dialect.quoter().write_quoted(out, column);
                }
                out.push_str(predicate);
                for arg in own {
                    arg.flatten_into(args);
                }
            }
            Expression::Clause {
                wheres,
                conjunction,
            } => {
                let mut any = false;
                for child in wheres {
                    if child.is_empty() {
                        continue;
                    }
                    if any {
                        out.push_str(conjunction.sql());
                    }
                    any = true;
                    out.push('(');
                    child.write(dialect, out, args);
                    out.push(')');
                }
            }
            Expression::Not(inner) => {
                if !inner.is_empty() {
                    out.push_str("NOT (");
                    inner.write(dialect, out, args);
                    out.push(')');
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn placeholder_count(sql: &str) -> usize {
        sql.matches('?').count()
    }

    #[test]
    fn single_condition() {
        let (sql, args) = eq("name", "Fred").build(&Dialect::sqlite());
        assert_eq!(sql, r#"WHERE "name"=?"#);
        assert_eq!(args, vec![SqlValue::Text("Fred".into())]);
    }

    #[test]
    fn composed_clause_parenthesizes() {
        let e = eq("a", 1).and(gt("b", 2).or(lt("c", 3)));
        let (sql, args) = e.build(&Dialect::sqlite());
        assert_eq!(sql, r#"WHERE ("a"=?) AND (("b">?) OR ("c"<?))"#);
        assert_eq!(
            args,
            vec![SqlValue::Int(1), SqlValue::Int(2), SqlValue::Int(3)]
        );
    }

    #[test]
    fn postgres_numbering_spans_the_tree() {
        let e = eq("a", 1).and(in_list("b", [2_i64, 3, 4])).and(gt("c", 5));
        let (sql, args) = e.build(&Dialect::postgres());
        assert_eq!(
            sql,
            r#"WHERE (("a"=$1) AND ("b" IN ($2,$3,$4))) AND ("c">$5)"#
        );
        assert_eq!(args.len(), 5);
    }

    #[test]
    fn list_args_flatten_to_match_placeholders() {
        let e = in_list("pk", [10_i64, 20, 30]);
        let (sql, args) = e.build_expression(&Dialect::sqlite());
        assert_eq!(placeholder_count(&sql), args.len());
        assert_eq!(args, vec![SqlValue::Int(10), SqlValue::Int(20), SqlValue::Int(30)]);
    }

    #[test]
    fn empty_in_list_matches_nothing() {
        let (sql, args) = in_list::<i64>("pk", []).build(&Dialect::sqlite());
        assert_eq!(sql, r#"WHERE "pk" IN (NULL)"#);
        assert!(args.is_empty());
    }

    #[test]
    fn empty_trees_render_to_nothing() {
        let (sql, args) = Expression::NoOp.build(&Dialect::sqlite());
        assert_eq!(sql, "");
        assert!(args.is_empty());

        let clause = Expression::NoOp.and(Expression::NoOp);
        let (sql, _) = clause.build(&Dialect::postgres());
        assert_eq!(sql, "");
        assert!(Expression::NoOp.not().is_empty());
    }

    #[test]
    fn not_wraps() {
        let (sql, args) = eq("x", 1).not().build(&Dialect::sqlite());
        assert_eq!(sql, r#"WHERE NOT ("x"=?)"#);
        assert_eq!(args, vec![SqlValue::Int(1)]);
    }

    #[test]
    fn trees_are_reusable_across_dialects() {
        let e = eq("x", 1).and(null("y"));
        let (my, _) = e.clone().build(&Dialect::mysql());
        let (pg, _) = e.clone().build(&Dialect::postgres());
        assert_eq!(my, "WHERE (`x`=?) AND (`y` IS NULL)");
        assert_eq!(pg, r#"WHERE ("x"=$1) AND ("y" IS NULL)"#);
        // The original is untouched.
        assert_eq!(e.clone().build(&Dialect::mysql()).0, my);
    }

    #[test]
    fn combinators_do_not_mutate_operands() {
        let base = eq("x", 1);
        let _grown = base.clone().and(eq("y", 2));
        assert_eq!(base, eq("x", 1));
    }

    #[test]
    fn null_conditions_take_no_args() {
        let (sql, args) = null("y").or(not_null("z")).build(&Dialect::sqlite());
        assert_eq!(sql, r#"WHERE ("y" IS NULL) OR ("z" IS NOT NULL)"#);
        assert!(args.is_empty());
    }
}
