use crate::{Consequence, Reference};
use std::{borrow::Cow, fmt, fmt::Write};

/// Identifies the vendor a [`Dialect`] speaks for. Stable across quoter
/// changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DialectIndex {
    Sqlite,
    Mysql,
    Postgres,
    /// PostgreSQL through the pooled tokio-postgres driver. Same SQL surface
    /// as `Postgres`; a distinct index because the execution shim differs.
    Pgx,
}

impl DialectIndex {
    pub fn as_str(&self) -> &'static str {
        match self {
            DialectIndex::Sqlite => "sqlite",
            DialectIndex::Mysql => "mysql",
            DialectIndex::Postgres => "postgres",
            DialectIndex::Pgx => "pgx",
        }
    }
}

impl fmt::Display for DialectIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier quoting strategy. Dotted names are split and each part quoted
/// individually, so a schema-qualified `x.Aaaa` becomes `"x"."Aaaa"` under
/// ANSI rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Quoter {
    #[default]
    Ansi,
    Backtick,
    None,
}

impl Quoter {
    /// Parses the `DB_QUOTE` environment value.
    pub fn parse(name: &str) -> Option<Quoter> {
        match name {
            "ansi" => Some(Quoter::Ansi),
            "mysql" => Some(Quoter::Backtick),
            "none" => Some(Quoter::None),
            _ => None,
        }
    }

    pub fn quote(&self, identifier: &str) -> String {
        let mut out = String::with_capacity(identifier.len() + 4);
        self.write_quoted(&mut out, identifier);
        out
    }

    pub fn write_quoted(&self, out: &mut String, identifier: &str) {
        let (open, close) = match self {
            Quoter::Ansi => ('"', '"'),
            Quoter::Backtick => ('`', '`'),
            Quoter::None => {
                out.push_str(identifier);
                return;
            }
        };
        let mut first = true;
        for part in identifier.split('.') {
            if !first {
                out.push('.');
            }
            first = false;
            out.push(open);
            write_escaped(out, part, close);
            out.push(close);
        }
    }
}

// Embedded quote characters are doubled, the portable escape.
fn write_escaped(out: &mut String, value: &str, quote: char) {
    let mut position = 0;
    for (i, c) in value.char_indices() {
        if c == quote {
            out.push_str(&value[position..i]);
            out.push(quote);
            out.push(quote);
            position = i + 1;
        }
    }
    out.push_str(&value[position..]);
}

/// Vendor-neutral column type carried by a [`FieldSpec`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    Bool,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    Text,
    Varchar,
    Blob,
    Timestamp,
}

/// Explicit description of one table column, built once at registration time.
/// This replaces runtime reflection over struct tags: the caller states the
/// facts and [`FieldSpec::validate`] checks them.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    pub sql_type: SqlType,
    pub primary: bool,
    pub auto: bool,
    pub nullable: bool,
    pub size: u32,
    pub foreign_key: Option<Reference>,
    pub on_update: Option<Consequence>,
    pub on_delete: Option<Consequence>,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, sql_type: SqlType) -> Self {
        FieldSpec {
            name: name.into(),
            sql_type,
            primary: false,
            auto: false,
            nullable: false,
            size: 0,
            foreign_key: None,
            on_update: None,
            on_delete: None,
        }
    }

    pub fn primary(mut self) -> Self {
        self.primary = true;
        self
    }

    /// Marks the column as vendor auto-increment. Implies `primary`.
    pub fn auto(mut self) -> Self {
        self.auto = true;
        self.primary = true;
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn size(mut self, size: u32) -> Self {
        self.size = size;
        self
    }

    pub fn references(mut self, table_name: impl Into<String>, column: impl Into<String>) -> Self {
        self.foreign_key = Some(Reference {
            table_name: table_name.into(),
            column: column.into(),
        });
        self
    }

    pub fn on_update(mut self, consequence: Consequence) -> Self {
        self.on_update = Some(consequence);
        self
    }

    pub fn on_delete(mut self, consequence: Consequence) -> Self {
        self.on_delete = Some(consequence);
        self
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.name.is_empty() {
            return Err(crate::Error::Unsupported("field has a blank name".into()));
        }
        if self.auto && !matches!(self.sql_type, SqlType::Int32 | SqlType::Int64) {
            return Err(crate::Error::Unsupported(format!(
                "auto-increment field {} must be an integer type",
                self.name
            )));
        }
        if self.on_update.is_some() && self.foreign_key.is_none() {
            return Err(crate::Error::Unsupported(format!(
                "field {} has an on-update consequence but no foreign key",
                self.name
            )));
        }
        Ok(())
    }
}

const QUESTIONS: [&str; 11] = [
    "",
    "?",
    "?,?",
    "?,?,?",
    "?,?,?,?",
    "?,?,?,?,?",
    "?,?,?,?,?,?",
    "?,?,?,?,?,?,?",
    "?,?,?,?,?,?,?,?",
    "?,?,?,?,?,?,?,?,?",
    "?,?,?,?,?,?,?,?,?,?",
];

/// Immutable vendor profile: placeholder syntax, identifier quoting, column
/// typing and the insert capability flag. Selected once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dialect {
    index: DialectIndex,
    quoter: Quoter,
}

impl Dialect {
    pub const fn new(index: DialectIndex, quoter: Quoter) -> Self {
        Dialect { index, quoter }
    }

    pub const fn sqlite() -> Self {
        Dialect::new(DialectIndex::Sqlite, Quoter::Ansi)
    }

    pub const fn mysql() -> Self {
        Dialect::new(DialectIndex::Mysql, Quoter::Backtick)
    }

    pub const fn postgres() -> Self {
        Dialect::new(DialectIndex::Postgres, Quoter::Ansi)
    }

    pub const fn pgx() -> Self {
        Dialect::new(DialectIndex::Pgx, Quoter::Ansi)
    }

    /// Parses the `DB_DIALECT` environment value.
    pub fn pick(name: &str) -> Option<Dialect> {
        match name {
            "sqlite" | "sqlite3" => Some(Dialect::sqlite()),
            "mysql" => Some(Dialect::mysql()),
            "postgres" | "postgresql" => Some(Dialect::postgres()),
            "pgx" => Some(Dialect::pgx()),
            _ => None,
        }
    }

    pub fn index(&self) -> DialectIndex {
        self.index
    }

    pub fn quoter(&self) -> Quoter {
        self.quoter
    }

    /// Returns a new dialect with the given quoter; the receiver is untouched
    /// and `index()` is unchanged.
    pub fn with_quoter(&self, quoter: Quoter) -> Dialect {
        Dialect {
            index: self.index,
            quoter,
        }
    }

    pub fn quote(&self, identifier: &str) -> String {
        self.quoter.quote(identifier)
    }

    /// The driver reports the generated key of an insert via its
    /// last-insert-id mechanism. Exactly one of this and
    /// [`insert_has_returning_phrase`](Self::insert_has_returning_phrase) is
    /// true for every dialect.
    pub fn has_last_insert_id(&self) -> bool {
        matches!(self.index, DialectIndex::Sqlite | DialectIndex::Mysql)
    }

    /// Inserts obtain the generated key by appending `RETURNING <pk>` and
    /// scanning the first column.
    pub fn insert_has_returning_phrase(&self) -> bool {
        !self.has_last_insert_id()
    }

    fn numbered_placeholders(&self) -> bool {
        matches!(self.index, DialectIndex::Postgres | DialectIndex::Pgx)
    }

    /// A comma list of `n` placeholders for `IN (...)` clauses, in this
    /// dialect's wire syntax. The question-mark form is served from a
    /// precomputed table for small `n` and extended incrementally above that.
    pub fn placeholders(&self, n: usize) -> String {
        if self.numbered_placeholders() {
            let mut out = String::with_capacity(n * 3);
            for i in 1..=n {
                if i > 1 {
                    out.push(',');
                }
                let _ = write!(out, "${}", i);
            }
            out
        } else if n < QUESTIONS.len() {
            QUESTIONS[n].to_owned()
        } else {
            let mut out = String::with_capacity(n * 2);
            out.push_str(QUESTIONS[QUESTIONS.len() - 1]);
            for _ in QUESTIONS.len() - 1..n {
                out.push_str(",?");
            }
            out
        }
    }

    /// Rewrites `?` placeholders into this dialect's wire form: `$1,$2,...`
    /// for PostgreSQL, unchanged for MySQL/SQLite.
    ///
    /// Question marks inside single-quoted string literals are left alone,
    /// which also makes the rewrite a no-op when applied to SQL that has
    /// already been numbered.
    pub fn replace_placeholders<'a>(&self, sql: &'a str) -> Cow<'a, str> {
        if !self.numbered_placeholders() || !sql.contains('?') {
            return Cow::Borrowed(sql);
        }
        let mut out = String::with_capacity(sql.len() + 8);
        let mut count = 0;
        let mut in_literal = false;
        for c in sql.chars() {
            match c {
                '\'' => {
                    // A doubled '' inside a literal toggles twice and lands
                    // back in the literal state.
                    in_literal = !in_literal;
                    out.push(c);
                }
                '?' if !in_literal => {
                    count += 1;
                    let _ = write!(out, "${}", count);
                }
                _ => out.push(c),
            }
        }
        Cow::Owned(out)
    }

    /// The vendor column type for a neutral [`SqlType`].
    pub fn column_type(&self, sql_type: SqlType, size: u32) -> String {
        let name = match self.index {
            DialectIndex::Sqlite => match sql_type {
                SqlType::Bool | SqlType::Int16 | SqlType::Int32 | SqlType::Int64 => "integer",
                SqlType::Float32 | SqlType::Float64 => "real",
                SqlType::Text | SqlType::Varchar | SqlType::Timestamp => "text",
                SqlType::Blob => "blob",
            },
            DialectIndex::Mysql => match sql_type {
                SqlType::Bool => "tinyint(1)",
                SqlType::Int16 => "smallint",
                SqlType::Int32 => "int",
                SqlType::Int64 => "bigint",
                SqlType::Float32 => "float",
                SqlType::Float64 => "double",
                SqlType::Text => "text",
                SqlType::Varchar => {
                    return format!("varchar({})", if size == 0 { 255 } else { size });
                }
                SqlType::Blob => "blob",
                SqlType::Timestamp => "datetime",
            },
            DialectIndex::Postgres | DialectIndex::Pgx => match sql_type {
                SqlType::Bool => "boolean",
                SqlType::Int16 => "smallint",
                SqlType::Int32 => "integer",
                SqlType::Int64 => "bigint",
                SqlType::Float32 => "real",
                SqlType::Float64 => "double precision",
                SqlType::Text => "text",
                SqlType::Varchar => {
                    return if size == 0 {
                        "text".to_owned()
                    } else {
                        format!("varchar({})", size)
                    };
                }
                SqlType::Blob => "bytea",
                SqlType::Timestamp => "timestamp",
            },
        };
        name.to_owned()
    }

    /// Renders the full column DDL fragment for one field, covering the
    /// vendor-specific auto-increment primary key spellings.
    pub fn field_ddl(&self, field: &FieldSpec) -> String {
        if field.auto {
            return match self.index {
                DialectIndex::Sqlite => "integer not null primary key autoincrement".to_owned(),
                DialectIndex::Mysql => match field.sql_type {
                    SqlType::Int32 => "int not null primary key auto_increment".to_owned(),
                    _ => "bigint not null primary key auto_increment".to_owned(),
                },
                DialectIndex::Postgres | DialectIndex::Pgx => match field.sql_type {
                    SqlType::Int32 => "serial not null primary key".to_owned(),
                    _ => "bigserial not null primary key".to_owned(),
                },
            };
        }
        let mut out = self.column_type(field.sql_type, field.size);
        if !field.nullable {
            out.push_str(" not null");
        }
        if field.primary {
            out.push_str(" primary key");
        }
        out
    }
}

impl Default for Dialect {
    fn default() -> Self {
        Dialect::sqlite()
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.index.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoters() {
        assert_eq!(Quoter::Ansi.quote("x.Aaaa"), r#""x"."Aaaa""#);
        assert_eq!(Quoter::Backtick.quote("x.Aaaa"), "`x`.`Aaaa`");
        assert_eq!(Quoter::None.quote("x.Aaaa"), "x.Aaaa");
        assert_eq!(Quoter::Ansi.quote(r#"we"ird"#), r#""we""ird""#);
    }

    #[test]
    fn with_quoter_returns_a_new_value() {
        let d = Dialect::postgres();
        let e = d.with_quoter(Quoter::None);
        assert_eq!(d.quoter(), Quoter::Ansi);
        assert_eq!(e.quoter(), Quoter::None);
        assert_eq!(d.index(), e.index());
    }

    #[test]
    fn capability_flags_are_mutually_exclusive() {
        for d in [
            Dialect::sqlite(),
            Dialect::mysql(),
            Dialect::postgres(),
            Dialect::pgx(),
        ] {
            assert_ne!(d.has_last_insert_id(), d.insert_has_returning_phrase());
        }
    }

    #[test]
    fn placeholders_shape() {
        let my = Dialect::mysql();
        assert_eq!(my.placeholders(0), "");
        assert_eq!(my.placeholders(1), "?");
        assert_eq!(my.placeholders(3), "?,?,?");
        assert_eq!(my.placeholders(12).matches('?').count(), 12);
        assert!(!my.placeholders(12).starts_with(','));
        assert!(!my.placeholders(12).ends_with(','));

        let pg = Dialect::postgres();
        assert_eq!(pg.placeholders(0), "");
        assert_eq!(pg.placeholders(3), "$1,$2,$3");
        assert_eq!(pg.placeholders(11).matches('$').count(), 11);
    }

    #[test]
    fn placeholders_agree_with_replace() {
        let pg = Dialect::postgres();
        for n in [0, 1, 5, 10, 17] {
            let question = Dialect::mysql().placeholders(n);
            assert_eq!(pg.replace_placeholders(&question), pg.placeholders(n));
        }
    }

    #[test]
    fn replace_placeholders_by_dialect() {
        let sql = "SELECT a FROM t WHERE x=? AND y=?";
        assert_eq!(Dialect::sqlite().replace_placeholders(sql), sql);
        assert_eq!(Dialect::mysql().replace_placeholders(sql), sql);
        assert_eq!(
            Dialect::postgres().replace_placeholders(sql),
            "SELECT a FROM t WHERE x=$1 AND y=$2"
        );
        assert_eq!(
            Dialect::pgx().replace_placeholders(sql),
            "SELECT a FROM t WHERE x=$1 AND y=$2"
        );
    }

    #[test]
    fn replace_placeholders_skips_string_literals() {
        let pg = Dialect::postgres();
        let sql = "SELECT 'a?b' FROM t WHERE x=? AND y='it''s?'";
        assert_eq!(
            pg.replace_placeholders(sql),
            "SELECT 'a?b' FROM t WHERE x=$1 AND y='it''s?'"
        );
        // Re-running over already numbered SQL is a no-op.
        let once = pg.replace_placeholders(sql).into_owned();
        assert_eq!(pg.replace_placeholders(&once), once);
    }

    #[test]
    fn column_types() {
        let f = FieldSpec::new("id", SqlType::Int64).auto();
        assert_eq!(
            Dialect::sqlite().field_ddl(&f),
            "integer not null primary key autoincrement"
        );
        assert_eq!(
            Dialect::mysql().field_ddl(&f),
            "bigint not null primary key auto_increment"
        );
        assert_eq!(
            Dialect::postgres().field_ddl(&f),
            "bigserial not null primary key"
        );

        let name = FieldSpec::new("name", SqlType::Varchar).size(40);
        assert_eq!(Dialect::mysql().field_ddl(&name), "varchar(40) not null");
        assert_eq!(Dialect::postgres().field_ddl(&name), "varchar(40) not null");
        assert_eq!(Dialect::sqlite().field_ddl(&name), "text not null");
    }

    #[test]
    fn field_spec_validation() {
        assert!(FieldSpec::new("id", SqlType::Int64).auto().validate().is_ok());
        assert!(FieldSpec::new("id", SqlType::Text).auto().validate().is_err());
        assert!(FieldSpec::new("", SqlType::Text).validate().is_err());
    }
}
