use crate::Dialect;
use std::fmt;

/// A two-part table name. The prefix is caller-supplied and not normalized;
/// it is often a schema qualifier ending in `.`, or a plain string prefix
/// such as `pfx_`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct TableName {
    pub prefix: String,
    pub name: String,
}

impl TableName {
    pub fn new(prefix: impl Into<String>, name: impl Into<String>) -> Self {
        TableName {
            prefix: prefix.into(),
            name: name.into(),
        }
    }

    pub fn plain(name: impl Into<String>) -> Self {
        TableName::new("", name)
    }

    /// Returns a copy with a different prefix, keeping the base name.
    pub fn with_prefix(&self, prefix: impl Into<String>) -> TableName {
        TableName {
            prefix: prefix.into(),
            name: self.name.clone(),
        }
    }

    /// The full name quoted for the given dialect. A prefix ending in `.`
    /// quotes as a separate schema part.
    pub fn quoted(&self, dialect: &Dialect) -> String {
        dialect.quote(&self.to_string())
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.prefix, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concatenation() {
        assert_eq!(TableName::new("pfx_", "persons").to_string(), "pfx_persons");
        assert_eq!(TableName::plain("persons").to_string(), "persons");
    }

    #[test]
    fn quoting() {
        let d = Dialect::postgres();
        assert_eq!(TableName::new("pfx_", "persons").quoted(&d), r#""pfx_persons""#);
        // A dotted prefix is a schema qualifier and quotes per part.
        assert_eq!(TableName::new("x.", "persons").quoted(&d), r#""x"."persons""#);
    }
}
