use crate::WrongSize;
use std::error::Error as StdError;
use thiserror::Error;

/// Error taxonomy of the access layer.
///
/// Connection failures carry a `retryable` classification consumed by the
/// establisher's backoff loop; query failures carry the offending SQL and its
/// rendered arguments; wrong-size failures expose the actual count through
/// [`Error::size`] so callers can tell not-found from not-unique without
/// matching message text.
#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot connect to the database: {message}")]
    Connect { message: String, retryable: bool },

    #[error("query failed: {source}\nsql: {sql}\nargs: {args}")]
    Query {
        sql: String,
        args: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    #[error("transaction aborted by panic: {message}")]
    TransactionAborted { message: String, backtrace: String },

    #[error("transaction already committed or rolled back")]
    TransactionClosed,

    #[error(transparent)]
    WrongSize(#[from] WrongSize),

    #[error("foreign key {constraint}: the {side} column name is blank")]
    BlankColumn {
        side: &'static str,
        constraint: String,
    },

    #[error("{0}")]
    Unsupported(String),

    #[error("database driver error: {0}")]
    Driver(String),
}

impl Error {
    /// Wraps a driver failure together with the SQL and arguments that caused
    /// it. The result is logged by the shim before being returned.
    pub fn query<E>(sql: impl Into<String>, args: impl std::fmt::Debug, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Error::Query {
            sql: sql.into(),
            args: format!("{:?}", args),
            source: Box::new(source),
        }
    }

    pub fn driver<E: std::fmt::Display>(source: E) -> Self {
        Error::Driver(source.to_string())
    }

    pub fn connect(message: impl Into<String>, retryable: bool) -> Self {
        Error::Connect {
            message: message.into(),
            retryable,
        }
    }

    /// True for connection failures the establisher should feed back into its
    /// backoff loop; everything else is permanent.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Connect { retryable: true, .. })
    }

    /// The actual row/affected count of a wrong-size failure.
    pub fn size(&self) -> Option<u64> {
        match self {
            Error::WrongSize(w) => Some(w.actual),
            _ => None,
        }
    }

    /// The query produced fewer rows than required (typically zero).
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::WrongSize(w) => w.is_not_found(),
            _ => false,
        }
    }

    /// The query produced more rows than the requirement allows.
    pub fn is_not_unique(&self) -> bool {
        match self {
            Error::WrongSize(w) => w.is_not_unique(),
            _ => false,
        }
    }
}
