mod open;
mod support;
mod table;

pub use open::*;
pub use sqlbridge_core::*;
pub use support::*;
pub use table::*;

#[cfg(feature = "mysql")]
pub use sqlbridge_mysql as mysql;
#[cfg(feature = "pgx")]
pub use sqlbridge_pgx as pgx;
#[cfg(feature = "postgres")]
pub use sqlbridge_postgres as postgres;
#[cfg(feature = "sqlite")]
pub use sqlbridge_sqlite as sqlite;
