mod connection;
mod transaction;

pub use connection::{connect, SqliteConn, SqliteDb};
pub use transaction::SqliteTx;
