mod connection;
mod transaction;

pub use connection::{connect, PostgresConn, PostgresDb};
pub use transaction::PostgresTx;
