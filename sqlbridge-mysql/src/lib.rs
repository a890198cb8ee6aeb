mod connection;
mod transaction;

pub use connection::{connect, MysqlConn, MysqlDb};
pub use transaction::MysqlTx;
