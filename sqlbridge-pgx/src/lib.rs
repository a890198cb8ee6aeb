mod config;
mod connection;
mod transaction;
mod value;

pub use config::PgEnv;
pub use connection::{connect, PgxConn, PgxDb};
pub use transaction::PgxTx;
