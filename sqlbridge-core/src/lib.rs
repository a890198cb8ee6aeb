mod config;
mod connect;
mod constraint;
mod dialect;
mod error;
mod execer;
mod expression;
mod logger;
mod require;
mod table_name;
mod value;

pub use config::*;
pub use connect::*;
pub use constraint::*;
pub use dialect::*;
pub use error::*;
pub use execer::*;
pub use expression::*;
pub use logger::*;
pub use require::*;
pub use table_name::*;
pub use value::*;

pub type Result<T> = std::result::Result<T, Error>;
