pub mod error;
pub mod key;

pub use error::{ConfigError, DbError, Result};
pub use key::{Key, Record};
