pub mod database;
pub mod serial;

pub use database::{Database, DatabaseOptions, DbEvent, DEFAULT_DB};
pub use serial::{SerialType, SerializableTypes, TYPE_KEY};
