pub mod document;
pub mod error;
pub mod value;

pub use document::{DocMeta, Document, Fields, ID_FIELD};
pub use error::{DbError, Result};
pub use value::Value;
