//! An in-memory document store with live bindings on top.
//!
//! [`Collection`]s hold revisioned documents, enforce unique indexes and
//! emit insert/update/delete events. [`DynamicView`]s keep filtered and
//! sorted projections current after every mutation. The [`live`] module
//! binds consumers to collections, single documents, views, filter inputs
//! and pagination, detaching every subscription on drop.
//!
//! # Examples
//!
//! ```
//! use livedocs::{CollectionOptions, Database, DatabaseOptions, Find, fields};
//!
//! # fn main() -> livedocs::Result<()> {
//! let db = Database::open("readme.db", DatabaseOptions::default())?;
//! let people = db.ensure_collection("people", CollectionOptions::default());
//!
//! people.insert(fields! { "name" => "Alice", "age" => 33_i64 })?;
//! people.insert(fields! { "name" => "Bob", "age" => 12_i64 })?;
//!
//! let adults = people
//!     .chain()?
//!     .find(&Find::new().op("age", "$gte", 18_i64))
//!     .data();
//! assert_eq!(adults.len(), 1);
//!
//! db.destroy();
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod facade;
pub mod live;
pub mod registry;
pub mod store;

// Re-export main types for convenience
pub use crate::core::{DbError, Document, Fields, ID_FIELD, Result, Value};
pub use facade::{DEFAULT_DB, Database, DatabaseOptions, DbEvent};
pub use registry::Registry;
pub use store::{
    Chain, Collection, CollectionEvent, CollectionOptions, DynamicView, EventPayload, FilterValue,
    Find, FindValue, ListenerId, Pattern, SimpleSort, ViewEvent, ViewOptions, WhereFn,
};

// Re-export live binding API
pub use live::{
    CollectionQuery, CollectionQueryOptions, CollectionTarget, DocQuery, DocQueryOptions,
    FilterBinding, FilterOptions, FilterSlot, InputType, Pagination, PaginationAction,
    PaginationOptions, PaginationState, SortBinding, ViewQuery, ViewQueryOptions,
};
