//! Live bindings over collections, documents and dynamic views.
//!
//! Each binding owns its event subscriptions and detaches them on `Drop`,
//! so a consumer holds a binding for exactly as long as it wants updates.

pub mod collection;
pub mod doc;
pub mod filter;
pub mod pagination;
pub mod view;

pub use collection::{CollectionQuery, CollectionQueryOptions};
pub use doc::{CreateFn, DocQuery, DocQueryOptions};
pub use filter::{
    FilterBinding, FilterOptions, FilterSlot, InputType, filter_to_input, input_to_filter,
    regexp_to_string, string_to_regexp,
};
pub use pagination::{Pagination, PaginationAction, PaginationOptions, PaginationState};
pub use view::{SortBinding, ViewQuery, ViewQueryOptions, ViewQueryState};

use std::sync::Arc;

use crate::core::Result;
use crate::facade::DEFAULT_DB;
use crate::registry::Registry;
use crate::store::Collection;

/// What a live binding is attached to: a collection handle held directly,
/// or a name resolved through a registered database.
#[derive(Clone)]
pub enum CollectionTarget {
    Collection(Arc<Collection>),
    Name(String),
}

impl From<Arc<Collection>> for CollectionTarget {
    fn from(collection: Arc<Collection>) -> Self {
        Self::Collection(collection)
    }
}

impl From<&Arc<Collection>> for CollectionTarget {
    fn from(collection: &Arc<Collection>) -> Self {
        Self::Collection(Arc::clone(collection))
    }
}

impl From<&str> for CollectionTarget {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for CollectionTarget {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

/// Resolve a target against `(registry, db_name)`. A database that was never
/// opened is a lifecycle bug and errors; a collection the database does not
/// hold yet resolves to `None` so the binding can stay empty until it exists.
pub(crate) fn resolve_target(
    target: &CollectionTarget,
    db_name: Option<&str>,
    registry: Option<&Arc<Registry>>,
) -> Result<Option<Arc<Collection>>> {
    match target {
        CollectionTarget::Collection(collection) => Ok(Some(Arc::clone(collection))),
        CollectionTarget::Name(name) => {
            let registry = registry.cloned().unwrap_or_else(Registry::global);
            let db = registry.get(db_name.unwrap_or(DEFAULT_DB))?;
            Ok(db.get_collection(name))
        }
    }
}
