pub mod collection;
pub mod events;
pub mod query;
pub mod view;

pub use collection::{Collection, CollectionEvent, CollectionOptions, EventPayload};
pub use events::{Emitter, ListenerId};
pub use query::{Chain, Find, FindValue, Pattern, WhereFn, pattern_filter};
pub use view::{DynamicView, FilterValue, SimpleSort, ViewEvent, ViewOptions};
