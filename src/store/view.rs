use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, RwLock, Weak};

use crate::core::Document;
use crate::store::collection::Collection;
use crate::store::events::{Emitter, ListenerId};
use crate::store::query::{Chain, Find, WhereFn};

/// Single-field sort criterion. An empty `field` means "no sort".
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SimpleSort {
    pub field: String,
    pub desc: bool,
}

impl SimpleSort {
    pub fn new(field: &str, desc: bool) -> Self {
        Self {
            field: field.to_string(),
            desc,
        }
    }
}

/// Options used when a dynamic view has to be constructed.
#[derive(Clone, Default)]
pub struct ViewOptions {
    /// Sort to apply from the start.
    pub simple_sort: Option<SimpleSort>,
}

/// A named filter slot holds either a declarative find query or a function
/// predicate.
#[derive(Clone)]
pub enum FilterValue {
    Find(Find),
    Where(WhereFn),
}

impl fmt::Debug for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Find(find) => write!(f, "Find({:?})", find),
            Self::Where(_) => write!(f, "Where(<fn>)"),
        }
    }
}

struct ViewFilter {
    uid: String,
    value: FilterValue,
}

#[derive(Clone)]
pub enum ViewEvent {
    /// The filter pipeline changed.
    Filter,
    /// The sort criterion changed.
    Sort,
    /// The result set changed; carries the fresh snapshot.
    Rebuild(Arc<[Document]>),
}

struct ViewInner {
    filters: Vec<ViewFilter>,
    sort: Option<SimpleSort>,
    data: Arc<[Document]>,
}

/// A filtered, sorted projection of one collection, kept current by the
/// collection after every mutation.
///
/// Views hold an ordered pipeline of uid-named filters and at most one
/// simple sort. Removing every filter restores the unfiltered document set.
pub struct DynamicView {
    name: String,
    collection: Weak<Collection>,
    inner: RwLock<ViewInner>,
    events: Emitter<ViewEvent>,
}

impl DynamicView {
    pub(crate) fn new(name: &str, collection: Weak<Collection>, options: ViewOptions) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            collection,
            inner: RwLock::new(ViewInner {
                filters: Vec::new(),
                sort: options.simple_sort,
                data: Arc::from(Vec::new()),
            }),
            events: Emitter::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn on(&self, callback: impl Fn(&ViewEvent) + Send + Sync + 'static) -> ListenerId {
        self.events.on(callback)
    }

    pub fn off(&self, id: ListenerId) -> bool {
        self.events.off(id)
    }

    /// Current filtered and sorted snapshot.
    pub fn data(&self) -> Arc<[Document]> {
        match self.inner.read() {
            Ok(inner) => Arc::clone(&inner.data),
            Err(poisoned) => Arc::clone(&poisoned.into_inner().data),
        }
    }

    /// Set the find query of the filter slot `uid`, then rebuild.
    pub fn apply_find(&self, uid: &str, find: Find) {
        self.set_filter(uid, FilterValue::Find(find));
    }

    /// Set the function predicate of the filter slot `uid`, then rebuild.
    pub fn apply_where(&self, uid: &str, predicate: WhereFn) {
        self.set_filter(uid, FilterValue::Where(predicate));
    }

    fn set_filter(&self, uid: &str, value: FilterValue) {
        {
            let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
            match inner.filters.iter_mut().find(|f| f.uid == uid) {
                Some(filter) => filter.value = value,
                None => inner.filters.push(ViewFilter {
                    uid: uid.to_string(),
                    value,
                }),
            }
        }
        self.events.emit(&ViewEvent::Filter);
        self.rebuild();
    }

    /// Remove the filter slot `uid`. Removing the last filter restores the
    /// unfiltered document set.
    pub fn remove_filter(&self, uid: &str) -> bool {
        let removed = {
            let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
            let before = inner.filters.len();
            inner.filters.retain(|f| f.uid != uid);
            inner.filters.len() < before
        };
        if removed {
            self.events.emit(&ViewEvent::Filter);
            self.rebuild();
        }
        removed
    }

    /// Value of the filter slot `uid`, `None` when the slot does not exist.
    pub fn get_filter_value(&self, uid: &str) -> Option<FilterValue> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner
            .filters
            .iter()
            .find(|f| f.uid == uid)
            .map(|f| f.value.clone())
    }

    pub fn filter_count(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .filters
            .len()
    }

    /// Sort criterion normalized to `{field, desc}`; `field` is empty when
    /// no sort has been applied.
    pub fn get_simple_sort(&self) -> SimpleSort {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.sort.clone().unwrap_or_default()
    }

    pub fn apply_simple_sort(&self, field: &str, desc: bool) {
        {
            let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
            inner.sort = Some(SimpleSort::new(field, desc));
        }
        self.events.emit(&ViewEvent::Sort);
        self.rebuild();
    }

    /// Column-header toggle: sorting the current field flips the direction,
    /// sorting a different field applies `desc` as given.
    pub fn toggle_simple_sort(&self, field: &str, desc: bool) {
        let current = self.get_simple_sort();
        let next_desc = if field == current.field { !current.desc } else { desc };
        self.apply_simple_sort(field, next_desc);
    }

    /// Declarative filters of the pipeline, in order. Function predicates
    /// cannot be serialized and are skipped by the caller.
    pub(crate) fn find_filters(&self) -> Vec<(String, Option<Find>)> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner
            .filters
            .iter()
            .map(|f| {
                let find = match &f.value {
                    FilterValue::Find(find) => Some(find.clone()),
                    FilterValue::Where(_) => None,
                };
                (f.uid.clone(), find)
            })
            .collect()
    }

    fn rebuild(&self) {
        if let Some(collection) = self.collection.upgrade() {
            let docs = collection.doc_snapshot();
            self.refresh(&docs);
        }
    }

    /// Recompute the snapshot from `docs`; emits `Rebuild` only when the
    /// result set actually changed.
    pub(crate) fn refresh(&self, docs: &[Document]) {
        let (filters_applied, sort) = {
            let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
            let mut chain = Chain::new(docs.to_vec());
            for filter in &inner.filters {
                chain = match &filter.value {
                    FilterValue::Find(find) => chain.find(find),
                    FilterValue::Where(predicate) => {
                        let predicate = Arc::clone(predicate);
                        chain.where_fn(move |doc| predicate(doc))
                    }
                };
            }
            (chain, inner.sort.clone())
        };
        let chain = match &sort {
            Some(sort) if !sort.field.is_empty() => {
                filters_applied.simple_sort(&sort.field, sort.desc)
            }
            _ => filters_applied,
        };
        let fresh: Vec<Document> = chain.data();

        let snapshot = {
            let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
            if inner.data[..] == fresh[..] {
                return;
            }
            inner.data = Arc::from(fresh);
            Arc::clone(&inner.data)
        };
        self.events.emit(&ViewEvent::Rebuild(snapshot));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields;
    use crate::store::collection::{Collection, CollectionOptions};

    fn people() -> Arc<Collection> {
        let collection = Collection::new("people", CollectionOptions::default());
        collection
            .insert_many(vec![
                fields! { "name" => "Alice", "age" => 30 },
                fields! { "name" => "Bob", "age" => 25 },
                fields! { "name" => "Carol", "age" => 35 },
            ])
            .unwrap();
        collection
    }

    #[test]
    fn test_filter_pipeline_and_removal() {
        let collection = people();
        let view = collection.ensure_dynamic_view("adults", ViewOptions::default());
        view.apply_find("min-age", Find::new().op("age", "$gte", 30));
        assert_eq!(view.data().len(), 2);

        view.apply_find("min-age", Find::new().op("age", "$gte", 35));
        assert_eq!(view.data().len(), 1);

        view.remove_filter("min-age");
        assert_eq!(view.data().len(), 3);
    }

    #[test]
    fn test_toggle_simple_sort() {
        let collection = people();
        let view = collection.ensure_dynamic_view("sorted", ViewOptions::default());
        assert_eq!(view.get_simple_sort(), SimpleSort::default());

        view.toggle_simple_sort("age", false);
        assert_eq!(view.get_simple_sort(), SimpleSort::new("age", false));
        assert_eq!(view.data()[0].get("name").unwrap().as_str(), Some("Bob"));

        // same field toggles direction
        view.toggle_simple_sort("age", false);
        assert_eq!(view.get_simple_sort(), SimpleSort::new("age", true));
        assert_eq!(view.data()[0].get("name").unwrap().as_str(), Some("Carol"));

        // different field resets to the given direction
        view.toggle_simple_sort("name", false);
        assert_eq!(view.get_simple_sort(), SimpleSort::new("name", false));
    }

    #[test]
    fn test_rebuild_fires_on_collection_mutation() {
        use std::sync::Mutex;
        let collection = people();
        let view = collection.ensure_dynamic_view("watcher", ViewOptions::default());
        view.apply_find("young", Find::new().op("age", "$lt", 30));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        view.on(move |event| {
            if let ViewEvent::Rebuild(docs) = event {
                seen_clone.lock().unwrap().push(docs.len());
            }
        });

        collection.insert(fields! { "name" => "Dave", "age" => 20 }).unwrap();
        assert_eq!(seen.lock().unwrap().as_slice(), &[2]);
        assert_eq!(view.data().len(), 2);
    }

    #[test]
    fn test_where_filter() {
        let collection = people();
        let view = collection.ensure_dynamic_view("fn", ViewOptions::default());
        view.apply_where(
            "bobs",
            Arc::new(|doc: &Document| doc.get("name").unwrap_or_default().as_str() == Some("Bob")),
        );
        assert_eq!(view.data().len(), 1);
        assert!(matches!(
            view.get_filter_value("bobs"),
            Some(FilterValue::Where(_))
        ));
    }
}
