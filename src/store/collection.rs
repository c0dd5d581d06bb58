use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

use crate::core::{DbError, Document, Fields, Result, Value, ID_FIELD};
use crate::store::events::{Emitter, ListenerId};
use crate::store::query::{Chain, Find};
use crate::store::view::{DynamicView, ViewOptions};

#[derive(Debug, Clone, Default)]
pub struct CollectionOptions {
    /// Fields with a unique index, usable as alternate lookup keys in
    /// [`Collection::by`].
    pub unique: Vec<String>,
    /// When set, live queries hand out mutable copies instead of shared
    /// immutable snapshots.
    pub disable_freeze: bool,
}

impl CollectionOptions {
    pub fn unique(fields: &[&str]) -> Self {
        Self {
            unique: fields.iter().map(|f| f.to_string()).collect(),
            ..Self::default()
        }
    }
}

/// Event payload: a single document or a whole batch.
#[derive(Debug, Clone)]
pub enum EventPayload {
    One(Document),
    Many(Vec<Document>),
}

impl EventPayload {
    pub fn iter(&self) -> std::slice::Iter<'_, Document> {
        match self {
            Self::One(doc) => std::slice::from_ref(doc).iter(),
            Self::Many(docs) => docs.iter(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum CollectionEvent {
    Insert(EventPayload),
    Update(EventPayload),
    Delete(EventPayload),
}

struct CollectionInner {
    docs: BTreeMap<u64, Document>,
    next_id: u64,
    unique: BTreeMap<String, BTreeMap<Value, u64>>,
}

impl CollectionInner {
    /// Uniqueness check against the live index. `extra` carries values of
    /// earlier documents in the same batch.
    fn check_unique(
        &self,
        fields: &Fields,
        ignore_id: Option<u64>,
        extra: &HashSet<(String, Value)>,
    ) -> Result<()> {
        for (field, index) in &self.unique {
            let Some(value) = fields.get(field) else { continue };
            if value.is_null() {
                continue;
            }
            let taken = match index.get(value) {
                Some(id) => Some(*id) != ignore_id,
                None => false,
            };
            if taken || extra.contains(&(field.clone(), value.clone())) {
                return Err(DbError::ConstraintViolation(format!(
                    "field '{}' already contains value {}",
                    field, value
                )));
            }
        }
        Ok(())
    }

    fn index(&mut self, doc: &Document) {
        for (field, index) in &mut self.unique {
            if let Some(value) = doc.fields.get(field) {
                if !value.is_null() {
                    index.insert(value.clone(), doc.id);
                }
            }
        }
    }

    fn unindex(&mut self, doc: &Document) {
        for (field, index) in &mut self.unique {
            if let Some(value) = doc.fields.get(field) {
                index.remove(value);
            }
        }
    }
}

/// An ordered set of documents with store-assigned integer identity,
/// synchronous insert/update/delete events and dynamic views.
///
/// Collections are shared (`Arc`) and internally locked; mutation methods
/// take `&self`. Events are emitted after the internal lock is released, so
/// listeners may read the collection — with the one documented exception of
/// batch removal, which emits one `Delete` per document *before* the batch
/// is gone. Live queries coalesce events for exactly this reason.
pub struct Collection {
    name: String,
    options: CollectionOptions,
    inner: RwLock<CollectionInner>,
    events: Emitter<CollectionEvent>,
    views: Mutex<Vec<Arc<DynamicView>>>,
}

impl Collection {
    pub fn new(name: &str, options: CollectionOptions) -> Arc<Self> {
        let unique = options
            .unique
            .iter()
            .map(|field| (field.clone(), BTreeMap::new()))
            .collect();
        Arc::new(Self {
            name: name.to_string(),
            options,
            inner: RwLock::new(CollectionInner {
                docs: BTreeMap::new(),
                next_id: 1,
                unique,
            }),
            events: Emitter::new(),
            views: Mutex::new(Vec::new()),
        })
    }

    /// Rebuild a collection from persisted documents, restoring indexes.
    pub(crate) fn restore(
        name: &str,
        options: CollectionOptions,
        next_id: u64,
        docs: Vec<Document>,
    ) -> Result<Arc<Self>> {
        let collection = Self::new(name, options);
        {
            let mut inner = collection.inner.write().unwrap_or_else(|e| e.into_inner());
            for doc in docs {
                inner.check_unique(&doc.fields, None, &HashSet::new())?;
                inner.index(&doc);
                inner.docs.insert(doc.id, doc);
            }
            inner.next_id = next_id;
        }
        Ok(collection)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn disable_freeze(&self) -> bool {
        self.options.disable_freeze
    }

    pub fn unique_fields(&self) -> &[String] {
        &self.options.unique
    }

    pub fn on(&self, callback: impl Fn(&CollectionEvent) + Send + Sync + 'static) -> ListenerId {
        self.events.on(callback)
    }

    pub fn off(&self, id: ListenerId) -> bool {
        self.events.off(id)
    }

    // ------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------

    pub fn insert(&self, fields: Fields) -> Result<Document> {
        let doc = {
            let mut inner = self.inner.write()?;
            inner.check_unique(&fields, None, &HashSet::new())?;
            let id = inner.next_id;
            inner.next_id += 1;
            let doc = Document::new(id, fields);
            inner.index(&doc);
            inner.docs.insert(id, doc.clone());
            doc
        };
        self.refresh_views();
        self.events.emit(&CollectionEvent::Insert(EventPayload::One(doc.clone())));
        Ok(doc)
    }

    /// Insert a batch; either every document is inserted or none is.
    /// Emits a single `Insert` event carrying the whole batch.
    pub fn insert_many(&self, batch: Vec<Fields>) -> Result<Vec<Document>> {
        let docs = {
            let mut inner = self.inner.write()?;
            let mut pending = HashSet::new();
            for fields in &batch {
                inner.check_unique(fields, None, &pending)?;
                for field in inner.unique.keys() {
                    if let Some(value) = fields.get(field) {
                        if !value.is_null() {
                            pending.insert((field.clone(), value.clone()));
                        }
                    }
                }
            }
            let mut docs = Vec::with_capacity(batch.len());
            for fields in batch {
                let id = inner.next_id;
                inner.next_id += 1;
                let doc = Document::new(id, fields);
                inner.index(&doc);
                inner.docs.insert(id, doc.clone());
                docs.push(doc);
            }
            docs
        };
        self.refresh_views();
        self.events
            .emit(&CollectionEvent::Insert(EventPayload::Many(docs.clone())));
        Ok(docs)
    }

    /// Replace the fields of an existing document; bumps the revision.
    pub fn update(&self, doc: &Document) -> Result<Document> {
        let updated = {
            let mut inner = self.inner.write()?;
            inner.apply_update(doc)?
        };
        self.refresh_views();
        self.events
            .emit(&CollectionEvent::Update(EventPayload::One(updated.clone())));
        Ok(updated)
    }

    /// Update a batch under one lock; a single `Update` event carries all
    /// updated documents.
    pub fn update_many(&self, batch: &[Document]) -> Result<Vec<Document>> {
        let updated = {
            let mut inner = self.inner.write()?;
            let mut updated = Vec::with_capacity(batch.len());
            for doc in batch {
                updated.push(inner.apply_update(doc)?);
            }
            updated
        };
        self.refresh_views();
        self.events
            .emit(&CollectionEvent::Update(EventPayload::Many(updated.clone())));
        Ok(updated)
    }

    /// Remove one document. Emits `Delete` before the document is gone
    /// (the store's native event order); returns the removed document.
    pub fn remove(&self, id: u64) -> Result<Option<Document>> {
        let Some(doc) = self.get(id) else {
            return Ok(None);
        };
        self.events
            .emit(&CollectionEvent::Delete(EventPayload::One(doc.clone())));
        {
            let mut inner = self.inner.write()?;
            inner.unindex(&doc);
            inner.docs.remove(&id);
        }
        self.refresh_views();
        Ok(Some(doc))
    }

    /// Remove a batch. One `Delete` event is emitted per document before any
    /// of them is removed, so a listener that reads the collection mid-batch
    /// observes an inconsistent intermediate state. Coalescing consumers
    /// (see `live::CollectionQuery`) recompute once after the burst instead.
    pub fn remove_many(&self, ids: &[u64]) -> Result<Vec<Document>> {
        let docs: Vec<Document> = {
            let inner = self.inner.read()?;
            ids.iter().filter_map(|id| inner.docs.get(id).cloned()).collect()
        };
        for doc in &docs {
            self.events
                .emit(&CollectionEvent::Delete(EventPayload::One(doc.clone())));
        }
        {
            let mut inner = self.inner.write()?;
            for doc in &docs {
                inner.unindex(doc);
                inner.docs.remove(&doc.id);
            }
        }
        self.refresh_views();
        Ok(docs)
    }

    /// Remove every document matching `find`.
    pub fn find_and_remove(&self, find: &Find) -> Result<Vec<Document>> {
        let ids: Vec<u64> = self
            .chain()?
            .find(find)
            .data()
            .into_iter()
            .map(|doc| doc.id)
            .collect();
        self.remove_many(&ids)
    }

    /// Remove everything; emits one `Delete` event carrying the batch.
    pub fn clear(&self) -> Result<()> {
        let docs = {
            let mut inner = self.inner.write()?;
            inner.unique.values_mut().for_each(|index| index.clear());
            let docs: Vec<Document> = std::mem::take(&mut inner.docs).into_values().collect();
            docs
        };
        self.refresh_views();
        if !docs.is_empty() {
            self.events
                .emit(&CollectionEvent::Delete(EventPayload::Many(docs)));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Lookup
    // ------------------------------------------------------------------

    pub fn get(&self, id: u64) -> Option<Document> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.docs.get(&id).cloned()
    }

    /// Unique-index lookup. `ID_FIELD` resolves through the identity map;
    /// any other field must carry a unique index.
    pub fn by(&self, field: &str, key: &Value) -> Result<Option<Document>> {
        if field == ID_FIELD {
            return Ok(key.as_i64().and_then(|id| self.get(id as u64)));
        }
        let inner = self.inner.read()?;
        let index = inner
            .unique
            .get(field)
            .ok_or_else(|| DbError::MissingUniqueIndex(field.to_string()))?;
        Ok(index.get(key).and_then(|id| inner.docs.get(id)).cloned())
    }

    /// Snapshot query over the current documents, in id order.
    pub fn chain(&self) -> Result<Chain> {
        Ok(Chain::new(self.doc_snapshot()))
    }

    pub fn doc_snapshot(&self) -> Vec<Document> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.docs.values().cloned().collect()
    }

    pub fn count(&self) -> usize {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.docs.len()
    }

    pub(crate) fn peek_next_id(&self) -> u64 {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.next_id
    }

    // ------------------------------------------------------------------
    // Dynamic views
    // ------------------------------------------------------------------

    /// Construct a view and keep it current; replaces a same-named view.
    pub fn add_dynamic_view(self: &Arc<Self>, name: &str, options: ViewOptions) -> Arc<DynamicView> {
        let view = DynamicView::new(name, Arc::downgrade(self), options);
        {
            let mut views = self.views.lock().unwrap_or_else(|e| e.into_inner());
            views.retain(|v| v.name() != name);
            views.push(Arc::clone(&view));
        }
        view.refresh(&self.doc_snapshot());
        view
    }

    pub fn get_dynamic_view(&self, name: &str) -> Option<Arc<DynamicView>> {
        let views = self.views.lock().unwrap_or_else(|e| e.into_inner());
        views.iter().find(|v| v.name() == name).cloned()
    }

    /// The existing named view, or a fresh one built with `options`.
    pub fn ensure_dynamic_view(self: &Arc<Self>, name: &str, options: ViewOptions) -> Arc<DynamicView> {
        match self.get_dynamic_view(name) {
            Some(view) => view,
            None => self.add_dynamic_view(name, options),
        }
    }

    pub fn remove_dynamic_view(&self, name: &str) -> bool {
        let mut views = self.views.lock().unwrap_or_else(|e| e.into_inner());
        let before = views.len();
        views.retain(|v| v.name() != name);
        views.len() < before
    }

    pub(crate) fn dynamic_views(&self) -> Vec<Arc<DynamicView>> {
        let views = self.views.lock().unwrap_or_else(|e| e.into_inner());
        views.clone()
    }

    fn refresh_views(&self) {
        let views = self.dynamic_views();
        if views.is_empty() {
            return;
        }
        let docs = self.doc_snapshot();
        for view in views {
            view.refresh(&docs);
        }
    }
}

impl CollectionInner {
    fn apply_update(&mut self, doc: &Document) -> Result<Document> {
        let old = self
            .docs
            .get(&doc.id)
            .cloned()
            .ok_or(DbError::UnknownDocument(doc.id))?;
        self.check_unique(&doc.fields, Some(doc.id), &HashSet::new())?;
        self.unindex(&old);
        let mut updated = doc.clone();
        updated.meta.created = old.meta.created;
        updated.meta.updated = chrono::Utc::now();
        updated.meta.revision = old.meta.revision + 1;
        self.index(&updated);
        self.docs.insert(updated.id, updated.clone());
        Ok(updated)
    }
}
