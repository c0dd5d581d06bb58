use std::sync::{Arc, Mutex};

use crate::core::{Document, Fields, ID_FIELD, Result, Value};
use crate::live::{CollectionTarget, resolve_target};
use crate::registry::Registry;
use crate::store::{Collection, CollectionEvent, ListenerId};

/// Factory for the document a [`DocQuery`] creates when its key is absent.
pub type CreateFn = Arc<dyn Fn() -> Fields + Send + Sync>;

/// Options for [`DocQuery`].
#[derive(Clone)]
pub struct DocQueryOptions {
    /// Field the key is matched against; the document id when `None`. Any
    /// other field must carry a unique index on the collection.
    pub field: Option<String>,
    /// When set, a missing document is inserted from this factory on every
    /// lookup, including after `set_key`. A consumer that dropped its query
    /// and later builds a new one for a deleted key gets a fresh document.
    pub create: Option<CreateFn>,
    /// Track mutations; when false the binding is a one-shot lookup.
    pub subscribe: bool,
    pub db_name: Option<String>,
    pub registry: Option<Arc<Registry>>,
}

impl Default for DocQueryOptions {
    fn default() -> Self {
        Self {
            field: None,
            create: None,
            subscribe: true,
            db_name: None,
            registry: None,
        }
    }
}

/// Live view of a single document, tracked by its id or a uniquely-indexed
/// key field.
///
/// The document is re-resolved on matching inserts and updates and cleared
/// on delete. Unlike [`CollectionQuery`](crate::live::CollectionQuery) there
/// is no dirty flag: a one-document update is cheap to apply inline.
pub struct DocQuery {
    options: DocQueryOptions,
    collection: Option<Arc<Collection>>,
    field: String,
    key: Value,
    shared: Arc<Mutex<Option<Document>>>,
    listener: Option<ListenerId>,
}

impl DocQuery {
    pub fn new(
        target: impl Into<CollectionTarget>,
        key: impl Into<Value>,
        options: DocQueryOptions,
    ) -> Result<Self> {
        let collection = resolve_target(
            &target.into(),
            options.db_name.as_deref(),
            options.registry.as_ref(),
        )?;
        let field = options
            .field
            .clone()
            .unwrap_or_else(|| ID_FIELD.to_string());
        let mut query = Self {
            options,
            collection,
            field,
            key: key.into(),
            shared: Arc::new(Mutex::new(None)),
            listener: None,
        };
        query.attach()?;
        Ok(query)
    }

    fn attach(&mut self) -> Result<()> {
        let current = self.lookup()?;
        *self.shared.lock().unwrap_or_else(|e| e.into_inner()) = current;

        if !self.options.subscribe {
            return Ok(());
        }
        if let Some(collection) = &self.collection {
            let shared = Arc::clone(&self.shared);
            let field = self.field.clone();
            let key = self.key.clone();
            self.listener = Some(collection.on(move |event| {
                match event {
                    CollectionEvent::Insert(payload) | CollectionEvent::Update(payload) => {
                        if let Some(doc) =
                            payload.iter().find(|doc| doc.matches_key(&field, &key))
                        {
                            *shared.lock().unwrap_or_else(|e| e.into_inner()) =
                                Some(doc.clone());
                        }
                    }
                    CollectionEvent::Delete(payload) => {
                        if payload.iter().any(|doc| doc.matches_key(&field, &key)) {
                            *shared.lock().unwrap_or_else(|e| e.into_inner()) = None;
                        }
                    }
                }
            }));
        }
        Ok(())
    }

    fn detach(&mut self) {
        if let (Some(collection), Some(listener)) = (&self.collection, self.listener.take()) {
            collection.off(listener);
        }
    }

    /// Identity or unique-index lookup, running the create factory on a
    /// miss. `MissingUniqueIndex` when the field carries no index.
    fn lookup(&self) -> Result<Option<Document>> {
        let Some(collection) = &self.collection else {
            return Ok(None);
        };
        if let Some(doc) = collection.by(&self.field, &self.key)? {
            return Ok(Some(doc));
        }
        if let Some(create) = &self.options.create {
            let mut fields = create();
            if self.field != ID_FIELD {
                fields.insert(self.field.clone(), self.key.clone());
            }
            return collection.insert(fields).map(Some);
        }
        Ok(None)
    }

    /// Current document; `None` when the key is absent or was deleted.
    pub fn doc(&self) -> Option<Document> {
        self.shared.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn key(&self) -> &Value {
        &self.key
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    /// Track a different key. Re-runs the lookup, including the create
    /// factory when the new key is absent.
    pub fn set_key(&mut self, key: impl Into<Value>) -> Result<()> {
        self.detach();
        self.key = key.into();
        self.attach()
    }

    /// Match against a different field. `None` matches the document id.
    pub fn set_field(&mut self, field: Option<&str>) -> Result<()> {
        self.detach();
        self.field = field.unwrap_or(ID_FIELD).to_string();
        self.attach()
    }

    /// Track the same key in another collection; the subscription moves
    /// with it.
    pub fn set_collection(&mut self, target: impl Into<CollectionTarget>) -> Result<()> {
        self.detach();
        self.collection = resolve_target(
            &target.into(),
            self.options.db_name.as_deref(),
            self.options.registry.as_ref(),
        )?;
        self.attach()
    }

    /// Start or stop tracking mutations; re-runs the lookup when turning
    /// tracking on.
    pub fn set_subscribe(&mut self, subscribe: bool) -> Result<()> {
        if subscribe == self.options.subscribe {
            return Ok(());
        }
        self.detach();
        self.options.subscribe = subscribe;
        self.attach()
    }
}

impl Drop for DocQuery {
    fn drop(&mut self) {
        self.detach();
    }
}
