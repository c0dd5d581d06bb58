use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::core::{Document, Result};
use crate::live::{CollectionTarget, resolve_target};
use crate::registry::Registry;
use crate::store::{Collection, ListenerId};

/// Options for [`CollectionQuery`].
#[derive(Clone)]
pub struct CollectionQueryOptions {
    /// Database to resolve a named target through; the default database
    /// when `None`.
    pub db_name: Option<String>,
    pub registry: Option<Arc<Registry>>,
    /// Track mutations; when false the binding is a one-shot snapshot.
    pub subscribe: bool,
}

impl Default for CollectionQueryOptions {
    fn default() -> Self {
        Self {
            db_name: None,
            registry: None,
            subscribe: true,
        }
    }
}

/// Live snapshot of a whole collection.
///
/// Mutations on the collection only raise a dirty flag; the snapshot is
/// recomputed when the consumer calls [`CollectionQuery::flush`]. A batch of
/// mutations between two flushes therefore costs one recompute, and the
/// per-document delete notifications of a batch remove collapse into a
/// single refresh.
pub struct CollectionQuery {
    options: CollectionQueryOptions,
    collection: Option<Arc<Collection>>,
    listener: Option<ListenerId>,
    dirty: Arc<AtomicBool>,
    data: Arc<[Document]>,
}

impl CollectionQuery {
    pub fn new(
        target: impl Into<CollectionTarget>,
        options: CollectionQueryOptions,
    ) -> Result<Self> {
        let collection = resolve_target(
            &target.into(),
            options.db_name.as_deref(),
            options.registry.as_ref(),
        )?;
        let mut query = Self {
            options,
            collection,
            listener: None,
            dirty: Arc::new(AtomicBool::new(false)),
            data: Arc::from(Vec::new()),
        };
        query.attach()?;
        Ok(query)
    }

    fn attach(&mut self) -> Result<()> {
        if let Some(collection) = &self.collection {
            self.data = Arc::from(collection.chain()?.data());
            if self.options.subscribe {
                let dirty = Arc::clone(&self.dirty);
                self.listener = Some(collection.on(move |_event| {
                    dirty.store(true, Ordering::SeqCst);
                }));
            }
        } else {
            self.data = Arc::from(Vec::new());
        }
        Ok(())
    }

    /// Current snapshot. Stale until the next [`flush`](Self::flush) when
    /// [`is_dirty`](Self::is_dirty) reports true.
    pub fn data(&self) -> Arc<[Document]> {
        Arc::clone(&self.data)
    }

    pub fn data_vec(&self) -> Vec<Document> {
        self.data.to_vec()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    /// Recompute the snapshot if any mutation happened since the last flush.
    /// Returns whether a recompute ran.
    pub fn flush(&mut self) -> Result<bool> {
        if !self.dirty.swap(false, Ordering::SeqCst) {
            return Ok(false);
        }
        if let Some(collection) = &self.collection {
            self.data = Arc::from(collection.chain()?.data());
        }
        Ok(true)
    }

    pub fn collection(&self) -> Option<Arc<Collection>> {
        self.collection.clone()
    }

    /// Point the binding at another collection; the snapshot and
    /// subscription move with it.
    pub fn set_collection(&mut self, target: impl Into<CollectionTarget>) -> Result<()> {
        self.unsubscribe();
        self.collection = resolve_target(
            &target.into(),
            self.options.db_name.as_deref(),
            self.options.registry.as_ref(),
        )?;
        self.attach()
    }

    /// Stop tracking mutations. The last snapshot stays readable.
    pub fn unsubscribe(&mut self) {
        if let (Some(collection), Some(listener)) = (&self.collection, self.listener.take()) {
            collection.off(listener);
        }
        self.dirty.store(false, Ordering::SeqCst);
    }
}

impl Drop for CollectionQuery {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
