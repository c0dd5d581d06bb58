use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::core::{Document, Result};
use crate::live::{CollectionTarget, resolve_target};
use crate::registry::Registry;
use crate::store::{Collection, DynamicView, ListenerId, SimpleSort, ViewEvent, ViewOptions};

/// Options for [`ViewQuery`].
#[derive(Clone)]
pub struct ViewQueryOptions {
    /// View name to attach to or create. `None` creates an anonymous view
    /// under a random name, removed again when the query is dropped.
    pub name: Option<String>,
    pub view_options: ViewOptions,
    /// Track rebuilds; when false the state is a one-shot snapshot.
    pub subscribe: bool,
    pub db_name: Option<String>,
    pub registry: Option<Arc<Registry>>,
}

impl Default for ViewQueryOptions {
    fn default() -> Self {
        Self {
            name: None,
            view_options: ViewOptions::default(),
            subscribe: true,
            db_name: None,
            registry: None,
        }
    }
}

/// Snapshot of a [`ViewQuery`]: `loading` is true only while the target
/// collection could not be resolved yet.
#[derive(Clone)]
pub struct ViewQueryState {
    pub loading: bool,
    pub data: Arc<[Document]>,
}

/// Live binding to a dynamic view.
///
/// The state updates synchronously with every view rebuild, so filter and
/// sort changes are visible to the consumer immediately, without a flush
/// step.
pub struct ViewQuery {
    collection: Option<Arc<Collection>>,
    view: Option<Arc<DynamicView>>,
    name: String,
    ephemeral: bool,
    state: Arc<Mutex<ViewQueryState>>,
    listener: Option<ListenerId>,
}

impl ViewQuery {
    pub fn new(target: impl Into<CollectionTarget>, options: ViewQueryOptions) -> Result<Self> {
        let collection = resolve_target(
            &target.into(),
            options.db_name.as_deref(),
            options.registry.as_ref(),
        )?;
        let ephemeral = options.name.is_none();
        let name = options
            .name
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        // loading is only ever pending while a constructed view awaits its
        // first refresh; a missing collection renders as empty, not loading
        let state = Arc::new(Mutex::new(ViewQueryState {
            loading: collection.is_some(),
            data: Arc::from(Vec::new()),
        }));

        let (view, listener) = match &collection {
            Some(collection) => {
                let view = collection.ensure_dynamic_view(&name, options.view_options);
                let listener = if options.subscribe {
                    let shared = Arc::clone(&state);
                    Some(view.on(move |event| {
                        if let ViewEvent::Rebuild(snapshot) = event {
                            let mut state = shared.lock().unwrap_or_else(|e| e.into_inner());
                            state.loading = false;
                            state.data = Arc::clone(snapshot);
                        }
                    }))
                } else {
                    None
                };
                {
                    let mut guard = state.lock().unwrap_or_else(|e| e.into_inner());
                    guard.loading = false;
                    guard.data = view.data();
                }
                (Some(view), listener)
            }
            None => (None, None),
        };

        Ok(Self {
            collection,
            view,
            name,
            ephemeral,
            state,
            listener,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The underlying view, for applying filters and sorts.
    pub fn view(&self) -> Option<Arc<DynamicView>> {
        self.view.clone()
    }

    pub fn state(&self) -> ViewQueryState {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn data(&self) -> Arc<[Document]> {
        Arc::clone(&self.state.lock().unwrap_or_else(|e| e.into_inner()).data)
    }

    pub fn loading(&self) -> bool {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).loading
    }
}

impl Drop for ViewQuery {
    fn drop(&mut self) {
        if let (Some(view), Some(listener)) = (&self.view, self.listener.take()) {
            view.off(listener);
        }
        // anonymous views exist only for this query's lifetime
        if self.ephemeral {
            if let Some(collection) = &self.collection {
                collection.remove_dynamic_view(&self.name);
            }
        }
    }
}

/// Tracks the simple-sort criterion of one view and mirrors changes made
/// through any other handle to the same view.
pub struct SortBinding {
    view: Arc<DynamicView>,
    current: Arc<Mutex<SimpleSort>>,
    listener: ListenerId,
}

impl SortBinding {
    pub fn new(view: Arc<DynamicView>) -> Self {
        let current = Arc::new(Mutex::new(view.get_simple_sort()));
        let listener = {
            let shared = Arc::clone(&current);
            let weak = Arc::downgrade(&view);
            view.on(move |event| {
                if matches!(event, ViewEvent::Sort) {
                    if let Some(view) = weak.upgrade() {
                        *shared.lock().unwrap_or_else(|e| e.into_inner()) =
                            view.get_simple_sort();
                    }
                }
            })
        };
        Self {
            view,
            current,
            listener,
        }
    }

    pub fn get(&self) -> SimpleSort {
        self.current.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn set(&self, field: &str, desc: bool) {
        self.view.apply_simple_sort(field, desc);
    }

    /// Flip the direction when `field` is already the sort field, otherwise
    /// start sorting by `field` ascending.
    pub fn toggle(&self, field: &str) {
        self.view.toggle_simple_sort(field, false);
    }
}

impl Drop for SortBinding {
    fn drop(&mut self) {
        self.view.off(self.listener);
    }
}
