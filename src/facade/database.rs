use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::watch;

use crate::core::Result;
use crate::facade::serial::{self, DbState, SerialType, SerializableTypes};
use crate::registry::Registry;
use crate::store::events::{Emitter, ListenerId};
use crate::store::{Collection, CollectionOptions};

/// Database name used when none is given.
pub const DEFAULT_DB: &str = "app.db";

#[derive(Clone, Default)]
pub struct DatabaseOptions {
    /// The host intends to call [`Database::load_json`] right after opening;
    /// until that first load, `autoloading` is true and [`Database::ready`]
    /// is pending.
    pub autoload: bool,
    /// Registry to register with; the process-wide default when `None`.
    pub registry: Option<Arc<Registry>>,
}

#[derive(Debug, Clone)]
pub enum DbEvent {
    /// Fired after every successful `load_json`.
    Loaded,
}

/// Named facade over a set of collections.
///
/// Opening a database registers it in a [`Registry`] under its name, so live
/// queries can resolve collections by `(db name, collection name)`. The
/// facade adds lifecycle flags (`autoloading`/`loaded`/`ready`),
/// ensure-collection semantics, and JSON serialization with an open
/// tagged-type registry.
pub struct Database {
    name: String,
    registry: Arc<Registry>,
    collections: RwLock<BTreeMap<String, Arc<Collection>>>,
    autoloading: AtomicBool,
    loaded: AtomicBool,
    ready_tx: watch::Sender<bool>,
    events: Emitter<DbEvent>,
    types: SerializableTypes,
}

impl Database {
    /// Open a named database and register it. Fails with `DuplicateName`
    /// when the name is already registered.
    pub fn open(name: &str, options: DatabaseOptions) -> Result<Arc<Self>> {
        let registry = options.registry.unwrap_or_else(Registry::global);
        let (ready_tx, _ready_rx) = watch::channel(!options.autoload);
        let db = Arc::new(Self {
            name: name.to_string(),
            registry: Arc::clone(&registry),
            collections: RwLock::new(BTreeMap::new()),
            autoloading: AtomicBool::new(options.autoload),
            loaded: AtomicBool::new(false),
            ready_tx,
            events: Emitter::new(),
            types: SerializableTypes::with_builtins(),
        });
        registry.register(name, Arc::clone(&db))?;
        log::debug!("opened database '{}'", name);
        Ok(db)
    }

    /// Open under [`DEFAULT_DB`].
    pub fn open_default(options: DatabaseOptions) -> Result<Arc<Self>> {
        Self::open(DEFAULT_DB, options)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// True from construction with `autoload` until the first load.
    pub fn autoloading(&self) -> bool {
        self.autoloading.load(Ordering::SeqCst)
    }

    /// True after the first load; never reset by later loads.
    pub fn loaded(&self) -> bool {
        self.loaded.load(Ordering::SeqCst)
    }

    /// Resolves once the first `Loaded` event fires, or immediately when the
    /// database was opened without `autoload`. Settles exactly once per
    /// construction; later loads have no effect on it.
    pub async fn ready(&self) {
        let mut rx = self.ready_tx.subscribe();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    pub fn on_loaded(&self, callback: impl Fn(&DbEvent) + Send + Sync + 'static) -> ListenerId {
        self.events.on(callback)
    }

    pub fn off_loaded(&self, id: ListenerId) -> bool {
        self.events.off(id)
    }

    // ------------------------------------------------------------------
    // Collections
    // ------------------------------------------------------------------

    /// The existing collection, never constructs.
    pub fn get_collection(&self, name: &str) -> Option<Arc<Collection>> {
        let collections = self.collections.read().unwrap_or_else(|e| e.into_inner());
        collections.get(name).cloned()
    }

    /// Always constructs, replacing a same-named collection.
    pub fn add_collection(&self, name: &str, options: CollectionOptions) -> Arc<Collection> {
        let collection = Collection::new(name, options);
        let mut collections = self.collections.write().unwrap_or_else(|e| e.into_inner());
        collections.insert(name.to_string(), Arc::clone(&collection));
        collection
    }

    /// The existing collection, or a fresh one built with `options`.
    pub fn ensure_collection(&self, name: &str, options: CollectionOptions) -> Arc<Collection> {
        if let Some(existing) = self.get_collection(name) {
            return existing;
        }
        self.add_collection(name, options)
    }

    pub fn remove_collection(&self, name: &str) -> bool {
        let mut collections = self.collections.write().unwrap_or_else(|e| e.into_inner());
        collections.remove(name).is_some()
    }

    pub fn collection_names(&self) -> Vec<String> {
        let collections = self.collections.read().unwrap_or_else(|e| e.into_inner());
        collections.keys().cloned().collect()
    }

    /// Remove this database from its registry. Idempotent; the in-memory
    /// contents stay usable through handles already held.
    pub fn destroy(&self) {
        self.registry.remove(&self.name);
        log::debug!("destroyed database '{}'", self.name);
    }

    // ------------------------------------------------------------------
    // Serialization
    // ------------------------------------------------------------------

    /// Register an additional tagged serializable type by name.
    pub fn register_serializable_type(&self, name: &str, codec: SerialType) {
        self.types.register(name, codec);
    }

    /// Serialize collections, documents and dynamic views to JSON text.
    /// Pattern filters are written in the tagged `RegExp` form; function
    /// filters cannot be serialized and are skipped with a warning.
    pub fn save_json(&self) -> Result<String> {
        let collections = {
            let map = self.collections.read()?;
            map.values()
                .map(|collection| serial::collection_state(collection, &self.types))
                .collect()
        };
        let state = DbState {
            name: self.name.clone(),
            collections,
        };
        Ok(serde_json::to_string(&state)?)
    }

    /// Rebuild collections from JSON text and fire `Loaded`.
    ///
    /// Collections are replaced wholesale; handles obtained before the load
    /// keep pointing at the pre-load instances, so long-lived consumers
    /// should re-resolve their collection on `Loaded`. Empty input loads an
    /// empty database.
    pub fn load_json(&self, text: &str) -> Result<()> {
        let fresh = if text.is_empty() {
            BTreeMap::new()
        } else {
            let state: DbState = serde_json::from_str(text)?;
            let mut map = BTreeMap::new();
            for collection_state in state.collections {
                let collection = serial::restore_collection(collection_state, &self.types)?;
                map.insert(collection.name().to_string(), collection);
            }
            map
        };
        {
            let mut collections = self.collections.write()?;
            *collections = fresh;
        }
        log::debug!("database '{}' loaded", self.name);
        self.mark_loaded();
        Ok(())
    }

    fn mark_loaded(&self) {
        self.autoloading.store(false, Ordering::SeqCst);
        self.loaded.store(true, Ordering::SeqCst);
        // the watch only ever transitions false -> true, so `ready` settles
        // exactly once per construction
        let _ = self.ready_tx.send(true);
        self.events.emit(&DbEvent::Loaded);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields;
    use crate::store::{Find, Pattern, ViewOptions};

    fn scratch(name: &str) -> (Arc<Registry>, Arc<Database>) {
        let registry = Arc::new(Registry::new());
        let db = Database::open(
            name,
            DatabaseOptions {
                registry: Some(Arc::clone(&registry)),
                ..DatabaseOptions::default()
            },
        )
        .unwrap();
        (registry, db)
    }

    #[test]
    fn test_ensure_collection() {
        let (_registry, db) = scratch("ensure.db");
        assert!(db.get_collection("notes").is_none());

        let created = db.ensure_collection("notes", CollectionOptions::default());
        created.insert(fields! { "text" => "hi" }).unwrap();

        let again = db.ensure_collection("notes", CollectionOptions::default());
        assert_eq!(again.count(), 1);

        // add_collection always constructs
        let replaced = db.add_collection("notes", CollectionOptions::default());
        assert_eq!(replaced.count(), 0);
    }

    #[tokio::test]
    async fn test_ready_without_autoload_resolves_immediately() {
        let (_registry, db) = scratch("instant.db");
        assert!(!db.autoloading());
        assert!(!db.loaded());
        db.ready().await;
    }

    #[tokio::test]
    async fn test_ready_with_autoload_waits_for_first_load() {
        let registry = Arc::new(Registry::new());
        let db = Database::open(
            "auto.db",
            DatabaseOptions {
                autoload: true,
                registry: Some(registry),
            },
        )
        .unwrap();
        assert!(db.autoloading());
        assert!(!db.loaded());

        let waiter = {
            let db = Arc::clone(&db);
            tokio::spawn(async move { db.ready().await })
        };
        db.load_json("").unwrap();
        waiter.await.unwrap();

        assert!(!db.autoloading());
        assert!(db.loaded());

        // a second load fires Loaded again but the flags stay settled
        db.load_json("").unwrap();
        assert!(db.loaded());
        db.ready().await;
    }

    #[test]
    fn test_save_load_round_trip_with_regex_view() {
        let (_registry, db) = scratch("persist.db");
        let people = db.ensure_collection("people", CollectionOptions::unique(&["email"]));
        people
            .insert_many(vec![
                fields! { "name" => "Alice", "email" => "alice@x.io" },
                fields! { "name" => "Bob", "email" => "bob@x.io" },
            ])
            .unwrap();
        let view = people.ensure_dynamic_view("als", ViewOptions::default());
        view.apply_find(
            "name",
            Find::new().regex("name", Pattern::new("^ali", true).unwrap()),
        );
        view.apply_simple_sort("name", false);
        assert_eq!(view.data().len(), 1);

        let text = db.save_json().unwrap();

        let (_registry2, restored) = scratch("persist2.db");
        restored.load_json(&text).unwrap();
        let people2 = restored.get_collection("people").unwrap();
        assert_eq!(people2.count(), 2);
        // unique index survives
        assert!(people2
            .by("email", &crate::core::Value::Text("bob@x.io".into()))
            .unwrap()
            .is_some());
        // id sequence continues where it left off
        let next = people2.insert(fields! { "name" => "Carol" }).unwrap();
        assert_eq!(next.id(), 3);

        let view2 = people2.get_dynamic_view("als").unwrap();
        assert_eq!(view2.data().len(), 1);
        assert_eq!(
            view2.data()[0].get("name").unwrap().as_str(),
            Some("Alice")
        );
        assert_eq!(view2.get_simple_sort().field, "name");
    }
}
