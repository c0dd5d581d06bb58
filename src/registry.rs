use lazy_static::lazy_static;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::core::{DbError, Result};
use crate::facade::Database;

lazy_static! {
    static ref GLOBAL_REGISTRY: Arc<Registry> = Arc::new(Registry::new());
}

/// Name → database-handle map, so multiple independent store instances can
/// coexist and be looked up by name.
///
/// Components take a registry explicitly; [`Registry::global`] is only a
/// convenience default, not hidden state the crate reaches into on its own.
pub struct Registry {
    inner: Mutex<HashMap<String, Arc<Database>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// The process-wide default registry.
    pub fn global() -> Arc<Registry> {
        Arc::clone(&GLOBAL_REGISTRY)
    }

    /// Store a handle under `name`. Fails when the name is taken; the caller
    /// must pick a different name or reuse the existing handle.
    pub fn register(&self, name: &str, handle: Arc<Database>) -> Result<()> {
        let mut inner = self.inner.lock()?;
        if inner.contains_key(name) {
            return Err(DbError::DuplicateName(name.to_string()));
        }
        inner.insert(name.to_string(), handle);
        Ok(())
    }

    /// Look up a handle. Failing here indicates a lifecycle-ordering bug:
    /// the name is used before its database was opened, or after destroy.
    pub fn get(&self, name: &str) -> Result<Arc<Database>> {
        let inner = self.inner.lock()?;
        inner
            .get(name)
            .cloned()
            .ok_or_else(|| DbError::NotRegistered(name.to_string()))
    }

    /// Drop the mapping for `name`; a no-op when absent.
    pub fn remove(&self, name: &str) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.remove(name);
    }

    pub fn contains(&self, name: &str) -> bool {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.contains_key(name)
    }

    pub fn len(&self) -> usize {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
