//! Process-lifetime caches for derived social data.
//!
//! Entries are recomputable, so races only cost a redundant fetch (last
//! writer wins). Callers that need fresh data bypass the cache.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use once_cell::sync::OnceCell;

use crate::key::DriveKey;

/// Raw query results keyed by author; `None` means "the user and everyone
/// they follow".
pub struct AuthorCache<T> {
    entries: RwLock<HashMap<Option<DriveKey>, Arc<T>>>,
}

impl<T> AuthorCache<T> {
    pub fn new() -> Self {
        AuthorCache {
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, author: Option<&DriveKey>) -> Option<Arc<T>> {
        let entries = self.entries.read().ok()?;
        entries.get(&author.cloned()).cloned()
    }

    pub fn insert(&self, author: Option<&DriveKey>, value: T) -> Arc<T> {
        let value = Arc::new(value);
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(author.cloned(), Arc::clone(&value));
        }
        value
    }

    /// Drop the entry for `author` and the combined entry.
    pub fn invalidate(&self, author: &DriveKey) {
        if let Ok(mut entries) = self.entries.write() {
            entries.remove(&Some(author.clone()));
            entries.remove(&None);
        }
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.write() {
            entries.clear();
        }
    }
}

impl<T> Default for AuthorCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// One slot per drive. Concurrent lookups of the same drive wait on a single
/// fetch; a failed fetch leaves the slot empty for the next caller.
pub struct SlotCache<T> {
    slots: Mutex<HashMap<DriveKey, Arc<OnceCell<Arc<T>>>>>,
}

impl<T> SlotCache<T> {
    pub fn new() -> Self {
        SlotCache {
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn get_or_try_init<E, F>(&self, key: &DriveKey, init: F) -> Result<Arc<T>, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        let slot = match self.slots.lock() {
            Ok(mut slots) => Arc::clone(slots.entry(key.clone()).or_default()),
            // A poisoned map only loses sharing, never correctness.
            Err(_) => Arc::new(OnceCell::new()),
        };
        slot.get_or_try_init(|| init().map(Arc::new)).cloned()
    }

    pub fn invalidate(&self, key: &DriveKey) {
        if let Ok(mut slots) = self.slots.lock() {
            slots.remove(key);
        }
    }

    pub fn clear(&self) {
        if let Ok(mut slots) = self.slots.lock() {
            slots.clear();
        }
    }
}

impl<T> Default for SlotCache<T> {
    fn default() -> Self {
        Self::new()
    }
}
