//! Memoized factory behind a reader/writer lock.
//!
//! Lookups take the read lock only. On a miss the write lock is taken and
//! the key is checked again before the factory runs, so concurrent first
//! access to one key constructs at most one value.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// A lazily populated `key -> Arc<value>` cache.
#[derive(Debug)]
pub struct MemoCache<K, V> {
    entries: RwLock<HashMap<K, Arc<V>>>,
}

impl<K, V> Default for MemoCache<K, V> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> MemoCache<K, V>
where
    K: Eq + Hash + Clone + Ord,
{
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached value for `key`, if any.
    pub fn get<Q>(&self, key: &Q) -> Option<Arc<V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.read().get(key).cloned()
    }

    /// Returns the cached value for `key`, constructing it with `init` on
    /// first access. A failed `init` caches nothing.
    pub fn get_or_try_init<Q, E, F>(&self, key: &Q, init: F) -> Result<Arc<V>, E>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ToOwned<Owned = K> + ?Sized,
        F: FnOnce() -> Result<V, E>,
    {
        if let Some(value) = self.read().get(key) {
            return Ok(Arc::clone(value));
        }

        let mut entries = self.write();
        if let Some(value) = entries.get(key) {
            return Ok(Arc::clone(value));
        }

        let value = Arc::new(init()?);
        entries.insert(key.to_owned(), Arc::clone(&value));
        Ok(value)
    }

    /// Removes and returns the value for `key`.
    pub fn remove<Q>(&self, key: &Q) -> Option<Arc<V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.write().remove(key)
    }

    /// Drops every cached value, returning them.
    pub fn clear(&self) -> Vec<(K, Arc<V>)> {
        self.write().drain().collect()
    }

    /// Returns the cached keys in ascending order.
    pub fn keys(&self) -> Vec<K> {
        let mut keys: Vec<K> = self.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<K, Arc<V>>> {
        // A panicking factory never leaves a half-inserted entry behind.
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<K, Arc<V>>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }
}
