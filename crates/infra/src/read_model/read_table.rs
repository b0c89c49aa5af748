use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, RwLock};

use stockroom_core::StoreId;

/// Store-scoped key/value table for disposable read models.
pub trait ReadTable<K, V>: Send + Sync {
    fn get(&self, store_id: StoreId, key: &K) -> Option<V>;
    fn upsert(&self, store_id: StoreId, key: K, value: V);
    fn remove(&self, store_id: StoreId, key: &K) -> Option<V>;
    fn list(&self, store_id: StoreId) -> Vec<V>;
    /// Drop every row of a store (rebuild support).
    fn clear_store(&self, store_id: StoreId);
}

impl<K, V, S> ReadTable<K, V> for Arc<S>
where
    S: ReadTable<K, V> + ?Sized,
{
    fn get(&self, store_id: StoreId, key: &K) -> Option<V> {
        (**self).get(store_id, key)
    }

    fn upsert(&self, store_id: StoreId, key: K, value: V) {
        (**self).upsert(store_id, key, value)
    }

    fn remove(&self, store_id: StoreId, key: &K) -> Option<V> {
        (**self).remove(store_id, key)
    }

    fn list(&self, store_id: StoreId) -> Vec<V> {
        (**self).list(store_id)
    }

    fn clear_store(&self, store_id: StoreId) {
        (**self).clear_store(store_id)
    }
}

/// In-memory table keyed by `(store, key)`.
#[derive(Debug)]
pub struct InMemoryReadTable<K, V> {
    inner: RwLock<HashMap<(StoreId, K), V>>,
}

impl<K, V> InMemoryReadTable<K, V> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> Default for InMemoryReadTable<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> ReadTable<K, V> for InMemoryReadTable<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn get(&self, store_id: StoreId, key: &K) -> Option<V> {
        let map = self.inner.read().ok()?;
        map.get(&(store_id, key.clone())).cloned()
    }

    fn upsert(&self, store_id: StoreId, key: K, value: V) {
        if let Ok(mut map) = self.inner.write() {
            map.insert((store_id, key), value);
        }
    }

    fn remove(&self, store_id: StoreId, key: &K) -> Option<V> {
        let mut map = self.inner.write().ok()?;
        map.remove(&(store_id, key.clone()))
    }

    fn list(&self, store_id: StoreId) -> Vec<V> {
        let map = match self.inner.read() {
            Ok(m) => m,
            Err(_) => return vec![],
        };

        map.iter()
            .filter_map(|((s, _k), v)| if *s == store_id { Some(v.clone()) } else { None })
            .collect()
    }

    fn clear_store(&self, store_id: StoreId) {
        if let Ok(mut map) = self.inner.write() {
            map.retain(|(s, _k), _v| *s != store_id);
        }
    }
}
