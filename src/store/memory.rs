use crate::counter::SharedCounter;
use crate::store::CounterStore;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::convert::Infallible;
use std::sync::Arc;

/// A [CounterStore] that uses [Dashmap](dashmap::DashMap) to store keys in memory.
///
/// Keys are spread across the map's shards, so callers working on unrelated keys rarely contend
/// on the same lock. Entries live until [CounterStore::reset_all] is called.
pub struct InMemoryStore<V = SharedCounter> {
    map: Arc<DashMap<String, V>>,
}

impl<V> Clone for InMemoryStore<V> {
    fn clone(&self) -> Self {
        Self {
            map: self.map.clone(),
        }
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> InMemoryStoreBuilder {
        InMemoryStoreBuilder { capacity: 0 }
    }
}

impl<V> InMemoryStore<V> {
    /// Number of keys currently held.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }
}

impl<V> Default for InMemoryStore<V> {
    fn default() -> Self {
        Self {
            map: Arc::new(DashMap::new()),
        }
    }
}

impl<V: Clone + 'static> CounterStore<V> for InMemoryStore<V> {
    type Error = Infallible;

    fn load_or_initialize(&self, key: &str, initial: V) -> Result<(V, bool), Self::Error> {
        // Fast path under the shard read lock, avoids allocating the key for known entries
        if let Some(existing) = self.map.get(key) {
            return Ok((existing.value().clone(), true));
        }
        // The entry holds the shard write lock across the check and the insert
        Ok(match self.map.entry(key.to_owned()) {
            Entry::Occupied(entry) => (entry.get().clone(), true),
            Entry::Vacant(entry) => {
                entry.insert(initial.clone());
                (initial, false)
            }
        })
    }

    fn store(&self, key: &str, value: V) -> Result<(), Self::Error> {
        self.map.insert(key.to_owned(), value);
        Ok(())
    }

    fn reset_all(&self) -> Result<(), Self::Error> {
        self.map.clear();
        Ok(())
    }
}

pub struct InMemoryStoreBuilder {
    capacity: usize,
}

impl InMemoryStoreBuilder {
    /// Pre-allocate room for roughly `capacity` keys.
    ///
    /// Expect about one key per distinct source address, plus one or two per active principal.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn build(self) -> InMemoryStore {
        InMemoryStore {
            map: Arc::new(DashMap::with_capacity(self.capacity)),
        }
    }
}
