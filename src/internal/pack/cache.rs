//! Caches used by the object store.
//!
//! * [`ObjectCache`]: id -> resolved envelope, bounded by heap usage with LRU eviction.
//! * [`PackCache`]: pack name -> parsed index or raw pack bytes, bounded by entry count with
//!   arbitrary-entry eviction. Both are cleared whenever the pack set is rewritten.

use std::sync::Mutex;

use dashmap::DashMap;
use lru_mem::{HeapSize, LruCache};
use tracing::warn;

use crate::{hash::ObjectHash, internal::object::ObjectEnvelope};

impl HeapSize for ObjectHash {
    fn heap_size(&self) -> usize {
        0
    }
}

impl HeapSize for ObjectEnvelope {
    fn heap_size(&self) -> usize {
        self.data.heap_size()
    }
}

/// Memory-bounded id -> envelope cache. The lock is only held for a single get or insert, never
/// while a delta chain is being resolved.
pub struct ObjectCache {
    lru: Mutex<LruCache<ObjectHash, ObjectEnvelope>>,
}

impl ObjectCache {
    pub fn new(mem_size: usize) -> Self {
        ObjectCache {
            lru: Mutex::new(LruCache::new(mem_size)),
        }
    }

    pub fn get(&self, id: &ObjectHash) -> Option<ObjectEnvelope> {
        let mut lru = self.lru.lock().ok()?;
        lru.get(id).cloned()
    }

    pub fn insert(&self, id: ObjectHash, object: ObjectEnvelope) {
        let Ok(mut lru) = self.lru.lock() else {
            return;
        };
        if let Err(e) = lru.insert(id, object) {
            // entries larger than the whole cache are simply not kept
            warn!("object {} not cached: {:?}", id, e);
        }
    }

    pub fn remove(&self, id: &ObjectHash) {
        if let Ok(mut lru) = self.lru.lock() {
            lru.remove(id);
        }
    }

    pub fn clear(&self) {
        if let Ok(mut lru) = self.lru.lock() {
            lru.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.lru.lock().map(|lru| lru.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Capacity-bounded cache keyed by pack file name.
pub struct PackCache<V> {
    map: DashMap<String, V>,
    capacity: usize,
}

impl<V: Clone> PackCache<V> {
    pub fn new(capacity: usize) -> Self {
        PackCache {
            map: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn get(&self, name: &str) -> Option<V> {
        self.map.get(name).map(|v| v.value().clone())
    }

    /// Insert `value`, evicting an arbitrary other entry when the cache is full.
    pub fn insert(&self, name: String, value: V) {
        if !self.map.contains_key(&name) && self.map.len() >= self.capacity {
            let victim = self.map.iter().next().map(|e| e.key().clone());
            if let Some(victim) = victim {
                self.map.remove(&victim);
            }
        }
        self.map.insert(name, value);
    }

    pub fn clear(&self) {
        self.map.clear();
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_cache_get_insert() {
        let cache = ObjectCache::new(1 << 20);
        let object = ObjectEnvelope::blob(b"cached".to_vec());
        let id = object.id();
        assert!(cache.get(&id).is_none());
        cache.insert(id, object.clone());
        assert_eq!(cache.get(&id), Some(object));
        assert_eq!(cache.len(), 1);
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn object_cache_is_memory_bounded() {
        let cache = ObjectCache::new(4096);
        let mut ids = Vec::new();
        for i in 0..64u8 {
            let object = ObjectEnvelope::blob(vec![i; 512]);
            ids.push(object.id());
            cache.insert(object.id(), object);
        }
        assert!(cache.len() < 64);
        // the most recent entry survives
        assert!(cache.get(&ids[63]).is_some());
        assert!(cache.get(&ids[0]).is_none());
    }

    #[test]
    fn oversized_object_is_skipped() {
        let cache = ObjectCache::new(64);
        let object = ObjectEnvelope::blob(vec![0u8; 1024]);
        cache.insert(object.id(), object.clone());
        assert!(cache.get(&object.id()).is_none());
    }

    #[test]
    fn pack_cache_respects_capacity() {
        let cache: PackCache<u32> = PackCache::new(2);
        cache.insert("a".to_string(), 1);
        cache.insert("b".to_string(), 2);
        cache.insert("c".to_string(), 3);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("c"), Some(3));

        // replacing an existing key never evicts
        cache.insert("c".to_string(), 4);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("c"), Some(4));

        cache.clear();
        assert!(cache.is_empty());
    }
}
