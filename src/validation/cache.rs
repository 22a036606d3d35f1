//! Bounded least-recently-used cache

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;

/// Strict LRU cache
///
/// Reading or inserting an entry makes it the most recently used. Inserting
/// a new key into a full cache evicts the least recently used entry first.
#[derive(Debug)]
pub struct LruCache<K, V> {
    data: HashMap<K, V>,
    /// Most recently used at the front
    access_order: VecDeque<K>,
    capacity: usize,
}

impl<K: Eq + Hash + Clone, V> LruCache<K, V> {
    /// Create a cache holding at most `capacity` entries (at least one)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            data: HashMap::with_capacity(capacity),
            access_order: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Get a value, promoting it to most recently used
    pub fn get(&mut self, key: &K) -> Option<&V> {
        if self.data.contains_key(key) {
            self.touch(key);
            self.data.get(key)
        } else {
            None
        }
    }

    /// Insert a value, returning the key evicted to make room, if any
    pub fn put(&mut self, key: K, value: V) -> Option<K> {
        let mut evicted = None;
        if self.data.contains_key(&key) {
            self.access_order.retain(|k| k != &key);
        } else if self.data.len() >= self.capacity
            && let Some(lru) = self.access_order.pop_back()
        {
            self.data.remove(&lru);
            evicted = Some(lru);
        }
        self.access_order.push_front(key.clone());
        self.data.insert(key, value);
        evicted
    }

    pub fn pop(&mut self, key: &K) -> Option<V> {
        self.access_order.retain(|k| k != key);
        self.data.remove(key)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.data.contains_key(key)
    }

    pub fn clear(&mut self) {
        self.data.clear();
        self.access_order.clear();
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn touch(&mut self, key: &K) {
        self.access_order.retain(|k| k != key);
        self.access_order.push_front(key.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evicts_least_recently_used() {
        let mut cache = LruCache::new(2);
        assert_eq!(cache.put("a", 1), None);
        assert_eq!(cache.put("b", 2), None);
        // Reading "a" makes "b" the eviction candidate
        assert_eq!(cache.get(&"a"), Some(&1));
        assert_eq!(cache.put("c", 3), Some("b"));
        assert!(cache.contains(&"a"));
        assert!(!cache.contains(&"b"));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_reinsert_does_not_evict() {
        let mut cache = LruCache::new(2);
        cache.put("a", 1);
        cache.put("b", 2);
        assert_eq!(cache.put("a", 10), None);
        assert_eq!(cache.get(&"a"), Some(&10));
        assert_eq!(cache.put("c", 3), Some("b"));
    }

    #[test]
    fn test_zero_capacity_holds_one() {
        let mut cache = LruCache::new(0);
        cache.put(1, "x");
        assert_eq!(cache.capacity(), 1);
        assert_eq!(cache.put(2, "y"), Some(1));
    }

    #[test]
    fn test_pop_and_clear() {
        let mut cache = LruCache::new(3);
        cache.put(1, 1);
        cache.put(2, 2);
        assert_eq!(cache.pop(&1), Some(1));
        assert_eq!(cache.len(), 1);
        cache.clear();
        assert!(cache.is_empty());
    }
}
