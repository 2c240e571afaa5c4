use std::collections::HashMap;
use std::hash::Hash;

/// Bounded cache evicting the least recently used entry.
///
/// Recency is a monotonically increasing stamp per access; eviction scans
/// for the smallest stamp, which is fine at the few hundred entries the
/// repository keeps.
pub struct MemoryRequestCache<K, V> {
    entries: HashMap<K, (V, u64)>,
    capacity: usize,
    clock: u64,
}

impl<K: Eq + Hash + Clone, V> MemoryRequestCache<K, V> {
    /// A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            capacity: capacity.max(1),
            clock: 0,
        }
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    pub fn has(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Look up `key`, marking it most recently used.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let stamp = self.tick();
        let entry = self.entries.get_mut(key)?;
        entry.1 = stamp;
        Some(&entry.0)
    }

    /// Insert or replace, evicting the least recently used entry when full.
    pub fn force_insert(&mut self, key: K, value: V) {
        if !self.entries.contains_key(&key) && self.entries.len() >= self.capacity {
            self.evict_oldest();
        }
        let stamp = self.tick();
        self.entries.insert(key, (value, stamp));
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.entries.remove(key).map(|(value, _)| value)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, (_, stamp))| *stamp)
            .map(|(key, _)| key.clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evicts_least_recently_used() {
        let mut cache = MemoryRequestCache::new(2);
        cache.force_insert("a", 1);
        cache.force_insert("b", 2);
        assert_eq!(cache.get(&"a"), Some(&1));

        cache.force_insert("c", 3);
        assert!(cache.has(&"a"));
        assert!(!cache.has(&"b"));
        assert!(cache.has(&"c"));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_replace_does_not_evict() {
        let mut cache = MemoryRequestCache::new(2);
        cache.force_insert("a", 1);
        cache.force_insert("b", 2);
        cache.force_insert("a", 10);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&"a"), Some(&10));
        assert!(cache.has(&"b"));
    }

    #[test]
    fn test_remove_and_clear() {
        let mut cache = MemoryRequestCache::new(4);
        cache.force_insert(1u32, "x");
        cache.force_insert(2u32, "y");
        assert_eq!(cache.remove(&1), Some("x"));
        assert_eq!(cache.remove(&1), None);
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_zero_capacity_holds_one() {
        let mut cache = MemoryRequestCache::new(0);
        cache.force_insert(1u32, ());
        cache.force_insert(2u32, ());
        assert_eq!(cache.capacity(), 1);
        assert!(cache.has(&2));
        assert!(!cache.has(&1));
    }
}
