//! Fixed-capacity LRU map for the in-process cache tier.
//!
//! Entries live in an arena of slots linked by prev/next indices; a
//! `HashMap` maps keys to slot indices. Get, put, remove and eviction are
//! all O(1) and no slot is ever reallocated after warm-up.

use std::collections::HashMap;

const NIL: usize = usize::MAX;

#[derive(Debug)]
struct Slot<V> {
    key: String,
    /// `None` once the entry is removed
    value: Option<V>,
    prev: usize,
    next: usize,
}

/// Least-recently-used map with a fixed capacity.
#[derive(Debug)]
pub struct LruCache<V> {
    slots: Vec<Slot<V>>,
    index: HashMap<String, usize>,
    /// Vacant slots left behind by `remove`
    free: Vec<usize>,
    /// Most recently used
    head: usize,
    /// Least recently used
    tail: usize,
    capacity: usize,
}

impl<V> LruCache<V> {
    /// Create a cache holding at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: Vec::with_capacity(capacity),
            index: HashMap::with_capacity(capacity),
            free: Vec::new(),
            head: NIL,
            tail: NIL,
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    #[cfg(test)]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[cfg(test)]
    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Look up a key and mark it most recently used.
    pub fn get(&mut self, key: &str) -> Option<&V> {
        let idx = *self.index.get(key)?;
        self.touch(idx);
        self.slots[idx].value.as_ref()
    }

    /// Look up a key without touching recency.
    #[cfg(test)]
    pub fn peek(&self, key: &str) -> Option<&V> {
        self.index
            .get(key)
            .and_then(|&idx| self.slots[idx].value.as_ref())
    }

    /// Insert or replace a value. Returns the evicted entry, if any.
    pub fn put(&mut self, key: String, value: V) -> Option<(String, V)> {
        if let Some(&idx) = self.index.get(&key) {
            self.slots[idx].value = Some(value);
            self.touch(idx);
            return None;
        }

        let mut evicted = None;
        let idx = if let Some(idx) = self.free.pop() {
            self.slots[idx].key = key.clone();
            self.slots[idx].value = Some(value);
            idx
        } else if self.slots.len() < self.capacity {
            self.slots.push(Slot {
                key: key.clone(),
                value: Some(value),
                prev: NIL,
                next: NIL,
            });
            self.slots.len() - 1
        } else {
            // Full: reuse the least recently used slot.
            let idx = self.tail;
            self.unlink(idx);
            let slot = &mut self.slots[idx];
            let old_key = std::mem::replace(&mut slot.key, key.clone());
            let old_value = slot.value.replace(value);
            self.index.remove(&old_key);
            evicted = old_value.map(|v| (old_key, v));
            idx
        };

        self.index.insert(key, idx);
        self.push_front(idx);
        evicted
    }

    /// Remove a key, dropping its value.
    pub fn remove(&mut self, key: &str) -> bool {
        let Some(idx) = self.index.remove(key) else {
            return false;
        };
        self.unlink(idx);
        let slot = &mut self.slots[idx];
        slot.key.clear();
        slot.value = None;
        self.free.push(idx);
        true
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.index.clear();
        self.free.clear();
        self.head = NIL;
        self.tail = NIL;
    }

    /// Keys from most to least recently used.
    #[cfg(test)]
    pub fn keys(&self) -> Vec<&str> {
        let mut keys = Vec::with_capacity(self.len());
        let mut idx = self.head;
        while idx != NIL {
            keys.push(self.slots[idx].key.as_str());
            idx = self.slots[idx].next;
        }
        keys
    }

    fn touch(&mut self, idx: usize) {
        if self.head != idx {
            self.unlink(idx);
            self.push_front(idx);
        }
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = (self.slots[idx].prev, self.slots[idx].next);
        if prev != NIL {
            self.slots[prev].next = next;
        } else {
            self.head = next;
        }
        if next != NIL {
            self.slots[next].prev = prev;
        } else {
            self.tail = prev;
        }
        self.slots[idx].prev = NIL;
        self.slots[idx].next = NIL;
    }

    fn push_front(&mut self, idx: usize) {
        self.slots[idx].prev = NIL;
        self.slots[idx].next = self.head;
        if self.head != NIL {
            self.slots[self.head].prev = idx;
        }
        self.head = idx;
        if self.tail == NIL {
            self.tail = idx;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get() {
        let mut lru = LruCache::new(2);
        assert!(lru.put("a".to_string(), 1).is_none());
        assert_eq!(lru.get("a"), Some(&1));
        assert_eq!(lru.get("b"), None);
        assert_eq!(lru.len(), 1);
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let mut lru = LruCache::new(2);
        lru.put("a".to_string(), 1);
        lru.put("b".to_string(), 2);
        lru.get("a");

        let evicted = lru.put("c".to_string(), 3);
        assert_eq!(evicted, Some(("b".to_string(), 2)));
        assert!(lru.contains("a"));
        assert!(lru.contains("c"));
        assert_eq!(lru.keys(), vec!["c", "a"]);
    }

    #[test]
    fn test_replace_keeps_len() {
        let mut lru = LruCache::new(2);
        lru.put("a".to_string(), 1);
        lru.put("a".to_string(), 5);
        assert_eq!(lru.len(), 1);
        assert_eq!(lru.peek("a"), Some(&5));
    }

    #[test]
    fn test_remove_then_reuse_slot() {
        let mut lru = LruCache::new(3);
        lru.put("a".to_string(), 1);
        lru.put("b".to_string(), 2);
        lru.put("c".to_string(), 3);

        assert!(lru.remove("b"));
        assert!(!lru.remove("b"));
        assert_eq!(lru.keys(), vec!["c", "a"]);

        assert!(lru.put("d".to_string(), 4).is_none());
        assert_eq!(lru.len(), 3);
        assert_eq!(lru.keys(), vec!["d", "c", "a"]);
    }

    #[test]
    fn test_remove_head_and_tail() {
        let mut lru = LruCache::new(3);
        lru.put("a".to_string(), 1);
        lru.put("b".to_string(), 2);
        lru.put("c".to_string(), 3);

        lru.remove("c");
        lru.remove("a");
        assert_eq!(lru.keys(), vec!["b"]);

        lru.remove("b");
        assert!(lru.is_empty());
        assert!(lru.keys().is_empty());
    }

    #[test]
    fn test_remove_releases_value() {
        let shared = std::sync::Arc::new(vec![1, 2, 3]);
        let mut lru = LruCache::new(2);
        lru.put("a".to_string(), std::sync::Arc::clone(&shared));
        assert_eq!(std::sync::Arc::strong_count(&shared), 2);

        lru.remove("a");
        assert_eq!(std::sync::Arc::strong_count(&shared), 1);
        assert_eq!(lru.peek("a"), None);
    }

    #[test]
    fn test_eviction_hands_back_value() {
        let shared = std::sync::Arc::new("old");
        let mut lru = LruCache::new(1);
        lru.put("a".to_string(), std::sync::Arc::clone(&shared));

        let evicted = lru.put("b".to_string(), std::sync::Arc::new("new"));
        drop(evicted);
        assert_eq!(std::sync::Arc::strong_count(&shared), 1);
    }

    #[test]
    fn test_capacity_one() {
        let mut lru = LruCache::new(0);
        assert_eq!(lru.capacity(), 1);
        lru.put("a".to_string(), 1);
        lru.put("b".to_string(), 2);
        assert_eq!(lru.keys(), vec!["b"]);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Debug, Clone)]
    enum Op {
        Put(u8),
        Get(u8),
        Remove(u8),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u8..16).prop_map(Op::Put),
            (0u8..16).prop_map(Op::Get),
            (0u8..16).prop_map(Op::Remove),
        ]
    }

    proptest! {
        /// The arena agrees with a naive recency list after any op sequence.
        #[test]
        fn matches_reference_model(ops in prop::collection::vec(op(), 0..200), cap in 1usize..8) {
            let mut lru = LruCache::new(cap);
            let mut model: Vec<String> = Vec::new(); // most recent first

            for op in ops {
                match op {
                    Op::Put(k) => {
                        let key = k.to_string();
                        lru.put(key.clone(), k);
                        model.retain(|m| *m != key);
                        model.insert(0, key);
                        model.truncate(cap);
                    }
                    Op::Get(k) => {
                        let key = k.to_string();
                        let hit = lru.get(&key).is_some();
                        prop_assert_eq!(hit, model.contains(&key));
                        if hit {
                            model.retain(|m| *m != key);
                            model.insert(0, key);
                        }
                    }
                    Op::Remove(k) => {
                        let key = k.to_string();
                        prop_assert_eq!(lru.remove(&key), model.contains(&key));
                        model.retain(|m| *m != key);
                    }
                }
                prop_assert!(lru.len() <= cap);
                let keys: Vec<String> = lru.keys().into_iter().map(String::from).collect();
                prop_assert_eq!(keys, model.clone());
            }
        }
    }
}
