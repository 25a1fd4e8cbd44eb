//! Fixed-capacity least-recently-used cache for per-agent position history.
//!
//! A [`HistoryCache`] pairs a hash map (key -> slot) with a doubly linked
//! recency list threaded through a slot vector. Every operation is O(1)
//! amortized: access and insertion move an entry to the head of the list,
//! eviction always takes the tail.
//!
//! Freed slots are recycled through a free list so a cache that churns at
//! capacity never grows its backing vector.

use std::collections::HashMap;
use std::hash::Hash;

use crate::error::StoreError;

/// One cached entry plus its links in the recency list.
///
/// `prev` points toward the head (more recently used), `next` toward the
/// tail (less recently used).
#[derive(Debug, Clone)]
struct Entry<K, V> {
    key: K,
    value: V,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Least-recently-used cache with a capacity fixed at creation.
#[derive(Debug, Clone)]
pub struct HistoryCache<K, V> {
    capacity: usize,
    map: HashMap<K, usize>,
    slots: Vec<Option<Entry<K, V>>>,
    free: Vec<usize>,
    /// Most recently used.
    head: Option<usize>,
    /// Least recently used.
    tail: Option<usize>,
}

impl<K, V> HistoryCache<K, V>
where
    K: Eq + Hash + Clone,
{
    /// Create an empty cache holding at most `capacity` entries.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidCapacity`] if `capacity` is zero.
    pub fn new(capacity: usize) -> Result<Self, StoreError> {
        if capacity == 0 {
            return Err(StoreError::InvalidCapacity(capacity));
        }
        Ok(Self {
            capacity,
            map: HashMap::with_capacity(capacity),
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            head: None,
            tail: None,
        })
    }

    /// Maximum number of entries.
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of entries currently cached.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Insert or update `key`.
    ///
    /// An existing key gets its value replaced and becomes most recently
    /// used without evicting anything. A new key inserted into a full cache
    /// first evicts the least recently used entry. Returns whether an
    /// eviction occurred.
    pub fn put(&mut self, key: K, value: V) -> bool {
        if let Some(&idx) = self.map.get(&key) {
            if let Some(entry) = self.entry_mut(idx) {
                entry.value = value;
            }
            self.move_to_front(idx);
            return false;
        }

        let evicted = self.map.len() >= self.capacity && self.remove_oldest().is_some();

        let idx = self.alloc(Entry {
            key: key.clone(),
            value,
            prev: None,
            next: None,
        });
        self.map.insert(key, idx);
        self.push_front(idx);
        evicted
    }

    /// Look up `key` and mark it most recently used.
    ///
    /// This read mutates recency order; use [`peek`](Self::peek) or
    /// [`contains`](Self::contains) for pure inspection.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let idx = *self.map.get(key)?;
        self.move_to_front(idx);
        self.entry(idx).map(|e| &e.value)
    }

    /// Look up `key` without touching recency order.
    pub fn peek(&self, key: &K) -> Option<&V> {
        let idx = *self.map.get(key)?;
        self.entry(idx).map(|e| &e.value)
    }

    /// Membership test with no recency side effect.
    pub fn contains(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }

    /// Remove `key`. Returns whether it was present.
    pub fn remove(&mut self, key: &K) -> bool {
        let Some(idx) = self.map.remove(key) else {
            return false;
        };
        self.unlink(idx);
        self.release(idx);
        true
    }

    /// Remove and return the least recently used entry.
    pub fn remove_oldest(&mut self) -> Option<(K, V)> {
        let idx = self.tail?;
        self.unlink(idx);
        let entry = self.release(idx)?;
        self.map.remove(&entry.key);
        Some((entry.key, entry.value))
    }

    /// Peek at the least recently used entry.
    pub fn oldest(&self) -> Option<(&K, &V)> {
        let entry = self.entry(self.tail?)?;
        Some((&entry.key, &entry.value))
    }

    /// Keys ordered from least to most recently used.
    pub fn keys(&self) -> Vec<K> {
        self.iter().map(|(k, _)| k.clone()).collect()
    }

    /// Iterate entries from least to most recently used.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            cache: self,
            cursor: self.tail,
            remaining: self.map.len(),
        }
    }

    /// Drop every entry. Capacity is unchanged.
    pub fn purge(&mut self) {
        self.map.clear();
        self.slots.clear();
        self.free.clear();
        self.head = None;
        self.tail = None;
    }

    // -------------------------------------------------------------------
    // Recency list plumbing
    // -------------------------------------------------------------------

    fn entry(&self, idx: usize) -> Option<&Entry<K, V>> {
        self.slots.get(idx).and_then(Option::as_ref)
    }

    fn entry_mut(&mut self, idx: usize) -> Option<&mut Entry<K, V>> {
        self.slots.get_mut(idx).and_then(Option::as_mut)
    }

    fn alloc(&mut self, entry: Entry<K, V>) -> usize {
        if let Some(idx) = self.free.pop()
            && let Some(slot) = self.slots.get_mut(idx)
        {
            *slot = Some(entry);
            return idx;
        }
        self.slots.push(Some(entry));
        self.slots.len().saturating_sub(1)
    }

    fn release(&mut self, idx: usize) -> Option<Entry<K, V>> {
        let entry = self.slots.get_mut(idx).and_then(Option::take)?;
        self.free.push(idx);
        Some(entry)
    }

    /// Detach `idx` from the list, patching its neighbours and the ends.
    fn unlink(&mut self, idx: usize) {
        let Some((prev, next)) = self.entry(idx).map(|e| (e.prev, e.next)) else {
            return;
        };

        match prev {
            Some(p) => {
                if let Some(entry) = self.entry_mut(p) {
                    entry.next = next;
                }
            }
            None => self.head = next,
        }
        match next {
            Some(n) => {
                if let Some(entry) = self.entry_mut(n) {
                    entry.prev = prev;
                }
            }
            None => self.tail = prev,
        }

        if let Some(entry) = self.entry_mut(idx) {
            entry.prev = None;
            entry.next = None;
        }
    }

    fn push_front(&mut self, idx: usize) {
        let old_head = self.head;
        if let Some(entry) = self.entry_mut(idx) {
            entry.prev = None;
            entry.next = old_head;
        }
        match old_head {
            Some(h) => {
                if let Some(entry) = self.entry_mut(h) {
                    entry.prev = Some(idx);
                }
            }
            None => self.tail = Some(idx),
        }
        self.head = Some(idx);
    }

    fn move_to_front(&mut self, idx: usize) {
        if self.head == Some(idx) {
            return;
        }
        self.unlink(idx);
        self.push_front(idx);
    }
}

/// Iterator over a [`HistoryCache`] from least to most recently used.
#[derive(Debug)]
pub struct Iter<'a, K, V> {
    cache: &'a HistoryCache<K, V>,
    cursor: Option<usize>,
    remaining: usize,
}

impl<'a, K, V> Iterator for Iter<'a, K, V>
where
    K: Eq + Hash + Clone,
{
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let cache: &'a HistoryCache<K, V> = self.cache;
        let entry = cache.entry(self.cursor?)?;
        self.cursor = entry.prev;
        self.remaining = self.remaining.saturating_sub(1);
        Some((&entry.key, &entry.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn cache(capacity: usize) -> HistoryCache<i64, &'static str> {
        HistoryCache::new(capacity).unwrap()
    }

    #[test]
    fn zero_capacity_rejected() {
        let result = HistoryCache::<i64, i64>::new(0);
        assert_eq!(result.err(), Some(StoreError::InvalidCapacity(0)));
    }

    #[test]
    fn overflow_evicts_least_recently_used() {
        let mut c = cache(3);
        assert!(!c.put(1, "a"));
        assert!(!c.put(2, "b"));
        assert!(!c.put(3, "c"));
        assert!(c.put(4, "d"));

        assert_eq!(c.len(), 3);
        assert!(!c.contains(&1));
        assert_eq!(c.keys(), vec![2, 3, 4]);
    }

    #[test]
    fn get_protects_key_from_eviction() {
        let mut c = cache(3);
        c.put(1, "a");
        c.put(2, "b");
        c.put(3, "c");

        assert_eq!(c.get(&1), Some(&"a"));
        assert!(c.put(4, "d"));

        assert!(c.contains(&1));
        assert!(!c.contains(&2));
        assert_eq!(c.keys(), vec![3, 1, 4]);
    }

    #[test]
    fn updating_existing_key_never_evicts() {
        let mut c = cache(2);
        c.put(1, "a");
        c.put(2, "b");

        assert!(!c.put(1, "a2"));
        assert_eq!(c.len(), 2);
        assert_eq!(c.peek(&1), Some(&"a2"));
        assert_eq!(c.keys(), vec![2, 1]);
    }

    #[test]
    fn contains_and_peek_leave_order_alone() {
        let mut c = cache(2);
        c.put(1, "a");
        c.put(2, "b");

        assert!(c.contains(&1));
        assert_eq!(c.peek(&1), Some(&"a"));
        c.put(3, "c");

        // 1 was still the oldest despite being inspected.
        assert!(!c.contains(&1));
    }

    #[test]
    fn oldest_and_remove_oldest() {
        let mut c = cache(3);
        assert!(c.oldest().is_none());
        assert!(c.remove_oldest().is_none());

        c.put(10, "x");
        c.put(20, "y");
        assert_eq!(c.oldest(), Some((&10, &"x")));
        assert_eq!(c.remove_oldest(), Some((10, "x")));
        assert_eq!(c.oldest(), Some((&20, &"y")));
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn remove_reports_presence() {
        let mut c = cache(3);
        c.put(1, "a");
        c.put(2, "b");
        c.put(3, "c");

        assert!(c.remove(&2));
        assert!(!c.remove(&2));
        assert_eq!(c.keys(), vec![1, 3]);

        // Head and tail removals keep the list intact.
        assert!(c.remove(&3));
        assert!(c.remove(&1));
        assert!(c.is_empty());
        assert!(c.keys().is_empty());
    }

    #[test]
    fn slots_are_recycled_under_churn() {
        let mut c = cache(4);
        for i in 0..1_000 {
            c.put(i, "v");
        }
        assert_eq!(c.len(), 4);
        assert!(c.slots.len() <= 5);
        assert_eq!(c.keys(), vec![996, 997, 998, 999]);
    }

    #[test]
    fn purge_clears_everything() {
        let mut c = cache(2);
        c.put(1, "a");
        c.put(2, "b");
        c.purge();

        assert!(c.is_empty());
        assert!(c.oldest().is_none());
        assert!(!c.put(3, "c"));
        assert_eq!(c.keys(), vec![3]);
        assert_eq!(c.capacity(), 2);
    }

    #[test]
    fn iter_yields_values_in_recency_order() {
        let mut c = cache(3);
        c.put(1, "a");
        c.put(2, "b");
        c.put(3, "c");
        c.get(&2);

        let collected: Vec<(i64, &str)> = c.iter().map(|(k, v)| (*k, *v)).collect();
        assert_eq!(collected, vec![(1, "a"), (3, "c"), (2, "b")]);
        assert_eq!(c.iter().size_hint(), (3, Some(3)));
    }
}
