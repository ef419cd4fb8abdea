//! Small bounded cache for slowly-changing lookups.
//!
//! Used by adapters to remember things like "this channel handle resolves to
//! that uploads playlist" between poll cycles. When full, the entry that was
//! written least recently is evicted; reads do not refresh an entry.

use std::collections::VecDeque;
use std::hash::Hash;
use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;

/// Default capacity for adapter lookup caches.
pub const DEFAULT_MAXSIZE: usize = 128;

#[derive(Debug, Clone)]
struct Slot<V> {
    value: V,
    generation: u64,
    written_at: Instant,
}

/// Capacity-bounded cache with write-order eviction and optional TTL.
#[derive(Debug, Clone)]
pub struct ResultCache<K, V> {
    entries: FxHashMap<K, Slot<V>>,
    /// Write order. Entries whose generation no longer matches the map are stale.
    order: VecDeque<(K, u64)>,
    maxsize: usize,
    ttl: Option<Duration>,
    next_generation: u64,
}

impl<K, V> ResultCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create a cache holding at most `maxsize` entries (minimum 1).
    pub fn new(maxsize: usize) -> Self {
        let maxsize = maxsize.max(1);
        Self {
            entries: FxHashMap::default(),
            order: VecDeque::with_capacity(maxsize),
            maxsize,
            ttl: None,
            next_generation: 0,
        }
    }

    /// Create a cache whose entries expire `ttl` after being written.
    pub fn with_ttl(maxsize: usize, ttl: Duration) -> Self {
        let mut cache = Self::new(maxsize);
        cache.ttl = Some(ttl);
        cache
    }

    /// Look up a value. Expired entries are reported as absent.
    pub fn get(&self, key: &K) -> Option<V> {
        let slot = self.entries.get(key)?;
        if let Some(ttl) = self.ttl
            && slot.written_at.elapsed() >= ttl
        {
            return None;
        }
        Some(slot.value.clone())
    }

    /// Insert or overwrite a value, evicting the oldest write when full.
    pub fn set(&mut self, key: K, value: V) {
        let generation = self.next_generation;
        self.next_generation += 1;

        let is_new_key = !self.entries.contains_key(&key);
        if is_new_key && self.entries.len() >= self.maxsize {
            self.evict_oldest();
        }

        self.entries.insert(
            key.clone(),
            Slot {
                value,
                generation,
                written_at: Instant::now(),
            },
        );
        self.order.push_back((key, generation));

        // Overwrites leave stale markers behind; keep the queue proportional to the map.
        if self.order.len() > self.maxsize * 2 {
            self.compact();
        }
    }

    /// Remove a single entry.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.entries.remove(key).map(|slot| slot.value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    fn evict_oldest(&mut self) {
        while let Some((key, generation)) = self.order.pop_front() {
            let is_current = self
                .entries
                .get(&key)
                .is_some_and(|slot| slot.generation == generation);
            if is_current {
                self.entries.remove(&key);
                return;
            }
        }
    }

    fn compact(&mut self) {
        let entries = &self.entries;
        self.order.retain(|(key, generation)| {
            entries
                .get(key)
                .is_some_and(|slot| slot.generation == *generation)
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_and_set() {
        let mut cache = ResultCache::new(4);
        assert_eq!(cache.get(&"a"), None);
        cache.set("a", 1);
        assert_eq!(cache.get(&"a"), Some(1));
        cache.set("a", 2);
        assert_eq!(cache.get(&"a"), Some(2));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_evicts_least_recently_set() {
        let mut cache = ResultCache::new(2);
        cache.set("a", 1);
        cache.set("b", 2);
        // Reading does not refresh "a".
        assert_eq!(cache.get(&"a"), Some(1));
        cache.set("c", 3);
        assert_eq!(cache.get(&"a"), None);
        assert_eq!(cache.get(&"b"), Some(2));
        assert_eq!(cache.get(&"c"), Some(3));
    }

    #[test]
    fn test_overwrite_refreshes_write_order() {
        let mut cache = ResultCache::new(2);
        cache.set("a", 1);
        cache.set("b", 2);
        cache.set("a", 10);
        cache.set("c", 3);
        assert_eq!(cache.get(&"a"), Some(10));
        assert_eq!(cache.get(&"b"), None);
    }

    #[test]
    fn test_many_overwrites_stay_bounded() {
        let mut cache = ResultCache::new(3);
        for i in 0..1000 {
            cache.set(i % 2, i);
        }
        assert_eq!(cache.len(), 2);
        assert!(cache.order.len() <= 6);
        assert_eq!(cache.get(&0), Some(998));
        assert_eq!(cache.get(&1), Some(999));
    }

    #[test]
    fn test_ttl_expiry() {
        let mut cache = ResultCache::with_ttl(2, Duration::from_millis(10));
        cache.set("a", 1);
        assert_eq!(cache.get(&"a"), Some(1));
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(cache.get(&"a"), None);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let mut cache = ResultCache::new(0);
        cache.set("a", 1);
        cache.set("b", 2);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&"b"), Some(2));
    }
}
