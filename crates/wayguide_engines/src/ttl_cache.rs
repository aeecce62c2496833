#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use wayguide_kernel_contracts::MonotonicTimeNs;

#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<V> {
    pub payload: V,
    pub created_at: MonotonicTimeNs,
    pub ttl_ms: u64,
}

impl<V> CacheEntry<V> {
    /// Valid iff `now < created_at + ttl`.
    pub fn is_valid(&self, now: MonotonicTimeNs) -> bool {
        now < self.created_at.saturating_add_ms(self.ttl_ms)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub expirations: u64,
    pub evictions: u64,
}

/// Bounded map with per-entry TTL. Time is always passed in so callers own the clock.
///
/// Not synchronized; the typed caches built on top of it hold it behind a lock.
#[derive(Debug, Clone)]
pub struct TtlCache<K: Ord + Clone, V: Clone> {
    entries: BTreeMap<K, CacheEntry<V>>,
    max_entries: usize,
    stats: CacheStats,
}

impl<K: Ord + Clone, V: Clone> TtlCache<K, V> {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: BTreeMap::new(),
            max_entries: max_entries.max(1),
            stats: CacheStats::default(),
        }
    }

    /// Reading an expired entry counts as a miss and evicts it.
    pub fn get(&mut self, key: &K, now: MonotonicTimeNs) -> Option<V> {
        let valid = match self.entries.get(key) {
            Some(entry) => entry.is_valid(now),
            None => {
                self.stats.misses += 1;
                return None;
            }
        };
        if !valid {
            self.entries.remove(key);
            self.stats.expirations += 1;
            self.stats.misses += 1;
            return None;
        }
        self.stats.hits += 1;
        self.entries.get(key).map(|e| e.payload.clone())
    }

    pub fn set(&mut self, key: K, payload: V, ttl_ms: u64, now: MonotonicTimeNs) {
        if !self.entries.contains_key(&key) && self.entries.len() >= self.max_entries {
            self.cleanup_expired(now);
            while self.entries.len() >= self.max_entries {
                if !self.evict_oldest() {
                    break;
                }
            }
        }
        self.entries.insert(
            key,
            CacheEntry {
                payload,
                created_at: now,
                ttl_ms,
            },
        );
    }

    pub fn delete(&mut self, key: &K) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Removes every entry whose key matches `pred`.
    pub fn remove_where(&mut self, mut pred: impl FnMut(&K) -> bool) -> usize {
        let before = self.entries.len();
        self.entries.retain(|k, _| !pred(k));
        before - self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Drops every expired entry and returns how many went.
    pub fn cleanup_expired(&mut self, now: MonotonicTimeNs) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| e.is_valid(now));
        let removed = before - self.entries.len();
        self.stats.expirations += removed as u64;
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            ..self.stats
        }
    }

    fn evict_oldest(&mut self) -> bool {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, e)| e.created_at)
            .map(|(k, _)| k.clone());
        match oldest {
            Some(k) => {
                self.entries.remove(&k);
                self.stats.evictions += 1;
                true
            }
            None => false,
        }
    }
}
