//! Process-wide LRU-K(K=2) cache for per-blob column statistics (§5, §6.5).
//!
//! A `hashbrown`-backed hit/miss-counting cache: a plain map keyed by blob
//! name, each entry additionally tracking its two most recent accesses so
//! eviction can pick the one least-recently-used on a 2-hit horizon.

use hashbrown::HashMap;
use once_cell::sync::Lazy;
use opteryx_types::ColumnStatistics;
use parking_lot::Mutex;

type Tick = u64;

#[derive(Debug, Clone, Default)]
struct Entry {
    statistics: HashMap<String, ColumnStatistics>,
    /// The two most recent access ticks, most recent first.
    history: [Tick; 2],
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub inserts: u64,
}

/// An LRU-K(2) cache keyed by blob name. A candidate is evicted when the
/// distance from "now" to its second-most-recent access exceeds that of
/// every other candidate -- the entry whose second access is furthest in
/// the past.
pub struct StatisticsCache {
    max_entries: usize,
    clock: Tick,
    entries: HashMap<String, Entry>,
    stats: CacheStats,
}

impl StatisticsCache {
    pub fn new(max_entries: usize) -> Self {
        StatisticsCache {
            max_entries,
            clock: 0,
            entries: HashMap::new(),
            stats: CacheStats::default(),
        }
    }

    pub fn get(&mut self, blob_name: &str) -> Option<HashMap<String, ColumnStatistics>> {
        self.clock += 1;
        let tick = self.clock;
        match self.entries.get_mut(blob_name) {
            Some(entry) => {
                entry.history = [tick, entry.history[0]];
                self.stats.hits += 1;
                Some(entry.statistics.clone())
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    /// Insert or refresh `blob_name`'s statistics, evicting synchronously
    /// if the cache is now over capacity.
    pub fn insert(&mut self, blob_name: impl Into<String>, statistics: HashMap<String, ColumnStatistics>) {
        self.clock += 1;
        let tick = self.clock;
        self.stats.inserts += 1;
        self.entries.insert(blob_name.into(), Entry { statistics, history: [tick, 0] });
        if self.entries.len() > self.max_entries {
            self.evict_one();
        }
    }

    pub fn delete(&mut self, blob_name: &str) {
        self.entries.remove(blob_name);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    fn evict_one(&mut self) {
        if let Some(victim) = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.history[1])
            .map(|(name, _)| name.clone())
        {
            self.entries.remove(&victim);
            self.stats.evictions += 1;
        }
    }
}

impl Default for StatisticsCache {
    fn default() -> Self {
        Self::new(10_000)
    }
}

/// The process-wide cache instance: "readable and writable concurrently"
/// per §5, guarded by a single mutex around the LRU structure.
pub static GLOBAL: Lazy<Mutex<StatisticsCache>> = Lazy::new(|| Mutex::new(StatisticsCache::default()));

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> HashMap<String, ColumnStatistics> {
        let mut m = HashMap::new();
        m.insert(
            "c".to_string(),
            ColumnStatistics {
                lower_bound: Some(0),
                upper_bound: Some(100),
                null_count: Some(0),
                cardinality_estimate: Some(50),
            },
        );
        m
    }

    #[test]
    fn miss_then_hit() {
        let mut cache = StatisticsCache::new(10);
        assert!(cache.get("a").is_none());
        cache.insert("a", sample());
        assert!(cache.get("a").is_some());
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn evicts_when_over_capacity() {
        let mut cache = StatisticsCache::new(2);
        cache.insert("a", sample());
        cache.insert("b", sample());
        cache.insert("c", sample());
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn second_most_recent_access_protects_from_eviction() {
        let mut cache = StatisticsCache::new(2);
        cache.insert("a", sample());
        cache.insert("b", sample());
        // touch `a` twice so its second-most-recent access is now recent.
        cache.get("a");
        cache.get("a");
        cache.insert("c", sample());
        assert!(cache.get("a").is_some());
        assert!(cache.get("b").is_none());
    }
}
