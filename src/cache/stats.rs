//! Cache Statistics Module
//!
//! Tracks cache activity: hits, misses, evictions, refreshes and rejected puts.

use serde::Serialize;

// == Cache Stats ==
/// Counters for one cache engine, plus a snapshot of its current contents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Number of reads that returned a value
    pub hits: u64,
    /// Number of reads that returned nothing
    pub misses: u64,
    /// Number of entries removed by pruning or stale-entry eviction
    pub evictions: u64,
    /// Number of entries successfully refreshed
    pub refreshes: u64,
    /// Number of puts that could not be stored
    pub rejected: u64,
    /// Current number of stored entries
    pub total_entries: usize,
    /// Current accounted size in bytes (encoded keys plus payloads)
    pub total_size: u64,
}

impl CacheStats {
    // == Constructor ==
    /// Creates a new CacheStats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Calculates the cache hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no reads have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_evictions(&mut self, count: usize) {
        self.evictions += count as u64;
    }

    pub fn record_refresh(&mut self) {
        self.refreshes += 1;
    }

    pub fn record_rejected(&mut self) {
        self.rejected += 1;
    }

    // == Snapshot ==
    /// Fills in the current contents.
    pub fn with_contents(mut self, total_entries: usize, total_size: u64) -> Self {
        self.total_entries = total_entries;
        self.total_size = total_size;
        self
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_new() {
        let stats = CacheStats::new();
        assert_eq!(stats, CacheStats::default());
        assert_eq!(stats.total_entries, 0);
    }

    #[test]
    fn test_hit_rate_no_requests() {
        assert_eq!(CacheStats::new().hit_rate(), 0.0);
    }

    #[test]
    fn test_hit_rate_mixed() {
        let mut stats = CacheStats::new();
        stats.record_hit();
        stats.record_hit();
        stats.record_hit();
        stats.record_miss();
        assert_eq!(stats.hit_rate(), 0.75);
    }

    #[test]
    fn test_counters() {
        let mut stats = CacheStats::new();
        stats.record_evictions(2);
        stats.record_evictions(1);
        stats.record_refresh();
        stats.record_rejected();
        assert_eq!(stats.evictions, 3);
        assert_eq!(stats.refreshes, 1);
        assert_eq!(stats.rejected, 1);
    }

    #[test]
    fn test_with_contents_and_serialize() {
        let stats = CacheStats::new().with_contents(4, 160);
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["total_entries"], 4);
        assert_eq!(json["total_size"], 160);
    }
}
