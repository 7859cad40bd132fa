/// Point-in-time copy of a cache's counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheMetricsSnapshot {
    pub get_calls: u64,
    pub get_hits: u64,
    pub get_misses: u64,

    pub computations: u64,
    pub failures: u64,

    pub set_calls: u64,
    pub remove_calls: u64,
    pub clear_calls: u64,

    pub prefetches: u64,

    // gauge captured at snapshot time
    pub entries: usize,
}

impl CacheMetricsSnapshot {
    /// Fraction of lookups served from an existing entry, or `0.0` with no lookups.
    pub fn hit_rate(&self) -> f64 {
        if self.get_calls == 0 {
            0.0
        } else {
            self.get_hits as f64 / self.get_calls as f64
        }
    }
}
