//! Per-site counters.
//!
//! Counters are relaxed atomics: they are diagnostics, never used to make
//! caching decisions.

use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters of one attribute-read site.
#[derive(Debug, Default)]
pub struct SiteStats {
    reads: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    specializations: AtomicU64,
    generalizations: AtomicU64,
    prunes: AtomicU64,
    generic_reads: AtomicU64,
}

impl SiteStats {
    /// Create zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn record_read(&self) {
        self.reads.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_specialization(&self) {
        self.specializations.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_generalization(&self) {
        self.generalizations.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_prune(&self) {
        self.prunes.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_generic_read(&self) {
        self.generic_reads.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy the current counter values.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            reads: self.reads.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            specializations: self.specializations.load(Ordering::Relaxed),
            generalizations: self.generalizations.load(Ordering::Relaxed),
            prunes: self.prunes.load(Ordering::Relaxed),
            generic_reads: self.generic_reads.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of `SiteStats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Reads that reached a receiver with attribute storage.
    pub reads: u64,
    /// Reads answered by a cached node.
    pub hits: u64,
    /// Guard misses (a read can miss several nodes).
    pub misses: u64,
    /// Cached nodes installed.
    pub specializations: u64,
    /// Times the chain tail was replaced by Generic.
    pub generalizations: u64,
    /// Stale cached nodes unlinked.
    pub prunes: u64,
    /// Reads answered by a full resolution.
    pub generic_reads: u64,
}

impl StatsSnapshot {
    /// Get hit rate as a percentage (0.0-100.0).
    #[inline]
    pub fn hit_rate(&self) -> f32 {
        if self.reads == 0 {
            0.0
        } else {
            (self.hits as f32 / self.reads as f32) * 100.0
        }
    }

    /// Sum two snapshots.
    pub fn merge(self, other: StatsSnapshot) -> StatsSnapshot {
        StatsSnapshot {
            reads: self.reads + other.reads,
            hits: self.hits + other.hits,
            misses: self.misses + other.misses,
            specializations: self.specializations + other.specializations,
            generalizations: self.generalizations + other.generalizations,
            prunes: self.prunes + other.prunes,
            generic_reads: self.generic_reads + other.generic_reads,
        }
    }
}
