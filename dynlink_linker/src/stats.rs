//! Linker statistics.
//!
//! Tracks linking, relinking and conversion activity for monitoring and
//! tuning of the relink threshold and chain length.

use std::sync::atomic::{AtomicU64, Ordering};

/// Statistics about linking activity.
#[derive(Debug, Default)]
pub struct LinkerStats {
    // =========================================================================
    // Call Sites
    // =========================================================================
    /// Targets installed into call sites, first links included.
    pub links: AtomicU64,
    /// Installations that replaced an earlier target.
    pub relinks: AtomicU64,
    /// Call sites that went megamorphic.
    pub resets: AtomicU64,
    /// Calls dispatched through a reset call site.
    pub megamorphic_dispatches: AtomicU64,
    /// Link attempts that produced no target.
    pub link_failures: AtomicU64,

    // =========================================================================
    // Conversions
    // =========================================================================
    /// Converter lookups served from the cache.
    pub converter_cache_hits: AtomicU64,
    /// Converter lookups that had to build a converter.
    pub converter_cache_misses: AtomicU64,
    /// Cache entries dropped after their types or converter were reclaimed.
    pub converter_evictions: AtomicU64,
}

/// Point-in-time copy of [`LinkerStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub links: u64,
    pub relinks: u64,
    pub resets: u64,
    pub megamorphic_dispatches: u64,
    pub link_failures: u64,
    pub converter_cache_hits: u64,
    pub converter_cache_misses: u64,
    pub converter_evictions: u64,
}

impl LinkerStats {
    /// Create new empty statistics.
    pub const fn new() -> Self {
        Self {
            links: AtomicU64::new(0),
            relinks: AtomicU64::new(0),
            resets: AtomicU64::new(0),
            megamorphic_dispatches: AtomicU64::new(0),
            link_failures: AtomicU64::new(0),
            converter_cache_hits: AtomicU64::new(0),
            converter_cache_misses: AtomicU64::new(0),
            converter_evictions: AtomicU64::new(0),
        }
    }

    /// Record a target installation.
    #[inline]
    pub fn record_link(&self, relink: bool) {
        self.links.fetch_add(1, Ordering::Relaxed);
        if relink {
            self.relinks.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn record_reset(&self) {
        self.resets.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_megamorphic_dispatch(&self) {
        self.megamorphic_dispatches.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_link_failure(&self) {
        self.link_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_converter_lookup(&self, hit: bool) {
        if hit {
            self.converter_cache_hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.converter_cache_misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn record_converter_evictions(&self, count: usize) {
        self.converter_evictions
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Get converter cache hit rate as a percentage (0.0-100.0).
    pub fn converter_hit_rate(&self) -> f64 {
        let hits = self.converter_cache_hits.load(Ordering::Relaxed);
        let total = hits + self.converter_cache_misses.load(Ordering::Relaxed);
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64 * 100.0
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            links: self.links.load(Ordering::Relaxed),
            relinks: self.relinks.load(Ordering::Relaxed),
            resets: self.resets.load(Ordering::Relaxed),
            megamorphic_dispatches: self.megamorphic_dispatches.load(Ordering::Relaxed),
            link_failures: self.link_failures.load(Ordering::Relaxed),
            converter_cache_hits: self.converter_cache_hits.load(Ordering::Relaxed),
            converter_cache_misses: self.converter_cache_misses.load(Ordering::Relaxed),
            converter_evictions: self.converter_evictions.load(Ordering::Relaxed),
        }
    }
}
