// SPDX-License-Identifier: MPL-2.0
//! In-memory media cache backing the viewer's auto-load policy.
//!
//! Fetched media bytes are kept in an LRU cache keyed by url. The cache is
//! memory-bounded: eviction runs until a new entry fits, and entries larger
//! than half the configured limit are never cached at all.
//!
//! The viewer consults [`crate::viewer::ImageCache::exists`] when deciding
//! whether an image is free to show regardless of the network policy.

use crate::viewer::ImageCache;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Default cache size in bytes (32 MB).
pub const DEFAULT_CACHE_BYTES: usize = 32 * 1024 * 1024;

/// Minimum cache size in bytes (8 MB).
pub const MIN_CACHE_BYTES: usize = 8 * 1024 * 1024;

/// Maximum cache size in bytes (128 MB).
pub const MAX_CACHE_BYTES: usize = 128 * 1024 * 1024;

/// Default maximum number of entries.
pub const DEFAULT_MAX_ENTRIES: usize = 64;

/// Minimum entries to keep room for.
pub const MIN_MAX_ENTRIES: usize = 4;

/// Maximum entries.
pub const MAX_MAX_ENTRIES: usize = 256;

/// Configuration for the media cache.
#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    /// Maximum cache size in bytes.
    pub max_bytes: usize,

    /// Maximum number of entries.
    pub max_entries: usize,

    /// Whether caching is enabled.
    pub enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_CACHE_BYTES,
            max_entries: DEFAULT_MAX_ENTRIES,
            enabled: true,
        }
    }
}

impl CacheConfig {
    /// Creates a configuration with the given limits, clamped into their
    /// supported ranges.
    #[must_use]
    pub fn new(max_bytes: usize, max_entries: usize) -> Self {
        Self {
            max_bytes: max_bytes.clamp(MIN_CACHE_BYTES, MAX_CACHE_BYTES),
            max_entries: max_entries.clamp(MIN_MAX_ENTRIES, MAX_MAX_ENTRIES),
            enabled: true,
        }
    }

    /// Creates a disabled configuration.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    bytes: Arc<Vec<u8>>,
}

impl CacheEntry {
    fn size(&self) -> usize {
        self.bytes.len()
    }
}

/// Statistics about cache performance.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    /// Number of entries currently cached.
    pub entry_count: usize,

    /// Total bytes currently used.
    pub total_bytes: usize,

    /// Number of cache hits.
    pub hits: u64,

    /// Number of cache misses.
    pub misses: u64,

    /// Number of entries evicted due to limits.
    pub evictions: u64,

    /// Number of entries inserted.
    pub insertions: u64,
}

impl CacheStats {
    /// Returns the cache hit rate as a percentage (0.0 - 100.0).
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

/// LRU cache of fetched media bytes, keyed by url.
pub struct MediaCache {
    cache: LruCache<String, CacheEntry>,
    config: CacheConfig,
    current_bytes: usize,
    stats: CacheStats,
}

impl MediaCache {
    /// Creates a cache with the given configuration.
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        let capacity = NonZeroUsize::new(config.max_entries)
            .unwrap_or(NonZeroUsize::new(DEFAULT_MAX_ENTRIES).expect("default capacity non-zero"));

        Self {
            cache: LruCache::new(capacity),
            config,
            current_bytes: 0,
            stats: CacheStats::default(),
        }
    }

    /// Creates a cache with default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(CacheConfig::default())
    }

    /// Inserts media bytes for `url`.
    ///
    /// Returns `true` if inserted, `false` when caching is disabled or the
    /// entry is too large to ever fit.
    pub fn insert(&mut self, url: impl Into<String>, bytes: Vec<u8>) -> bool {
        if !self.config.enabled {
            return false;
        }

        let entry = CacheEntry {
            bytes: Arc::new(bytes),
        };
        let entry_size = entry.size();

        // Never let one entry dominate the cache.
        if entry_size > self.config.max_bytes / 2 {
            return false;
        }

        while self.current_bytes + entry_size > self.config.max_bytes && !self.cache.is_empty() {
            if let Some((_, evicted)) = self.cache.pop_lru() {
                self.current_bytes = self.current_bytes.saturating_sub(evicted.size());
                self.stats.evictions += 1;
            }
        }

        let url = url.into();
        if let Some(existing) = self.cache.pop(&url) {
            self.current_bytes = self.current_bytes.saturating_sub(existing.size());
        }

        self.current_bytes += entry_size;
        self.cache.put(url, entry);
        self.stats.insertions += 1;
        self.stats.entry_count = self.cache.len();
        self.stats.total_bytes = self.current_bytes;

        true
    }

    /// Gets the bytes for `url`, updating LRU order on a hit.
    pub fn get(&mut self, url: &str) -> Option<Arc<Vec<u8>>> {
        if !self.config.enabled {
            return None;
        }

        if let Some(entry) = self.cache.get(url) {
            self.stats.hits += 1;
            Some(Arc::clone(&entry.bytes))
        } else {
            self.stats.misses += 1;
            None
        }
    }

    /// Checks for `url` without updating LRU order.
    #[must_use]
    pub fn contains(&self, url: &str) -> bool {
        if !self.config.enabled {
            return false;
        }
        self.cache.contains(url)
    }

    /// Clears all cached entries.
    pub fn clear(&mut self) {
        self.cache.clear();
        self.current_bytes = 0;
        self.stats.entry_count = 0;
        self.stats.total_bytes = 0;
    }

    /// Returns the current cache statistics.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Returns the current memory usage in bytes.
    #[must_use]
    pub fn memory_usage(&self) -> usize {
        self.current_bytes
    }

    #[must_use]
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }
}

impl ImageCache for MediaCache {
    fn exists(&self, url: &str) -> bool {
        self.contains(url)
    }
}

impl std::fmt::Debug for MediaCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaCache")
            .field("enabled", &self.config.enabled)
            .field("entry_count", &self.cache.len())
            .field("memory_usage", &self.current_bytes)
            .field("max_bytes", &self.config.max_bytes)
            .field("max_entries", &self.config.max_entries)
            .field("stats", &self.stats)
            .finish()
    }
}
