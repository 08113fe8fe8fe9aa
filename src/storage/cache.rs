//! Cache of encoded tiles read out of slabs.
//!
//! Repeated requests over the same area read the same tiles; caching the
//! stored bytes spares a slab index read and a range read per tile. Entries
//! are keyed by slab key and tile index, so every level sharing a storage
//! context can share one cache.
//!
//! The cache tracks the total size of cached tiles in bytes and evicts
//! least-recently-used entries when the capacity is exceeded.

use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;

use bytes::Bytes;
use lru::LruCache;
use tokio::sync::RwLock;

/// Default cache capacity: 64MB
pub const DEFAULT_TILE_CACHE_CAPACITY: usize = 64 * 1024 * 1024;

/// Default maximum number of entries (to bound LRU overhead)
const DEFAULT_MAX_ENTRIES: usize = 16_384;

/// Identifies one stored tile.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TileCacheKey {
    /// Slab identifier (path or `s3://bucket/key`)
    pub slab: Arc<str>,

    /// Tile index within the slab
    pub index: u32,
}

impl TileCacheKey {
    pub fn new(slab: impl Into<Arc<str>>, index: u32) -> Self {
        Self {
            slab: slab.into(),
            index,
        }
    }
}

struct CacheState {
    entries: LruCache<TileCacheKey, Bytes>,
    size: usize,
}

/// Size-bounded LRU cache of encoded tiles.
///
/// Thread-safe; share it across levels and tasks via `Arc`.
pub struct TileCache {
    state: RwLock<CacheState>,
    max_size: usize,
}

impl TileCache {
    /// Create a tile cache with default capacity (64MB).
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_TILE_CACHE_CAPACITY)
    }

    /// Create a tile cache holding at most `max_size` bytes.
    pub fn with_capacity(max_size: usize) -> Self {
        Self::with_capacity_and_entries(max_size, DEFAULT_MAX_ENTRIES)
    }

    /// Create a tile cache bounded both in bytes and in entry count.
    pub fn with_capacity_and_entries(max_size: usize, max_entries: usize) -> Self {
        let entries = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            state: RwLock::new(CacheState {
                entries: LruCache::new(entries),
                size: 0,
            }),
            max_size,
        }
    }

    /// Get a tile, marking it as recently used.
    pub async fn get(&self, key: &TileCacheKey) -> Option<Bytes> {
        let mut state = self.state.write().await;
        state.entries.get(key).cloned()
    }

    /// Check presence without updating LRU order.
    pub async fn contains(&self, key: &TileCacheKey) -> bool {
        self.state.read().await.entries.contains(key)
    }

    /// Store a tile, evicting least-recently-used entries beyond capacity.
    ///
    /// Tiles larger than the whole capacity are not stored.
    pub async fn put(&self, key: TileCacheKey, data: Bytes) {
        if data.len() > self.max_size {
            return;
        }

        let mut guard = self.state.write().await;
        let state = &mut *guard;
        let added = data.len();

        // Returns either the replaced value or the entry evicted by the entry bound
        if let Some((_, old)) = state.entries.push(key, data) {
            state.size = state.size.saturating_sub(old.len());
        }
        state.size += added;

        while state.size > self.max_size {
            match state.entries.pop_lru() {
                Some((_, evicted)) => state.size = state.size.saturating_sub(evicted.len()),
                None => break,
            }
        }
    }

    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        state.entries.clear();
        state.size = 0;
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.entries.is_empty()
    }

    /// Total size of cached tiles in bytes.
    pub async fn size(&self) -> usize {
        self.state.read().await.size
    }

    /// Maximum capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.max_size
    }
}

impl fmt::Debug for TileCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TileCache")
            .field("max_size", &self.max_size)
            .finish_non_exhaustive()
    }
}

impl Default for TileCache {
    fn default() -> Self {
        Self::new()
    }
}
