//! Visibility-driven tile cache.
//!
//! This cache stores rendered tiles and bounds resident memory, but its
//! eviction policy is not LRU: residency is decided purely by the current
//! RequiredSet. [`TileCache::retain`] declares which keys are required right
//! now; every resident key outside that set is eviction-eligible
//! immediately, even if it was inserted a moment ago. A zoom jump that
//! replaces the whole retained set therefore drops the entire previous
//! level in one `retain` / `evict_ineligible` pair.
//!
//! Since total image data can vastly exceed device memory, this trades
//! re-render cost for a hard residency bound: visible tiles (plus the
//! prefetch ring), and nothing else, survive a reconciliation.
//!
//! # Capacity
//!
//! Two independent bounds, either of which may be unlimited: a byte budget
//! and a tile count. [`TileCache::put`] evicts eligible tiles oldest-first
//! until the insert fits; if the retained set alone would still exceed a
//! bound, the insert fails with [`CacheError`] and the caller runs the
//! allocation-recovery path.
//!
//! # Thread Safety
//!
//! Internally synchronized: renders complete from worker-fed tasks while
//! retain/evict runs on the control path.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::error::CacheError;
use crate::pyramid::TileKey;

use super::Tile;

/// Default cache byte budget: 64MB
pub const DEFAULT_CACHE_BYTE_BUDGET: usize = 64 * 1024 * 1024;

// =============================================================================
// Inner state
// =============================================================================

struct CacheEntry {
    tile: Arc<Tile>,
    /// Insertion sequence number, for oldest-first eviction among eligible.
    seq: u64,
}

#[derive(Default)]
struct CacheInner {
    tiles: HashMap<TileKey, CacheEntry>,
    retained: HashSet<TileKey>,
    resident_bytes: usize,
    next_seq: u64,
}

impl CacheInner {
    fn remove(&mut self, key: TileKey) -> Option<Arc<Tile>> {
        self.tiles.remove(&key).map(|entry| {
            self.resident_bytes = self.resident_bytes.saturating_sub(entry.tile.byte_size());
            entry.tile
        })
    }

    /// Evict the oldest eviction-eligible tile. Returns false if every
    /// resident tile is retained.
    fn evict_one_eligible(&mut self) -> bool {
        let victim = self
            .tiles
            .iter()
            .filter(|(key, _)| !self.retained.contains(*key))
            .min_by_key(|(_, entry)| entry.seq)
            .map(|(key, _)| *key);
        match victim {
            Some(key) => {
                self.remove(key);
                true
            }
            None => false,
        }
    }
}

// =============================================================================
// TileCache
// =============================================================================

/// Bounded store mapping [`TileKey`] to rendered tiles.
///
/// See the module docs for the eviction policy. Shared across tasks via
/// `&self`; all methods are internally synchronized.
pub struct TileCache {
    inner: RwLock<CacheInner>,
    max_bytes: usize,
    max_tiles: usize,
}

impl TileCache {
    /// Create a cache with the default byte budget and no tile count limit.
    pub fn new() -> Self {
        Self::with_budget(DEFAULT_CACHE_BYTE_BUDGET, 0)
    }

    /// Create a cache with explicit bounds. Zero means unlimited for either.
    pub fn with_budget(max_bytes: usize, max_tiles: usize) -> Self {
        Self {
            inner: RwLock::new(CacheInner::default()),
            max_bytes: if max_bytes == 0 { usize::MAX } else { max_bytes },
            max_tiles: if max_tiles == 0 { usize::MAX } else { max_tiles },
        }
    }

    /// Look up a tile. O(1); never affects eviction order.
    pub async fn get(&self, key: TileKey) -> Option<Arc<Tile>> {
        self.inner.read().await.tiles.get(&key).map(|e| e.tile.clone())
    }

    /// Whether a tile is resident.
    pub async fn contains(&self, key: TileKey) -> bool {
        self.inner.read().await.tiles.contains_key(&key)
    }

    /// Insert or replace a tile, evicting eligible tiles first if the cache
    /// is at capacity.
    ///
    /// # Errors
    ///
    /// [`CacheError`] if the insert cannot fit even with every eligible tile
    /// evicted, i.e. the retained set alone exceeds a bound. The tile is not
    /// inserted in that case.
    pub async fn put(&self, key: TileKey, tile: Arc<Tile>) -> Result<(), CacheError> {
        let size = tile.byte_size();
        let mut inner = self.inner.write().await;

        // Replacing: old entry's bytes no longer count.
        inner.remove(key);

        while inner.resident_bytes.saturating_add(size) > self.max_bytes
            || inner.tiles.len() + 1 > self.max_tiles
        {
            if !inner.evict_one_eligible() {
                break;
            }
        }

        if inner.resident_bytes.saturating_add(size) > self.max_bytes {
            return Err(CacheError::BudgetExceeded {
                needed: inner.resident_bytes.saturating_add(size),
                budget: self.max_bytes,
            });
        }
        if inner.tiles.len() + 1 > self.max_tiles {
            return Err(CacheError::TileLimitExceeded {
                needed: inner.tiles.len() + 1,
                max_tiles: self.max_tiles,
            });
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.resident_bytes += size;
        inner.tiles.insert(key, CacheEntry { tile, seq });
        Ok(())
    }

    /// Declare `keys` as the currently required set.
    ///
    /// Every resident key outside `keys` becomes eviction-eligible
    /// immediately; nothing is freed until [`TileCache::evict_ineligible`]
    /// or an over-capacity [`TileCache::put`].
    pub async fn retain(&self, keys: &HashSet<TileKey>) {
        self.inner.write().await.retained = keys.clone();
    }

    /// Free every eviction-eligible tile. Returns the number evicted.
    pub async fn evict_ineligible(&self) -> usize {
        let mut inner = self.inner.write().await;
        let victims: Vec<TileKey> = inner
            .tiles
            .keys()
            .filter(|key| !inner.retained.contains(*key))
            .copied()
            .collect();
        for key in &victims {
            inner.remove(*key);
        }
        victims.len()
    }

    /// Drop everything, including retained tiles.
    pub async fn clear(&self) {
        let mut inner = self.inner.write().await;
        inner.tiles.clear();
        inner.resident_bytes = 0;
    }

    /// Number of resident tiles.
    pub async fn len(&self) -> usize {
        self.inner.read().await.tiles.len()
    }

    /// Whether the cache is empty.
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.tiles.is_empty()
    }

    /// Total bytes of resident pixel data.
    pub async fn resident_bytes(&self) -> usize {
        self.inner.read().await.resident_bytes
    }

    /// Keys of all resident tiles, in no particular order.
    pub async fn resident_keys(&self) -> Vec<TileKey> {
        self.inner.read().await.tiles.keys().copied().collect()
    }

    /// The configured byte budget.
    pub fn byte_budget(&self) -> usize {
        self.max_bytes
    }

    /// The configured tile count limit.
    pub fn tile_limit(&self) -> usize {
        self.max_tiles
    }
}

impl Default for TileCache {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
