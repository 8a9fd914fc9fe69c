//! GlyphCache: bounded LRU cache over a record directory

use std::path::Path;

use glyphstore::{DirStorage, EntryStore, Error, Key, Result, Storage};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::CacheConfig;
use crate::recency::{InvariantError, RecencyIndex};
use crate::stats::CacheStats;

/// Everything one cache operation touches, serialized behind one lock
struct Inner<S> {
    entries: EntryStore<S>,
    index: RecencyIndex<S>,
    /// Number of real keys in the ring
    size: usize,
}

/// Persistent glyph cache with least-recently-used eviction
///
/// Payloads and recency order both live in storage. The ring's multi-record
/// updates are not atomic, so every operation runs under one mutex.
pub struct GlyphCache<S: Storage> {
    inner: Mutex<Inner<S>>,

    /// Cache statistics
    stats: CacheStats,

    /// Maximum number of real entries
    capacity: usize,
}

impl GlyphCache<DirStorage> {
    /// Open a cache in the given directory
    ///
    /// # Arguments
    /// * `path` - Cache directory path, created if missing
    /// * `config` - Capacity and start-up policy
    ///
    /// # Returns
    /// * `Result<GlyphCache<DirStorage>>` - Cache handle
    pub fn open<P: AsRef<Path>>(path: P, config: CacheConfig) -> Result<Self> {
        Self::new(DirStorage::open(path)?, config)
    }
}

impl<S: Storage + Clone> GlyphCache<S> {
    /// Create a cache over any storage backend
    ///
    /// A cold start wipes every record in the directory. A warm start keeps
    /// them and recovers the entry count by walking the ring; a ring that
    /// does not close is reported as `Corrupt`.
    pub fn new(storage: S, config: CacheConfig) -> Result<Self> {
        config.validate()?;

        let entries = EntryStore::new(storage.clone());
        let index = RecencyIndex::new(storage);
        index.init()?;

        let mut inner = Inner {
            entries,
            index,
            size: 0,
        };

        if config.cold_start {
            Self::wipe(&mut inner)?;
            info!(capacity = config.capacity, "glyph cache opened cold");
        } else {
            inner.size = inner.index.walk()?.len();
            info!(
                capacity = config.capacity,
                size = inner.size,
                "glyph cache recovered"
            );
        }

        let cache = Self {
            inner: Mutex::new(inner),
            stats: CacheStats::new(),
            capacity: config.capacity,
        };

        // A warm start under a smaller capacity may begin over the bound
        cache.reconcile()?;
        Ok(cache)
    }
}

impl<S: Storage> GlyphCache<S> {
    /// Store a payload as the most recently used entry
    ///
    /// Putting a key that is already cached overwrites its payload and
    /// promotes it. Afterwards the least recently used entries are evicted
    /// until the size is within capacity.
    ///
    /// # Returns
    /// * `Result<usize>` - Number of cached entries after the call
    pub fn put(&self, key: Key, payload: &[u8]) -> Result<usize> {
        if key.is_sentinel() {
            return Err(Error::ReservedKey(key.get()));
        }

        let mut inner = self.inner.lock();
        if let Err(e) = inner.entries.write(key, payload) {
            // A partial payload is worse than none: reads treat absence as a miss
            let _ = inner.entries.delete(key);
            return Err(e);
        }

        let linked = match inner.index.contains(key) {
            Ok(linked) => linked,
            Err(e) => {
                let _ = inner.entries.delete(key);
                return Err(e);
            }
        };

        if linked {
            inner.index.promote_most_recent(key)?;
            self.stats.record_update();
        } else {
            if let Err(e) = inner.index.insert_most_recent(key) {
                // Don't leave a payload the ring knows nothing about
                let _ = inner.entries.delete(key);
                return Err(e);
            }
            inner.size += 1;
            self.stats.record_insert();
        }

        self.evict_excess(&mut inner)?;
        Ok(inner.size)
    }

    /// Read a cached payload and mark it most recently used
    ///
    /// A miss returns `NotFound` without touching the ring.
    pub fn get(&self, key: Key) -> Result<Vec<u8>> {
        let inner = self.inner.lock();
        let payload = match inner.entries.read(key) {
            Ok(payload) => payload,
            Err(e) => return Err(self.miss(e)),
        };

        inner.index.promote_most_recent(key)?;
        self.stats.record_hit();
        Ok(payload)
    }

    /// Open a cached payload for incremental reads and mark it most recently used
    pub fn open_entry(&self, key: Key) -> Result<S::Record> {
        let inner = self.inner.lock();
        let record = match inner.entries.open(key) {
            Ok(record) => record,
            Err(e) => return Err(self.miss(e)),
        };

        inner.index.promote_most_recent(key)?;
        self.stats.record_hit();
        Ok(record)
    }

    /// Delete every entry and start from an empty ring
    pub fn reset(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        Self::wipe(&mut inner)?;
        self.stats.reset();
        info!("glyph cache reset");
        Ok(())
    }

    /// Retry eviction left unfinished by an earlier failure
    ///
    /// # Returns
    /// * `Result<usize>` - Number of cached entries after the call
    pub fn reconcile(&self) -> Result<usize> {
        let mut inner = self.inner.lock();
        self.evict_excess(&mut inner)?;
        Ok(inner.size)
    }

    /// Check whether a key is cached, without promoting it
    pub fn contains(&self, key: Key) -> Result<bool> {
        if key.is_sentinel() {
            return Ok(false);
        }
        self.inner.lock().index.contains(key)
    }

    /// Cached keys from most to least recently used
    pub fn keys(&self) -> Result<Vec<Key>> {
        self.inner.lock().index.walk()
    }

    /// Verify the ring and that the entry count agrees with it
    pub fn check_invariants(&self) -> std::result::Result<(), InvariantError> {
        let inner = self.inner.lock();
        inner.index.check_invariants()?;

        let linked = inner.index.walk()?.len();
        if linked != inner.size {
            return Err(InvariantError::new(format!(
                "size is {} but the ring holds {} keys",
                inner.size, linked
            )));
        }
        Ok(())
    }

    /// Get current number of cached entries
    pub fn len(&self) -> usize {
        self.inner.lock().size
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get cache capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get cache statistics
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    fn miss(&self, err: Error) -> Error {
        if err.is_not_found() {
            self.stats.record_miss();
        }
        err
    }

    fn evict_excess(&self, inner: &mut Inner<S>) -> Result<()> {
        while inner.size > self.capacity {
            let victim = match inner.index.evict_oldest() {
                Ok(victim) => victim,
                Err(e) => {
                    warn!(size = inner.size, capacity = self.capacity, error = %e, "eviction failed");
                    return Err(e);
                }
            };
            inner.size -= 1;
            self.stats.record_eviction();

            match inner.entries.delete(victim) {
                Ok(()) | Err(Error::NotFound) => {}
                Err(e) => {
                    warn!(key = %victim, error = %e, "evicted payload could not be deleted");
                    return Err(e);
                }
            }
            debug!(key = %victim, size = inner.size, "evicted least recently used glyph");
        }
        Ok(())
    }

    fn wipe(inner: &mut Inner<S>) -> Result<()> {
        for key in inner.entries.enumerate()? {
            match inner.entries.delete(key) {
                Ok(()) | Err(Error::NotFound) => {}
                Err(e) => return Err(e),
            }
        }
        inner.index.clear()?;
        inner.size = 0;
        Ok(())
    }
}
