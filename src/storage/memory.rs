//! In-memory tile store.
//!
//! An LRU map of encoded tiles bounded by total byte size. Used on its own
//! when no cache directory is configured, and as the hot tier in front of the
//! file store otherwise.
//!
//! # Size-Based Eviction
//!
//! The store tracks the total size of cached tiles in bytes and evicts
//! least-recently-used entries when the capacity is exceeded.

use std::num::NonZeroUsize;

use async_trait::async_trait;
use bytes::Bytes;
use lru::LruCache;
use tokio::sync::RwLock;

use crate::error::StorageError;

use super::key::TileKey;
use super::BlobStore;

/// Default capacity: 100MB
pub const DEFAULT_MEMORY_CAPACITY: usize = 100 * 1024 * 1024;

/// Default maximum number of entries (to bound LRU overhead)
const DEFAULT_MAX_ENTRIES: usize = 10_000;

/// LRU store for encoded tiles with size-based capacity.
///
/// # Thread Safety
///
/// The store can be shared across async tasks via `Arc`.
pub struct MemoryBlobStore {
    /// The underlying LRU cache
    cache: RwLock<LruCache<TileKey, Bytes>>,

    /// Maximum total size in bytes
    max_size: usize,

    /// Current total size in bytes
    current_size: RwLock<usize>,
}

impl MemoryBlobStore {
    /// Create a store with the default capacity (100MB).
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MEMORY_CAPACITY)
    }

    /// Create a store holding at most `max_size` bytes.
    pub fn with_capacity(max_size: usize) -> Self {
        Self::with_capacity_and_entries(max_size, DEFAULT_MAX_ENTRIES)
    }

    /// Create a store with a byte capacity and an entry limit.
    pub fn with_capacity_and_entries(max_size: usize, max_entries: usize) -> Self {
        let entries = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: RwLock::new(LruCache::new(entries)),
            max_size,
            current_size: RwLock::new(0),
        }
    }

    /// Remove every entry belonging to `layer`.
    pub async fn clear_layer(&self, layer: &str) -> usize {
        let mut cache = self.cache.write().await;
        let mut current_size = self.current_size.write().await;

        let doomed: Vec<TileKey> = cache
            .iter()
            .filter(|(key, _)| &*key.layer == layer)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &doomed {
            if let Some(data) = cache.pop(key) {
                *current_size = current_size.saturating_sub(data.len());
            }
        }
        doomed.len()
    }

    /// Clear all entries.
    pub async fn clear(&self) {
        let mut cache = self.cache.write().await;
        let mut current_size = self.current_size.write().await;
        cache.clear();
        *current_size = 0;
    }

    /// Number of cached tiles.
    pub async fn len(&self) -> usize {
        self.cache.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.cache.read().await.is_empty()
    }

    /// Current total size of cached tiles in bytes.
    pub async fn size(&self) -> usize {
        *self.current_size.read().await
    }

    /// Maximum capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.max_size
    }
}

impl Default for MemoryBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    /// Marks the entry as recently used.
    async fn get(&self, key: &TileKey) -> Result<Option<Bytes>, StorageError> {
        let mut cache = self.cache.write().await;
        Ok(cache.get(key).cloned())
    }

    /// Evicts least-recently-used entries until the store is within capacity.
    async fn put(&self, key: &TileKey, data: Bytes) -> Result<(), StorageError> {
        let data_size = data.len();
        let mut cache = self.cache.write().await;
        let mut current_size = self.current_size.write().await;

        // Replacing an entry releases its old size first
        if let Some(old_data) = cache.peek(key) {
            *current_size = current_size.saturating_sub(old_data.len());
        }

        // push hands back either the replaced entry or one dropped by the entry limit
        if let Some((evicted_key, evicted)) = cache.push(key.clone(), data) {
            if evicted_key != *key {
                *current_size = current_size.saturating_sub(evicted.len());
            }
        }
        *current_size += data_size;

        while *current_size > self.max_size {
            match cache.pop_lru() {
                Some((_, evicted)) => {
                    *current_size = current_size.saturating_sub(evicted.len());
                }
                None => break,
            }
        }
        Ok(())
    }

    async fn delete(&self, key: &TileKey) -> Result<bool, StorageError> {
        let mut cache = self.cache.write().await;
        let mut current_size = self.current_size.write().await;

        match cache.pop(key) {
            Some(data) => {
                *current_size = current_size.saturating_sub(data.len());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Does not update the LRU order.
    async fn exists(&self, key: &TileKey) -> Result<bool, StorageError> {
        Ok(self.cache.read().await.contains(key))
    }
}

// =============================================================================
// Tests
// =============================================================================
