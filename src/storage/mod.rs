//! Tile storage.
//!
//! Tiles are stored as opaque encoded blobs keyed by [`TileKey`]. Two stores
//! are provided: a size-bounded in-memory LRU and a filesystem store. The
//! [`TieredBlobStore`] puts the memory store in front of the file store.

mod file;
mod key;
mod memory;

pub use file::FileBlobStore;
pub use key::TileKey;
pub use memory::{MemoryBlobStore, DEFAULT_MEMORY_CAPACITY};

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::StorageError;

/// Storage backend for encoded tiles.
///
/// Implementations must be safe to share across tasks; the tile service and
/// every seed worker hold the same instance.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Fetch a tile, `None` when it is not stored.
    async fn get(&self, key: &TileKey) -> Result<Option<Bytes>, StorageError>;

    /// Store a tile, replacing any previous content.
    async fn put(&self, key: &TileKey, data: Bytes) -> Result<(), StorageError>;

    /// Remove a tile; returns whether it was present.
    async fn delete(&self, key: &TileKey) -> Result<bool, StorageError>;

    async fn exists(&self, key: &TileKey) -> Result<bool, StorageError>;
}

/// Memory store in front of a file store.
///
/// Reads that miss memory but hit disk are promoted into memory. Writes and
/// deletes go to both tiers.
pub struct TieredBlobStore {
    memory: MemoryBlobStore,
    file: FileBlobStore,
}

impl TieredBlobStore {
    pub fn new(memory: MemoryBlobStore, file: FileBlobStore) -> Self {
        Self { memory, file }
    }

    pub fn memory(&self) -> &MemoryBlobStore {
        &self.memory
    }

    pub fn file(&self) -> &FileBlobStore {
        &self.file
    }
}

#[async_trait]
impl BlobStore for TieredBlobStore {
    async fn get(&self, key: &TileKey) -> Result<Option<Bytes>, StorageError> {
        if let Some(data) = self.memory.get(key).await? {
            return Ok(Some(data));
        }
        match self.file.get(key).await? {
            Some(data) => {
                self.memory.put(key, data.clone()).await?;
                Ok(Some(data))
            }
            None => Ok(None),
        }
    }

    async fn put(&self, key: &TileKey, data: Bytes) -> Result<(), StorageError> {
        self.file.put(key, data.clone()).await?;
        self.memory.put(key, data).await
    }

    async fn delete(&self, key: &TileKey) -> Result<bool, StorageError> {
        let in_memory = self.memory.delete(key).await?;
        let on_disk = self.file.delete(key).await?;
        Ok(in_memory || on_disk)
    }

    async fn exists(&self, key: &TileKey) -> Result<bool, StorageError> {
        Ok(self.memory.exists(key).await? || self.file.exists(key).await?)
    }
}
