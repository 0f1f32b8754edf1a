//! Filesystem tile store.
//!
//! Tiles are laid out under the cache directory as
//!
//! ```text
//! <root>/<layer>/<gridset>_<zz>[_<params>]/<x / n>_<y / n>/<x>_<y>.<ext>
//! ```
//!
//! where `n = 2^(z/2 + 1)` groups neighbouring tiles in one directory so that
//! no directory grows past a few thousand entries. Coordinates are zero padded
//! to a width derived from `n`. Names are sanitised to a portable character set.
//!
//! Writes go to a temporary file renamed into place, so a concurrent reader
//! never observes a partially written tile.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use crate::error::StorageError;

use super::key::TileKey;
use super::BlobStore;

/// Tile store rooted at a cache directory.
pub struct FileBlobStore {
    root: PathBuf,
    temp_counter: AtomicU64,
}

impl FileBlobStore {
    /// Create the cache directory if needed and open a store on it.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| StorageError::Io(format!("{}: {}", root.display(), e)))?;
        Ok(Self {
            root,
            temp_counter: AtomicU64::new(0),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Location of the tile named by `key`.
    pub fn tile_path(&self, key: &TileKey) -> Result<PathBuf, StorageError> {
        if key.x < 0 || key.y < 0 {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        if key.format.is_empty() || !key.format.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(StorageError::InvalidKey(key.to_string()));
        }

        let half: i64 = 2 << (key.z / 2);
        let digits = if half > 10 {
            (half as f64).log10() as usize + 1
        } else {
            1
        };

        let mut gridset_dir = format!("{}_{:02}", filter_name(&key.gridset, key)?, key.z);
        if let Some(params) = &key.parameters_id {
            gridset_dir.push('_');
            gridset_dir.push_str(&filter_name(params, key)?);
        }

        Ok(self
            .root
            .join(filter_name(&key.layer, key)?)
            .join(gridset_dir)
            .join(format!(
                "{:0w$}_{:0w$}",
                key.x / half,
                key.y / half,
                w = digits
            ))
            .join(format!(
                "{:0w$}_{:0w$}.{}",
                key.x,
                key.y,
                key.format,
                w = 2 * digits
            )))
    }

    /// Directory holding every tile of `layer`.
    pub fn layer_path(&self, layer: &str) -> PathBuf {
        self.root.join(sanitize(layer))
    }

    /// Remove every tile of `layer`; returns whether anything was removed.
    pub async fn delete_layer(&self, layer: &str) -> Result<bool, StorageError> {
        let path = self.layer_path(layer);
        match tokio::fs::remove_dir_all(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_error(&path, e)),
        }
    }

    fn temp_path(&self, path: &Path) -> PathBuf {
        let n = self.temp_counter.fetch_add(1, Ordering::Relaxed);
        let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(format!(".{}.{}.tmp", std::process::id(), n));
        path.with_file_name(name)
    }
}

#[async_trait]
impl BlobStore for FileBlobStore {
    async fn get(&self, key: &TileKey) -> Result<Option<Bytes>, StorageError> {
        let path = self.tile_path(key)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(&path, e)),
        }
    }

    async fn put(&self, key: &TileKey, data: Bytes) -> Result<(), StorageError> {
        let path = self.tile_path(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(parent, e))?;
        }

        let temp = self.temp_path(&path);
        tokio::fs::write(&temp, &data)
            .await
            .map_err(|e| io_error(&temp, e))?;

        if let Err(e) = tokio::fs::rename(&temp, &path).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(io_error(&path, e));
        }

        debug!(path = %path.display(), bytes = data.len(), "Stored tile");
        Ok(())
    }

    async fn delete(&self, key: &TileKey) -> Result<bool, StorageError> {
        let path = self.tile_path(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_error(&path, e)),
        }
    }

    async fn exists(&self, key: &TileKey) -> Result<bool, StorageError> {
        let path = self.tile_path(key)?;
        tokio::fs::try_exists(&path)
            .await
            .map_err(|e| io_error(&path, e))
    }
}

fn io_error(path: &Path, e: std::io::Error) -> StorageError {
    StorageError::Io(format!("{}: {}", path.display(), e))
}

/// Replace characters that are not portable in file names.
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn filter_name(name: &str, key: &TileKey) -> Result<String, StorageError> {
    let filtered = sanitize(name);
    if filtered.is_empty() || filtered.chars().all(|c| c == '.') {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(filtered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::TileIndex;

    fn key(x: i64, y: i64, z: i32) -> TileKey {
        TileKey::new("states", "EPSG:2163", "png", TileIndex::new(x, y, z))
    }

    // -------------------------------------------------------------------------
    // Paths
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_tile_path_layout() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileBlobStore::open(dir.path()).await.unwrap();

        assert_eq!(
            store.tile_path(&key(0, 0, 0)).unwrap(),
            dir.path().join("states/EPSG_2163_00/0_0/00_00.png")
        );

        let with_params = key(0, 0, 0).with_parameters_id(Some("75595e9159afae9c4669aee57366de8c196a57e1"));
        assert_eq!(
            store.tile_path(&with_params).unwrap(),
            dir.path().join(
                "states/EPSG_2163_00_75595e9159afae9c4669aee57366de8c196a57e1/0_0/00_00.png"
            )
        );

        // level 12: groups of 2^7 = 128 tiles, three digit directory names
        assert_eq!(
            store.tile_path(&key(1234, 567, 12)).unwrap(),
            dir.path().join("states/EPSG_2163_12/009_004/001234_000567.png")
        );
    }

    #[tokio::test]
    async fn test_rejects_bad_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileBlobStore::open(dir.path()).await.unwrap();

        assert!(store.tile_path(&key(-1, 0, 0)).is_err());

        let mut bad = key(0, 0, 0);
        bad.format = "png/../x".into();
        assert!(matches!(store.tile_path(&bad), Err(StorageError::InvalidKey(_))));

        let mut dots = key(0, 0, 0);
        dots.layer = "..".into();
        assert!(store.tile_path(&dots).is_err());
    }

    // -------------------------------------------------------------------------
    // Operations
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_put_get_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileBlobStore::open(dir.path()).await.unwrap();
        let key = key(3, 1, 2);

        assert!(store.get(&key).await.unwrap().is_none());
        assert!(!store.exists(&key).await.unwrap());

        store.put(&key, Bytes::from_static(b"tile")).await.unwrap();
        assert!(store.exists(&key).await.unwrap());
        assert_eq!(store.get(&key).await.unwrap().unwrap(), &b"tile"[..]);

        store.put(&key, Bytes::from_static(b"again")).await.unwrap();
        assert_eq!(store.get(&key).await.unwrap().unwrap(), &b"again"[..]);

        assert!(store.delete(&key).await.unwrap());
        assert!(!store.delete(&key).await.unwrap());
        assert!(store.get(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileBlobStore::open(dir.path()).await.unwrap();
        let key = key(0, 0, 0);

        store.put(&key, Bytes::from_static(b"tile")).await.unwrap();

        let parent = store.tile_path(&key).unwrap().parent().unwrap().to_path_buf();
        let names: Vec<String> = std::fs::read_dir(parent)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["00_00.png"]);
    }

    #[tokio::test]
    async fn test_delete_layer() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileBlobStore::open(dir.path()).await.unwrap();

        store.put(&key(0, 0, 0), Bytes::from_static(b"a")).await.unwrap();
        store.put(&key(1, 0, 1), Bytes::from_static(b"b")).await.unwrap();

        assert!(store.delete_layer("states").await.unwrap());
        assert!(!store.exists(&key(1, 0, 1)).await.unwrap());
        assert!(!store.delete_layer("states").await.unwrap());
    }
}
