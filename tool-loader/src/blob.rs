//! Archive blob storage.

use std::collections::HashMap;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::RwLock;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::fs;

/// Result alias for blob operations.
pub type BlobResult<T> = Result<T, BlobError>;

/// Errors produced by blob stores.
#[derive(Debug, Error)]
pub enum BlobError {
    /// No blob is stored under the key.
    #[error("blob `{key}` not found")]
    NotFound {
        /// Requested key.
        key: String,
    },
    /// The key is empty or escapes the store root.
    #[error("invalid blob key `{key}`")]
    InvalidKey {
        /// Offending key.
        key: String,
    },
    /// Backend I/O failure.
    #[error("blob `{key}` i/o error: {source}")]
    Io {
        /// Key being accessed.
        key: String,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
}

/// Durable storage for uploaded plugin archives.
///
/// Keys are `/`-separated relative paths such as `weather/weather.zip`.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stores `bytes` under `key`, replacing any previous blob.
    async fn put(&self, key: &str, bytes: Bytes) -> BlobResult<()>;

    /// Fetches the blob stored under `key`.
    async fn get(&self, key: &str) -> BlobResult<Bytes>;

    /// Removes the blob stored under `key`.
    async fn delete(&self, key: &str) -> BlobResult<()>;

    /// Returns `true` when a blob exists under `key`.
    async fn exists(&self, key: &str) -> BlobResult<bool>;
}

fn check_key(key: &str) -> BlobResult<()> {
    let valid = !key.is_empty()
        && Path::new(key)
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
    if valid {
        Ok(())
    } else {
        Err(BlobError::InvalidKey { key: key.to_owned() })
    }
}

/// Blob store rooted at a local directory.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Creates a store rooted at `root`. The directory is created lazily.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> BlobResult<PathBuf> {
        check_key(key)?;
        Ok(self.root.join(key))
    }
}

fn io_err(key: &str) -> impl FnOnce(io::Error) -> BlobError + '_ {
    move |source| {
        if source.kind() == io::ErrorKind::NotFound {
            BlobError::NotFound { key: key.to_owned() }
        } else {
            BlobError::Io {
                key: key.to_owned(),
                source,
            }
        }
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, key: &str, bytes: Bytes) -> BlobResult<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|source| BlobError::Io {
                    key: key.to_owned(),
                    source,
                })?;
        }
        // Readers never observe a half-written archive.
        let partial = path.with_extension("partial");
        fs::write(&partial, &bytes).await.map_err(io_err(key))?;
        fs::rename(&partial, &path).await.map_err(io_err(key))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> BlobResult<Bytes> {
        let path = self.path_for(key)?;
        let data = fs::read(&path).await.map_err(io_err(key))?;
        Ok(Bytes::from(data))
    }

    async fn delete(&self, key: &str) -> BlobResult<()> {
        let path = self.path_for(key)?;
        fs::remove_file(&path).await.map_err(io_err(key))?;
        if let Some(parent) = path.parent().filter(|parent| *parent != self.root) {
            // Only succeeds when the per-plugin directory is now empty.
            let _ = fs::remove_dir(parent).await;
        }
        Ok(())
    }

    async fn exists(&self, key: &str) -> BlobResult<bool> {
        let path = self.path_for(key)?;
        fs::try_exists(&path).await.map_err(io_err(key))
    }
}

/// In-process blob store, used in tests and ephemeral deployments.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, Bytes>>,
}

impl MemoryBlobStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the stored keys in sorted order.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self
            .blobs
            .read()
            .expect("blob store poisoned")
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, bytes: Bytes) -> BlobResult<()> {
        check_key(key)?;
        self.blobs
            .write()
            .expect("blob store poisoned")
            .insert(key.to_owned(), bytes);
        Ok(())
    }

    async fn get(&self, key: &str) -> BlobResult<Bytes> {
        check_key(key)?;
        self.blobs
            .read()
            .expect("blob store poisoned")
            .get(key)
            .cloned()
            .ok_or_else(|| BlobError::NotFound { key: key.to_owned() })
    }

    async fn delete(&self, key: &str) -> BlobResult<()> {
        check_key(key)?;
        self.blobs
            .write()
            .expect("blob store poisoned")
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| BlobError::NotFound { key: key.to_owned() })
    }

    async fn exists(&self, key: &str) -> BlobResult<bool> {
        check_key(key)?;
        Ok(self
            .blobs
            .read()
            .expect("blob store poisoned")
            .contains_key(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fs_store_put_get_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());

        store
            .put("weather/weather.zip", Bytes::from_static(b"PK"))
            .await
            .unwrap();
        assert!(store.exists("weather/weather.zip").await.unwrap());
        assert_eq!(
            store.get("weather/weather.zip").await.unwrap(),
            Bytes::from_static(b"PK")
        );

        store.delete("weather/weather.zip").await.unwrap();
        assert!(!store.exists("weather/weather.zip").await.unwrap());
        assert!(!dir.path().join("weather").exists());
        assert!(matches!(
            store.get("weather/weather.zip").await,
            Err(BlobError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn keys_cannot_escape_root() {
        let store = MemoryBlobStore::new();
        for key in ["", "../x.zip", "/abs.zip", "a/../../b"] {
            assert!(matches!(
                store.put(key, Bytes::new()).await,
                Err(BlobError::InvalidKey { .. })
            ));
        }
    }

    #[tokio::test]
    async fn memory_store_tracks_keys() {
        let store = MemoryBlobStore::new();
        store.put("b/b.zip", Bytes::new()).await.unwrap();
        store.put("a/a.zip", Bytes::new()).await.unwrap();
        assert_eq!(store.keys(), ["a/a.zip", "b/b.zip"]);
        store.delete("a/a.zip").await.unwrap();
        assert!(store.delete("a/a.zip").await.is_err());
    }
}
