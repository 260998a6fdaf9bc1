//! Pluggable byte-stream store for attachment payloads.
//!
//! The primary store keeps only attachment metadata; payload bytes live
//! here under an opaque storage key. Payloads are sealed in the
//! encryption envelope before they reach the store.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("blob I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid storage key: {0}")]
    InvalidKey(String),
}

pub type BlobResult<T> = Result<T, BlobError>;

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, data: Bytes) -> BlobResult<()>;

    async fn get(&self, key: &str) -> BlobResult<Option<Bytes>>;

    async fn delete(&self, key: &str) -> BlobResult<()>;
}

/// Storage keys are generated internally; reject anything that could
/// escape the root directory.
fn validate_key(key: &str) -> BlobResult<()> {
    if key.is_empty()
        || key.contains("..")
        || key.contains('/')
        || key.contains('\\')
    {
        return Err(BlobError::InvalidKey(key.to_string()));
    }
    Ok(())
}

/// Filesystem-backed blob store.
pub struct FsBlobStore {
    root: std::path::PathBuf,
}

impl FsBlobStore {
    pub async fn new(root: impl Into<std::path::PathBuf>) -> BlobResult<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    fn path_for(&self, key: &str) -> std::path::PathBuf {
        self.root.join(key)
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, key: &str, data: Bytes) -> BlobResult<()> {
        validate_key(key)?;
        // Write-then-rename keeps readers from seeing partial payloads.
        let path = self.path_for(key);
        let tmp = self.path_for(&format!("{}.tmp", key));
        tokio::fs::write(&tmp, &data).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> BlobResult<Option<Bytes>> {
        validate_key(key)?;
        match tokio::fs::read(self.path_for(key)).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, key: &str) -> BlobResult<()> {
        validate_key(key)?;
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory blob store for tests and single-node development.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: dashmap::DashMap<String, Bytes>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, data: Bytes) -> BlobResult<()> {
        validate_key(key)?;
        self.blobs.insert(key.to_string(), data);
        Ok(())
    }

    async fn get(&self, key: &str) -> BlobResult<Option<Bytes>> {
        validate_key(key)?;
        Ok(self.blobs.get(key).map(|b| b.clone()))
    }

    async fn delete(&self, key: &str) -> BlobResult<()> {
        validate_key(key)?;
        self.blobs.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_round_trips() {
        let store = MemoryBlobStore::new();
        store.put("k1", Bytes::from_static(b"payload")).await.unwrap();
        assert_eq!(
            store.get("k1").await.unwrap().unwrap(),
            Bytes::from_static(b"payload")
        );
        store.delete("k1").await.unwrap();
        assert!(store.get("k1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn fs_store_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path()).await.unwrap();
        store.put("k1", Bytes::from_static(b"payload")).await.unwrap();
        assert_eq!(
            store.get("k1").await.unwrap().unwrap(),
            Bytes::from_static(b"payload")
        );
        store.delete("k1").await.unwrap();
        assert!(store.get("k1").await.unwrap().is_none());
        // Deleting twice is fine.
        store.delete("k1").await.unwrap();
    }

    #[tokio::test]
    async fn path_escapes_rejected() {
        let store = MemoryBlobStore::new();
        assert!(store.get("../etc/passwd").await.is_err());
        assert!(store.put("a/b", Bytes::new()).await.is_err());
        assert!(store.get("").await.is_err());
    }
}
