//! Filesystem content store
//!
//! Stores sealed payloads in a local directory using their CID as filename.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

use super::{compute_cid, parse_cid, ContentStore};
use crate::error::{Result, WelltickError};

/// Result of storing a blob
#[derive(Debug, Clone)]
pub struct StoreResult {
    /// CIDv1 of the blob
    pub cid: String,
    /// Total size in bytes
    pub size_bytes: u64,
    /// Whether blob already existed
    pub already_existed: bool,
}

/// Content-addressed blob directory
pub struct LocalContentStore {
    /// Root directory for blob storage
    root_dir: PathBuf,
}

impl LocalContentStore {
    /// Create a new store at the given directory
    pub async fn new<P: AsRef<Path>>(root_dir: P) -> Result<Self> {
        let root_dir = root_dir.as_ref().to_path_buf();

        fs::create_dir_all(&root_dir).await?;

        info!(path = %root_dir.display(), "Initialized local content store");

        Ok(Self { root_dir })
    }

    /// Get path for a blob by CID
    pub(crate) fn blob_path(&self, cid: &str) -> Result<PathBuf> {
        // Only parsed CIDs reach the filesystem, which keeps ids like "../x" out
        let parsed = parse_cid(cid)?;
        let digest = hex::encode(parsed.hash().digest());
        let subdir = &digest[..4.min(digest.len())];
        Ok(self.root_dir.join(subdir).join(parsed.to_string()))
    }

    /// Store a blob, returning its CID
    pub async fn store(&self, data: &[u8]) -> Result<StoreResult> {
        let cid = compute_cid(data);
        let blob_path = self.blob_path(&cid)?;

        if fs::metadata(&blob_path).await.is_ok() {
            debug!(cid = %cid, "Blob already exists");
            return Ok(StoreResult {
                cid,
                size_bytes: data.len() as u64,
                already_existed: true,
            });
        }

        if let Some(parent) = blob_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Blob paths only ever hold complete data: write aside, then rename into place
        let tmp_path = blob_path.with_extension("tmp");
        fs::write(&tmp_path, data).await?;
        fs::rename(&tmp_path, &blob_path).await?;

        info!(cid = %cid, size = data.len(), "Stored blob");

        Ok(StoreResult {
            cid,
            size_bytes: data.len() as u64,
            already_existed: false,
        })
    }

    /// Check if a blob exists
    pub async fn exists(&self, cid: &str) -> bool {
        match self.blob_path(cid) {
            Ok(path) => fs::metadata(path).await.is_ok(),
            Err(_) => false,
        }
    }

    /// Retrieve a blob by CID, verifying the bytes still match it
    pub async fn retrieve(&self, cid: &str) -> Result<Vec<u8>> {
        let blob_path = self.blob_path(cid)?;

        let data = match fs::read(&blob_path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(WelltickError::NotFound(format!("Blob not found: {}", cid)));
            }
            Err(e) => return Err(e.into()),
        };

        let expected = parse_cid(cid)?.to_string();
        let computed = compute_cid(&data);
        if computed != expected {
            return Err(WelltickError::HashMismatch {
                expected,
                actual: computed,
            });
        }

        Ok(data)
    }

    /// Get storage statistics
    pub async fn stats(&self) -> Result<StorageStats> {
        let mut total_blobs = 0u64;
        let mut total_bytes = 0u64;

        let mut entries = fs::read_dir(&self.root_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let mut blobs = fs::read_dir(entry.path()).await?;
            while let Some(blob) = blobs.next_entry().await? {
                let metadata = blob.metadata().await?;
                if metadata.is_file() && blob.path().extension().is_none() {
                    total_blobs += 1;
                    total_bytes += metadata.len();
                }
            }
        }

        Ok(StorageStats {
            total_blobs,
            total_bytes,
        })
    }
}

#[async_trait]
impl ContentStore for LocalContentStore {
    async fn put(&self, data: &[u8]) -> Result<String> {
        Ok(self.store(data).await?.cid)
    }

    async fn get(&self, id: &str) -> Result<Vec<u8>> {
        self.retrieve(id).await
    }

    fn backend_name(&self) -> &'static str {
        "local"
    }

    async fn stats(&self) -> Result<Option<StorageStats>> {
        Ok(Some(LocalContentStore::stats(self).await?))
    }
}

/// Storage statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct StorageStats {
    pub total_blobs: u64,
    pub total_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_store_and_retrieve() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalContentStore::new(temp_dir.path()).await.unwrap();

        let data = b"Hello, Welltick!";
        let result = store.store(data).await.unwrap();

        assert!(result.cid.starts_with("bafkrei"));
        assert_eq!(result.size_bytes, data.len() as u64);
        assert!(!result.already_existed);
        assert!(store.exists(&result.cid).await);

        let retrieved = store.retrieve(&result.cid).await.unwrap();
        assert_eq!(retrieved, data);
    }

    #[tokio::test]
    async fn test_idempotent_store() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalContentStore::new(temp_dir.path()).await.unwrap();

        let data = b"Duplicate test";
        let result1 = store.store(data).await.unwrap();
        let result2 = store.store(data).await.unwrap();

        assert_eq!(result1.cid, result2.cid);
        assert!(!result1.already_existed);
        assert!(result2.already_existed);

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total_blobs, 1);
        assert_eq!(stats.total_bytes, data.len() as u64);
    }

    #[tokio::test]
    async fn test_missing_blob_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalContentStore::new(temp_dir.path()).await.unwrap();

        let cid = compute_cid(b"never stored");
        assert!(matches!(
            store.get(&cid).await,
            Err(WelltickError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_invalid_cid_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalContentStore::new(temp_dir.path()).await.unwrap();

        assert!(matches!(
            store.get("../escape").await,
            Err(WelltickError::InvalidInput(_))
        ));
        assert!(!store.exists("../escape").await);
    }

    #[tokio::test]
    async fn test_corrupted_blob_detected() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalContentStore::new(temp_dir.path()).await.unwrap();

        let cid = store.put(b"original bytes").await.unwrap();
        let path = store.blob_path(&cid).unwrap();
        std::fs::write(&path, b"swapped bytes").unwrap();

        assert!(matches!(
            store.get(&cid).await,
            Err(WelltickError::HashMismatch { .. })
        ));
    }
}
