//! Blob storage for uploaded document bytes.
//!
//! Path format: `blobs/{first-2-hex}/{next-2-hex}/{uuid}.bin`

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use docshelf_core::{BlobStore, Error, Result};

/// Compute the BLAKE3 hex digest of uploaded bytes.
pub fn compute_content_hash(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}

/// Generate the storage locator for a document ID.
pub fn generate_storage_path(id: &Uuid) -> String {
    let simple = id.simple().to_string();
    format!(
        "blobs/{}/{}/{}.bin",
        &simple[0..2],
        &simple[2..4],
        id.as_hyphenated()
    )
}

/// Filesystem blob store rooted at a base directory.
pub struct FilesystemBlobStore {
    base_path: PathBuf,
}

impl FilesystemBlobStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Resolve a locator under the base path, rejecting traversal.
    fn full_path(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path);
        let safe = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(Error::Storage(format!("invalid storage path: {path}")));
        }
        Ok(self.base_path.join(relative))
    }

    /// Round-trip a probe file to catch permission or mount problems early.
    pub async fn validate(&self) -> std::result::Result<(), String> {
        let test_dir = self.base_path.join("blobs/.health-check");
        let test_file = test_dir.join("probe.bin");

        fs::create_dir_all(&test_dir)
            .await
            .map_err(|e| format!("create_dir_all({:?}): {}", test_dir, e))?;

        let data = b"docshelf-storage-probe";
        fs::write(&test_file, data)
            .await
            .map_err(|e| format!("write({:?}): {}", test_file, e))?;

        let read_back = fs::read(&test_file)
            .await
            .map_err(|e| format!("read({:?}): {}", test_file, e))?;
        if read_back != data {
            return Err("read-back mismatch".to_string());
        }

        fs::remove_file(&test_file)
            .await
            .map_err(|e| format!("remove_file({:?}): {}", test_file, e))?;
        let _ = fs::remove_dir(&test_dir).await;

        Ok(())
    }
}

#[async_trait]
impl BlobStore for FilesystemBlobStore {
    async fn put(&self, id: Uuid, data: &[u8]) -> Result<String> {
        let path = generate_storage_path(&id);
        let full_path = self.full_path(&path)?;
        debug!(subsystem = "db", component = "blobs", op = "put", storage_path = %path, size_bytes = data.len(), "Writing blob");

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                warn!(parent = %parent.display(), error = %e, "blobs: create_dir_all failed");
                e
            })?;
        }

        // Atomic write: temp file + rename
        let temp_path = full_path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp_path, &full_path).await.map_err(|e| {
            warn!(from = %temp_path.display(), to = %full_path.display(), error = %e, "blobs: rename failed");
            e
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&full_path, std::fs::Permissions::from_mode(0o644)).await?;
        }

        Ok(path)
    }

    async fn get(&self, path: &str) -> Result<Vec<u8>> {
        let full_path = self.full_path(path)?;
        Ok(fs::read(full_path).await?)
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let full_path = self.full_path(path)?;
        if fs::try_exists(&full_path).await? {
            fs::remove_file(full_path).await?;
        }
        Ok(())
    }

    async fn health_check(&self) -> Result<bool> {
        match self.validate().await {
            Ok(()) => Ok(true),
            Err(e) => {
                warn!(subsystem = "db", component = "blobs", error = %e, "Blob storage health check failed");
                Ok(false)
            }
        }
    }
}

/// In-process blob store for single-node setups and tests.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.read().await.is_empty()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, id: Uuid, data: &[u8]) -> Result<String> {
        let path = generate_storage_path(&id);
        self.blobs.write().await.insert(path.clone(), data.to_vec());
        Ok(path)
    }

    async fn get(&self, path: &str) -> Result<Vec<u8>> {
        self.blobs
            .read()
            .await
            .get(path)
            .cloned()
            .ok_or_else(|| Error::Storage(format!("blob not found: {path}")))
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.blobs.write().await.remove(path);
        Ok(())
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_path_layout() {
        let id = Uuid::parse_str("01948f7e-8b2a-7c3d-9e4f-5a6b7c8d9e0f").unwrap();
        assert_eq!(
            generate_storage_path(&id),
            "blobs/01/94/01948f7e-8b2a-7c3d-9e4f-5a6b7c8d9e0f.bin"
        );
    }

    #[test]
    fn test_content_hash_is_blake3_hex() {
        let hash = compute_content_hash(b"hello");
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, compute_content_hash(b"hello"));
        assert_ne!(hash, compute_content_hash(b"hello!"));
    }

    #[tokio::test]
    async fn test_filesystem_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemBlobStore::new(dir.path());
        let id = Uuid::now_v7();

        let path = store.put(id, b"lecture notes").await.unwrap();
        assert_eq!(store.get(&path).await.unwrap(), b"lecture notes");

        store.delete(&path).await.unwrap();
        assert!(store.get(&path).await.is_err());
        // Deleting again is a no-op.
        store.delete(&path).await.unwrap();
    }

    #[tokio::test]
    async fn test_filesystem_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemBlobStore::new(dir.path());
        let err = store.get("../outside.bin").await.unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
        assert!(store.get("/etc/passwd").await.is_err());
    }

    #[tokio::test]
    async fn test_filesystem_health_check() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemBlobStore::new(dir.path());
        assert!(store.health_check().await.unwrap());
    }

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryBlobStore::new();
        let path = store.put(Uuid::now_v7(), b"x").await.unwrap();
        assert_eq!(store.len().await, 1);
        assert_eq!(store.get(&path).await.unwrap(), b"x");
        store.delete(&path).await.unwrap();
        assert!(store.is_empty().await);
        assert!(matches!(store.get(&path).await, Err(Error::Storage(_))));
    }
}
