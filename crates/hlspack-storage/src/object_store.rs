//! The object store seam.

use std::path::Path;

use async_trait::async_trait;

use crate::error::StorageResult;

/// Object store operations the pipeline depends on.
///
/// Implementations: [`crate::client::R2Client`] (production) and
/// [`crate::memory::MemoryObjectStore`] (tests).
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload a local file.
    async fn upload_file(&self, path: &Path, key: &str, content_type: &str) -> StorageResult<()>;

    /// Upload in-memory bytes.
    async fn upload_bytes(&self, data: Vec<u8>, key: &str, content_type: &str)
        -> StorageResult<()>;

    /// Download an object into memory. `NotFound` when absent.
    async fn download_bytes(&self, key: &str) -> StorageResult<Vec<u8>>;

    /// Download an object to a local file, creating parent directories.
    async fn download_file(&self, key: &str, path: &Path) -> StorageResult<()>;

    /// List all keys under a prefix (pagination handled internally).
    async fn list_keys(&self, prefix: &str) -> StorageResult<Vec<String>>;

    /// Delete multiple objects. Missing keys are not an error.
    async fn delete_objects(&self, keys: &[String]) -> StorageResult<u32>;

    /// Object size in bytes if it exists.
    async fn head(&self, key: &str) -> StorageResult<Option<u64>>;
}
