//! Storage trait definitions.

use crate::error::StorageResult;
use async_trait::async_trait;
use bytes::Bytes;
use time::OffsetDateTime;

/// Key-addressed byte storage for release archives.
///
/// Keys are `/`-separated relative paths. Listing is one level deep: callers
/// walk the namespace with [`ObjectStore::list_directories`] and then
/// [`ObjectStore::list_files`] per directory.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Check if an object exists.
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Get an object's size and modification time without fetching content.
    async fn head(&self, key: &str) -> StorageResult<ObjectMeta>;

    /// Get an object's content.
    async fn get(&self, key: &str) -> StorageResult<Bytes>;

    /// Put an object only if no object is stored under `key`.
    ///
    /// Returns `false` without touching the existing object when the key is taken.
    async fn put_if_not_exists(&self, key: &str, data: Bytes) -> StorageResult<bool>;

    /// Names of the immediate child directories under `prefix`, sorted.
    async fn list_directories(&self, prefix: &str) -> StorageResult<Vec<String>>;

    /// Objects stored directly under `prefix` (not in nested directories), sorted by name.
    async fn list_files(&self, prefix: &str) -> StorageResult<Vec<ObjectInfo>>;

    /// Static identifier for the backend type, used in logs and health output.
    fn backend_name(&self) -> &'static str;

    /// Verify storage backend connectivity.
    ///
    /// Called once at startup and by the health endpoint.
    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }
}

/// Metadata about a stored object.
#[derive(Clone, Debug)]
pub struct ObjectMeta {
    /// Object size in bytes.
    pub size: u64,
    /// Last modification time (if available).
    pub last_modified: Option<OffsetDateTime>,
}

/// One entry of a [`ObjectStore::list_files`] listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectInfo {
    /// File name relative to the listed prefix.
    pub name: String,
    /// Full object key.
    pub key: String,
    /// Object size in bytes.
    pub size: u64,
    /// Creation or last modification time, when the backend reports one.
    pub last_modified: Option<OffsetDateTime>,
}

/// Normalize a listing prefix to either empty or `dir/`.
pub(crate) fn directory_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{trimmed}/")
    }
}
