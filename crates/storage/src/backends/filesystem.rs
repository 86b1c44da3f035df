//! Local filesystem storage backend.

use crate::error::{StorageError, StorageResult};
use crate::traits::{ObjectInfo, ObjectMeta, ObjectStore, directory_prefix};
use async_trait::async_trait;
use bytes::Bytes;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::instrument;
use uuid::Uuid;

/// Marker embedded in in-flight temp file names; such files are never listed.
const TEMP_MARKER: &str = ".tmp.";

/// Local filesystem object store.
///
/// Writes land in a uniquely named temp file next to the target and are
/// published with a hard link, so a key is either absent or fully written and
/// an existing key is never replaced.
pub struct FilesystemBackend {
    root: PathBuf,
}

impl FilesystemBackend {
    /// Create a new filesystem backend rooted at `root`, creating it if needed.
    pub async fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    /// Resolve a key to a path under the root.
    ///
    /// Runs on the blocking pool because it canonicalizes and stats paths.
    async fn key_path(&self, key: &str) -> StorageResult<PathBuf> {
        let root = self.root.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || resolve_key(&root, &key))
            .await
            .map_err(|e| {
                StorageError::Io(std::io::Error::other(format!("spawn_blocking failed: {e}")))
            })?
    }

    /// Resolve a listing prefix to a directory path; the empty prefix is the root.
    async fn prefix_path(&self, prefix: &str) -> StorageResult<PathBuf> {
        let prefix = directory_prefix(prefix);
        if prefix.is_empty() {
            return Ok(self.root.clone());
        }
        self.key_path(prefix.trim_end_matches('/')).await
    }

    async fn write_new(&self, path: &Path, data: &[u8]) -> StorageResult<bool> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let temp_path = path.with_file_name(format!("{file_name}{TEMP_MARKER}{}", Uuid::new_v4()));

        {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(data).await?;
            file.sync_all().await?;
        }

        let published = match fs::hard_link(&temp_path, path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(StorageError::Io(e)),
        };

        if let Err(e) = fs::remove_file(&temp_path).await {
            tracing::warn!(path = %temp_path.display(), error = %e, "Failed to remove temp file");
        }

        published
    }

    /// Read a directory, treating a missing directory as empty.
    async fn read_dir_entries(&self, dir: &Path) -> StorageResult<Vec<fs::DirEntry>> {
        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::Io(e)),
        };

        let mut out = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            out.push(entry);
        }
        Ok(out)
    }
}

fn not_found_or_io(key: &str) -> impl FnOnce(std::io::Error) -> StorageError + '_ {
    move |e| {
        if e.kind() == ErrorKind::NotFound {
            StorageError::NotFound(key.to_string())
        } else {
            StorageError::Io(e)
        }
    }
}

/// Map `key` onto `root`, rejecting anything that could land outside it.
///
/// Besides lexical checks, the nearest existing ancestor (or the path itself)
/// is canonicalized so a symlink inside the root cannot redirect reads or
/// writes elsewhere.
fn resolve_key(root: &Path, key: &str) -> StorageResult<PathBuf> {
    if key.is_empty() || key.starts_with('/') || key.starts_with('\\') || key.contains("..") {
        return Err(StorageError::InvalidKey(format!("unsafe key: {key:?}")));
    }
    if !Path::new(key)
        .components()
        .all(|c| matches!(c, Component::Normal(_)))
    {
        return Err(StorageError::InvalidKey(format!(
            "contains unsafe path component: {key}"
        )));
    }

    let root_canonical = root.canonicalize().map_err(|e| {
        StorageError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to canonicalize root: {e}"),
        ))
    })?;

    let path = root.join(key);
    let mut probe = Some(path.as_path());
    while let Some(candidate) = probe {
        match std::fs::symlink_metadata(candidate) {
            Ok(meta) => {
                let canonical = candidate.canonicalize().map_err(|e| {
                    if meta.file_type().is_symlink() {
                        StorageError::InvalidKey(format!("dangling symlink in key: {key}"))
                    } else {
                        StorageError::Io(e)
                    }
                })?;
                if !canonical.starts_with(&root_canonical) {
                    return Err(StorageError::InvalidKey(format!(
                        "key escapes storage root: {key}"
                    )));
                }
                return Ok(path);
            }
            Err(e) if e.kind() == ErrorKind::NotFound => probe = candidate.parent(),
            Err(e) => return Err(StorageError::Io(e)),
        }
    }

    Ok(path)
}

fn is_temp_name(name: &str) -> bool {
    name.contains(TEMP_MARKER)
}

#[async_trait]
impl ObjectStore for FilesystemBackend {
    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let path = self.key_path(key).await?;
        match fs::metadata(&path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn head(&self, key: &str) -> StorageResult<ObjectMeta> {
        let path = self.key_path(key).await?;
        let metadata = fs::metadata(&path).await.map_err(not_found_or_io(key))?;
        if !metadata.is_file() {
            return Err(StorageError::NotFound(key.to_string()));
        }

        Ok(ObjectMeta {
            size: metadata.len(),
            last_modified: metadata.modified().ok().map(Into::into),
        })
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        let path = self.key_path(key).await?;
        let data = fs::read(&path).await.map_err(not_found_or_io(key))?;
        Ok(Bytes::from(data))
    }

    #[instrument(skip(self, data), fields(backend = "filesystem", size = data.len()))]
    async fn put_if_not_exists(&self, key: &str, data: Bytes) -> StorageResult<bool> {
        let path = self.key_path(key).await?;
        self.write_new(&path, &data).await
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn list_directories(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let dir = self.prefix_path(prefix).await?;
        let mut names = Vec::new();

        for entry in self.read_dir_entries(&dir).await? {
            // file_type() does not follow symlinks; linked directories are skipped.
            if entry.file_type().await?.is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }

        names.sort();
        Ok(names)
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn list_files(&self, prefix: &str) -> StorageResult<Vec<ObjectInfo>> {
        let key_prefix = directory_prefix(prefix);
        let dir = self.prefix_path(prefix).await?;
        let mut files = Vec::new();

        for entry in self.read_dir_entries(&dir).await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if is_temp_name(&name) {
                continue;
            }

            let metadata = entry.metadata().await?;
            let last_modified = metadata
                .created()
                .or_else(|_| metadata.modified())
                .ok()
                .map(Into::into);

            files.push(ObjectInfo {
                key: format!("{key_prefix}{name}"),
                name,
                size: metadata.len(),
                last_modified,
            });
        }

        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn health_check(&self) -> StorageResult<()> {
        let metadata = fs::metadata(&self.root).await.map_err(|e| {
            StorageError::Io(std::io::Error::new(
                e.kind(),
                format!("storage root not accessible: {e}"),
            ))
        })?;

        if !metadata.is_dir() {
            return Err(StorageError::Io(std::io::Error::new(
                ErrorKind::NotADirectory,
                format!("storage root is not a directory: {:?}", self.root),
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn backend() -> (tempfile::TempDir, FilesystemBackend) {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path()).await.unwrap();
        (dir, backend)
    }

    #[tokio::test]
    async fn put_if_not_exists_never_overwrites() {
        let (_dir, backend) = backend().await;

        let key = "updates/52/20240101000000000.zip";
        assert!(
            backend
                .put_if_not_exists(key, Bytes::from("first"))
                .await
                .unwrap()
        );
        assert!(
            !backend
                .put_if_not_exists(key, Bytes::from("second"))
                .await
                .unwrap()
        );

        assert_eq!(backend.get(key).await.unwrap(), Bytes::from("first"));
        assert_eq!(backend.head(key).await.unwrap().size, 5);
    }

    #[tokio::test]
    async fn get_missing_is_not_found() {
        let (_dir, backend) = backend().await;
        assert!(matches!(
            backend.get("updates/52/missing.zip").await,
            Err(StorageError::NotFound(_))
        ));
        assert!(!backend.exists("updates/52/missing.zip").await.unwrap());
    }

    #[tokio::test]
    async fn listing_is_one_level_deep() {
        let (_dir, backend) = backend().await;
        for key in [
            "updates/52/b.zip",
            "updates/52/a.zip",
            "updates/53/c.zip",
            "updates/top.txt",
        ] {
            backend.put_if_not_exists(key, Bytes::from(key)).await.unwrap();
        }

        assert_eq!(
            backend.list_directories("updates/").await.unwrap(),
            vec!["52".to_string(), "53".to_string()]
        );
        assert_eq!(backend.list_directories("").await.unwrap(), vec!["updates"]);

        let files = backend.list_files("updates/52").await.unwrap();
        let names: Vec<_> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["a.zip", "b.zip"]);
        assert_eq!(files[0].key, "updates/52/a.zip");
        assert_eq!(files[0].size, "updates/52/a.zip".len() as u64);
        assert!(files[0].last_modified.is_some());

        let top = backend.list_files("updates/").await.unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].name, "top.txt");
    }

    #[tokio::test]
    async fn listing_missing_prefix_is_empty() {
        let (_dir, backend) = backend().await;
        assert!(backend.list_directories("updates/").await.unwrap().is_empty());
        assert!(backend.list_files("updates/99").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn listing_skips_temp_files() {
        let (dir, backend) = backend().await;
        std::fs::create_dir_all(dir.path().join("updates/52")).unwrap();
        std::fs::write(
            dir.path().join("updates/52/x.zip.tmp.0000"),
            b"partial",
        )
        .unwrap();

        assert!(backend.list_files("updates/52").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn path_traversal_rejected() {
        let (_dir, backend) = backend().await;

        assert!(backend.exists("../escape").await.is_err());
        assert!(backend.exists("/absolute/path").await.is_err());
        assert!(backend.exists("foo/../bar").await.is_err());
        assert!(backend.list_files("../").await.is_err());

        assert!(backend.exists("valid/nested/key").await.is_ok());
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn symlink_escape_rejected() {
        use std::os::unix::fs::symlink;

        let (dir, backend) = backend().await;
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("secret.txt"), "secret").unwrap();

        symlink(outside.path(), dir.path().join("escape")).unwrap();

        assert!(matches!(
            backend.get("escape/secret.txt").await,
            Err(StorageError::InvalidKey(_))
        ));
        assert!(
            backend
                .put_if_not_exists("escape/nested/file.zip", Bytes::from("x"))
                .await
                .is_err()
        );
        assert!(!outside.path().join("nested").exists());
    }
}
