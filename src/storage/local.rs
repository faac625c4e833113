use super::{BlobObject, BlobStore, StorageError};
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use walkdir::WalkDir;

/// Blob store backed by a directory tree. Keys map to relative paths.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
    bucket: String,
}

impl LocalBlobStore {
    /// Store rooted at `root`. `bucket` is only reported, never used for paths.
    pub fn new(root: impl AsRef<Path>, bucket: impl Into<String>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            bucket: bucket.into(),
        }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(key.trim_start_matches('/'));
        let escapes = relative
            .components()
            .any(|component| !matches!(component, Component::Normal(_)));
        if key.trim().is_empty() || escapes {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

fn list_sync(root: &Path, prefix: &str) -> Vec<BlobObject> {
    let mut objects: Vec<BlobObject> = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| {
            let relative = entry.path().strip_prefix(root).ok()?;
            let key = relative
                .components()
                .map(|component| component.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if !key.starts_with(prefix) {
                return None;
            }
            let metadata = entry.metadata().ok()?;
            let modified = metadata
                .modified()
                .ok()
                .and_then(|time| OffsetDateTime::from(time).format(&Rfc3339).ok());
            Some(BlobObject {
                key,
                size: metadata.len(),
                modified,
            })
        })
        .collect();
    objects.sort_by(|a, b| a.key.cmp(&b.key));
    objects
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        tracing::debug!(path = %path.display(), "Blob written");
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<BlobObject>, StorageError> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let root = self.root.clone();
        let prefix = prefix.trim_start_matches('/').to_string();
        tokio::task::spawn_blocking(move || list_sync(&root, &prefix))
            .await
            .map_err(|err| StorageError::Unavailable(format!("listing task failed: {err}")))
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    fn uri(&self, key: &str) -> String {
        self.root.join(key.trim_start_matches('/')).display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_and_lists_nested_keys() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = LocalBlobStore::new(dir.path(), "local");

        store
            .put(
                "f/delta_datasets/t/_delta_log/00000000000000000000.json",
                b"{}".to_vec(),
                "application/json",
            )
            .await
            .unwrap();
        store.put("f/csv/a.csv", b"a\n".to_vec(), "text/csv").await.unwrap();

        let listed = store.list("f/delta_datasets/t/").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(listed[0].key.ends_with("00000000000000000000.json"));
        assert!(listed[0].modified.is_some());
        assert_eq!(store.get("f/csv/a.csv").await.unwrap(), b"a\n");
    }

    #[tokio::test]
    async fn rejects_keys_escaping_the_root() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = LocalBlobStore::new(dir.path(), "local");
        let err = store.put("../outside", Vec::new(), "text/plain").await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidKey(_)));
    }

    #[tokio::test]
    async fn missing_root_lists_nothing() {
        let store = LocalBlobStore::new("/nonexistent/ragpipe-root", "local");
        assert!(store.list("").await.unwrap().is_empty());
    }
}
