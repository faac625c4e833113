use super::{BlobObject, BlobStore, StorageError};
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct StoredObject {
    bytes: Vec<u8>,
    content_type: String,
}

/// In-process blob store.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    bucket: String,
    objects: RwLock<BTreeMap<String, StoredObject>>,
}

impl MemoryBlobStore {
    /// Empty store for `bucket`.
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            objects: RwLock::default(),
        }
    }

    /// Every stored key, sorted.
    pub async fn keys(&self) -> Vec<String> {
        self.objects.read().await.keys().cloned().collect()
    }

    /// Content type recorded for `key`.
    pub async fn content_type(&self, key: &str) -> Option<String> {
        self.objects
            .read()
            .await
            .get(key)
            .map(|object| object.content_type.clone())
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), StorageError> {
        self.objects.write().await.insert(
            key.to_string(),
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<BlobObject>, StorageError> {
        Ok(self
            .objects
            .read()
            .await
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, object)| BlobObject {
                key: key.clone(),
                size: object.bytes.len() as u64,
                modified: None,
            })
            .collect())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        self.objects
            .read()
            .await
            .get(key)
            .map(|object| object.bytes.clone())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lists_only_matching_prefix() {
        let store = MemoryBlobStore::new("b");
        store.put("a/1", b"x".to_vec(), "text/plain").await.unwrap();
        store.put("a/2", b"yy".to_vec(), "text/plain").await.unwrap();
        store.put("ab/3", b"z".to_vec(), "text/plain").await.unwrap();

        let listed = store.list("a/").await.unwrap();
        let keys: Vec<_> = listed.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["a/1", "a/2"]);
        assert_eq!(listed[1].size, 2);
        assert_eq!(store.uri("a/1"), "s3://b/a/1");
        assert!(matches!(store.get("missing").await, Err(StorageError::NotFound(_))));
    }
}
