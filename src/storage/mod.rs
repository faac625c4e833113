//! Blob storage boundary: `put`, `list`, and `get` over S3, a local directory, or memory.

mod local;
mod memory;
mod s3;
pub mod sigv4;

pub use local::LocalBlobStore;
pub use memory::MemoryBlobStore;
pub use s3::S3BlobStore;
pub use sigv4::AwsCredentials;

use crate::config::{Config, ConfigError, StorageBackend};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

/// Errors returned by blob stores.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Backend could not be reached.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
    /// Backend answered with an unexpected status.
    #[error("Unexpected storage response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the backend.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// Object does not exist.
    #[error("Object not found: {0}")]
    NotFound(String),
    /// Key escapes the store root or is otherwise unusable.
    #[error("Invalid object key: {0}")]
    InvalidKey(String),
    /// Credentials are missing.
    #[error(transparent)]
    Credentials(#[from] ConfigError),
    /// Local filesystem failure.
    #[error("Filesystem error: {0}")]
    Io(#[from] std::io::Error),
}

/// One listed object.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BlobObject {
    /// Full key within the bucket.
    pub key: String,
    /// Size in bytes.
    pub size: u64,
    /// Last modification time (RFC 3339) when known.
    pub modified: Option<String>,
}

/// Black-box object storage scoped to one bucket.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Bucket holding every key.
    fn bucket(&self) -> &str;

    /// Store `bytes` at `key`, replacing any previous object.
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), StorageError>;

    /// Objects whose key starts with `prefix`, sorted by key.
    async fn list(&self, prefix: &str) -> Result<Vec<BlobObject>, StorageError>;

    /// Read the object at `key`.
    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError>;

    /// Fully qualified location of `key`.
    fn uri(&self, key: &str) -> String {
        format!("s3://{}/{}", self.bucket(), key.trim_start_matches('/'))
    }
}

/// Build the blob store selected by configuration.
pub fn build_blob_store(config: &Config) -> Result<Arc<dyn BlobStore>, StorageError> {
    let store: Arc<dyn BlobStore> = match config.storage_backend {
        StorageBackend::S3 => Arc::new(S3BlobStore::new(
            config.storage_bucket.clone(),
            config.aws_region.clone(),
            config.s3_endpoint_url.clone(),
            AwsCredentials::from_env()?,
        )?),
        StorageBackend::Local => Arc::new(LocalBlobStore::new(
            &config.storage_local_root,
            config.storage_bucket.clone(),
        )),
    };
    tracing::info!(
        backend = ?config.storage_backend,
        bucket = %config.storage_bucket,
        "Blob store initialized"
    );
    Ok(store)
}
