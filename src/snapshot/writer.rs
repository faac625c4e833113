use super::SnapshotError;
use super::columnar::encode_parquet;
use super::frame::{Column, Frame};
use super::log::{Commit, LOG_DIR, LogEntry, Operation, data_file_name, log_key, parse_sequence};
use crate::storage::BlobStore;
use crate::tables::Record;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Content type of data files.
pub const PARQUET_CONTENT_TYPE: &str = "application/parquet";
const LOG_CONTENT_TYPE: &str = "application/json";

/// Outcome of one snapshot write.
#[derive(Debug, Clone, Serialize)]
pub struct WriteReceipt {
    /// Snapshot name.
    pub table_name: String,
    /// CREATE or APPEND.
    pub operation: Operation,
    /// Sequence number of the new log entry.
    pub sequence: u64,
    /// Location of the table root.
    pub location: String,
    /// Key of the table root, ending in `/`.
    pub prefix: String,
    /// Key of the new data file.
    pub data_file: String,
    /// Key of the new log entry.
    pub log_file: String,
    /// Rows in the data file.
    pub rows: usize,
    /// Size of the data file in bytes.
    pub bytes: u64,
    /// Schema inferred for the written rows.
    pub columns: Vec<Column>,
}

/// Writes rows as Parquet data files plus log entries under `{folder}/delta_datasets/`.
///
/// Writes to one table name are serialized by a per-name lock, so concurrent uploads that
/// target the same snapshot receive consecutive sequence numbers. Appends never read or merge
/// earlier data files and there is no conflict detection across processes.
pub struct SnapshotWriter {
    store: Arc<dyn BlobStore>,
    folder: String,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SnapshotWriter {
    /// Create a writer rooted at `folder` in `store`.
    pub fn new(store: Arc<dyn BlobStore>, folder: impl Into<String>) -> Self {
        Self {
            store,
            folder: folder.into().trim_end_matches('/').to_string(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Blob store receiving snapshots.
    pub fn store(&self) -> &Arc<dyn BlobStore> {
        &self.store
    }

    /// Root folder, without a trailing `/`.
    pub fn folder(&self) -> &str {
        &self.folder
    }

    /// Key prefix of `table`, ending in `/`.
    pub fn table_prefix(&self, table: &str) -> String {
        format!("{}/delta_datasets/{table}/", self.folder)
    }

    async fn lock_for(&self, table: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(table.to_string()).or_default().clone()
    }

    async fn sequences(&self, prefix: &str) -> Result<Vec<u64>, SnapshotError> {
        let listed = self.store.list(&format!("{prefix}{LOG_DIR}")).await?;
        let mut sequences: Vec<u64> = listed
            .iter()
            .filter_map(|object| parse_sequence(&object.key))
            .collect();
        sequences.sort_unstable();
        Ok(sequences)
    }

    /// Append `rows` to `table`, creating it when it has no log yet.
    pub async fn write(
        &self,
        table: &str,
        rows: Vec<Record>,
    ) -> Result<WriteReceipt, SnapshotError> {
        if rows.is_empty() {
            return Err(SnapshotError::Empty(table.to_string()));
        }
        let lock = self.lock_for(table).await;
        let _guard = lock.lock().await;

        let prefix = self.table_prefix(table);
        let (operation, sequence) = match self.sequences(&prefix).await?.last() {
            None => (Operation::Create, 0),
            Some(last) => (Operation::Append, last + 1),
        };
        self.commit(table, &prefix, operation, sequence, Frame::from_records(rows))
            .await
    }

    /// Write `rows` as a new table holding a single CREATE entry.
    ///
    /// Fails with [`SnapshotError::AlreadyExists`] when `table` already has a log, leaving
    /// its files untouched.
    pub async fn create(
        &self,
        table: &str,
        rows: Vec<Record>,
    ) -> Result<WriteReceipt, SnapshotError> {
        if rows.is_empty() {
            return Err(SnapshotError::Empty(table.to_string()));
        }
        let lock = self.lock_for(table).await;
        let _guard = lock.lock().await;

        let prefix = self.table_prefix(table);
        if !self.sequences(&prefix).await?.is_empty() {
            return Err(SnapshotError::AlreadyExists(table.to_string()));
        }
        self.commit(table, &prefix, Operation::Create, 0, Frame::from_records(rows))
            .await
    }

    async fn commit(
        &self,
        table: &str,
        prefix: &str,
        operation: Operation,
        sequence: u64,
        frame: Frame,
    ) -> Result<WriteReceipt, SnapshotError> {
        let parquet = encode_parquet(&frame)?;
        let bytes = parquet.len() as u64;
        let content_hash = hex::encode(Sha256::digest(&parquet));
        let txn_id = Uuid::new_v4().to_string();
        let table_id = Uuid::new_v4().to_string();
        let data_path = data_file_name(sequence, &content_hash, &txn_id);
        let timestamp_ms = (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64;

        let log = Commit {
            operation,
            frame: &frame,
            data_path: &data_path,
            data_size: bytes,
            table_id: &table_id,
            txn_id: &txn_id,
            timestamp_ms,
        }
        .render()?;

        let data_file = format!("{prefix}{data_path}");
        let log_file = log_key(prefix, sequence);
        self.store
            .put(&data_file, parquet, PARQUET_CONTENT_TYPE)
            .await?;
        self.store
            .put(&log_file, log.into_bytes(), LOG_CONTENT_TYPE)
            .await?;

        tracing::info!(
            table,
            operation = ?operation,
            sequence,
            rows = frame.len(),
            bytes,
            "Snapshot written"
        );
        Ok(WriteReceipt {
            table_name: table.to_string(),
            operation,
            sequence,
            location: self.store.uri(prefix),
            prefix: prefix.to_string(),
            data_file,
            log_file,
            rows: frame.len(),
            bytes,
            columns: frame.columns().to_vec(),
        })
    }

    /// Every log entry of `table` in sequence order.
    pub async fn history(&self, table: &str) -> Result<Vec<LogEntry>, SnapshotError> {
        let prefix = self.table_prefix(table);
        let mut entries = Vec::new();
        for sequence in self.sequences(&prefix).await? {
            let key = log_key(&prefix, sequence);
            let bytes = self.store.get(&key).await?;
            let text = String::from_utf8_lossy(&bytes);
            entries.push(LogEntry::parse(&key, &text)?);
        }
        Ok(entries)
    }

    /// Keys of the data files recorded in the log of `table`, in log order.
    pub async fn data_files(&self, table: &str) -> Result<Vec<String>, SnapshotError> {
        let prefix = self.table_prefix(table);
        Ok(self
            .history(table)
            .await?
            .into_iter()
            .filter_map(|entry| entry.added_file)
            .map(|file| format!("{prefix}{}", file.path))
            .collect())
    }
}
