//! Versioned table snapshots: Parquet data files plus an append-only JSON transaction log.
//!
//! Layout under the configured folder:
//!
//! ```text
//! {folder}/delta_datasets/{table}/part-00000-<hash>-<txn>-c000.snappy.parquet
//! {folder}/delta_datasets/{table}/_delta_log/00000000000000000000.json
//! {folder}/delta_datasets/{table}/_symlink_format_manifest
//! {folder}/csv/{document}_{table_type}_{stamp}.csv
//! ```

mod columnar;
mod derived;
mod enrich;
mod export;
mod frame;
pub mod log;
mod pipeline;
mod writer;

pub use columnar::encode_parquet;
pub use derived::{
    ValueMatcher, WordOverlapMatcher, can_derive_cash_flow, can_derive_product_values, cash_flow,
    product_values,
};
pub use enrich::{Provenance, enrich_primary, row_hash};
pub use export::{export_tables, render_csv};
pub use frame::{Column, ColumnType, Frame};
pub use log::{LogEntry, Operation};
pub use pipeline::{
    FIXED_INCOME_TABLE, INVESTMENT_TABLE, SnapshotOutcome, SnapshotPipeline, SnapshotReport,
};
pub use writer::{PARQUET_CONTENT_TYPE, SnapshotWriter, WriteReceipt};

use crate::storage::StorageError;
use thiserror::Error;

/// Errors raised while writing or reading snapshots.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// No rows were given for a write.
    #[error("No rows to write to table '{0}'")]
    Empty(String),
    /// A fresh table was requested under a name that already has a log.
    #[error("Table '{0}' already exists")]
    AlreadyExists(String),
    /// Building the columnar batch failed.
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),
    /// Encoding the Parquet file failed.
    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),
    /// A log entry could not be rendered or parsed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// CSV rendering failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    /// A log entry is structurally invalid.
    #[error("Corrupt log entry '{key}': {reason}")]
    CorruptLog {
        /// Key of the entry.
        key: String,
        /// What is wrong with it.
        reason: String,
    },
    /// The blob store failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
}
