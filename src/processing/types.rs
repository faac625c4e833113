//! Core data types and error definitions for the processing pipeline.

use crate::catalog::CatalogError;
use crate::completion::CompletionError;
use crate::extraction::ExtractionError;
use crate::metadata::MetadataError;
use crate::snapshot::{SnapshotError, SnapshotOutcome};
use crate::storage::StorageError;
use crate::tables::{TableMetrics, TablePreview};
use crate::vector::VectorError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors produced while turning text into chunks.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// Chunking was configured with a zero target size.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
}

/// Errors emitted by the document pipeline and its query surface.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Upload was rejected before processing.
    #[error("Invalid upload: {0}")]
    InvalidUpload(String),
    /// Referenced task does not exist.
    #[error("Task not found: {0}")]
    TaskNotFound(String),
    /// PDF could not be opened or decoded.
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    /// Chunking step failed.
    #[error("Failed to chunk document: {0}")]
    Chunking(#[from] ChunkingError),
    /// Snapshot write failed.
    #[error("Snapshot write failed: {0}")]
    Snapshot(#[from] SnapshotError),
    /// Blob store failed outside a snapshot write.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// Catalog could not be initialized.
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    /// Vector index failed.
    #[error(transparent)]
    Index(#[from] VectorError),
    /// Completion provider failed.
    #[error(transparent)]
    Completion(#[from] CompletionError),
    /// Metadata store failed.
    #[error(transparent)]
    Metadata(#[from] MetadataError),
    /// A background worker panicked or was cancelled.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Stable identifier reported to clients.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidUpload(_) => "invalid_request",
            Self::TaskNotFound(_) => "not_found",
            Self::Extraction(err) => err.kind(),
            Self::Chunking(_) => "chunking",
            Self::Snapshot(SnapshotError::Storage(_)) | Self::Storage(_) => "storage",
            Self::Snapshot(_) => "snapshot",
            Self::Catalog(_) => "catalog",
            Self::Index(_) => "index",
            Self::Completion(_) => "completion",
            Self::Metadata(MetadataError::NotFound(_)) => "not_found",
            Self::Metadata(_) => "metadata",
            Self::Internal(_) => "internal",
        }
    }

    /// Operator-facing hint, when one exists.
    pub fn remediation(&self) -> Option<&'static str> {
        match self {
            Self::Extraction(err) => err.remediation(),
            _ => None,
        }
    }

    /// Message shown on a failed task: a kind-specific prefix plus remediation.
    pub fn task_message(&self) -> String {
        let prefix = match self.kind() {
            "dependency" => "Missing dependency",
            "encryption" => "Encrypted PDF",
            _ => "Processing failed",
        };
        match self.remediation() {
            Some(hint) => format!("{prefix}: {self} | Solution: {hint}"),
            None => format!("{prefix}: {self}"),
        }
    }
}

/// One uploaded document.
#[derive(Debug, Clone)]
pub struct DocumentUpload {
    /// Original file name.
    pub filename: String,
    /// Uploading user.
    pub user_id: String,
    /// PDF bytes.
    pub bytes: Vec<u8>,
}

/// Result stored on a completed upload task.
#[derive(Debug, Clone, Serialize)]
pub struct UploadOutcome {
    /// Original file name.
    pub pdf_name: String,
    /// Metadata record id.
    pub pdf_id: String,
    /// Pages read.
    pub page_count: usize,
    /// Chunks sent to the vector index.
    pub chunks_created: usize,
    /// Table types that produced rows.
    pub tables_extracted: Vec<String>,
    /// Rows over every table.
    pub total_rows: usize,
    /// Table type to CSV location.
    pub csv_files: BTreeMap<String, String>,
    /// Snapshot key to table location.
    pub delta_files: BTreeMap<String, String>,
    /// Wall-clock processing time.
    pub processing_time_seconds: f64,
    /// `processing_time_seconds` rendered for humans.
    pub processing_time_formatted: String,
}

/// Summary of the text extraction step.
#[derive(Debug, Clone, Serialize)]
#[allow(missing_docs)]
pub struct PdfInfo {
    pub page_count: usize,
    pub total_chars: usize,
    pub total_words: usize,
    pub failed_pages: Vec<u32>,
}

/// Result of a synchronous table run.
#[derive(Debug, Clone, Serialize)]
pub struct TableRunOutcome {
    /// Original file name.
    pub pdf_name: String,
    /// Text extraction summary.
    pub pdf_info: PdfInfo,
    /// Table types that produced rows, in request order.
    pub tables_extracted: Vec<String>,
    /// Rows per table type.
    pub tables_data: BTreeMap<String, TablePreview>,
    /// Extraction provenance.
    pub metrics: TableMetrics,
    /// CSV exports and snapshots written.
    pub snapshots: SnapshotOutcome,
    /// When the run finished (RFC 3339).
    pub processing_date: String,
}

/// Semantic search parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchRequest {
    /// Query text.
    pub question: String,
    /// Restrict to one document.
    #[serde(default)]
    pub pdf_name: Option<String>,
    /// Restrict to one tenant.
    #[serde(default)]
    pub user_id: Option<String>,
    /// Maximum number of matches.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

fn default_top_k() -> usize {
    5
}

/// Grounded chat parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    /// User question.
    pub message: String,
    /// Restrict retrieval to one document.
    #[serde(default)]
    pub pdf_name: Option<String>,
    /// Asking user.
    #[serde(default)]
    pub user_id: Option<String>,
    /// Chunks retrieved as context.
    #[serde(default = "default_context_chunks")]
    pub max_context_chunks: usize,
}

fn default_context_chunks() -> usize {
    5
}

/// One retrieved chunk cited by an answer.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChatSource {
    /// Leading excerpt of the chunk.
    pub text: String,
    /// Document the chunk came from.
    pub pdf_name: String,
    /// Position of the chunk in its document.
    pub chunk_index: u64,
    /// Similarity reported by the index.
    pub similarity_score: f64,
}

/// Answer to a chat request.
#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    /// Stored chat record id, when the interaction was recorded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
    /// Question as asked.
    pub message: String,
    /// Generated or fallback answer.
    pub response: String,
    /// Whether retrieved context backed the answer.
    pub context_used: bool,
    /// Chunks used as context.
    pub sources: Vec<ChatSource>,
    /// Retrieval details.
    pub metadata: Map<String, Value>,
}

/// One listed artifact.
#[derive(Debug, Clone, Serialize)]
#[allow(missing_docs)]
pub struct FileEntry {
    pub key: String,
    pub size: u64,
    pub last_modified: Option<String>,
    pub url: String,
}

/// Artifacts under one sub-folder.
#[derive(Debug, Clone, Serialize)]
#[allow(missing_docs)]
pub struct FileListing {
    pub bucket: String,
    pub folder: String,
    pub files: Vec<FileEntry>,
    pub total_files: usize,
}
