//! Key-value metadata: per-document records, chat interactions, and feedback.
//!
//! Records are keyed by generated ids and queried by user (the secondary index). Chat records
//! are append-only apart from a single feedback update.

mod memory;

pub use memory::InMemoryMetadataStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors returned by metadata stores.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// Referenced record does not exist.
    #[error("Record not found: {0}")]
    NotFound(String),
    /// Backend could not be reached.
    #[error("Metadata store unavailable: {0}")]
    Unavailable(String),
}

/// Metadata of one processed document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentRecord {
    /// Generated identifier.
    pub pdf_id: String,
    /// Owner of the upload.
    pub user_id: String,
    /// Original file name.
    pub pdf_name: String,
    /// Pages read from the document.
    pub page_count: usize,
    /// Chunks sent to the vector index.
    pub chunk_count: usize,
    /// Table types that produced rows.
    pub tables: Vec<String>,
    /// Wall-clock processing time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_time_seconds: Option<f64>,
    /// `processing_time_seconds` rendered for humans.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_time_formatted: Option<String>,
    /// Insertion time (RFC 3339).
    pub created_at: String,
}

/// Fields supplied when saving a document record.
#[derive(Debug, Clone, Default)]
#[allow(missing_docs)]
pub struct NewDocument {
    pub user_id: String,
    pub pdf_name: String,
    pub page_count: usize,
    pub chunk_count: usize,
    pub tables: Vec<String>,
    pub processing_time_seconds: Option<f64>,
}

/// Rating attached to an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rating {
    /// The answer helped.
    Positive,
    /// The answer did not help.
    Negative,
}

/// Feedback on one chat answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Feedback {
    /// Rating given.
    pub rating: Rating,
    /// Optional free-text comment.
    pub comment: String,
    /// When the feedback was recorded (RFC 3339).
    pub feedback_date: String,
}

/// One question and its grounded answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRecord {
    /// Generated identifier.
    pub chat_id: String,
    /// Asking user.
    pub user_id: String,
    /// Document the question was scoped to, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdf_name: Option<String>,
    /// Question text.
    pub question: String,
    /// Answer text.
    pub answer: String,
    /// Creation time (RFC 3339).
    pub timestamp: String,
    /// Retrieval details (sources, model).
    pub metadata: Map<String, Value>,
    /// Feedback, once given.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<Feedback>,
}

/// Fields supplied when recording a chat interaction.
#[derive(Debug, Clone, Default)]
#[allow(missing_docs)]
pub struct NewChat {
    pub user_id: String,
    pub pdf_name: Option<String>,
    pub question: String,
    pub answer: String,
    pub metadata: Map<String, Value>,
}

/// Black-box metadata persistence.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Save a document record and return it with its generated id.
    async fn put_document(&self, document: NewDocument) -> Result<DocumentRecord, MetadataError>;

    /// Documents owned by `user_id`, newest first.
    async fn list_documents(&self, user_id: &str) -> Result<Vec<DocumentRecord>, MetadataError>;

    /// Append a chat interaction.
    async fn record_chat(&self, chat: NewChat) -> Result<ChatRecord, MetadataError>;

    /// Attach feedback to an existing chat record, replacing earlier feedback.
    async fn add_feedback(
        &self,
        chat_id: &str,
        rating: Rating,
        comment: String,
    ) -> Result<ChatRecord, MetadataError>;

    /// Up to `limit` chats of `user_id`, newest first.
    async fn chat_history(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<ChatRecord>, MetadataError>;
}
