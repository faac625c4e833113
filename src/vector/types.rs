//! Shared types used by the vector index client.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::time::Duration;
use thiserror::Error;

/// Errors returned while interacting with the vector index service.
#[derive(Debug, Error)]
pub enum VectorError {
    /// Base URL failed to parse or normalize.
    #[error("Invalid vector service URL: {0}")]
    InvalidUrl(String),
    /// Service could not be reached.
    #[error("Vector service unavailable: {0}")]
    Unavailable(String),
    /// Service did not answer within the configured timeout.
    #[error("Vector request timed out after {0:?}")]
    Timeout(Duration),
    /// Service responded with an unexpected status code.
    #[error("Unexpected vector service response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the service.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// Response body could not be decoded.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}

impl VectorError {
    /// Whether the caller may retry the same request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Unavailable(_))
    }
}

/// One document sent to the index.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct IndexDocument {
    /// Chunk text.
    pub text: String,
    /// Exact-match metadata stored next to the embedding.
    pub metadata: Map<String, Value>,
    /// Stable identifier (`{pdf_name}_chunk_{index}`).
    pub chunk_id: String,
}

/// Columnar query response as returned by the service.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct QueryResult {
    /// Matched document texts.
    #[serde(default)]
    pub documents: Vec<String>,
    /// Metadata per match.
    #[serde(default)]
    pub metadatas: Vec<Map<String, Value>>,
    /// Distance per match. Lower is closer.
    #[serde(default)]
    pub distances: Vec<f64>,
    /// Identifier per match.
    #[serde(default)]
    pub ids: Vec<String>,
}

/// One match, zipped out of a [`QueryResult`].
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SearchHit {
    /// Chunk text.
    pub text: String,
    /// Stored metadata.
    pub metadata: Map<String, Value>,
    /// Distance reported by the index.
    pub score: f64,
    /// Chunk identifier.
    pub id: String,
}

impl QueryResult {
    /// Zip the parallel columns into hits. Missing entries default to empty values.
    pub fn into_hits(self) -> Vec<SearchHit> {
        let QueryResult {
            documents,
            mut metadatas,
            distances,
            mut ids,
        } = self;
        metadatas.resize_with(documents.len(), Map::new);
        ids.resize_with(documents.len(), String::new);

        documents
            .into_iter()
            .zip(metadatas)
            .zip(ids)
            .enumerate()
            .map(|(position, ((text, metadata), id))| SearchHit {
                text,
                metadata,
                score: distances.get(position).copied().unwrap_or(0.0),
                id,
            })
            .collect()
    }
}

/// Exact-match restriction on chunk metadata. An empty filter searches everything.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct MetadataFilter {
    /// Restrict to one document.
    pub pdf_name: Option<String>,
    /// Restrict to one tenant.
    pub user_id: Option<String>,
}

impl MetadataFilter {
    /// Render as a `where` clause, or `None` when unrestricted. Several conditions are
    /// combined with `$and`.
    pub fn to_where(&self) -> Option<Value> {
        let mut conditions = Vec::new();
        if let Some(pdf_name) = self.pdf_name.as_deref().filter(|v| !v.is_empty()) {
            conditions.push(json!({ "pdf_name": pdf_name }));
        }
        if let Some(user_id) = self.user_id.as_deref().filter(|v| !v.is_empty()) {
            conditions.push(json!({ "user_id": user_id }));
        }
        match conditions.len() {
            0 => None,
            1 => conditions.pop(),
            _ => Some(json!({ "$and": conditions })),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct HealthResponse {
    #[serde(default)]
    pub(crate) status: String,
}
