//! Vector index boundary: document insertion, filtered similarity queries, and health.

mod client;
mod types;

pub use client::HttpVectorIndex;
pub use types::{IndexDocument, MetadataFilter, QueryResult, SearchHit, VectorError};

use crate::processing::chunking::Chunk;
use async_trait::async_trait;
use serde_json::{Map, Value};

/// Black-box embedding index.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert documents into `collection`, returning how many were sent.
    async fn add(
        &self,
        collection: &str,
        documents: Vec<IndexDocument>,
    ) -> Result<usize, VectorError>;

    /// Return up to `n_results` matches for `query_text`. `filter` is an exact-match `where`
    /// clause; `None` searches the whole collection.
    async fn query(
        &self,
        collection: &str,
        query_text: &str,
        n_results: usize,
        filter: Option<Value>,
    ) -> Result<QueryResult, VectorError>;

    /// Whether the service reports itself healthy. Never fails.
    async fn health(&self) -> bool;
}

/// Identifier of chunk `index` of `pdf_name`.
pub fn chunk_id(pdf_name: &str, index: usize) -> String {
    format!("{pdf_name}_chunk_{index}")
}

/// Prepare `chunks` of one document for insertion.
pub fn chunk_documents(
    pdf_name: &str,
    chunks: &[Chunk],
    user_id: Option<&str>,
    indexed_at: &str,
) -> Vec<IndexDocument> {
    chunks
        .iter()
        .map(|chunk| {
            let mut metadata = Map::new();
            metadata.insert("pdf_name".into(), Value::from(pdf_name));
            metadata.insert("chunk_index".into(), Value::from(chunk.index));
            metadata.insert("chunk_type".into(), Value::from("text"));
            metadata.insert("total_chunks".into(), Value::from(chunks.len()));
            metadata.insert("indexed_at".into(), Value::from(indexed_at));
            if let Some(user_id) = user_id {
                metadata.insert("user_id".into(), Value::from(user_id));
            }
            IndexDocument {
                text: chunk.text.clone(),
                metadata,
                chunk_id: chunk_id(pdf_name, chunk.index),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::chunking::{ChunkingParams, chunk_text};

    #[test]
    fn documents_carry_tenant_and_position() {
        let text = "Cláusula primeira. ".repeat(120);
        let chunks = chunk_text(&text, "c.pdf", ChunkingParams::default()).expect("chunks");
        let documents = chunk_documents("c.pdf", &chunks, Some("u1"), "2025-01-01T00:00:00Z");

        assert_eq!(documents.len(), chunks.len());
        let last = documents.last().unwrap();
        assert_eq!(last.chunk_id, format!("c.pdf_chunk_{}", chunks.len() - 1));
        assert_eq!(last.metadata["user_id"], "u1");
        assert_eq!(last.metadata["total_chunks"], Value::from(chunks.len()));
        assert_eq!(last.metadata["chunk_type"], "text");
    }
}
