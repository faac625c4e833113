use super::{
    ChatRecord, DocumentRecord, Feedback, MetadataError, MetadataStore, NewChat, NewDocument,
    Rating,
};
use crate::clock;
use crate::processing::format_processing_time;
use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Process-local metadata store. Contents are lost on restart.
#[derive(Default)]
pub struct InMemoryMetadataStore {
    documents: RwLock<Vec<DocumentRecord>>,
    chats: RwLock<Vec<ChatRecord>>,
}

impl InMemoryMetadataStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn put_document(&self, document: NewDocument) -> Result<DocumentRecord, MetadataError> {
        let record = DocumentRecord {
            pdf_id: Uuid::new_v4().to_string(),
            user_id: document.user_id,
            pdf_name: document.pdf_name,
            page_count: document.page_count,
            chunk_count: document.chunk_count,
            tables: document.tables,
            processing_time_formatted: document.processing_time_seconds.map(format_processing_time),
            processing_time_seconds: document.processing_time_seconds,
            created_at: clock::current_timestamp_rfc3339(),
        };
        tracing::debug!(
            pdf_id = %record.pdf_id,
            pdf_name = %record.pdf_name,
            "Document metadata saved"
        );
        self.documents.write().await.push(record.clone());
        Ok(record)
    }

    async fn list_documents(&self, user_id: &str) -> Result<Vec<DocumentRecord>, MetadataError> {
        let documents = self.documents.read().await;
        Ok(documents
            .iter()
            .rev()
            .filter(|record| record.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn record_chat(&self, chat: NewChat) -> Result<ChatRecord, MetadataError> {
        let record = ChatRecord {
            chat_id: Uuid::new_v4().to_string(),
            user_id: chat.user_id,
            pdf_name: chat.pdf_name,
            question: chat.question,
            answer: chat.answer,
            timestamp: clock::current_timestamp_rfc3339(),
            metadata: chat.metadata,
            feedback: None,
        };
        tracing::debug!(chat_id = %record.chat_id, user_id = %record.user_id, "Chat recorded");
        self.chats.write().await.push(record.clone());
        Ok(record)
    }

    async fn add_feedback(
        &self,
        chat_id: &str,
        rating: Rating,
        comment: String,
    ) -> Result<ChatRecord, MetadataError> {
        let mut chats = self.chats.write().await;
        let record = chats
            .iter_mut()
            .find(|record| record.chat_id == chat_id)
            .ok_or_else(|| MetadataError::NotFound(chat_id.to_string()))?;
        record.feedback = Some(Feedback {
            rating,
            comment,
            feedback_date: clock::current_timestamp_rfc3339(),
        });
        tracing::info!(chat_id, rating = ?rating, "Feedback saved");
        Ok(record.clone())
    }

    async fn chat_history(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<ChatRecord>, MetadataError> {
        let chats = self.chats.read().await;
        Ok(chats
            .iter()
            .rev()
            .filter(|record| record.user_id == user_id)
            .take(limit)
            .cloned()
            .collect())
    }
}
