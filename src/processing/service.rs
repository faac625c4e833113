//! Pipeline service coordinating extraction, table snapshots, chunk indexing, and chat.

use crate::{
    catalog::{CatalogRegistrar, build_catalog},
    clock,
    completion::{CompletionClient, build_completion_client},
    config::Config,
    extraction::{ExtractedDocument, extract_pdf},
    metadata::{
        ChatRecord, DocumentRecord, InMemoryMetadataStore, MetadataStore, NewChat, NewDocument,
        Rating,
    },
    metrics::{MetricsSnapshot, PipelineMetrics},
    processing::{
        chat,
        chunking::{ChunkingParams, chunk_text},
        tasks::{SweepReport, TaskRecord, TaskStatus, TaskStore, format_processing_time},
        types::{
            ChatRequest, ChatResponse, DocumentUpload, FileEntry, FileListing, PdfInfo,
            PipelineError, SearchRequest, TableRunOutcome, UploadOutcome,
        },
    },
    snapshot::{SnapshotPipeline, SnapshotWriter},
    storage::{BlobStore, build_blob_store},
    tables::{TableExtraction, TableExtractor, TableKind, TablePreview},
    vector::{HttpVectorIndex, MetadataFilter, SearchHit, VectorIndex, chunk_documents},
};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

/// External collaborators used by the pipeline.
#[derive(Clone)]
pub struct PipelineComponents {
    /// Completion model for table extraction and chat.
    pub completion: Arc<dyn CompletionClient>,
    /// Vector index receiving chunks.
    pub index: Arc<dyn VectorIndex>,
    /// Blob store for exports and listings.
    pub store: Arc<dyn BlobStore>,
    /// Snapshot writer plus registrar.
    pub snapshots: Arc<SnapshotPipeline>,
    /// Document and chat metadata.
    pub metadata: Arc<dyn MetadataStore>,
}

/// Tunables read from configuration.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Chunk geometry.
    pub chunking: ChunkingParams,
    /// Collection receiving chunks.
    pub collection: String,
    /// Table types extracted when a request names none.
    pub target_tables: Vec<String>,
    /// Key prefix of every artifact.
    pub folder: String,
    /// Background units allowed to run at once.
    pub worker_pool_size: usize,
    /// Age after which task records are swept.
    pub task_max_age: Duration,
}

impl PipelineSettings {
    /// Settings taken from `config`.
    pub fn from_config(config: &Config) -> Self {
        Self {
            chunking: ChunkingParams {
                chunk_size: config.chunk_size,
                overlap: config.chunk_overlap,
                min_chunk_size: config.min_chunk_size,
            },
            collection: config.vector_collection.clone(),
            target_tables: config.target_tables.clone(),
            folder: config.storage_folder.trim_end_matches('/').to_string(),
            worker_pool_size: config.worker_pool_size.max(1),
            task_max_age: Duration::from_secs(config.task_max_age_secs),
        }
    }
}

/// Abstraction over the pipeline used by the HTTP surface.
#[async_trait]
pub trait ProcessingApi: Send + Sync {
    /// Accept an upload for background processing and return its task id.
    async fn submit_upload(&self, upload: DocumentUpload) -> Result<String, PipelineError>;

    /// Extract tables from a PDF and write exports and snapshots before returning.
    async fn process_tables(
        &self,
        filename: &str,
        bytes: Vec<u8>,
        target_tables: Option<Vec<String>>,
    ) -> Result<TableRunOutcome, PipelineError>;

    /// Status record of one task.
    async fn task(&self, task_id: &str) -> Option<TaskRecord>;

    /// Every task record.
    async fn tasks(&self) -> BTreeMap<String, TaskRecord>;

    /// Remove stale task records.
    async fn sweep_tasks(&self) -> SweepReport;

    /// Mark a task completed regardless of state.
    async fn force_complete(&self, task_id: &str) -> Result<TaskRecord, PipelineError>;

    /// Semantic search over indexed chunks.
    async fn query(&self, request: SearchRequest) -> Result<Vec<SearchHit>, PipelineError>;

    /// Answer a question from retrieved chunks.
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, PipelineError>;

    /// Attach feedback to a recorded answer.
    async fn feedback(
        &self,
        chat_id: &str,
        rating: Rating,
        comment: String,
    ) -> Result<ChatRecord, PipelineError>;

    /// Documents processed for `user_id`.
    async fn documents(&self, user_id: &str) -> Result<Vec<DocumentRecord>, PipelineError>;

    /// Recent chats of `user_id`.
    async fn chat_history(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<ChatRecord>, PipelineError>;

    /// Artifacts stored under `{folder}/{sub_folder}/`.
    async fn list_files(&self, sub_folder: &str) -> Result<FileListing, PipelineError>;

    /// Whether the vector index reports healthy.
    async fn index_healthy(&self) -> bool;

    /// Current pipeline counters.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

/// Runs uploads through extraction, table snapshots, and chunk indexing.
///
/// Uploads are processed in the background on at most `worker_pool_size` concurrent units;
/// excess uploads wait for a permit. Cloning is cheap and clones share all state.
#[derive(Clone)]
pub struct PipelineService {
    components: PipelineComponents,
    settings: Arc<PipelineSettings>,
    tasks: TaskStore,
    workers: Arc<Semaphore>,
    metrics: Arc<PipelineMetrics>,
}

impl PipelineService {
    /// Service over explicit collaborators.
    pub fn new(components: PipelineComponents, settings: PipelineSettings) -> Self {
        Self {
            tasks: TaskStore::new(settings.task_max_age),
            workers: Arc::new(Semaphore::new(settings.worker_pool_size.max(1))),
            metrics: Arc::new(PipelineMetrics::new()),
            settings: Arc::new(settings),
            components,
        }
    }

    /// Build every collaborator from configuration.
    ///
    /// An unreachable vector index is logged and tolerated; requests that need it fail later.
    pub async fn from_config(config: &Config) -> Result<Self, PipelineError> {
        let settings = PipelineSettings::from_config(config);
        let completion = build_completion_client(config)?;
        let index: Arc<dyn VectorIndex> = Arc::new(HttpVectorIndex::new(config)?);
        let store = build_blob_store(config)?;
        let catalog = build_catalog(config)?;

        let writer = Arc::new(SnapshotWriter::new(store.clone(), settings.folder.clone()));
        let registrar = Arc::new(CatalogRegistrar::new(
            store.clone(),
            catalog,
            config.catalog_database.clone(),
        ));
        let snapshots = Arc::new(SnapshotPipeline::new(writer, registrar));

        if index.health().await {
            tracing::info!(url = %config.vector_url, "Vector index reachable");
        } else {
            tracing::warn!(url = %config.vector_url, "Vector index unreachable at startup");
        }

        Ok(Self::new(
            PipelineComponents {
                completion,
                index,
                store,
                snapshots,
                metadata: Arc::new(InMemoryMetadataStore::new()),
            },
            settings,
        ))
    }

    /// Shared task store.
    pub fn task_store(&self) -> &TaskStore {
        &self.tasks
    }

    fn table_kinds(&self, requested: Option<Vec<String>>) -> Vec<TableKind> {
        let ids = requested
            .filter(|ids| !ids.is_empty())
            .unwrap_or_else(|| self.settings.target_tables.clone());
        ids.iter().map(|id| TableKind::parse(id)).collect()
    }

    async fn extract(&self, bytes: Vec<u8>) -> Result<ExtractedDocument, PipelineError> {
        let document = tokio::task::spawn_blocking(move || extract_pdf(&bytes))
            .await
            .map_err(|err| PipelineError::Internal(err.to_string()))??;
        tracing::info!(
            pages = document.page_count,
            chars = document.total_chars,
            failed_pages = document.failed_pages().count(),
            "Text extracted"
        );
        Ok(document)
    }

    async fn extract_tables(&self, text: &str, kinds: &[TableKind]) -> TableExtraction {
        let extraction = TableExtractor::new(self.components.completion.clone())
            .extract(text, kinds)
            .await;
        self.metrics.record_rows(extraction.total_rows() as u64);
        extraction
    }

    /// Process one upload end to end, reporting progress on `task_id`.
    async fn process_upload(
        &self,
        task_id: &str,
        upload: &DocumentUpload,
        started: Instant,
    ) -> Result<UploadOutcome, PipelineError> {
        let filename = upload.filename.as_str();
        self.tasks
            .update(task_id, TaskStatus::Processing, 20, format!("Processing {filename}..."), None)
            .await;
        let document = self.extract(upload.bytes.clone()).await?;

        self.tasks
            .update(
                task_id,
                TaskStatus::Processing,
                50,
                format!("Extracting tables from {filename}..."),
                None,
            )
            .await;
        let kinds = self.table_kinds(None);
        let extraction = self.extract_tables(&document.full_text, &kinds).await;
        let snapshots = self
            .components
            .snapshots
            .run(&extraction, filename)
            .await?;
        self.metrics
            .record_snapshots(snapshots.snapshots.len() as u64);

        self.tasks
            .update(task_id, TaskStatus::Processing, 70, format!("Indexing {filename}..."), None)
            .await;
        let chunks = chunk_text(&document.full_text, filename, self.settings.chunking)?;
        let documents = chunk_documents(
            filename,
            &chunks,
            Some(upload.user_id.as_str()),
            &clock::current_timestamp_rfc3339(),
        );
        if documents.is_empty() {
            tracing::warn!(filename, "No text to index");
        } else {
            self.components
                .index
                .add(&self.settings.collection, documents)
                .await?;
        }

        let tables_extracted: Vec<String> = extraction
            .tables
            .iter()
            .map(|table| table.table_type().to_string())
            .collect();
        let elapsed = started.elapsed().as_secs_f64();
        let record = self
            .components
            .metadata
            .put_document(NewDocument {
                user_id: upload.user_id.clone(),
                pdf_name: filename.to_string(),
                page_count: document.page_count,
                chunk_count: chunks.len(),
                tables: tables_extracted.clone(),
                processing_time_seconds: Some(elapsed),
            })
            .await?;
        self.metrics.record_document(chunks.len() as u64);

        Ok(UploadOutcome {
            pdf_name: filename.to_string(),
            pdf_id: record.pdf_id,
            page_count: document.page_count,
            chunks_created: chunks.len(),
            tables_extracted,
            total_rows: extraction.total_rows(),
            csv_files: snapshots.csv_files.clone(),
            delta_files: snapshots.locations(),
            processing_time_seconds: elapsed,
            processing_time_formatted: format_processing_time(elapsed),
        })
    }

    /// Background unit: waits for a worker permit, then runs the upload to a terminal state.
    async fn run_upload(self, task_id: String, upload: DocumentUpload) {
        let _permit = match self.workers.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(err) => {
                self.metrics.record_failure();
                self.tasks
                    .update(
                        &task_id,
                        TaskStatus::Error,
                        0,
                        format!("Worker pool closed: {err}"),
                        None,
                    )
                    .await;
                return;
            }
        };
        let started = Instant::now();

        match self.process_upload(&task_id, &upload, started).await {
            Ok(outcome) => {
                let message = format!(
                    "Processing finished in {}: {} tables extracted, {} CSV files and {} snapshots written.",
                    outcome.processing_time_formatted,
                    outcome.tables_extracted.len(),
                    outcome.csv_files.len(),
                    outcome.delta_files.len(),
                );
                let result = serde_json::to_value(&outcome).ok();
                self.tasks
                    .update(&task_id, TaskStatus::Completed, 100, message, result)
                    .await;
            }
            Err(err) => {
                self.metrics.record_failure();
                tracing::error!(
                    task_id = %task_id,
                    filename = %upload.filename,
                    kind = err.kind(),
                    error = %err,
                    "Upload processing failed"
                );
                self.tasks
                    .update(&task_id, TaskStatus::Error, 0, err.task_message(), None)
                    .await;
            }
        }
    }

    /// Accept `upload` and process it in the background.
    pub async fn submit_upload(&self, upload: DocumentUpload) -> Result<String, PipelineError> {
        if !upload.filename.to_lowercase().ends_with(".pdf") {
            return Err(PipelineError::InvalidUpload(
                "only PDF files are accepted".to_string(),
            ));
        }
        let task_id = self
            .tasks
            .create(format!("Starting processing of {}...", upload.filename))
            .await;
        tokio::spawn(self.clone().run_upload(task_id.clone(), upload));
        Ok(task_id)
    }

    /// Extract tables synchronously and write their exports and snapshots.
    pub async fn process_tables(
        &self,
        filename: &str,
        bytes: Vec<u8>,
        target_tables: Option<Vec<String>>,
    ) -> Result<TableRunOutcome, PipelineError> {
        if !filename.to_lowercase().ends_with(".pdf") {
            return Err(PipelineError::InvalidUpload(
                "only PDF files are accepted".to_string(),
            ));
        }
        let document = self.extract(bytes).await?;
        let kinds = self.table_kinds(target_tables);
        let extraction = self.extract_tables(&document.full_text, &kinds).await;
        let snapshots = self
            .components
            .snapshots
            .run(&extraction, filename)
            .await?;
        self.metrics
            .record_snapshots(snapshots.snapshots.len() as u64);

        Ok(TableRunOutcome {
            pdf_name: filename.to_string(),
            pdf_info: PdfInfo {
                page_count: document.page_count,
                total_chars: document.total_chars,
                total_words: document.total_words,
                failed_pages: document.failed_pages().map(|page| page.page_number).collect(),
            },
            tables_extracted: extraction
                .tables
                .iter()
                .map(|table| table.table_type().to_string())
                .collect(),
            tables_data: extraction
                .tables
                .iter()
                .map(|table| (table.table_type().to_string(), TablePreview::of(table)))
                .collect(),
            metrics: extraction.metrics,
            snapshots,
            processing_date: clock::current_timestamp_rfc3339(),
        })
    }

    /// Semantic search restricted by the request's filters.
    pub async fn query(&self, request: SearchRequest) -> Result<Vec<SearchHit>, PipelineError> {
        let filter = MetadataFilter {
            pdf_name: request.pdf_name,
            user_id: request.user_id,
        };
        let result = self
            .components
            .index
            .query(
                &self.settings.collection,
                &request.question,
                request.top_k.max(1),
                filter.to_where(),
            )
            .await?;
        Ok(result.into_hits())
    }

    /// Retrieve context, ask the completion model, and record the interaction.
    ///
    /// A failed completion call falls back to quoting the retrieved chunks.
    pub async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, PipelineError> {
        let pdf_name = request.pdf_name.filter(|name| !name.is_empty());
        let user_id = request.user_id.filter(|id| !id.is_empty());
        let hits = self
            .query(SearchRequest {
                question: request.message.clone(),
                pdf_name: pdf_name.clone(),
                user_id: user_id.clone(),
                top_k: request.max_context_chunks,
            })
            .await?;

        let mut metadata = Map::new();
        if let Some(user_id) = &user_id {
            metadata.insert("user_id".into(), Value::from(user_id.as_str()));
        }
        if hits.is_empty() {
            return Ok(ChatResponse {
                chat_id: None,
                response: chat::no_context_answer(pdf_name.as_deref()),
                message: request.message,
                context_used: false,
                sources: Vec::new(),
                metadata,
            });
        }

        let prompt = chat::grounded_prompt(&request.message, pdf_name.as_deref(), &hits);
        let answer = match self.components.completion.invoke(&prompt).await {
            Ok(answer) if !answer.trim().is_empty() => answer.trim().to_string(),
            Ok(_) => chat::fallback_answer(&request.message, &hits),
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    retryable = err.is_retryable(),
                    "Chat completion failed, answering from context"
                );
                chat::fallback_answer(&request.message, &hits)
            }
        };
        let sources = chat::sources(&hits, pdf_name.as_deref());
        metadata.insert("chunks_used".into(), Value::from(hits.len()));
        metadata.insert(
            "model_used".into(),
            Value::from(self.components.completion.model_name()),
        );

        let record = self
            .components
            .metadata
            .record_chat(NewChat {
                user_id: user_id.clone().unwrap_or_default(),
                pdf_name: pdf_name.clone(),
                question: request.message.clone(),
                answer: answer.clone(),
                metadata: metadata.clone(),
            })
            .await?;

        Ok(ChatResponse {
            chat_id: Some(record.chat_id),
            message: request.message,
            response: answer,
            context_used: true,
            sources,
            metadata,
        })
    }

    /// List artifacts under `{folder}/{sub_folder}/`.
    pub async fn list_files(&self, sub_folder: &str) -> Result<FileListing, PipelineError> {
        let folder = format!("{}/{}", self.settings.folder, sub_folder.trim_matches('/'));
        let objects = self
            .components
            .store
            .list(&format!("{folder}/"))
            .await?;
        let files: Vec<FileEntry> = objects
            .into_iter()
            .map(|object| FileEntry {
                url: self.components.store.uri(&object.key),
                key: object.key,
                size: object.size,
                last_modified: object.modified,
            })
            .collect();
        Ok(FileListing {
            bucket: self.components.store.bucket().to_string(),
            folder,
            total_files: files.len(),
            files,
        })
    }
}

#[async_trait]
impl ProcessingApi for PipelineService {
    async fn submit_upload(&self, upload: DocumentUpload) -> Result<String, PipelineError> {
        PipelineService::submit_upload(self, upload).await
    }

    async fn process_tables(
        &self,
        filename: &str,
        bytes: Vec<u8>,
        target_tables: Option<Vec<String>>,
    ) -> Result<TableRunOutcome, PipelineError> {
        PipelineService::process_tables(self, filename, bytes, target_tables).await
    }

    async fn task(&self, task_id: &str) -> Option<TaskRecord> {
        self.tasks.get(task_id).await
    }

    async fn tasks(&self) -> BTreeMap<String, TaskRecord> {
        self.tasks.all().await
    }

    async fn sweep_tasks(&self) -> SweepReport {
        self.tasks.sweep().await
    }

    async fn force_complete(&self, task_id: &str) -> Result<TaskRecord, PipelineError> {
        self.tasks
            .force_complete(task_id)
            .await
            .ok_or_else(|| PipelineError::TaskNotFound(task_id.to_string()))
    }

    async fn query(&self, request: SearchRequest) -> Result<Vec<SearchHit>, PipelineError> {
        PipelineService::query(self, request).await
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, PipelineError> {
        PipelineService::chat(self, request).await
    }

    async fn feedback(
        &self,
        chat_id: &str,
        rating: Rating,
        comment: String,
    ) -> Result<ChatRecord, PipelineError> {
        Ok(self
            .components
            .metadata
            .add_feedback(chat_id, rating, comment)
            .await?)
    }

    async fn documents(&self, user_id: &str) -> Result<Vec<DocumentRecord>, PipelineError> {
        Ok(self.components.metadata.list_documents(user_id).await?)
    }

    async fn chat_history(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<ChatRecord>, PipelineError> {
        Ok(self.components.metadata.chat_history(user_id, limit).await?)
    }

    async fn list_files(&self, sub_folder: &str) -> Result<FileListing, PipelineError> {
        PipelineService::list_files(self, sub_folder).await
    }

    async fn index_healthy(&self) -> bool {
        self.components.index.health().await
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::NoopCatalog;
    use crate::completion::CompletionError;
    use crate::storage::MemoryBlobStore;
    use crate::vector::{IndexDocument, QueryResult, VectorError};
    use tokio::sync::Mutex;

    struct EchoCompletion {
        fail: bool,
    }

    #[async_trait]
    impl CompletionClient for EchoCompletion {
        async fn invoke(&self, _prompt: &str) -> Result<String, CompletionError> {
            if self.fail {
                Err(CompletionError::Timeout(Duration::from_secs(1)))
            } else {
                Ok("O valor total é R$ 10.000.".into())
            }
        }

        fn model_name(&self) -> &str {
            "echo"
        }
    }

    #[derive(Default)]
    struct FixedIndex {
        hits: Vec<(String, String)>,
        filters: Mutex<Vec<Option<Value>>>,
    }

    #[async_trait]
    impl VectorIndex for FixedIndex {
        async fn add(
            &self,
            _collection: &str,
            documents: Vec<IndexDocument>,
        ) -> Result<usize, VectorError> {
            Ok(documents.len())
        }

        async fn query(
            &self,
            _collection: &str,
            _query_text: &str,
            n_results: usize,
            filter: Option<Value>,
        ) -> Result<QueryResult, VectorError> {
            self.filters.lock().await.push(filter);
            let hits: Vec<_> = self.hits.iter().take(n_results).collect();
            Ok(QueryResult {
                documents: hits.iter().map(|(text, _)| text.clone()).collect(),
                metadatas: hits
                    .iter()
                    .map(|(_, pdf)| {
                        let mut metadata = Map::new();
                        metadata.insert("pdf_name".into(), Value::from(pdf.as_str()));
                        metadata
                    })
                    .collect(),
                distances: hits.iter().map(|_| 0.2).collect(),
                ids: hits.iter().enumerate().map(|(i, _)| format!("id-{i}")).collect(),
            })
        }

        async fn health(&self) -> bool {
            true
        }
    }

    fn service(index: Arc<FixedIndex>, fail: bool) -> PipelineService {
        let store = Arc::new(MemoryBlobStore::new("bucket"));
        let writer = Arc::new(SnapshotWriter::new(store.clone(), "folder"));
        let registrar = Arc::new(CatalogRegistrar::new(store.clone(), Arc::new(NoopCatalog), "db"));
        PipelineService::new(
            PipelineComponents {
                completion: Arc::new(EchoCompletion { fail }),
                index,
                store,
                snapshots: Arc::new(SnapshotPipeline::new(writer, registrar)),
                metadata: Arc::new(InMemoryMetadataStore::new()),
            },
            PipelineSettings::from_config(&crate::config::test_config()),
        )
    }

    fn chat_request(message: &str) -> ChatRequest {
        ChatRequest {
            message: message.into(),
            pdf_name: Some("c.pdf".into()),
            user_id: Some("ana".into()),
            max_context_chunks: 5,
        }
    }

    #[tokio::test]
    async fn chat_records_grounded_answers() {
        let index = Arc::new(FixedIndex {
            hits: vec![("Valor total: R$ 10.000".into(), "c.pdf".into())],
            ..FixedIndex::default()
        });
        let service = service(index.clone(), false);

        let response = service.chat(chat_request("Qual o valor?")).await.unwrap();
        assert!(response.context_used);
        assert_eq!(response.response, "O valor total é R$ 10.000.");
        assert_eq!(response.sources[0].pdf_name, "c.pdf");
        assert_eq!(response.metadata["model_used"], "echo");

        let history = ProcessingApi::chat_history(&service, "ana", 10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(Some(history[0].chat_id.clone()), response.chat_id);

        let filters = index.filters.lock().await;
        assert_eq!(filters[0].as_ref().unwrap()["$and"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn chat_without_context_is_not_recorded() {
        let service = service(Arc::new(FixedIndex::default()), false);
        let response = service.chat(chat_request("Qual o prazo?")).await.unwrap();
        assert!(!response.context_used);
        assert!(response.chat_id.is_none());
        assert!(response.response.contains("'c.pdf'"));
        assert!(ProcessingApi::chat_history(&service, "ana", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_completion_falls_back_to_context() {
        let index = Arc::new(FixedIndex {
            hits: vec![("Prazo de 12 meses".into(), "c.pdf".into())],
            ..FixedIndex::default()
        });
        let response = service(index, true).chat(chat_request("prazo")).await.unwrap();
        assert!(response.response.contains("1. Prazo de 12 meses..."));
    }

    #[tokio::test]
    async fn non_pdf_uploads_are_rejected() {
        let service = service(Arc::new(FixedIndex::default()), false);
        let err = service
            .submit_upload(DocumentUpload {
                filename: "notes.txt".into(),
                user_id: "ana".into(),
                bytes: Vec::new(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidUpload(_)));
        assert!(service.task_store().all().await.is_empty());
    }

    #[tokio::test]
    async fn unreadable_upload_ends_in_error() {
        let service = service(Arc::new(FixedIndex::default()), false);
        let task_id = service
            .submit_upload(DocumentUpload {
                filename: "broken.pdf".into(),
                user_id: "ana".into(),
                bytes: b"not a pdf".to_vec(),
            })
            .await
            .unwrap();

        let mut record = None;
        for _ in 0..100 {
            let current = service.task_store().get(&task_id).await.unwrap();
            if current.status.is_terminal() {
                record = Some(current);
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let record = record.expect("task finished");
        assert_eq!(record.status, TaskStatus::Error);
        assert_eq!(record.progress, 0);
        assert_eq!(service.metrics_snapshot().processing_failures, 1);
    }

    #[tokio::test]
    async fn files_are_listed_under_the_folder() {
        let service = service(Arc::new(FixedIndex::default()), false);
        service
            .components
            .store
            .put("test-folder/csv/a.csv", b"x".to_vec(), "text/csv")
            .await
            .unwrap();
        let listing = service.list_files("csv").await.unwrap();
        assert_eq!(listing.folder, "test-folder/csv");
        assert_eq!(listing.total_files, 1);
        assert_eq!(listing.files[0].url, "s3://bucket/test-folder/csv/a.csv");
    }
}
