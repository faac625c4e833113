//! HTTP surface for the document pipeline.
//!
//! The router exposes uploads, task polling, retrieval, chat, metadata listings, and discovery:
//!
//! - `POST /upload-pdf` – Accept a multipart PDF and process it in the background. Returns a
//!   `task_id` to poll through `/upload-status/:task_id` or `/check-completion/:task_id`.
//! - `POST /process-pdf-tables` – Extract tables synchronously and write CSV exports and snapshots.
//! - `POST /query` / `POST /chat` – Semantic search and grounded answers over indexed chunks.
//! - `GET /pdfs`, `GET /chat-history`, `GET /files` – Per-user metadata and stored artifacts.
//! - `GET /metrics` – Pipeline counters.
//! - `GET /commands` – Machine-readable command catalog for quick discovery by tools/hosts.

use crate::clock;
use crate::config::split_list;
use crate::metadata::{MetadataError, Rating};
use crate::metrics::MetricsSnapshot;
use crate::processing::{
    ChatRequest, DocumentUpload, PipelineError, ProcessingApi, SearchRequest, TaskRecord,
    TaskStatus,
};
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Path, Query, State, multipart::MultipartError},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;

/// User recorded when a request names none.
pub const DEFAULT_USER_ID: &str = "default_user";

const MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;

/// Build the HTTP router exposing the pipeline.
pub fn create_router<S>(service: Arc<S>) -> Router
where
    S: ProcessingApi + 'static,
{
    Router::new()
        .route("/health", get(health::<S>))
        .route("/upload-pdf", post(upload_pdf::<S>))
        .route("/process-pdf-tables", post(process_pdf_tables::<S>))
        .route("/upload-status/:task_id", get(upload_status::<S>))
        .route("/check-completion/:task_id", get(check_completion::<S>))
        .route("/processing-status", get(processing_status::<S>))
        .route("/clear-old-status", post(clear_old_status::<S>))
        .route("/force-complete-status/:task_id", post(force_complete::<S>))
        .route("/query", post(query::<S>))
        .route("/chat", post(chat::<S>))
        .route("/feedback", post(feedback::<S>))
        .route("/pdfs", get(list_pdfs::<S>))
        .route("/chat-history", get(chat_history::<S>))
        .route("/files", get(list_files::<S>))
        .route("/metrics", get(get_metrics::<S>))
        .route("/commands", get(get_commands))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(service)
}

/// Liveness plus vector-index reachability.
async fn health<S>(State(service): State<Arc<S>>) -> Json<Value>
where
    S: ProcessingApi,
{
    let index_healthy = service.index_healthy().await;
    let active_tasks = service
        .tasks()
        .await
        .values()
        .filter(|record| record.status == TaskStatus::Processing)
        .count();
    Json(json!({
        "status": "healthy",
        "timestamp": clock::current_timestamp_rfc3339(),
        "services": {
            "backend": "running",
            "vector_index": if index_healthy { "connected" } else { "disconnected" },
        },
        "active_tasks": active_tasks,
        "processing_active": active_tasks > 0,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Multipart fields shared by the upload routes.
#[derive(Default)]
struct UploadForm {
    file: Option<(String, Vec<u8>)>,
    user_id: Option<String>,
    target_tables: Option<Vec<String>>,
}

impl UploadForm {
    async fn read(mut multipart: Multipart) -> Result<Self, AppError> {
        let mut form = Self::default();
        while let Some(field) = multipart.next_field().await? {
            let name = field.name().map(str::to_string);
            match name.as_deref() {
                Some("file") => {
                    let filename = field.file_name().unwrap_or_default().to_string();
                    let bytes = field.bytes().await?;
                    form.file = Some((filename, bytes.to_vec()));
                }
                Some("user_id") => {
                    let value = field.text().await?;
                    form.user_id = Some(value.trim().to_string()).filter(|v| !v.is_empty());
                }
                Some("target_tables") => {
                    let value = field.text().await?;
                    form.target_tables = Some(split_list(&value)).filter(|v| !v.is_empty());
                }
                _ => {}
            }
        }
        Ok(form)
    }

    fn into_file(self) -> Result<(String, Vec<u8>, Option<String>, Option<Vec<String>>), AppError> {
        let (filename, bytes) = self.file.ok_or_else(|| {
            AppError::from(PipelineError::InvalidUpload("missing multipart field 'file'".into()))
        })?;
        if !filename.to_lowercase().ends_with(".pdf") {
            return Err(PipelineError::InvalidUpload("only PDF files are accepted".into()).into());
        }
        Ok((filename, bytes, self.user_id, self.target_tables))
    }
}

/// Response body for `POST /upload-pdf`.
#[derive(Serialize)]
struct UploadResponse {
    message: String,
    pdf_name: String,
    task_id: String,
    status: TaskStatus,
    user_id: String,
}

/// Queue a PDF for background processing.
async fn upload_pdf<S>(
    State(service): State<Arc<S>>,
    multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError>
where
    S: ProcessingApi,
{
    let (filename, bytes, user_id, _) = UploadForm::read(multipart).await?.into_file()?;
    let user_id = user_id.unwrap_or_else(|| DEFAULT_USER_ID.to_string());
    tracing::info!(
        filename = %filename,
        user_id = %user_id,
        bytes = bytes.len(),
        "Upload received"
    );
    let task_id = service
        .submit_upload(DocumentUpload {
            filename: filename.clone(),
            user_id: user_id.clone(),
            bytes,
        })
        .await?;
    Ok(Json(UploadResponse {
        message: format!("Upload of {filename} accepted; processing in background"),
        pdf_name: filename,
        task_id,
        status: TaskStatus::Pending,
        user_id,
    }))
}

/// Extract tables from a PDF and write their snapshots before responding.
async fn process_pdf_tables<S>(
    State(service): State<Arc<S>>,
    multipart: Multipart,
) -> Result<Json<Value>, AppError>
where
    S: ProcessingApi,
{
    let (filename, bytes, _, target_tables) = UploadForm::read(multipart).await?.into_file()?;
    let outcome = service
        .process_tables(&filename, bytes, target_tables)
        .await?;
    tracing::info!(
        filename = %filename,
        tables = outcome.tables_extracted.len(),
        snapshots = outcome.snapshots.snapshots.len(),
        "Table run completed"
    );
    let mut body =
        serde_json::to_value(&outcome).map_err(|err| PipelineError::Internal(err.to_string()))?;
    body["success"] = Value::Bool(true);
    Ok(Json(body))
}

/// Task record augmented with polling flags.
#[derive(Serialize)]
struct TaskStatusResponse {
    task_id: String,
    #[serde(flatten)]
    record: TaskRecord,
    is_completed: bool,
    is_error: bool,
    is_processing: bool,
}

async fn find_task<S: ProcessingApi>(service: &S, task_id: &str) -> Result<TaskRecord, AppError> {
    service
        .task(task_id)
        .await
        .ok_or_else(|| PipelineError::TaskNotFound(task_id.to_string()).into())
}

/// Current record of one upload task.
async fn upload_status<S>(
    State(service): State<Arc<S>>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskStatusResponse>, AppError>
where
    S: ProcessingApi,
{
    let record = find_task(service.as_ref(), &task_id).await?;
    Ok(Json(TaskStatusResponse {
        is_completed: record.status == TaskStatus::Completed,
        is_error: record.status == TaskStatus::Error,
        is_processing: record.status == TaskStatus::Processing,
        task_id,
        record,
    }))
}

/// Completion flags telling clients whether to keep polling.
async fn check_completion<S>(
    State(service): State<Arc<S>>,
    Path(task_id): Path<String>,
) -> Result<Json<Value>, AppError>
where
    S: ProcessingApi,
{
    let record = find_task(service.as_ref(), &task_id).await?;
    let is_completed = record.status == TaskStatus::Completed;
    let is_error = record.status == TaskStatus::Error;
    Ok(Json(json!({
        "task_id": task_id,
        "is_completed": is_completed,
        "is_error": is_error,
        "status": record.status,
        "progress": record.progress,
        "message": record.message,
        "result": record.result,
        "timestamp": record.timestamp,
        "completion_check": {
            "completed": is_completed,
            "error": is_error,
            "can_stop_polling": record.status.is_terminal(),
        },
    })))
}

/// Every task record.
async fn processing_status<S>(State(service): State<Arc<S>>) -> Json<Value>
where
    S: ProcessingApi,
{
    let tasks = service.tasks().await;
    Json(json!({
        "active_tasks": tasks.len(),
        "tasks": tasks,
        "timestamp": clock::current_timestamp_rfc3339(),
    }))
}

/// Sweep task records older than the configured age.
async fn clear_old_status<S>(State(service): State<Arc<S>>) -> Json<Value>
where
    S: ProcessingApi,
{
    let report = service.sweep_tasks().await;
    Json(json!({
        "message": format!("Cleanup finished. {} old task records removed.", report.removed_tasks),
        "removed_tasks": report.removed_tasks,
        "active_tasks": report.active_tasks,
        "timestamp": clock::current_timestamp_rfc3339(),
    }))
}

/// Debug override marking a task completed.
async fn force_complete<S>(
    State(service): State<Arc<S>>,
    Path(task_id): Path<String>,
) -> Result<Json<Value>, AppError>
where
    S: ProcessingApi,
{
    let record = service.force_complete(&task_id).await?;
    Ok(Json(json!({
        "message": format!("Task {task_id} forced to completed"),
        "task_id": task_id,
        "status": record,
        "timestamp": clock::current_timestamp_rfc3339(),
    })))
}

/// Semantic search over indexed chunks.
async fn query<S>(
    State(service): State<Arc<S>>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<Value>, AppError>
where
    S: ProcessingApi,
{
    let question = request.question.clone();
    let pdf_name = request.pdf_name.clone();
    let hits = service.query(request).await?;
    Ok(Json(json!({
        "question": question,
        "pdf_name": pdf_name,
        "total_docs_found": hits.len(),
        "context": hits,
        "timestamp": clock::current_timestamp_rfc3339(),
    })))
}

/// Grounded answer over retrieved chunks.
async fn chat<S>(
    State(service): State<Arc<S>>,
    Json(mut request): Json<ChatRequest>,
) -> Result<impl IntoResponse, AppError>
where
    S: ProcessingApi,
{
    if request.user_id.as_deref().is_none_or(str::is_empty) {
        request.user_id = Some(DEFAULT_USER_ID.to_string());
    }
    Ok(Json(service.chat(request).await?))
}

/// Request body for `POST /feedback`.
#[derive(Deserialize)]
struct FeedbackRequest {
    chat_id: String,
    rating: Rating,
    #[serde(default)]
    comment: String,
}

/// Attach a rating to a recorded answer.
async fn feedback<S>(
    State(service): State<Arc<S>>,
    Json(request): Json<FeedbackRequest>,
) -> Result<Json<Value>, AppError>
where
    S: ProcessingApi,
{
    let record = service
        .feedback(&request.chat_id, request.rating, request.comment)
        .await?;
    Ok(Json(json!({
        "success": true,
        "message": "Feedback saved",
        "chat_id": record.chat_id,
        "rating": request.rating,
        "user_id": record.user_id,
        "timestamp": clock::current_timestamp_rfc3339(),
    })))
}

/// Query string naming the user of a listing.
#[derive(Deserialize)]
struct UserQuery {
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default = "default_history_limit")]
    limit: usize,
}

fn default_history_limit() -> usize {
    10
}

impl UserQuery {
    fn user(&self) -> String {
        self.user_id
            .clone()
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| DEFAULT_USER_ID.to_string())
    }
}

/// Documents processed for a user.
async fn list_pdfs<S>(
    State(service): State<Arc<S>>,
    Query(params): Query<UserQuery>,
) -> Result<Json<Value>, AppError>
where
    S: ProcessingApi,
{
    let user_id = params.user();
    let pdfs = service.documents(&user_id).await?;
    Ok(Json(json!({
        "user_id": user_id,
        "total_pdfs": pdfs.len(),
        "pdfs": pdfs,
        "timestamp": clock::current_timestamp_rfc3339(),
    })))
}

/// Recent chats of a user, newest first. `limit` is clamped to 1..=100.
async fn chat_history<S>(
    State(service): State<Arc<S>>,
    Query(params): Query<UserQuery>,
) -> Result<Json<Value>, AppError>
where
    S: ProcessingApi,
{
    let user_id = params.user();
    let chats = service
        .chat_history(&user_id, params.limit.clamp(1, 100))
        .await?;
    Ok(Json(json!({
        "user_id": user_id,
        "total_chats": chats.len(),
        "chats": chats,
        "timestamp": clock::current_timestamp_rfc3339(),
    })))
}

/// Query string selecting an artifact sub-folder.
#[derive(Deserialize)]
struct FilesQuery {
    #[serde(default = "default_sub_folder")]
    sub_folder: String,
}

fn default_sub_folder() -> String {
    "csv".to_string()
}

/// Stored artifacts under one sub-folder.
async fn list_files<S>(
    State(service): State<Arc<S>>,
    Query(params): Query<FilesQuery>,
) -> Result<impl IntoResponse, AppError>
where
    S: ProcessingApi,
{
    Ok(Json(service.list_files(&params.sub_folder).await?))
}

/// Return the pipeline counters.
async fn get_metrics<S>(State(service): State<Arc<S>>) -> Json<MetricsSnapshot>
where
    S: ProcessingApi,
{
    Json(service.metrics_snapshot())
}

/// Descriptor for a single command in the discovery catalog.
#[derive(Serialize)]
struct CommandDescriptor {
    name: &'static str,
    method: &'static str,
    path: &'static str,
    description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_example: Option<Value>,
}

/// Response body for `GET /commands`.
#[derive(Serialize)]
struct CommandsResponse {
    commands: Vec<CommandDescriptor>,
}

fn command(
    name: &'static str,
    method: &'static str,
    path: &'static str,
    description: &'static str,
) -> CommandDescriptor {
    CommandDescriptor {
        name,
        method,
        path,
        description,
        request_example: None,
    }
}

/// Enumerate supported HTTP commands for discovery/UX in hosts and tools.
async fn get_commands() -> Json<CommandsResponse> {
    Json(CommandsResponse {
        commands: vec![
            command("health", "GET", "/health", "Liveness plus vector index reachability."),
            command(
                "upload_pdf",
                "POST",
                "/upload-pdf",
                "Multipart upload (`file`, optional `user_id`). Returns a task_id immediately; the PDF is extracted, snapshotted, chunked, and indexed in the background.",
            ),
            command(
                "process_pdf_tables",
                "POST",
                "/process-pdf-tables",
                "Multipart upload (`file`, optional comma-separated `target_tables`). Extracts tables and writes CSV exports and snapshots before responding.",
            ),
            command(
                "upload_status",
                "GET",
                "/upload-status/:task_id",
                "Task record with is_completed, is_error, and is_processing flags.",
            ),
            command(
                "check_completion",
                "GET",
                "/check-completion/:task_id",
                "Completion flags including can_stop_polling.",
            ),
            command(
                "processing_status",
                "GET",
                "/processing-status",
                "Every task record held in memory.",
            ),
            command(
                "clear_old_status",
                "POST",
                "/clear-old-status",
                "Remove task records older than TASK_MAX_AGE_SECS.",
            ),
            command(
                "force_complete_status",
                "POST",
                "/force-complete-status/:task_id",
                "Debug override marking a task COMPLETED.",
            ),
            CommandDescriptor {
                request_example: Some(json!({
                    "question": "Qual o valor total do contrato?",
                    "pdf_name": "contrato.pdf",
                    "user_id": "user-123",
                    "top_k": 5
                })),
                ..command(
                    "query",
                    "POST",
                    "/query",
                    "Semantic search over indexed chunks, optionally restricted to one PDF or user.",
                )
            },
            CommandDescriptor {
                request_example: Some(json!({
                    "message": "Qual o prazo de vigência?",
                    "pdf_name": "contrato.pdf",
                    "user_id": "user-123",
                    "max_context_chunks": 5
                })),
                ..command(
                    "chat",
                    "POST",
                    "/chat",
                    "Answer a question from retrieved chunks and record the interaction.",
                )
            },
            CommandDescriptor {
                request_example: Some(json!({
                    "chat_id": "3f1c…",
                    "rating": "positive",
                    "comment": "Resposta completa"
                })),
                ..command(
                    "feedback",
                    "POST",
                    "/feedback",
                    "Attach a positive or negative rating to a recorded answer.",
                )
            },
            command("pdfs", "GET", "/pdfs?user_id=", "Documents processed for a user."),
            command(
                "chat_history",
                "GET",
                "/chat-history?user_id=&limit=",
                "Recent chats of a user, newest first.",
            ),
            command(
                "files",
                "GET",
                "/files?sub_folder=csv",
                "Stored artifacts under one sub-folder of the storage folder.",
            ),
            command(
                "metrics",
                "GET",
                "/metrics",
                "Pipeline counters useful for observability dashboards.",
            ),
        ],
    })
}

struct AppError(PipelineError);

impl AppError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            PipelineError::InvalidUpload(_) => StatusCode::BAD_REQUEST,
            PipelineError::TaskNotFound(_)
            | PipelineError::Metadata(MetadataError::NotFound(_)) => {
                StatusCode::NOT_FOUND
            }
            PipelineError::Extraction(err) if err.kind() == "dependency" => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            PipelineError::Extraction(_) => StatusCode::UNPROCESSABLE_ENTITY,
            PipelineError::Chunking(_) | PipelineError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            PipelineError::Index(_) => StatusCode::SERVICE_UNAVAILABLE,
            PipelineError::Snapshot(_)
            | PipelineError::Storage(_)
            | PipelineError::Catalog(_)
            | PipelineError::Completion(_)
            | PipelineError::Metadata(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(kind = self.0.kind(), error = %self.0, "Request failed");
        }
        let mut body = json!({
            "error": self.0.to_string(),
            "kind": self.0.kind(),
        });
        if let Some(hint) = self.0.remediation() {
            body["remediation"] = Value::from(hint);
        }
        (status, Json(body)).into_response()
    }
}

impl From<PipelineError> for AppError {
    fn from(inner: PipelineError) -> Self {
        Self(inner)
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        Self(PipelineError::InvalidUpload(err.body_text()))
    }
}

#[cfg(test)]
mod tests {
    use super::{create_router, get_commands};
    use crate::extraction::ExtractionError;
    use crate::metadata::{ChatRecord, DocumentRecord, MetadataError, Rating};
    use crate::metrics::MetricsSnapshot;
    use crate::processing::{
        ChatRequest, ChatResponse, DocumentUpload, FileListing, PipelineError, ProcessingApi,
        SearchRequest, SweepReport, TableRunOutcome, TaskRecord, TaskStore,
    };
    use crate::vector::SearchHit;
    use async_trait::async_trait;
    use axum::{
        body::{Body, to_bytes},
        http::{Method, Request, StatusCode},
        response::Response,
    };
    use serde_json::{Map, Value, json};
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::Mutex;
    use tower::ServiceExt;

    const BOUNDARY: &str = "ragpipe-test-boundary";

    #[tokio::test]
    async fn commands_catalog_exposes_upload_endpoint() {
        let response = get_commands().await;
        let commands = response.0.commands;
        let upload = commands
            .iter()
            .find(|cmd| cmd.name == "upload_pdf")
            .expect("upload command present");

        assert_eq!(upload.method, "POST");
        assert_eq!(upload.path, "/upload-pdf");
        assert!(upload.description.contains("task_id"));
        assert!(commands.iter().any(|cmd| cmd.path == "/chat"));
    }

    #[tokio::test]
    async fn upload_route_queues_pdf_for_user() {
        let service = Arc::new(StubProcessingService::default());
        let app = create_router(service.clone());

        let response = app
            .oneshot(multipart_request(
                "/upload-pdf",
                &[("file", Some("contrato.pdf"), "%PDF-1.4"), ("user_id", None, "ana")],
            ))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "PENDING");
        assert_eq!(json["user_id"], "ana");
        let task_id = json["task_id"].as_str().unwrap().to_string();

        let uploads = service.uploads.lock().await;
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].filename, "contrato.pdf");
        assert_eq!(uploads[0].bytes, b"%PDF-1.4");
        assert!(service.tasks.get(&task_id).await.is_some());
    }

    #[tokio::test]
    async fn upload_route_rejects_non_pdf_files() {
        let service = Arc::new(StubProcessingService::default());
        let app = create_router(service.clone());

        let response = app
            .oneshot(multipart_request("/upload-pdf", &[("file", Some("notes.txt"), "hello")]))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["kind"], "invalid_request");
        assert!(service.uploads.lock().await.is_empty());
    }

    #[tokio::test]
    async fn status_routes_report_polling_flags() {
        let service = Arc::new(StubProcessingService::default());
        let task_id = service.tasks.create("queued").await;
        let app = create_router(service.clone());

        let response = app
            .clone()
            .oneshot(get_request(&format!("/upload-status/{task_id}")))
            .await
            .expect("router response");
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "PENDING");
        assert_eq!(json["progress"], 10);
        assert_eq!(json["is_completed"], false);

        service.tasks.force_complete(&task_id).await;
        let response = app
            .clone()
            .oneshot(get_request(&format!("/check-completion/{task_id}")))
            .await
            .expect("router response");
        let json = body_json(response).await;
        assert_eq!(json["completion_check"]["can_stop_polling"], true);

        let response = app
            .oneshot(get_request("/upload-status/missing"))
            .await
            .expect("router response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["kind"], "not_found");
    }

    #[tokio::test]
    async fn encrypted_pdfs_map_to_unprocessable_with_remediation() {
        let service = Arc::new(StubProcessingService {
            table_error: true,
            ..StubProcessingService::default()
        });
        let app = create_router(service);

        let response = app
            .oneshot(multipart_request(
                "/process-pdf-tables",
                &[("file", Some("locked.pdf"), "%PDF"), ("target_tables", None, "renda_fixa")],
            ))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let json = body_json(response).await;
        assert_eq!(json["kind"], "encryption");
        assert!(json["remediation"].is_string());
    }

    #[tokio::test]
    async fn chat_route_defaults_the_user() {
        let service = Arc::new(StubProcessingService::default());
        let app = create_router(service.clone());

        let response = app
            .oneshot(json_request("/chat", json!({ "message": "Qual o valor?" })))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["context_used"], false);
        let chats = service.chats.lock().await;
        assert_eq!(chats[0].user_id.as_deref(), Some(super::DEFAULT_USER_ID));
        assert_eq!(chats[0].max_context_chunks, 5);
    }

    #[tokio::test]
    async fn feedback_for_unknown_chat_is_not_found() {
        let app = create_router(Arc::new(StubProcessingService::default()));
        let response = app
            .oneshot(json_request(
                "/feedback",
                json!({ "chat_id": "missing", "rating": "negative", "comment": "x" }),
            ))
            .await
            .expect("router response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn clear_old_status_reports_counts() {
        let service = Arc::new(StubProcessingService::default());
        service.tasks.create("a").await;
        let app = create_router(service);
        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/clear-old-status")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router response");
        let json = body_json(response).await;
        assert_eq!(json["removed_tasks"], 0);
        assert_eq!(json["active_tasks"], 1);
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder()
            .method(Method::GET)
            .uri(uri)
            .body(Body::empty())
            .expect("request")
    }

    fn json_request(uri: &str, payload: Value) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(payload.to_string()))
            .expect("request")
    }

    fn multipart_request(uri: &str, fields: &[(&str, Option<&str>, &str)]) -> Request<Body> {
        let mut body = String::new();
        for (name, filename, value) in fields {
            body.push_str(&format!("--{BOUNDARY}\r\n"));
            match filename {
                Some(filename) => body.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n\
                     Content-Type: application/pdf\r\n\r\n"
                )),
                None => body.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{name}\"\r\n\r\n"
                )),
            }
            body.push_str(value);
            body.push_str("\r\n");
        }
        body.push_str(&format!("--{BOUNDARY}--\r\n"));
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .expect("request")
    }

    async fn body_json(response: Response) -> Value {
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        serde_json::from_slice(&body).expect("json body")
    }

    struct StubProcessingService {
        tasks: TaskStore,
        uploads: Arc<Mutex<Vec<DocumentUpload>>>,
        chats: Arc<Mutex<Vec<ChatRequest>>>,
        table_error: bool,
    }

    impl Default for StubProcessingService {
        fn default() -> Self {
            Self {
                tasks: TaskStore::new(Duration::from_secs(3600)),
                uploads: Arc::new(Mutex::new(Vec::new())),
                chats: Arc::new(Mutex::new(Vec::new())),
                table_error: false,
            }
        }
    }

    #[async_trait]
    impl ProcessingApi for StubProcessingService {
        async fn submit_upload(&self, upload: DocumentUpload) -> Result<String, PipelineError> {
            let task_id = self.tasks.create(format!("Starting {}", upload.filename)).await;
            self.uploads.lock().await.push(upload);
            Ok(task_id)
        }

        async fn process_tables(
            &self,
            _filename: &str,
            _bytes: Vec<u8>,
            _target_tables: Option<Vec<String>>,
        ) -> Result<TableRunOutcome, PipelineError> {
            assert!(self.table_error, "only the failing path is exercised");
            Err(ExtractionError::DocumentEncrypted("password required".into()).into())
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
                .ok_or_else(|| PipelineError::TaskNotFound(task_id.into()))
        }

        async fn query(&self, _request: SearchRequest) -> Result<Vec<SearchHit>, PipelineError> {
            Ok(Vec::new())
        }

        async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, PipelineError> {
            let message = request.message.clone();
            self.chats.lock().await.push(request);
            Ok(ChatResponse {
                chat_id: None,
                message,
                response: "sem contexto".into(),
                context_used: false,
                sources: Vec::new(),
                metadata: Map::new(),
            })
        }

        async fn feedback(
            &self,
            chat_id: &str,
            _rating: Rating,
            _comment: String,
        ) -> Result<ChatRecord, PipelineError> {
            Err(MetadataError::NotFound(chat_id.into()).into())
        }

        async fn documents(&self, _user_id: &str) -> Result<Vec<DocumentRecord>, PipelineError> {
            Ok(Vec::new())
        }

        async fn chat_history(
            &self,
            _user_id: &str,
            _limit: usize,
        ) -> Result<Vec<ChatRecord>, PipelineError> {
            Ok(Vec::new())
        }

        async fn list_files(&self, sub_folder: &str) -> Result<FileListing, PipelineError> {
            Ok(FileListing {
                bucket: "bucket".into(),
                folder: format!("folder/{sub_folder}"),
                files: Vec::new(),
                total_files: 0,
            })
        }

        async fn index_healthy(&self) -> bool {
            true
        }

        fn metrics_snapshot(&self) -> MetricsSnapshot {
            MetricsSnapshot::default()
        }
    }
}
