use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode},
};
use httpmock::{Method::GET, Method::POST, MockServer};
use ragpipe::{api, config::Config, processing::PipelineService};
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::sync::OnceCell;
use tower::ServiceExt;

static MOCK_SERVER: OnceCell<&'static MockServer> = OnceCell::const_new();
static STORAGE_ROOT: OnceCell<&'static TempDir> = OnceCell::const_new();

fn set_env(key: &str, value: &str) {
    // SAFETY: Tests run in a single process and establish deterministic configuration upfront.
    unsafe { std::env::set_var(key, value) }
}

async fn mock_server() -> &'static MockServer {
    MOCK_SERVER
        .get_or_init(|| async {
            let server: &'static MockServer = Box::leak(Box::new(MockServer::start_async().await));
            server
                .mock_async(|when, then| {
                    when.method(GET).path("/health");
                    then.status(200).json_body(json!({ "status": "healthy" }));
                })
                .await;
            server
                .mock_async(|when, then| {
                    when.method(POST)
                        .path("/collections/rag_documents/query")
                        .body_contains("\"pdf_name\":\"contrato.pdf\"");
                    then.status(200).json_body(json!({
                        "documents": ["Valor total do contrato: R$ 10.000,00"],
                        "metadatas": [{ "pdf_name": "contrato.pdf", "chunk_index": 2 }],
                        "distances": [0.12],
                        "ids": ["contrato.pdf_chunk_2"]
                    }));
                })
                .await;
            server
                .mock_async(|when, then| {
                    when.method(POST).path("/collections/rag_documents/query");
                    then.status(200).json_body(json!({
                        "documents": [], "metadatas": [], "distances": [], "ids": []
                    }));
                })
                .await;
            server
                .mock_async(|when, then| {
                    when.method(POST)
                        .path("/api/generate")
                        .json_body_partial(r#"{"model":"llama3.1","stream":false}"#);
                    then.status(200).json_body(json!({
                        "response": "O valor total é R$ 10.000,00.",
                        "done": true
                    }));
                })
                .await;
            server
        })
        .await
}

async fn app() -> Router {
    let server = mock_server().await;
    let root = STORAGE_ROOT
        .get_or_init(|| async { &*Box::leak(Box::new(tempfile::tempdir().expect("tempdir"))) })
        .await;

    set_env("VECTOR_URL", &server.base_url());
    set_env("COMPLETION_URL", &server.base_url());
    set_env("COMPLETION_PROVIDER", "ollama");
    set_env("COMPLETION_MODEL", "llama3.1");
    set_env("STORAGE_BACKEND", "local");
    set_env("STORAGE_LOCAL_ROOT", &root.path().display().to_string());
    set_env("STORAGE_FOLDER", "chathib");
    set_env("CATALOG_ENABLED", "false");

    let config = Config::from_env().expect("config from env");
    let service = PipelineService::from_config(&config)
        .await
        .expect("pipeline service");
    api::create_router(Arc::new(service))
}

async fn send(app: Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(payload) => {
            builder = builder.header("content-type", "application/json");
            Body::from(payload.to_string())
        }
        None => Body::empty(),
    };
    let response = app
        .oneshot(builder.body(body).expect("request"))
        .await
        .expect("router response");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body bytes");
    (status, serde_json::from_slice(&bytes).expect("json body"))
}

#[tokio::test]
async fn health_reports_vector_index() {
    let (status, body) = send(app().await, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["services"]["vector_index"], "connected");
    assert_eq!(body["active_tasks"], 0);
}

#[tokio::test]
async fn chat_answers_from_retrieved_chunks_and_records_history() {
    let app = app().await;

    let (status, body) = send(
        app.clone(),
        Method::POST,
        "/chat",
        Some(json!({
            "message": "Qual o valor total?",
            "pdf_name": "contrato.pdf",
            "user_id": "ana"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["context_used"], true);
    assert_eq!(body["response"], "O valor total é R$ 10.000,00.");
    assert_eq!(body["sources"][0]["chunk_index"], 2);
    assert_eq!(body["metadata"]["model_used"], "llama3.1");
    let chat_id = body["chat_id"].as_str().expect("chat id").to_string();

    let (status, body) = send(
        app.clone(),
        Method::POST,
        "/feedback",
        Some(json!({ "chat_id": chat_id, "rating": "positive" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let (_, body) = send(app.clone(), Method::GET, "/chat-history?user_id=ana", None).await;
    assert_eq!(body["total_chats"], 1);
    assert_eq!(body["chats"][0]["feedback"]["rating"], "positive");

    let (_, body) = send(
        app,
        Method::POST,
        "/chat",
        Some(json!({ "message": "Qual o prazo?", "pdf_name": "outro.pdf" })),
    )
    .await;
    assert_eq!(body["context_used"], false);
    assert!(body.get("chat_id").is_none());
}

#[tokio::test]
async fn unknown_tasks_are_not_found() {
    let (status, body) = send(app().await, Method::GET, "/check-completion/nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "not_found");
}
