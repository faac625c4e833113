//! HTTP client for the vector index service.

use crate::config::Config;
use crate::vector::VectorIndex;
use crate::vector::types::{HealthResponse, IndexDocument, QueryResult, VectorError};
use async_trait::async_trait;
use reqwest::{Client, Method};
use serde_json::{Value, json};
use std::time::Duration;

/// Lightweight HTTP client for the vector index.
pub struct HttpVectorIndex {
    pub(crate) client: Client,
    pub(crate) base_url: String,
    pub(crate) add_timeout: Duration,
    pub(crate) query_timeout: Duration,
}

impl HttpVectorIndex {
    /// Construct a client from configuration.
    pub fn new(config: &Config) -> Result<Self, VectorError> {
        let client = Client::builder().user_agent("ragpipe/vector").build()?;
        let base_url = normalize_base_url(&config.vector_url).map_err(VectorError::InvalidUrl)?;
        tracing::debug!(url = %base_url, "Initialized vector index client");

        Ok(Self {
            client,
            base_url,
            add_timeout: Duration::from_secs(config.vector_add_timeout_secs),
            query_timeout: Duration::from_secs(config.vector_query_timeout_secs),
        })
    }

    fn request(&self, method: Method, path: &str, timeout: Duration) -> reqwest::RequestBuilder {
        self.client
            .request(method, format_endpoint(&self.base_url, path))
            .timeout(timeout)
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        timeout: Duration,
    ) -> Result<reqwest::Response, VectorError> {
        let response = request.send().await.map_err(|err| {
            if err.is_timeout() {
                VectorError::Timeout(timeout)
            } else {
                VectorError::Unavailable(format!("failed to reach {}: {err}", self.base_url))
            }
        })?;
        ensure_success(response).await
    }
}

#[async_trait]
impl VectorIndex for HttpVectorIndex {
    async fn add(
        &self,
        collection: &str,
        documents: Vec<IndexDocument>,
    ) -> Result<usize, VectorError> {
        if documents.is_empty() {
            return Ok(0);
        }
        let count = documents.len();
        let request = self
            .request(Method::POST, &format!("collections/{collection}/add"), self.add_timeout)
            .json(&documents);
        self.send(request, self.add_timeout).await?;
        tracing::debug!(collection, documents = count, "Documents indexed");
        Ok(count)
    }

    async fn query(
        &self,
        collection: &str,
        query_text: &str,
        n_results: usize,
        filter: Option<Value>,
    ) -> Result<QueryResult, VectorError> {
        let mut body = json!({
            "query": query_text,
            "collection_name": collection,
            "n_results": n_results,
        });
        if let (Some(filter), Some(object)) = (filter, body.as_object_mut()) {
            object.insert("where".into(), filter);
        }

        let request = self
            .request(Method::POST, &format!("collections/{collection}/query"), self.query_timeout)
            .json(&body);
        let response = self.send(request, self.query_timeout).await?;
        let result: QueryResult = response.json().await?;
        tracing::debug!(collection, hits = result.documents.len(), "Vector query answered");
        Ok(result)
    }

    async fn health(&self) -> bool {
        let request = self.request(Method::GET, "health", self.query_timeout);
        match self.send(request, self.query_timeout).await {
            Ok(response) => match response.json::<HealthResponse>().await {
                Ok(health) => health.status == "healthy",
                Err(err) => {
                    tracing::warn!(error = %err, "Vector health response unreadable");
                    false
                }
            },
            Err(err) => {
                tracing::warn!(error = %err, "Vector health check failed");
                false
            }
        }
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, VectorError> {
    if response.status().is_success() {
        Ok(response)
    } else {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let error = VectorError::UnexpectedStatus { status, body };
        tracing::error!(error = %error, "Vector request failed");
        Err(error)
    }
}

pub(crate) fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}

pub(crate) fn format_endpoint(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}
