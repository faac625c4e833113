use serde::Deserialize;
use std::env;
use std::sync::OnceLock;
use thiserror::Error;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Table types extracted when a request does not name its own.
pub const DEFAULT_TARGET_TABLES: [&str; 6] = [
    "investimento_financeiro",
    "renda_fixa",
    "valores_contrato",
    "produtos_servicos",
    "cronograma_pagamentos",
    "partes_contrato",
];

/// Runtime configuration for the pipeline server.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
    /// Target chunk length in characters.
    pub chunk_size: usize,
    /// Characters shared between consecutive chunks.
    pub chunk_overlap: usize,
    /// Chunks whose trimmed length falls below this are dropped.
    pub min_chunk_size: usize,
    /// Completion backend used for table extraction and chat.
    pub completion_provider: CompletionProvider,
    /// Base URL of the completion backend.
    pub completion_url: String,
    /// Model identifier passed to the completion backend.
    pub completion_model: String,
    /// Optional bearer token for OpenAI-compatible providers.
    pub completion_api_key: Option<String>,
    /// Per-call completion timeout in seconds.
    pub completion_timeout_secs: u64,
    /// Base URL of the vector index service.
    pub vector_url: String,
    /// Collection receiving document chunks.
    pub vector_collection: String,
    /// Timeout applied to bulk inserts.
    pub vector_add_timeout_secs: u64,
    /// Timeout applied to queries and health probes.
    pub vector_query_timeout_secs: u64,
    /// Blob store backend.
    pub storage_backend: StorageBackend,
    /// Bucket holding every artifact.
    pub storage_bucket: String,
    /// Key prefix under which artifacts are written.
    pub storage_folder: String,
    /// Root directory for the local blob backend.
    pub storage_local_root: String,
    /// AWS region for S3 and Glue.
    pub aws_region: String,
    /// Optional S3 endpoint override (MinIO, LocalStack).
    pub s3_endpoint_url: Option<String>,
    /// Optional Glue endpoint override.
    pub glue_endpoint_url: Option<String>,
    /// Whether snapshots are registered in the external catalog.
    pub catalog_enabled: bool,
    /// Catalog namespace receiving snapshot tables.
    pub catalog_database: String,
    /// Maximum number of documents processed concurrently in the background.
    pub worker_pool_size: usize,
    /// Age after which task records are removed by a sweep.
    pub task_max_age_secs: u64,
    /// Table types extracted by default.
    pub target_tables: Vec<String>,
}

/// Supported completion backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionProvider {
    /// Local Ollama runtime.
    Ollama,
    /// Any OpenAI-compatible chat completions endpoint.
    OpenAI,
}

/// Supported blob store backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// S3 REST API signed with SigV4.
    S3,
    /// Directory tree on the local filesystem.
    Local,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        let completion_provider = match load_env_optional("COMPLETION_PROVIDER") {
            Some(value) => value
                .parse()
                .map_err(|()| ConfigError::InvalidValue("COMPLETION_PROVIDER".into()))?,
            None => CompletionProvider::Ollama,
        };
        let completion_url = load_env_optional("COMPLETION_URL").unwrap_or_else(|| {
            match completion_provider {
                CompletionProvider::Ollama => "http://127.0.0.1:11434".to_string(),
                CompletionProvider::OpenAI => "https://api.openai.com/v1".to_string(),
            }
        });
        let storage_backend = match load_env_optional("STORAGE_BACKEND") {
            Some(value) => value
                .parse()
                .map_err(|()| ConfigError::InvalidValue("STORAGE_BACKEND".into()))?,
            None => StorageBackend::Local,
        };
        let target_tables = load_env_optional("TARGET_TABLES")
            .map(|value| split_list(&value))
            .filter(|tables| !tables.is_empty())
            .unwrap_or_else(|| DEFAULT_TARGET_TABLES.iter().map(|t| t.to_string()).collect());

        Ok(Self {
            server_port: parse_optional("SERVER_PORT")?,
            chunk_size: parse_or("CHUNK_SIZE", 1000)?,
            chunk_overlap: parse_or("CHUNK_OVERLAP", 200)?,
            min_chunk_size: parse_or("MIN_CHUNK_SIZE", 100)?,
            completion_provider,
            completion_url,
            completion_model: load_env_optional("COMPLETION_MODEL")
                .unwrap_or_else(|| "llama3.1".to_string()),
            completion_api_key: load_env_optional("COMPLETION_API_KEY"),
            completion_timeout_secs: parse_or("COMPLETION_TIMEOUT_SECS", 120)?,
            vector_url: load_env_optional("VECTOR_URL")
                .unwrap_or_else(|| "http://127.0.0.1:8001".to_string()),
            vector_collection: load_env_optional("VECTOR_COLLECTION")
                .unwrap_or_else(|| "rag_documents".to_string()),
            vector_add_timeout_secs: parse_or("VECTOR_ADD_TIMEOUT_SECS", 120)?,
            vector_query_timeout_secs: parse_or("VECTOR_QUERY_TIMEOUT_SECS", 30)?,
            storage_backend,
            storage_bucket: load_env_optional("STORAGE_BUCKET")
                .unwrap_or_else(|| "dl-landing-zone-ca-central-1-stage".to_string()),
            storage_folder: load_env_optional("STORAGE_FOLDER")
                .unwrap_or_else(|| "chathib-prod".to_string()),
            storage_local_root: load_env_optional("STORAGE_LOCAL_ROOT")
                .unwrap_or_else(|| "datasets".to_string()),
            aws_region: load_env_optional("AWS_REGION")
                .or_else(|| load_env_optional("AWS_DEFAULT_REGION"))
                .unwrap_or_else(|| "ca-central-1".to_string()),
            s3_endpoint_url: load_env_optional("S3_ENDPOINT_URL"),
            glue_endpoint_url: load_env_optional("GLUE_ENDPOINT_URL"),
            catalog_enabled: parse_flag("CATALOG_ENABLED")?,
            catalog_database: load_env_optional("CATALOG_DATABASE")
                .unwrap_or_else(|| "chathib_stage".to_string()),
            worker_pool_size: parse_or::<usize>("WORKER_POOL_SIZE", 2)?.max(1),
            task_max_age_secs: parse_or("TASK_MAX_AGE_SECS", 3600)?,
            target_tables,
        })
    }
}

/// Split a comma separated list, dropping blanks.
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// Read a required environment variable.
pub fn load_env(key: &str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::MissingVariable(key.to_string()))
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_optional<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    Ok(parse_optional(key)?.unwrap_or(default))
}

fn parse_flag(key: &str) -> Result<bool, ConfigError> {
    match load_env_optional(key).map(|value| value.trim().to_lowercase()) {
        None => Ok(false),
        Some(value) => match value.as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue(key.to_string())),
        },
    }
}

impl std::str::FromStr for CompletionProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAI),
            _ => Err(()),
        }
    }
}

impl std::str::FromStr for StorageBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "s3" => Ok(Self::S3),
            "local" => Ok(Self::Local),
            _ => Err(()),
        }
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() {
    dotenvy::dotenv().ok();
    let config = Config::from_env().expect("Failed to load config from environment");
    tracing::debug!(
        completion_provider = ?config.completion_provider,
        completion_model = %config.completion_model,
        vector_url = %config.vector_url,
        storage_backend = ?config.storage_backend,
        catalog_enabled = config.catalog_enabled,
        server_port = ?config.server_port,
        "Loaded configuration"
    );
    CONFIG.set(config).expect("Failed to set config");
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        server_port: None,
        chunk_size: 1000,
        chunk_overlap: 200,
        min_chunk_size: 100,
        completion_provider: CompletionProvider::Ollama,
        completion_url: "http://127.0.0.1:11434".into(),
        completion_model: "test-model".into(),
        completion_api_key: None,
        completion_timeout_secs: 5,
        vector_url: "http://127.0.0.1:8001".into(),
        vector_collection: "rag_documents".into(),
        vector_add_timeout_secs: 5,
        vector_query_timeout_secs: 5,
        storage_backend: StorageBackend::Local,
        storage_bucket: "test-bucket".into(),
        storage_folder: "test-folder".into(),
        storage_local_root: "datasets".into(),
        aws_region: "ca-central-1".into(),
        s3_endpoint_url: None,
        glue_endpoint_url: None,
        catalog_enabled: false,
        catalog_database: "chathib_stage".into(),
        worker_pool_size: 2,
        task_max_age_secs: 3600,
        target_tables: DEFAULT_TARGET_TABLES.iter().map(|t| t.to_string()).collect(),
    }
}
