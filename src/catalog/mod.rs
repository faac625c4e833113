//! External catalog registration for snapshots.

mod glue;
mod registrar;

pub use glue::GlueCatalog;
pub use registrar::{CatalogRegistrar, MANIFEST_NAME, RegistrationReport, StepResult, StepStatus};

use crate::config::{Config, ConfigError};
use crate::storage::AwsCredentials;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

/// Errors returned by catalog services.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Catalog endpoint could not be reached.
    #[error("Catalog unavailable: {0}")]
    Unavailable(String),
    /// Catalog answered with an unexpected status.
    #[error("Unexpected catalog response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the catalog.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// Catalog rejected the request with a typed error.
    #[error("Catalog rejected request: {code}: {message}")]
    Rejected {
        /// Service error type, e.g. `AccessDeniedException`.
        code: String,
        /// Service message.
        message: String,
    },
    /// Credentials are missing.
    #[error(transparent)]
    Credentials(#[from] ConfigError),
}

/// One column of a catalog table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogColumn {
    /// Column name.
    pub name: String,
    /// Catalog-native type name.
    pub data_type: String,
    /// Free-form description.
    pub comment: String,
}

/// Whether a table definition was created or replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TableUpsert {
    /// Table did not exist.
    Created,
    /// Existing definition was replaced.
    Updated,
}

/// Black-box schema registry for query engines.
#[async_trait]
pub trait CatalogService: Send + Sync {
    /// Create `namespace` unless it exists.
    async fn ensure_namespace(&self, namespace: &str) -> Result<(), CatalogError>;

    /// Create the table, or replace its definition when it exists.
    async fn create_or_update_table(
        &self,
        namespace: &str,
        name: &str,
        columns: &[CatalogColumn],
        location: &str,
    ) -> Result<TableUpsert, CatalogError>;

    /// False for catalogs that skip registration entirely.
    fn is_enabled(&self) -> bool {
        true
    }
}

/// Catalog used when registration is disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCatalog;

#[async_trait]
impl CatalogService for NoopCatalog {
    async fn ensure_namespace(&self, _namespace: &str) -> Result<(), CatalogError> {
        Ok(())
    }

    async fn create_or_update_table(
        &self,
        _namespace: &str,
        _name: &str,
        _columns: &[CatalogColumn],
        _location: &str,
    ) -> Result<TableUpsert, CatalogError> {
        Ok(TableUpsert::Updated)
    }

    fn is_enabled(&self) -> bool {
        false
    }
}

/// Build the catalog selected by configuration.
pub fn build_catalog(config: &Config) -> Result<Arc<dyn CatalogService>, CatalogError> {
    if !config.catalog_enabled {
        tracing::info!("Catalog registration disabled");
        return Ok(Arc::new(NoopCatalog));
    }
    let catalog = GlueCatalog::new(
        config.aws_region.clone(),
        config.glue_endpoint_url.clone(),
        AwsCredentials::from_env()?,
    )?;
    tracing::info!(
        region = %config.aws_region,
        database = %config.catalog_database,
        "Glue catalog initialized"
    );
    Ok(Arc::new(catalog))
}
