use super::{CatalogColumn, CatalogService, TableUpsert};
use crate::snapshot::Column;
use crate::storage::BlobStore;
use serde::Serialize;
use std::sync::Arc;

/// Name of the manifest file written at the table root.
pub const MANIFEST_NAME: &str = "_symlink_format_manifest";

/// Outcome of one registration step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    /// Step completed.
    Succeeded,
    /// Step had nothing to do.
    Skipped,
    /// Step failed; see the detail.
    Failed,
}

/// Status of one step plus a human-readable detail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepResult {
    /// Step outcome.
    pub status: StepStatus,
    /// Location written, reason skipped, or error message.
    pub detail: String,
}

impl StepResult {
    fn succeeded(detail: impl Into<String>) -> Self {
        Self {
            status: StepStatus::Succeeded,
            detail: detail.into(),
        }
    }

    fn skipped(detail: impl Into<String>) -> Self {
        Self {
            status: StepStatus::Skipped,
            detail: detail.into(),
        }
    }

    fn failed(detail: impl Into<String>) -> Self {
        Self {
            status: StepStatus::Failed,
            detail: detail.into(),
        }
    }
}

/// Per-step result of registering one snapshot, plus operator commands.
#[derive(Debug, Clone, Serialize)]
pub struct RegistrationReport {
    /// Qualified table name, `{database}.{table}`.
    pub table: String,
    /// Symlink manifest step.
    pub manifest: StepResult,
    /// Catalog table step.
    pub catalog: StepResult,
    /// Command refreshing the table's partitions.
    pub repair_command: String,
    /// Example queries against the registered table.
    pub sample_queries: Vec<String>,
}

/// Publishes snapshots to query engines: a manifest of data files plus a catalog table.
///
/// Both steps run independently; a failure in one is reported and does not skip the other.
pub struct CatalogRegistrar {
    store: Arc<dyn BlobStore>,
    catalog: Arc<dyn CatalogService>,
    database: String,
}

impl CatalogRegistrar {
    /// Registrar writing manifests to `store` and tables into `database`.
    pub fn new(
        store: Arc<dyn BlobStore>,
        catalog: Arc<dyn CatalogService>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            store,
            catalog,
            database: database.into(),
        }
    }

    /// Register `table`, rooted at `prefix`, with the given schema.
    ///
    /// The manifest lists exactly `data_files`, the keys recorded in the table's log, so
    /// stray objects under the prefix are never published.
    pub async fn register(
        &self,
        table: &str,
        columns: &[Column],
        prefix: &str,
        data_files: &[String],
    ) -> RegistrationReport {
        let manifest = self.write_manifest(prefix, data_files).await;
        let catalog = self.register_table(table, columns, prefix).await;
        let qualified = format!("{}.{table}", self.database);
        tracing::info!(
            table = %qualified,
            manifest = ?manifest.status,
            catalog = ?catalog.status,
            "Snapshot registration finished"
        );
        RegistrationReport {
            repair_command: format!("MSCK REPAIR TABLE {qualified};"),
            sample_queries: vec![
                format!("SELECT * FROM {qualified} LIMIT 10;"),
                format!("SHOW PARTITIONS {qualified};"),
            ],
            table: qualified,
            manifest,
            catalog,
        }
    }

    async fn write_manifest(&self, prefix: &str, data_files: &[String]) -> StepResult {
        let files: Vec<String> = data_files.iter().map(|key| self.store.uri(key)).collect();
        if files.is_empty() {
            tracing::warn!(prefix, "No data files found, manifest not written");
            return StepResult::skipped("no data files found");
        }

        let key = format!("{prefix}{MANIFEST_NAME}");
        match self
            .store
            .put(&key, files.join("\n").into_bytes(), "text/plain")
            .await
        {
            Ok(()) => {
                tracing::debug!(key = %key, files = files.len(), "Manifest written");
                StepResult::succeeded(self.store.uri(&key))
            }
            Err(err) => {
                tracing::warn!(key = %key, error = %err, "Writing manifest failed");
                StepResult::failed(err.to_string())
            }
        }
    }

    async fn register_table(&self, table: &str, columns: &[Column], prefix: &str) -> StepResult {
        if !self.catalog.is_enabled() {
            return StepResult::skipped("catalog registration disabled");
        }
        let columns: Vec<CatalogColumn> = columns
            .iter()
            .map(|column| CatalogColumn {
                name: column.name.clone(),
                data_type: column.data_type.catalog_name().to_string(),
                comment: format!("{} ({})", column.name, column.data_type.log_name()),
            })
            .collect();
        let location = self.store.uri(prefix);

        if let Err(err) = self.catalog.ensure_namespace(&self.database).await {
            tracing::warn!(
                database = %self.database,
                error = %err,
                "Catalog namespace unavailable"
            );
            return StepResult::failed(err.to_string());
        }
        match self
            .catalog
            .create_or_update_table(&self.database, table, &columns, &location)
            .await
        {
            Ok(outcome) => {
                let verb = match outcome {
                    TableUpsert::Created => "created",
                    TableUpsert::Updated => "updated",
                };
                StepResult::succeeded(format!("{}.{table} {verb}", self.database))
            }
            Err(err) => {
                tracing::warn!(table, error = %err, "Catalog registration failed");
                StepResult::failed(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogError, NoopCatalog};
    use crate::snapshot::ColumnType;
    use crate::storage::MemoryBlobStore;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingCatalog {
        tables: Mutex<Vec<(String, Vec<CatalogColumn>, String)>>,
        fail: bool,
    }

    #[async_trait]
    impl CatalogService for RecordingCatalog {
        async fn ensure_namespace(&self, _namespace: &str) -> Result<(), CatalogError> {
            Ok(())
        }

        async fn create_or_update_table(
            &self,
            _namespace: &str,
            name: &str,
            columns: &[CatalogColumn],
            location: &str,
        ) -> Result<TableUpsert, CatalogError> {
            if self.fail {
                return Err(CatalogError::Unavailable("down".into()));
            }
            self.tables
                .lock()
                .unwrap()
                .push((name.to_string(), columns.to_vec(), location.to_string()));
            Ok(TableUpsert::Created)
        }
    }

    fn columns() -> Vec<Column> {
        vec![Column {
            name: "receita".into(),
            data_type: ColumnType::Long,
        }]
    }

    #[tokio::test]
    async fn manifest_lists_the_given_data_files() {
        let store = Arc::new(MemoryBlobStore::new("bucket"));
        let prefix = "f/delta_datasets/investimento/";
        store
            .put(&format!("{prefix}part-00000-stale.snappy.parquet"), vec![1], "x")
            .await
            .unwrap();
        let files = vec![
            format!("{prefix}part-00000-a.snappy.parquet"),
            format!("{prefix}part-00001-b.snappy.parquet"),
        ];
        let catalog = Arc::new(RecordingCatalog::default());
        let registrar = CatalogRegistrar::new(store.clone(), catalog.clone(), "db");

        let report = registrar.register("investimento", &columns(), prefix, &files).await;

        assert_eq!(report.manifest.status, StepStatus::Succeeded);
        let manifest = store.get(&format!("{prefix}{MANIFEST_NAME}")).await.unwrap();
        assert_eq!(
            String::from_utf8(manifest).unwrap(),
            "s3://bucket/f/delta_datasets/investimento/part-00000-a.snappy.parquet\n\
             s3://bucket/f/delta_datasets/investimento/part-00001-b.snappy.parquet"
        );
        assert_eq!(report.catalog.status, StepStatus::Succeeded);
        let tables = catalog.tables.lock().unwrap();
        assert_eq!(tables[0].1[0].data_type, "bigint");
        assert_eq!(tables[0].2, "s3://bucket/f/delta_datasets/investimento/");
        assert_eq!(report.repair_command, "MSCK REPAIR TABLE db.investimento;");
        assert_eq!(report.sample_queries[0], "SELECT * FROM db.investimento LIMIT 10;");
    }

    #[tokio::test]
    async fn steps_fail_independently() {
        let store = Arc::new(MemoryBlobStore::new("bucket"));
        let catalog = Arc::new(RecordingCatalog {
            fail: true,
            ..RecordingCatalog::default()
        });
        let registrar = CatalogRegistrar::new(store, catalog, "db");

        let report = registrar
            .register("vazia", &columns(), "f/delta_datasets/vazia/", &[])
            .await;
        assert_eq!(report.manifest.status, StepStatus::Skipped);
        assert_eq!(report.catalog.status, StepStatus::Failed);
    }

    #[tokio::test]
    async fn disabled_catalog_is_skipped() {
        let store = Arc::new(MemoryBlobStore::new("bucket"));
        let registrar = CatalogRegistrar::new(store, Arc::new(NoopCatalog), "db");
        let report = registrar.register("t", &columns(), "p/", &[]).await;
        assert_eq!(report.catalog.status, StepStatus::Skipped);
    }
}
