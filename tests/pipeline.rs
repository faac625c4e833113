use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use ragpipe::{
    catalog::{
        CatalogColumn, CatalogError, CatalogRegistrar, CatalogService, MANIFEST_NAME, StepStatus,
        TableUpsert,
    },
    completion::{CompletionClient, CompletionError},
    snapshot::{Operation, SnapshotPipeline, SnapshotWriter},
    storage::{BlobStore, LocalBlobStore},
    tables::{TableExtractor, TableKind},
};
use tempfile::TempDir;

/// Completion stub answering each table prompt from a fixed script.
struct ScriptedCompletion {
    investment: &'static str,
    contract_values: &'static str,
}

#[async_trait]
impl CompletionClient for ScriptedCompletion {
    async fn invoke(&self, prompt: &str) -> Result<String, CompletionError> {
        if prompt.contains("tabela do tipo: investimento_financeiro") {
            Ok(self.investment.to_string())
        } else if prompt.contains("tabela do tipo: valores_contrato") {
            Ok(self.contract_values.to_string())
        } else {
            Ok("[]".to_string())
        }
    }

    fn model_name(&self) -> &str {
        "scripted-model"
    }
}

#[derive(Default)]
struct CountingCatalog {
    namespaces: AtomicUsize,
    tables: AtomicUsize,
}

#[async_trait]
impl CatalogService for CountingCatalog {
    async fn ensure_namespace(&self, _namespace: &str) -> Result<(), CatalogError> {
        self.namespaces.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn create_or_update_table(
        &self,
        _namespace: &str,
        _name: &str,
        _columns: &[CatalogColumn],
        _location: &str,
    ) -> Result<TableUpsert, CatalogError> {
        Ok(if self.tables.fetch_add(1, Ordering::SeqCst) == 0 {
            TableUpsert::Created
        } else {
            TableUpsert::Updated
        })
    }
}

struct Harness {
    _dir: TempDir,
    store: Arc<LocalBlobStore>,
    catalog: Arc<CountingCatalog>,
    pipeline: SnapshotPipeline,
}

impl Harness {
    fn new() -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = Arc::new(LocalBlobStore::new(dir.path(), "landing"));
        let catalog = Arc::new(CountingCatalog::default());
        let writer = Arc::new(SnapshotWriter::new(store.clone(), "chathib"));
        let registrar = Arc::new(CatalogRegistrar::new(store.clone(), catalog.clone(), "stage"));
        Self {
            _dir: dir,
            store,
            catalog,
            pipeline: SnapshotPipeline::new(writer, registrar),
        }
    }
}

fn kinds() -> Vec<TableKind> {
    ["investimento_financeiro", "renda_fixa", "valores_contrato"]
        .into_iter()
        .map(TableKind::parse)
        .collect()
}

#[tokio::test]
async fn second_document_appends_without_rewriting_history() {
    let harness = Harness::new();
    let extractor = TableExtractor::new(Arc::new(ScriptedCompletion {
        investment: r#"[{"empresa": "ACME", "periodo": "2023", "receita_bruta": "R$ 1.500,00"}]"#,
        contract_values: "[]",
    }));

    let first = extractor.extract("Relatório ACME 2023", &kinds()).await;
    let outcome = harness.pipeline.run(&first, "acme_2023.pdf").await.expect("first run");
    let receipt = &outcome.snapshots["delta_investimento"].receipt;
    assert_eq!(receipt.operation, Operation::Create);
    assert_eq!(receipt.sequence, 0);
    let first_log = harness.store.get(&receipt.log_file).await.expect("first log entry");

    let second = extractor.extract("Relatório ACME 2024", &kinds()).await;
    let outcome = harness.pipeline.run(&second, "acme_2024.pdf").await.expect("second run");
    let receipt = &outcome.snapshots["delta_investimento"].receipt;
    assert_eq!(receipt.operation, Operation::Append);
    assert_eq!(receipt.sequence, 1);

    let history = harness
        .pipeline
        .writer()
        .history("investimento")
        .await
        .expect("history");
    let operations: Vec<_> = history.iter().map(|entry| entry.operation).collect();
    assert_eq!(operations, vec![Operation::Create, Operation::Append]);
    assert!(history[0].schema.is_some());
    assert!(history[1].schema.is_none());

    let prefix = harness.pipeline.writer().table_prefix("investimento");
    let first_key = format!("{prefix}_delta_log/00000000000000000000.json");
    assert_eq!(harness.store.get(&first_key).await.expect("reread"), first_log);

    let keys: Vec<String> = harness
        .store
        .list(&prefix)
        .await
        .expect("list")
        .into_iter()
        .map(|object| object.key)
        .collect();
    assert_eq!(keys.iter().filter(|key| key.ends_with(".parquet")).count(), 2);
    let manifest = harness
        .store
        .get(&format!("{prefix}{MANIFEST_NAME}"))
        .await
        .expect("manifest");
    assert_eq!(String::from_utf8_lossy(&manifest).lines().count(), 2);

    let registration = &outcome.snapshots["delta_investimento"].registration;
    assert_eq!(registration.table, "stage.investimento");
    assert_eq!(registration.catalog.status, StepStatus::Succeeded);
}

#[tokio::test]
async fn documents_without_primary_tables_write_no_snapshots() {
    let harness = Harness::new();
    let extractor = TableExtractor::new(Arc::new(ScriptedCompletion {
        investment: "Nenhum dado financeiro encontrado.",
        contract_values: r#"[{"Descrição": "Valor total", "Valor": "R$ 10.000,00"}]"#,
    }));

    let extraction = extractor.extract("Contrato de serviços", &kinds()).await;
    let outcome = harness
        .pipeline
        .run(&extraction, "contrato.pdf")
        .await
        .expect("run");

    assert!(outcome.snapshots.is_empty());
    assert_eq!(outcome.csv_files.len(), 1);
    assert!(outcome.csv_files.contains_key("valores_contrato"));
    assert_eq!(harness.catalog.namespaces.load(Ordering::SeqCst), 0);
    assert_eq!(harness.catalog.tables.load(Ordering::SeqCst), 0);

    let snapshots = harness
        .store
        .list("chathib/delta_datasets/")
        .await
        .expect("list");
    assert!(snapshots.is_empty());
}
