use super::SnapshotError;
use super::derived::{
    ValueMatcher, WordOverlapMatcher, can_derive_cash_flow, can_derive_product_values, cash_flow,
    product_values,
};
use super::enrich::{Provenance, enrich_primary};
use super::export::export_tables;
use super::writer::{SnapshotWriter, WriteReceipt};
use crate::catalog::{CatalogRegistrar, RegistrationReport};
use crate::clock;
use crate::tables::{Record, TableExtraction, TableKind};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

/// Appendable snapshot fed by `investimento_financeiro`.
pub const INVESTMENT_TABLE: &str = "investimento";
/// Appendable snapshot fed by `renda_fixa`.
pub const FIXED_INCOME_TABLE: &str = "renda_fixa";

/// One written snapshot and its registration.
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotReport {
    /// Write outcome.
    pub receipt: WriteReceipt,
    /// Manifest and catalog outcome.
    pub registration: RegistrationReport,
}

/// Everything one document run wrote.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SnapshotOutcome {
    /// Table type to CSV location.
    pub csv_files: BTreeMap<String, String>,
    /// `delta_investimento`, `delta_renda_fixa`, `delta_produto_valor`, `delta_fluxo_caixa`.
    pub snapshots: BTreeMap<String, SnapshotReport>,
}

impl SnapshotOutcome {
    /// Snapshot key to table location.
    pub fn locations(&self) -> BTreeMap<String, String> {
        self.snapshots
            .iter()
            .map(|(key, report)| (key.clone(), report.receipt.location.clone()))
            .collect()
    }
}

/// Turns one document's extracted tables into CSV exports and snapshots.
///
/// Primary snapshots are appended to; derived snapshots get fresh timestamped names. Nothing
/// is snapshotted unless investment or fixed-income rows were extracted.
pub struct SnapshotPipeline {
    writer: Arc<SnapshotWriter>,
    registrar: Arc<CatalogRegistrar>,
    matcher: Arc<dyn ValueMatcher>,
}

impl SnapshotPipeline {
    /// Pipeline matching products to values by word overlap.
    pub fn new(writer: Arc<SnapshotWriter>, registrar: Arc<CatalogRegistrar>) -> Self {
        Self {
            writer,
            registrar,
            matcher: Arc::new(WordOverlapMatcher),
        }
    }

    /// Replace the product-to-value matching strategy.
    pub fn with_matcher(mut self, matcher: Arc<dyn ValueMatcher>) -> Self {
        self.matcher = matcher;
        self
    }

    /// Snapshot writer in use.
    pub fn writer(&self) -> &Arc<SnapshotWriter> {
        &self.writer
    }

    /// Export and snapshot `extraction`, extracted from `filename`.
    pub async fn run(
        &self,
        extraction: &TableExtraction,
        filename: &str,
    ) -> Result<SnapshotOutcome, SnapshotError> {
        let provenance = Provenance::new(filename, &extraction.metrics);
        let base = provenance.base_name().to_string();
        let mut outcome = SnapshotOutcome {
            csv_files: export_tables(
                self.writer.store().as_ref(),
                self.writer.folder(),
                &base,
                &extraction.tables,
                provenance.processed_at,
            )
            .await,
            ..SnapshotOutcome::default()
        };

        let investment = extraction.get(&TableKind::Investment);
        let fixed_income = extraction.get(&TableKind::FixedIncome);
        if investment.is_none() && fixed_income.is_none() {
            tracing::info!(
                filename,
                "No investment or fixed-income rows, skipping snapshots"
            );
            return Ok(outcome);
        }

        if let Some(table) = investment {
            let rows = enrich_primary(table.records(), &provenance);
            let report = self.append(INVESTMENT_TABLE, rows).await?;
            outcome.snapshots.insert("delta_investimento".into(), report);
        }
        if let Some(table) = fixed_income {
            let rows = enrich_primary(table.records(), &provenance);
            let report = self.append(FIXED_INCOME_TABLE, rows).await?;
            outcome.snapshots.insert("delta_renda_fixa".into(), report);
        }

        // Derived tables are only built alongside investment data.
        if investment.is_some() {
            let stamp = clock::compact_stamp(provenance.processed_at);
            if can_derive_product_values(extraction) {
                let rows = product_values(extraction, self.matcher.as_ref(), &provenance);
                let name = format!("{base}_delta_produto_valor_{stamp}");
                if let Some(report) = self.replace(&name, rows).await? {
                    outcome.snapshots.insert("delta_produto_valor".into(), report);
                }
            }
            if can_derive_cash_flow(extraction) {
                let rows = cash_flow(extraction, &provenance);
                let name = format!("{base}_delta_fluxo_caixa_{stamp}");
                if let Some(report) = self.replace(&name, rows).await? {
                    outcome.snapshots.insert("delta_fluxo_caixa".into(), report);
                }
            }
        }

        tracing::info!(
            filename,
            snapshots = outcome.snapshots.len(),
            csv_files = outcome.csv_files.len(),
            "Snapshot run finished"
        );
        Ok(outcome)
    }

    async fn append(
        &self,
        table: &str,
        rows: Vec<Record>,
    ) -> Result<SnapshotReport, SnapshotError> {
        let receipt = self.writer.write(table, rows).await?;
        self.report(receipt).await
    }

    async fn replace(
        &self,
        table: &str,
        rows: Vec<Record>,
    ) -> Result<Option<SnapshotReport>, SnapshotError> {
        if rows.is_empty() {
            return Ok(None);
        }
        let receipt = match self.writer.create(table, rows.clone()).await {
            Err(SnapshotError::AlreadyExists(_)) => {
                let suffix = Uuid::new_v4().simple().to_string();
                let renamed = format!("{table}_{}", &suffix[..8]);
                tracing::warn!(
                    table,
                    renamed = %renamed,
                    "Derived table name taken, writing under a new name"
                );
                self.writer.create(&renamed, rows).await?
            }
            other => other?,
        };
        self.report(receipt).await.map(Some)
    }

    async fn report(&self, receipt: WriteReceipt) -> Result<SnapshotReport, SnapshotError> {
        let data_files = self.writer.data_files(&receipt.table_name).await?;
        let registration = self
            .registrar
            .register(
                &receipt.table_name,
                &receipt.columns,
                &receipt.prefix,
                &data_files,
            )
            .await;
        Ok(SnapshotReport {
            receipt,
            registration,
        })
    }
}
