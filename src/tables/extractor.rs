//! Runs one completion call per requested table type and collects the typed results.

use super::kinds::{ExtractedTable, TableKind};
use super::parse::parse_rows;
use super::prompt::extraction_prompt;
use super::record::{Record, union_columns};
use crate::completion::CompletionClient;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

/// Timing of one table type that produced rows.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TableTiming {
    /// Table type identifier.
    pub table_type: String,
    /// Seconds spent in the completion call, rounded to milliseconds.
    pub processing_time: f64,
    /// Rows kept after parsing.
    pub rows_extracted: usize,
}

/// Provenance of one extraction run.
#[derive(Debug, Clone, Serialize, PartialEq, Default)]
pub struct TableMetrics {
    /// Model that answered the prompts.
    pub model_used: String,
    /// Seconds spent over all table types, rounded to milliseconds.
    pub total_processing_time: f64,
    /// Per-type timings, only for types that produced rows.
    pub tables: Vec<TableTiming>,
}

/// Non-empty tables of one document, in request order, plus extraction metrics.
#[derive(Debug, Clone, Default)]
pub struct TableExtraction {
    /// Tables that produced at least one row.
    pub tables: Vec<ExtractedTable>,
    /// Provenance for enrichment columns.
    pub metrics: TableMetrics,
}

impl TableExtraction {
    /// Table extracted for `kind`, if it produced rows.
    pub fn get(&self, kind: &TableKind) -> Option<&ExtractedTable> {
        self.tables.iter().find(|table| table.kind() == *kind)
    }

    /// True when no table produced rows.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Total rows over every table.
    pub fn total_rows(&self) -> usize {
        self.tables.iter().map(ExtractedTable::len).sum()
    }
}

/// JSON-friendly rendering of a table for API responses.
#[derive(Debug, Clone, Serialize)]
pub struct TablePreview {
    /// Rows as objects.
    pub data: Vec<Record>,
    /// Union of row columns in first-seen order.
    pub columns: Vec<String>,
    /// `[rows, columns]`.
    pub shape: [usize; 2],
    /// Row count.
    pub total_rows: usize,
}

impl TablePreview {
    /// Render `table`.
    pub fn of(table: &ExtractedTable) -> Self {
        let data = table.records();
        let columns = union_columns(&data);
        Self {
            shape: [data.len(), columns.len()],
            total_rows: data.len(),
            data,
            columns,
        }
    }
}

fn round_millis(seconds: f64) -> f64 {
    (seconds * 1000.0).round() / 1000.0
}

/// Runs one completion call per requested table type.
pub struct TableExtractor {
    client: Arc<dyn CompletionClient>,
}

impl TableExtractor {
    /// Create an extractor over `client`.
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self { client }
    }

    /// Extract every kind in `kinds` from `text`.
    ///
    /// Types are processed in order and in isolation: a failed completion call or unparsable
    /// output counts as zero rows for that type and extraction moves on.
    pub async fn extract(&self, text: &str, kinds: &[TableKind]) -> TableExtraction {
        let started = Instant::now();
        let mut extraction = TableExtraction {
            tables: Vec::new(),
            metrics: TableMetrics {
                model_used: self.client.model_name().to_string(),
                ..TableMetrics::default()
            },
        };

        for kind in kinds {
            let table_type = kind.id();
            let call_started = Instant::now();
            let prompt = extraction_prompt(kind, text);
            let response = match self.client.invoke(&prompt).await {
                Ok(response) => response,
                Err(err) => {
                    tracing::warn!(
                        table_type,
                        error = %err,
                        retryable = err.is_retryable(),
                        "Table extraction call failed"
                    );
                    continue;
                }
            };
            let elapsed = call_started.elapsed().as_secs_f64();

            let table = ExtractedTable::from_objects(kind, parse_rows(&response, table_type));
            if table.is_empty() {
                tracing::info!(table_type, "No rows extracted");
                continue;
            }
            tracing::info!(table_type, rows = table.len(), seconds = elapsed, "Table extracted");
            extraction.metrics.tables.push(TableTiming {
                table_type: table_type.to_string(),
                processing_time: round_millis(elapsed),
                rows_extracted: table.len(),
            });
            extraction.tables.push(table);
        }

        extraction.metrics.total_processing_time = round_millis(started.elapsed().as_secs_f64());
        extraction
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::CompletionError;
    use async_trait::async_trait;
    use std::time::Duration;

    struct ScriptedCompletion;

    #[async_trait]
    impl CompletionClient for ScriptedCompletion {
        async fn invoke(&self, prompt: &str) -> Result<String, CompletionError> {
            if prompt.contains("tabela do tipo: renda_fixa") {
                Err(CompletionError::Timeout(Duration::from_secs(1)))
            } else if prompt.contains("tabela do tipo: valores_contrato") {
                Ok("```json\n[{\"Descricao\": \"Total\", \"valor\": \"1.500\"}]\n```".into())
            } else if prompt.contains("tabela do tipo: partes_contrato") {
                Ok("Não encontrei partes.".into())
            } else {
                Ok("[{\"empresa\": \"ACME\", \"receita_bruta\": 10}]".into())
            }
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    #[tokio::test]
    async fn failed_types_do_not_stop_the_others() {
        let extractor = TableExtractor::new(Arc::new(ScriptedCompletion));
        let kinds: Vec<_> = [
            "investimento_financeiro",
            "renda_fixa",
            "valores_contrato",
            "partes_contrato",
        ]
        .into_iter()
            .map(TableKind::parse)
            .collect();

        let extraction = extractor.extract("documento", &kinds).await;

        let types: Vec<_> = extraction.tables.iter().map(ExtractedTable::table_type).collect();
        assert_eq!(types, vec!["investimento_financeiro", "valores_contrato"]);
        assert_eq!(extraction.metrics.model_used, "scripted");
        assert_eq!(extraction.metrics.tables.len(), 2);
        assert_eq!(extraction.total_rows(), 2);
        assert!(extraction.get(&TableKind::FixedIncome).is_none());
    }

    #[test]
    fn preview_reports_shape() {
        let table = ExtractedTable::from_objects(
            &TableKind::Products,
            vec![serde_json::json!({"produto_servico": "Licença"}).as_object().unwrap().clone()],
        );
        let preview = TablePreview::of(&table);
        assert_eq!(preview.shape, [1, 3]);
        assert_eq!(preview.columns, vec!["produto_servico", "detalhes", "categoria"]);
    }
}
