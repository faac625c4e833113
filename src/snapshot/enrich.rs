use crate::clock;
use crate::tables::{Record, TableMetrics};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;

/// Provenance stamped onto every snapshot row of one document run.
#[derive(Debug, Clone)]
pub struct Provenance {
    /// Original upload file name.
    pub filename: String,
    /// Model that extracted the tables.
    pub model_used: String,
    /// Seconds spent in table extraction.
    pub llm_seconds: f64,
    /// Instant of the snapshot run.
    pub processed_at: OffsetDateTime,
}

impl Provenance {
    /// Provenance for `filename` from extraction metrics, stamped now.
    pub fn new(filename: impl Into<String>, metrics: &TableMetrics) -> Self {
        let model_used = if metrics.model_used.is_empty() {
            "modelo_nao_identificado".to_string()
        } else {
            metrics.model_used.clone()
        };
        Self {
            filename: filename.into(),
            model_used,
            llm_seconds: metrics.total_processing_time,
            processed_at: OffsetDateTime::now_utc(),
        }
    }

    /// File name without its extension.
    pub fn base_name(&self) -> &str {
        let name = self.filename.rsplit(['/', '\\']).next().unwrap_or(&self.filename);
        match name.rfind('.') {
            Some(dot) if dot > 0 => &name[..dot],
            _ => name,
        }
    }
}

/// Advisory content hash of a row: first 16 hex chars of the SHA-256 of its JSON.
pub fn row_hash(record: &Record) -> String {
    let canonical = record.to_json().to_string();
    let digest = Sha256::digest(canonical.as_bytes());
    hex::encode(digest)[..16].to_string()
}

/// Add tracing and provenance columns to rows bound for a primary snapshot.
pub fn enrich_primary(rows: Vec<Record>, provenance: &Provenance) -> Vec<Record> {
    let processed = clock::rfc3339(provenance.processed_at);
    let inserted = clock::datetime_seconds(provenance.processed_at);
    rows.into_iter()
        .map(|record| {
            let hash = row_hash(&record);
            record
                .with("arquivo_origem", provenance.filename.as_str())
                .with("data_processamento", processed.as_str())
                .with("hash_linha", hash)
                .with("fonte_arquivo", provenance.filename.as_str())
                .with("data_insercao", inserted.as_str())
                .with("Arquivo", provenance.filename.as_str())
                .with("modelo_llm_usado", provenance.model_used.as_str())
                .with("tempo_processamento_llm_segundos", provenance.llm_seconds)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn provenance() -> Provenance {
        Provenance {
            filename: "contrato.final.pdf".into(),
            model_used: "llama3.1".into(),
            llm_seconds: 1.25,
            processed_at: datetime!(2024-01-02 03:04:05 UTC),
        }
    }

    #[test]
    fn base_name_drops_only_the_last_extension() {
        assert_eq!(provenance().base_name(), "contrato.final");
        let mut other = provenance();
        other.filename = "uploads/relatorio".into();
        assert_eq!(other.base_name(), "relatorio");
    }

    #[test]
    fn primary_rows_gain_provenance_columns() {
        let rows = enrich_primary(vec![Record::new().with("empresa", "ACME")], &provenance());
        let columns: Vec<_> = rows[0].columns().collect();
        assert_eq!(
            columns,
            vec![
                "empresa",
                "arquivo_origem",
                "data_processamento",
                "hash_linha",
                "fonte_arquivo",
                "data_insercao",
                "Arquivo",
                "modelo_llm_usado",
                "tempo_processamento_llm_segundos",
            ]
        );
        assert_eq!(rows[0].get("data_insercao").unwrap().to_string(), "2024-01-02 03:04:05");
        assert_eq!(rows[0].get("hash_linha").unwrap().to_string().len(), 16);
    }

    #[test]
    fn hash_depends_on_row_content_only() {
        let a = Record::new().with("empresa", "ACME");
        let b = Record::new().with("empresa", "ACME");
        let c = Record::new().with("empresa", "Beta");
        assert_eq!(row_hash(&a), row_hash(&b));
        assert_ne!(row_hash(&a), row_hash(&c));
    }
}
