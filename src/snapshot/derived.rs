//! Analytical tables derived from one document's extracted tables.

use super::enrich::Provenance;
use crate::clock;
use crate::tables::lenient::parse_number;
use crate::tables::{
    ContractValueRow, ExtractedTable, Record, ScheduleRow, TableExtraction, TableKind,
};

/// Decides whether a contract value belongs to a product.
pub trait ValueMatcher: Send + Sync {
    /// True when `value_description` refers to `product_name`.
    fn matches(&self, product_name: &str, value_description: &str) -> bool;
}

/// Matches when any whitespace-separated word of the product name occurs in the description,
/// ignoring case.
#[derive(Debug, Clone, Copy, Default)]
pub struct WordOverlapMatcher;

impl ValueMatcher for WordOverlapMatcher {
    fn matches(&self, product_name: &str, value_description: &str) -> bool {
        let description = value_description.to_lowercase();
        product_name
            .to_lowercase()
            .split_whitespace()
            .any(|word| description.contains(word))
    }
}

fn contract_values(extraction: &TableExtraction) -> &[ContractValueRow] {
    match extraction.get(&TableKind::ContractValues) {
        Some(ExtractedTable::ContractValues(rows)) => rows.as_slice(),
        _ => &[],
    }
}

fn schedule(extraction: &TableExtraction) -> &[ScheduleRow] {
    match extraction.get(&TableKind::PaymentSchedule) {
        Some(ExtractedTable::PaymentSchedule(rows)) => rows.as_slice(),
        _ => &[],
    }
}

/// Product names: the first cell of each row of `produtos_servicos`, or of
/// `investimento_financeiro` when no products were extracted.
fn product_names(extraction: &TableExtraction) -> Vec<String> {
    let source = extraction
        .get(&TableKind::Products)
        .or_else(|| extraction.get(&TableKind::Investment));
    source
        .map(|table| {
            table
                .records()
                .iter()
                .map(|record| {
                    record
                        .iter()
                        .next()
                        .map(|(_, value)| value.to_string())
                        .unwrap_or_default()
                })
                .collect()
        })
        .unwrap_or_default()
}

/// True when a product-value table can be derived.
pub fn can_derive_product_values(extraction: &TableExtraction) -> bool {
    (extraction.get(&TableKind::Products).is_some()
        || extraction.get(&TableKind::Investment).is_some())
        && !contract_values(extraction).is_empty()
}

/// True when a cash-flow table can be derived.
pub fn can_derive_cash_flow(extraction: &TableExtraction) -> bool {
    !schedule(extraction).is_empty() && !contract_values(extraction).is_empty()
}

/// One row per product with the first matching contract value.
///
/// A value matches when the matcher accepts its description and it carries a number; the
/// first match wins and is flagged `Alta`. Products without a match get `0.0` and `Baixa`.
pub fn product_values(
    extraction: &TableExtraction,
    matcher: &dyn ValueMatcher,
    provenance: &Provenance,
) -> Vec<Record> {
    let values = contract_values(extraction);
    let analysed = clock::day_first_minutes(provenance.processed_at);
    let processed = clock::rfc3339(provenance.processed_at);

    product_names(extraction)
        .into_iter()
        .map(|product| {
            let matched = values.iter().find_map(|value| {
                let description = value.descricao.as_deref().unwrap_or_default();
                if matcher.matches(&product, description) {
                    value.valor
                } else {
                    None
                }
            });
            let (estimate, confidence) = match matched {
                Some(amount) => (amount, "Alta"),
                None => (0.0, "Baixa"),
            };
            Record::new()
                .with("Arquivo", provenance.filename.as_str())
                .with("Produto_Servico", product)
                .with("Valor_Estimado", estimate)
                .with("Confianca_Valor", confidence)
                .with("Data_Analise", analysed.as_str())
                .with("data_processamento", processed.as_str())
                .with("modelo_llm_usado", provenance.model_used.as_str())
                .with("tempo_processamento_llm_segundos", provenance.llm_seconds)
        })
        .collect()
}

/// Share of the contract total assumed for a schedule entry without its own amount.
fn default_share(description: &str, total: f64, entries: usize) -> f64 {
    let description = description.to_lowercase();
    if description.contains("entrada") {
        total * 0.3
    } else if description.contains("parcela") {
        total * 0.2
    } else if description.contains("final") {
        total * 0.1
    } else {
        total / entries as f64
    }
}

/// One row per schedule entry with an explicit or estimated amount.
///
/// The contract total is the sum of every numeric contract value. Entries with a non-zero
/// amount keep it; the rest get a keyword-based share of the total.
pub fn cash_flow(extraction: &TableExtraction, provenance: &Provenance) -> Vec<Record> {
    let entries = schedule(extraction);
    let total: f64 = contract_values(extraction)
        .iter()
        .filter_map(|value| value.valor)
        .sum();
    let analysed = clock::day_first_minutes(provenance.processed_at);
    let processed = clock::rfc3339(provenance.processed_at);

    entries
        .iter()
        .map(|entry| {
            let description = entry.descricao.clone().unwrap_or_default();
            let explicit = entry
                .valor
                .as_deref()
                .and_then(parse_number)
                .filter(|amount| *amount != 0.0);
            let estimate =
                explicit.unwrap_or_else(|| default_share(&description, total, entries.len()));
            let share = if total > 0.0 { estimate / total * 100.0 } else { 0.0 };
            Record::new()
                .with("Arquivo", provenance.filename.as_str())
                .with("Data_Prevista", entry.data_prazo.clone().unwrap_or_default())
                .with("Descricao_Fluxo", description)
                .with("Valor_Estimado", estimate)
                .with("Percentual_Total", share)
                .with("Data_Analise", analysed.as_str())
                .with("data_processamento", processed.as_str())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::Scalar;
    use serde_json::{Value, json};
    use time::macros::datetime;

    fn provenance() -> Provenance {
        Provenance {
            filename: "contrato.pdf".into(),
            model_used: "llama3.1".into(),
            llm_seconds: 2.0,
            processed_at: datetime!(2024-01-02 03:04:05 UTC),
        }
    }

    fn table(kind: TableKind, rows: Value) -> ExtractedTable {
        let objects = rows
            .as_array()
            .unwrap()
            .iter()
            .map(|row| row.as_object().unwrap().clone())
            .collect();
        ExtractedTable::from_objects(&kind, objects)
    }

    fn extraction(tables: Vec<ExtractedTable>) -> TableExtraction {
        TableExtraction {
            tables,
            ..TableExtraction::default()
        }
    }

    #[test]
    fn word_overlap_ignores_case() {
        let matcher = WordOverlapMatcher;
        assert!(matcher.matches("Licença Software", "Valor da licença anual"));
        assert!(!matcher.matches("Consultoria", "Valor da licença anual"));
        assert!(!matcher.matches("", "qualquer"));
    }

    #[test]
    fn products_take_the_first_matching_value() {
        let extraction = extraction(vec![
            table(
                TableKind::Products,
                json!([{"produto_servico": "Licença Software"}, {"produto_servico": "Suporte"}]),
            ),
            table(
                TableKind::ContractValues,
                json!([
                    {"Descricao": "Licença perpétua", "valor": "R$ 1200,50"},
                    {"Descricao": "Licença extra", "valor": 99},
                    {"Descricao": "Treinamento", "valor": 10}
                ]),
            ),
        ]);
        assert!(can_derive_product_values(&extraction));

        let rows = product_values(&extraction, &WordOverlapMatcher, &provenance());
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("Valor_Estimado"), Some(&Scalar::Float(1200.5)));
        assert_eq!(rows[0].get("Confianca_Valor"), Some(&Scalar::from("Alta")));
        assert_eq!(rows[1].get("Valor_Estimado"), Some(&Scalar::Float(0.0)));
        assert_eq!(rows[1].get("Confianca_Valor"), Some(&Scalar::from("Baixa")));
        assert_eq!(rows[0].get("Data_Analise"), Some(&Scalar::from("02/01/2024 03:04")));
    }

    #[test]
    fn investment_rows_stand_in_for_products() {
        let extraction = extraction(vec![
            table(TableKind::Investment, json!([{"empresa": "ACME", "receita_bruta": 10}])),
            table(TableKind::ContractValues, json!([{"Descricao": "Aporte ACME", "valor": 50}])),
        ]);
        let rows = product_values(&extraction, &WordOverlapMatcher, &provenance());
        assert_eq!(rows[0].get("Produto_Servico"), Some(&Scalar::from("ACME")));
        assert_eq!(rows[0].get("Valor_Estimado"), Some(&Scalar::Float(50.0)));
    }

    #[test]
    fn cash_flow_applies_keyword_shares() {
        let extraction = extraction(vec![
            table(
                TableKind::PaymentSchedule,
                json!([
                    {"Data/Prazo": "01/02/2024", "Descrição": "Entrada"},
                    {"Data/Prazo": "01/03/2024", "Descrição": "Parcela 1", "Valor": "0"},
                    {"Data/Prazo": "01/04/2024", "Descrição": "Pagamento final"},
                    {"Data/Prazo": "01/05/2024", "Descrição": "Ajuste", "Valor": "250"}
                ]),
            ),
            table(
                TableKind::ContractValues,
                json!([{"Descricao": "Total", "valor": 1000}, {"Descricao": "Obs", "valor": "n/d"}]),
            ),
        ]);
        assert!(can_derive_cash_flow(&extraction));

        let rows = cash_flow(&extraction, &provenance());
        let estimates: Vec<_> = rows
            .iter()
            .map(|row| row.get("Valor_Estimado").and_then(Scalar::as_f64).unwrap())
            .collect();
        assert_eq!(estimates, vec![300.0, 200.0, 100.0, 250.0]);
        assert_eq!(rows[0].get("Percentual_Total"), Some(&Scalar::Float(30.0)));
        assert_eq!(rows[3].get("Data_Prevista"), Some(&Scalar::from("01/05/2024")));
    }

    #[test]
    fn unmatched_entries_split_the_total_evenly() {
        let extraction = extraction(vec![
            table(
                TableKind::PaymentSchedule,
                json!([{"Descrição": "Marco A"}, {"Descrição": "Marco B"}]),
            ),
            table(TableKind::ContractValues, json!([{"Descricao": "Total", "valor": 900}])),
        ]);
        let rows = cash_flow(&extraction, &provenance());
        assert_eq!(rows[1].get("Valor_Estimado"), Some(&Scalar::Float(450.0)));
        assert_eq!(rows[1].get("Data_Prevista"), Some(&Scalar::from("")));
    }

    #[test]
    fn nothing_derives_without_contract_values() {
        let extraction = extraction(vec![table(
            TableKind::PaymentSchedule,
            json!([{"Descrição": "Entrada"}]),
        )]);
        assert!(!can_derive_cash_flow(&extraction));
        assert!(!can_derive_product_values(&extraction));
    }
}
