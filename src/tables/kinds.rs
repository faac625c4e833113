//! Table kinds and the row shapes the completion model is asked to produce.
//!
//! The six built-in kinds deserialize into typed rows through the lenient field helpers; keys
//! the model adds beyond the requested shape are kept in `extra` so column drift survives into
//! the snapshot. Row fields carry the names used in the prompts. Anything else is a [`ExtractedTable::Generic`] table of open records.

use super::lenient;
use super::record::{Record, Scalar};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Identifier of a table type requested from the completion model.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TableKind {
    /// `investimento_financeiro`: headline financial indicators.
    Investment,
    /// `renda_fixa`: fixed-income positions.
    FixedIncome,
    /// `valores_contrato`: monetary values and their descriptions.
    ContractValues,
    /// `produtos_servicos`: products, services, and items.
    Products,
    /// `cronograma_pagamentos`: payment schedule and deadlines.
    PaymentSchedule,
    /// `partes_contrato`: contract parties.
    Parties,
    /// Any other identifier, extracted with the generic prompt.
    Other(String),
}

impl TableKind {
    /// Resolve an identifier. Unknown identifiers map to [`TableKind::Other`].
    pub fn parse(id: &str) -> Self {
        match id.trim() {
            "investimento_financeiro" => Self::Investment,
            "renda_fixa" => Self::FixedIncome,
            "valores_contrato" => Self::ContractValues,
            "produtos_servicos" => Self::Products,
            "cronograma_pagamentos" => Self::PaymentSchedule,
            "partes_contrato" => Self::Parties,
            other => Self::Other(other.to_string()),
        }
    }

    /// Identifier used in prompts, metrics, CSV names and API payloads.
    pub fn id(&self) -> &str {
        match self {
            Self::Investment => "investimento_financeiro",
            Self::FixedIncome => "renda_fixa",
            Self::ContractValues => "valores_contrato",
            Self::Products => "produtos_servicos",
            Self::PaymentSchedule => "cronograma_pagamentos",
            Self::Parties => "partes_contrato",
            Self::Other(id) => id,
        }
    }
}

fn extras(record: &mut Record, extra: &BTreeMap<String, Value>) {
    for (key, value) in extra {
        record.set(key.clone(), Scalar::from_json(value));
    }
}

/// One row of `investimento_financeiro`.
#[derive(Debug, Clone, Default, Deserialize)]
#[allow(missing_docs)]
pub struct InvestmentRow {
    #[serde(default, deserialize_with = "lenient::text")]
    pub empresa: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub periodo: Option<String>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub receita_bruta: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub variacao_receita_bruta: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub ebitda: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub margem_ebitda: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub variacao_ebitda: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub lucro_liquido: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub margem_lucro_liquido: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub variacao_lucro_liquido: Option<f64>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl InvestmentRow {
    fn to_record(&self) -> Record {
        let mut record = Record::new()
            .with("empresa", self.empresa.clone())
            .with("periodo", self.periodo.clone())
            .with("receita_bruta", self.receita_bruta)
            .with("variacao_receita_bruta", self.variacao_receita_bruta)
            .with("ebitda", self.ebitda)
            .with("margem_ebitda", self.margem_ebitda)
            .with("variacao_ebitda", self.variacao_ebitda)
            .with("lucro_liquido", self.lucro_liquido)
            .with("margem_lucro_liquido", self.margem_lucro_liquido)
            .with("variacao_lucro_liquido", self.variacao_lucro_liquido);
        extras(&mut record, &self.extra);
        record
    }
}

/// One row of `renda_fixa`.
#[derive(Debug, Clone, Default, Deserialize)]
#[allow(missing_docs)]
pub struct FixedIncomeRow {
    #[serde(default, deserialize_with = "lenient::text")]
    pub banco: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub tipo_carteira: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub tipo: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub ativo: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub data_aplicacao: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub data_carencia: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub data_vencimento: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub taxa_compra: Option<String>,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub disponivel: Option<bool>,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub garantia: Option<bool>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub valor_aplicado: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub posicao_taxa_compra: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub valor_liquido: Option<f64>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl FixedIncomeRow {
    fn to_record(&self) -> Record {
        let mut record = Record::new()
            .with("banco", self.banco.clone())
            .with("tipo_carteira", self.tipo_carteira.clone())
            .with("tipo", self.tipo.clone())
            .with("ativo", self.ativo.clone())
            .with("data_aplicacao", self.data_aplicacao.clone())
            .with("data_carencia", self.data_carencia.clone())
            .with("data_vencimento", self.data_vencimento.clone())
            .with("taxa_compra", self.taxa_compra.clone())
            .with("disponivel", self.disponivel)
            .with("garantia", self.garantia)
            .with("valor_aplicado", self.valor_aplicado)
            .with("posicao_taxa_compra", self.posicao_taxa_compra)
            .with("valor_liquido", self.valor_liquido);
        extras(&mut record, &self.extra);
        record
    }
}

/// One row of `valores_contrato`.
#[derive(Debug, Clone, Default, Deserialize)]
#[allow(missing_docs)]
pub struct ContractValueRow {
    #[serde(
        rename = "Descricao",
        alias = "Descrição",
        alias = "descricao",
        default,
        deserialize_with = "lenient::text"
    )]
    pub descricao: Option<String>,
    #[serde(alias = "Valor", default, deserialize_with = "lenient::number")]
    pub valor: Option<f64>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl ContractValueRow {
    fn to_record(&self) -> Record {
        let mut record = Record::new()
            .with("Descricao", self.descricao.clone())
            .with("valor", self.valor);
        extras(&mut record, &self.extra);
        record
    }
}

/// One row of `produtos_servicos`.
#[derive(Debug, Clone, Default, Deserialize)]
#[allow(missing_docs)]
pub struct ProductRow {
    #[serde(default, deserialize_with = "lenient::text")]
    pub produto_servico: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub detalhes: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub categoria: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl ProductRow {
    fn to_record(&self) -> Record {
        let mut record = Record::new()
            .with("produto_servico", self.produto_servico.clone())
            .with("detalhes", self.detalhes.clone())
            .with("categoria", self.categoria.clone());
        extras(&mut record, &self.extra);
        record
    }
}

/// One row of `cronograma_pagamentos`. `Valor` stays textual: schedules mix amounts with
/// notes such as "a combinar".
#[derive(Debug, Clone, Default, Deserialize)]
#[allow(missing_docs)]
pub struct ScheduleRow {
    #[serde(rename = "Data/Prazo", alias = "Data", default, deserialize_with = "lenient::text")]
    pub data_prazo: Option<String>,
    #[serde(
        rename = "Descrição",
        alias = "Descricao",
        default,
        deserialize_with = "lenient::text"
    )]
    pub descricao: Option<String>,
    #[serde(rename = "Valor", alias = "valor", default, deserialize_with = "lenient::text")]
    pub valor: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl ScheduleRow {
    fn to_record(&self) -> Record {
        let mut record = Record::new()
            .with("Data/Prazo", self.data_prazo.clone())
            .with("Descrição", self.descricao.clone())
            .with("Valor", self.valor.clone());
        extras(&mut record, &self.extra);
        record
    }
}

/// One row of `partes_contrato`.
#[derive(Debug, Clone, Default, Deserialize)]
#[allow(missing_docs)]
pub struct PartyRow {
    #[serde(rename = "Tipo", default, deserialize_with = "lenient::text")]
    pub tipo: Option<String>,
    #[serde(rename = "Nome", default, deserialize_with = "lenient::text")]
    pub nome: Option<String>,
    #[serde(rename = "Documento", default, deserialize_with = "lenient::text")]
    pub documento: Option<String>,
    #[serde(
        rename = "Endereço",
        alias = "Endereco",
        default,
        deserialize_with = "lenient::text"
    )]
    pub endereco: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl PartyRow {
    fn to_record(&self) -> Record {
        let mut record = Record::new()
            .with("Tipo", self.tipo.clone())
            .with("Nome", self.nome.clone())
            .with("Documento", self.documento.clone())
            .with("Endereço", self.endereco.clone());
        extras(&mut record, &self.extra);
        record
    }
}

/// Rows extracted for one table type.
#[derive(Debug, Clone)]
pub enum ExtractedTable {
    /// `investimento_financeiro` rows.
    Investment(Vec<InvestmentRow>),
    /// `renda_fixa` rows.
    FixedIncome(Vec<FixedIncomeRow>),
    /// `valores_contrato` rows.
    ContractValues(Vec<ContractValueRow>),
    /// `produtos_servicos` rows.
    Products(Vec<ProductRow>),
    /// `cronograma_pagamentos` rows.
    PaymentSchedule(Vec<ScheduleRow>),
    /// `partes_contrato` rows.
    Parties(Vec<PartyRow>),
    /// Rows of a type without a fixed shape.
    Generic {
        /// Identifier the rows were requested for.
        table_type: String,
        /// Open records in model order.
        rows: Vec<Record>,
    },
}

fn typed<T: for<'de> Deserialize<'de>>(
    table_type: &str,
    objects: Vec<Map<String, Value>>,
) -> Vec<T> {
    objects
        .into_iter()
        .filter_map(|object| match serde_json::from_value(Value::Object(object)) {
            Ok(row) => Some(row),
            Err(err) => {
                tracing::warn!(
                    table_type,
                    error = %err,
                    "Dropping row that does not fit table shape"
                );
                None
            }
        })
        .collect()
}

impl ExtractedTable {
    /// Shape raw JSON objects according to `kind`.
    pub fn from_objects(kind: &TableKind, objects: Vec<Map<String, Value>>) -> Self {
        let id = kind.id();
        match kind {
            TableKind::Investment => Self::Investment(typed(id, objects)),
            TableKind::FixedIncome => Self::FixedIncome(typed(id, objects)),
            TableKind::ContractValues => Self::ContractValues(typed(id, objects)),
            TableKind::Products => Self::Products(typed(id, objects)),
            TableKind::PaymentSchedule => Self::PaymentSchedule(typed(id, objects)),
            TableKind::Parties => Self::Parties(typed(id, objects)),
            TableKind::Other(table_type) => Self::Generic {
                table_type: table_type.clone(),
                rows: objects.iter().map(Record::from_json_object).collect(),
            },
        }
    }

    /// Kind of the table.
    pub fn kind(&self) -> TableKind {
        match self {
            Self::Investment(_) => TableKind::Investment,
            Self::FixedIncome(_) => TableKind::FixedIncome,
            Self::ContractValues(_) => TableKind::ContractValues,
            Self::Products(_) => TableKind::Products,
            Self::PaymentSchedule(_) => TableKind::PaymentSchedule,
            Self::Parties(_) => TableKind::Parties,
            Self::Generic { table_type, .. } => TableKind::Other(table_type.clone()),
        }
    }

    /// Identifier of the table type.
    pub fn table_type(&self) -> &str {
        match self {
            Self::Generic { table_type, .. } => table_type,
            Self::Investment(_) => "investimento_financeiro",
            Self::FixedIncome(_) => "renda_fixa",
            Self::ContractValues(_) => "valores_contrato",
            Self::Products(_) => "produtos_servicos",
            Self::PaymentSchedule(_) => "cronograma_pagamentos",
            Self::Parties(_) => "partes_contrato",
        }
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        match self {
            Self::Investment(rows) => rows.len(),
            Self::FixedIncome(rows) => rows.len(),
            Self::ContractValues(rows) => rows.len(),
            Self::Products(rows) => rows.len(),
            Self::PaymentSchedule(rows) => rows.len(),
            Self::Parties(rows) => rows.len(),
            Self::Generic { rows, .. } => rows.len(),
        }
    }

    /// True when no rows were extracted.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rows as ordered records: the requested columns first, then any extra keys.
    pub fn records(&self) -> Vec<Record> {
        match self {
            Self::Investment(rows) => rows.iter().map(InvestmentRow::to_record).collect(),
            Self::FixedIncome(rows) => rows.iter().map(FixedIncomeRow::to_record).collect(),
            Self::ContractValues(rows) => rows.iter().map(ContractValueRow::to_record).collect(),
            Self::Products(rows) => rows.iter().map(ProductRow::to_record).collect(),
            Self::PaymentSchedule(rows) => rows.iter().map(ScheduleRow::to_record).collect(),
            Self::Parties(rows) => rows.iter().map(PartyRow::to_record).collect(),
            Self::Generic { rows, .. } => rows.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn objects(value: Value) -> Vec<Map<String, Value>> {
        value
            .as_array()
            .unwrap()
            .iter()
            .map(|row| row.as_object().unwrap().clone())
            .collect()
    }

    #[test]
    fn kinds_round_trip_through_identifiers() {
        for id in crate::config::DEFAULT_TARGET_TABLES {
            assert_eq!(TableKind::parse(id).id(), id);
        }
        assert_eq!(TableKind::parse("clausulas"), TableKind::Other("clausulas".into()));
    }

    #[test]
    fn fixed_income_rows_coerce_and_keep_drifted_columns() {
        let table = ExtractedTable::from_objects(
            &TableKind::FixedIncome,
            objects(json!([
                {"banco": "XP", "disponivel": "sim", "valor_aplicado": "10.500,00", "rating": "AA"}
            ])),
        );
        let ExtractedTable::FixedIncome(rows) = &table else {
            panic!("expected fixed income rows");
        };
        assert_eq!(rows[0].disponivel, Some(true));
        assert_eq!(rows[0].valor_aplicado, Some(10.5));

        let record = &table.records()[0];
        assert_eq!(record.get("rating"), Some(&Scalar::Text("AA".into())));
        assert_eq!(record.get("garantia"), Some(&Scalar::Null));
        assert_eq!(record.columns().next(), Some("banco"));
    }

    #[test]
    fn accented_and_plain_keys_both_match() {
        let table = ExtractedTable::from_objects(
            &TableKind::ContractValues,
            objects(json!([{"Descrição": "Entrada", "Valor": 100}, {"Descricao": "Saldo", "valor": "50"}])),
        );
        let ExtractedTable::ContractValues(rows) = table else {
            panic!("expected contract values");
        };
        assert_eq!(rows[0].descricao.as_deref(), Some("Entrada"));
        assert_eq!(rows[0].valor, Some(100.0));
        assert_eq!(rows[1].valor, Some(50.0));
    }

    #[test]
    fn generic_tables_keep_model_keys() {
        let table = ExtractedTable::from_objects(
            &TableKind::Other("clausulas".into()),
            objects(json!([{"numero": 1, "texto": "Objeto"}])),
        );
        assert_eq!(table.table_type(), "clausulas");
        assert_eq!(table.records()[0].get("numero"), Some(&Scalar::Int(1)));
    }
}
