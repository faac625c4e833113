use crate::tables::{Record, Scalar, union_columns};
use serde::Serialize;
use serde_json::{Map, Value, json};

static NULL: Scalar = Scalar::Null;

/// Column type inferred from observed cell values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    /// Every non-null value is a whole number.
    Long,
    /// Every non-null value is numeric, at least one fractional.
    Double,
    /// Every non-null value is a boolean.
    Boolean,
    /// Anything else, including all-null columns.
    String,
}

impl ColumnType {
    /// Type name written to the snapshot log schema.
    pub fn log_name(self) -> &'static str {
        match self {
            Self::Long => "long",
            Self::Double => "double",
            Self::Boolean => "boolean",
            Self::String => "string",
        }
    }

    /// Type name used by the external catalog.
    pub fn catalog_name(self) -> &'static str {
        match self {
            Self::Long => "bigint",
            Self::Double => "double",
            Self::Boolean => "boolean",
            Self::String => "string",
        }
    }

    fn is_numeric(self) -> bool {
        matches!(self, Self::Long | Self::Double)
    }

    fn infer<'a>(values: impl Iterator<Item = &'a Scalar>) -> Self {
        let mut inferred: Option<Self> = None;
        for value in values {
            let observed = match value {
                Scalar::Null => continue,
                Scalar::Int(_) => Self::Long,
                Scalar::Float(_) => Self::Double,
                Scalar::Bool(_) => Self::Boolean,
                Scalar::Text(_) => return Self::String,
            };
            inferred = Some(match (inferred, observed) {
                (None, observed) => observed,
                (Some(current), observed) if current == observed => current,
                (Some(current), observed) if current.is_numeric() && observed.is_numeric() => {
                    Self::Double
                }
                _ => return Self::String,
            });
        }
        inferred.unwrap_or(Self::String)
    }
}

/// One named, nullable column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Column {
    /// Column name.
    pub name: String,
    /// Inferred type.
    pub data_type: ColumnType,
}

/// Rows plus the schema inferred over them. Rows missing a column read as null.
#[derive(Debug, Clone)]
pub struct Frame {
    columns: Vec<Column>,
    rows: Vec<Record>,
}

impl Frame {
    /// Infer a schema over `rows`. Columns appear in first-seen order.
    pub fn from_records(rows: Vec<Record>) -> Self {
        let columns = union_columns(&rows)
            .into_iter()
            .map(|name| {
                let data_type =
                    ColumnType::infer(rows.iter().filter_map(|row| row.get(&name)));
                Column { name, data_type }
            })
            .collect();
        Self { columns, rows }
    }

    /// Inferred schema.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Rows in insertion order.
    pub fn rows(&self) -> &[Record] {
        &self.rows
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when there are no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Cells of `column` in row order, with missing cells as [`Scalar::Null`].
    pub fn cells<'a>(&'a self, column: &'a str) -> impl Iterator<Item = &'a Scalar> + 'a {
        self.rows
            .iter()
            .map(move |row| row.get(column).unwrap_or(&NULL))
    }

    /// Per-file statistics: row count plus min, max and null count per column.
    ///
    /// Numeric columns report numbers; every other column reports the lexical min and max of
    /// the rendered values. Columns with no values have no min/max entry.
    pub fn stats(&self) -> Value {
        let mut min_values = Map::new();
        let mut max_values = Map::new();
        let mut null_count = Map::new();

        for column in &self.columns {
            let nulls = self.cells(&column.name).filter(|cell| cell.is_null()).count();
            null_count.insert(column.name.clone(), Value::from(nulls));

            let bounds = if column.data_type.is_numeric() {
                numeric_bounds(self.cells(&column.name).filter_map(Scalar::as_f64))
            } else {
                text_bounds(
                    self.cells(&column.name)
                        .filter(|cell| !cell.is_null())
                        .map(ToString::to_string),
                )
            };
            if let Some((min, max)) = bounds {
                min_values.insert(column.name.clone(), min);
                max_values.insert(column.name.clone(), max);
            }
        }

        json!({
            "numRecords": self.rows.len(),
            "minValues": min_values,
            "maxValues": max_values,
            "nullCount": null_count,
        })
    }
}

fn numeric_bounds(values: impl Iterator<Item = f64>) -> Option<(Value, Value)> {
    let (min, max) = values.fold(None, |acc: Option<(f64, f64)>, value| match acc {
        None => Some((value, value)),
        Some((min, max)) => Some((min.min(value), max.max(value))),
    })?;
    Some((Value::from(min), Value::from(max)))
}

fn text_bounds(values: impl Iterator<Item = String>) -> Option<(Value, Value)> {
    let (min, max) = values.fold(None, |acc: Option<(String, String)>, value| match acc {
        None => Some((value.clone(), value)),
        Some((min, max)) => Some((
            if value < min { value.clone() } else { min },
            if value > max { value } else { max },
        )),
    })?;
    Some((Value::String(min), Value::String(max)))
}
