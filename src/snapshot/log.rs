//! Snapshot log actions in the Delta Lake JSON layout.
//!
//! Each log entry is a file of newline-delimited actions named by its zero-padded sequence
//! number, so that key order equals commit order.

use super::SnapshotError;
use super::frame::Frame;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Directory, relative to the table prefix, holding log entries.
pub const LOG_DIR: &str = "_delta_log/";

const ENGINE_INFO: &str = concat!("ragpipe/", env!("CARGO_PKG_VERSION"));

/// Kind of write recorded by a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    /// First entry of a table; carries schema and protocol.
    Create,
    /// Later entry referencing one new data file.
    Append,
}

/// Key of log entry `sequence` under `prefix`.
pub fn log_key(prefix: &str, sequence: u64) -> String {
    format!("{prefix}{LOG_DIR}{sequence:020}.json")
}

/// Sequence number encoded in a log entry key, if the key names one.
pub fn parse_sequence(key: &str) -> Option<u64> {
    let name = key.rsplit('/').next()?;
    let digits = name.strip_suffix(".json")?;
    if digits.len() != 20 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Data file name: sequence, content hash, and transaction prefix.
pub fn data_file_name(sequence: u64, content_hash: &str, txn_id: &str) -> String {
    format!(
        "part-{sequence:05}-{}-{}-c000.snappy.parquet",
        &content_hash[..8.min(content_hash.len())],
        &txn_id[..8.min(txn_id.len())]
    )
}

#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationParameters {
    pub mode: String,
    pub partition_by: String,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationMetrics {
    pub num_files: String,
    pub num_output_rows: String,
    pub num_output_bytes: String,
}

/// Provenance of one commit.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitInfo {
    pub timestamp: i64,
    pub operation: String,
    pub operation_parameters: OperationParameters,
    pub isolation_level: String,
    pub is_blind_append: bool,
    pub operation_metrics: OperationMetrics,
    pub engine_info: String,
    pub txn_id: String,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Format {
    pub provider: String,
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

/// Table identity and schema, written once by the CREATE entry.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaData {
    pub id: String,
    pub format: Format,
    pub schema_string: String,
    pub partition_columns: Vec<String>,
    pub configuration: BTreeMap<String, String>,
    pub created_time: i64,
}

/// Reader and writer versions required by the table.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Protocol {
    pub min_reader_version: u32,
    pub min_writer_version: u32,
}

/// Reference to one data file plus its statistics.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddFile {
    pub path: String,
    pub partition_values: BTreeMap<String, String>,
    pub size: u64,
    pub modification_time: i64,
    pub data_change: bool,
    /// JSON text with `numRecords`, `minValues`, `maxValues`, `nullCount`.
    pub stats: String,
}

/// One line of a log entry.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Action {
    CommitInfo(CommitInfo),
    MetaData(MetaData),
    Protocol(Protocol),
    Add(AddFile),
}

/// One field of the schema string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaField {
    /// Column name.
    pub name: String,
    /// Log type name (`long`, `double`, `boolean`, `string`).
    #[serde(rename = "type")]
    pub data_type: String,
    /// Always true for written tables.
    pub nullable: bool,
    /// Unused field metadata.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

#[derive(Serialize, Deserialize)]
struct StructType {
    #[serde(rename = "type")]
    kind: String,
    fields: Vec<SchemaField>,
}

/// Schema of `frame` as log fields.
pub fn schema_fields(frame: &Frame) -> Vec<SchemaField> {
    frame
        .columns()
        .iter()
        .map(|column| SchemaField {
            name: column.name.clone(),
            data_type: column.data_type.log_name().to_string(),
            nullable: true,
            metadata: BTreeMap::new(),
        })
        .collect()
}

/// Inputs of one commit.
pub(crate) struct Commit<'a> {
    pub operation: Operation,
    pub frame: &'a Frame,
    pub data_path: &'a str,
    pub data_size: u64,
    pub table_id: &'a str,
    pub txn_id: &'a str,
    pub timestamp_ms: i64,
}

impl Commit<'_> {
    /// Actions in write order: CREATE adds metadata and protocol between commit info and add.
    pub fn actions(&self) -> Result<Vec<Action>, SnapshotError> {
        let rows = self.frame.len().to_string();
        let mut actions = vec![Action::CommitInfo(CommitInfo {
            timestamp: self.timestamp_ms,
            operation: "WRITE".into(),
            operation_parameters: OperationParameters {
                mode: "Append".into(),
                partition_by: "[]".into(),
            },
            isolation_level: "Serializable".into(),
            is_blind_append: true,
            operation_metrics: OperationMetrics {
                num_files: "1".into(),
                num_output_rows: rows,
                num_output_bytes: self.data_size.to_string(),
            },
            engine_info: ENGINE_INFO.into(),
            txn_id: self.txn_id.to_string(),
        })];

        if self.operation == Operation::Create {
            let schema_string = serde_json::to_string(&StructType {
                kind: "struct".into(),
                fields: schema_fields(self.frame),
            })?;
            actions.push(Action::MetaData(MetaData {
                id: self.table_id.to_string(),
                format: Format {
                    provider: "parquet".into(),
                    options: BTreeMap::new(),
                },
                schema_string,
                partition_columns: Vec::new(),
                configuration: BTreeMap::new(),
                created_time: self.timestamp_ms,
            }));
            actions.push(Action::Protocol(Protocol {
                min_reader_version: 1,
                min_writer_version: 2,
            }));
        }

        actions.push(Action::Add(AddFile {
            path: self.data_path.to_string(),
            partition_values: BTreeMap::new(),
            size: self.data_size,
            modification_time: self.timestamp_ms,
            data_change: true,
            stats: serde_json::to_string(&self.frame.stats())?,
        }));
        Ok(actions)
    }

    /// Newline-delimited compact JSON of [`Commit::actions`].
    pub fn render(&self) -> Result<String, SnapshotError> {
        let mut text = String::new();
        for action in self.actions()? {
            text.push_str(&serde_json::to_string(&action)?);
            text.push('\n');
        }
        Ok(text)
    }
}

/// A log entry read back from storage.
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    /// Position in the log, from the entry's key.
    pub sequence: u64,
    /// CREATE when the entry carries table metadata.
    pub operation: Operation,
    /// Schema declared by a CREATE entry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<Vec<SchemaField>>,
    /// Data file added by this entry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub added_file: Option<AddFile>,
    /// Commit timestamp in milliseconds.
    pub timestamp: i64,
}

impl LogEntry {
    /// Parse the actions of the entry stored at `key`.
    pub fn parse(key: &str, text: &str) -> Result<Self, SnapshotError> {
        let corrupt = |reason: String| SnapshotError::CorruptLog {
            key: key.to_string(),
            reason,
        };
        let sequence = parse_sequence(key).ok_or_else(|| corrupt("not a log entry key".into()))?;

        let mut entry = LogEntry {
            sequence,
            operation: Operation::Append,
            schema: None,
            added_file: None,
            timestamp: 0,
        };
        for line in text.lines().filter(|line| !line.trim().is_empty()) {
            let action: Action =
                serde_json::from_str(line).map_err(|err| corrupt(err.to_string()))?;
            match action {
                Action::CommitInfo(info) => entry.timestamp = info.timestamp,
                Action::MetaData(meta) => {
                    let schema: StructType = serde_json::from_str(&meta.schema_string)
                        .map_err(|err| corrupt(err.to_string()))?;
                    entry.operation = Operation::Create;
                    entry.schema = Some(schema.fields);
                }
                Action::Protocol(_) => {}
                Action::Add(add) => entry.added_file = Some(add),
            }
        }
        Ok(entry)
    }

    /// Row count recorded in the added file's statistics.
    pub fn row_count(&self) -> Option<u64> {
        let stats: serde_json::Value = serde_json::from_str(&self.added_file.as_ref()?.stats).ok()?;
        stats.get("numRecords")?.as_u64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::Record;

    fn frame() -> Frame {
        Frame::from_records(vec![Record::new().with("empresa", "ACME").with("receita", 10i64)])
    }

    fn commit(frame: &Frame, operation: Operation) -> Commit<'_> {
        Commit {
            operation,
            frame,
            data_path: "part-00000-aaaaaaaa-bbbbbbbb-c000.snappy.parquet",
            data_size: 512,
            table_id: "table-id",
            txn_id: "txn-id",
            timestamp_ms: 1_700_000_000_000,
        }
    }

    #[test]
    fn keys_sort_by_sequence() {
        assert_eq!(
            log_key("f/delta_datasets/investimento/", 1),
            "f/delta_datasets/investimento/_delta_log/00000000000000000001.json"
        );
        assert_eq!(parse_sequence(&log_key("p/", 42)), Some(42));
        assert_eq!(parse_sequence("p/_delta_log/00000000000000000003.crc"), None);
        assert_eq!(parse_sequence("p/_delta_log/3.json"), None);
        assert!(log_key("p/", 9) < log_key("p/", 10));
    }

    #[test]
    fn create_entry_carries_schema_and_protocol() {
        let frame = frame();
        let text = commit(&frame, Operation::Create).render().unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("{\"commitInfo\":"));
        assert!(lines[1].starts_with("{\"metaData\":"));
        assert!(lines[2].contains("\"minReaderVersion\":1"));
        assert!(lines[3].starts_with("{\"add\":"));

        let entry = LogEntry::parse("p/_delta_log/00000000000000000000.json", &text).unwrap();
        assert_eq!(entry.operation, Operation::Create);
        let schema = entry.schema.unwrap();
        assert_eq!(schema[1].name, "receita");
        assert_eq!(schema[1].data_type, "long");
        assert_eq!(entry.added_file.as_ref().unwrap().size, 512);
    }

    #[test]
    fn append_entry_only_references_the_new_file() {
        let frame = frame();
        let text = commit(&frame, Operation::Append).render().unwrap();
        assert_eq!(text.lines().count(), 2);

        let entry = LogEntry::parse("p/_delta_log/00000000000000000001.json", &text).unwrap();
        assert_eq!(entry.sequence, 1);
        assert_eq!(entry.operation, Operation::Append);
        assert!(entry.schema.is_none());
        assert_eq!(entry.row_count(), Some(1));
    }

    #[test]
    fn data_file_names_are_deterministic() {
        assert_eq!(
            data_file_name(3, "0123456789abcdef", "fedcba98-7654"),
            "part-00003-01234567-fedcba98-c000.snappy.parquet"
        );
    }
}
