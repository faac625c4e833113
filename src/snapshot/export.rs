use super::SnapshotError;
use crate::clock;
use crate::storage::BlobStore;
use crate::tables::{ExtractedTable, Record, union_columns};
use std::collections::BTreeMap;
use time::OffsetDateTime;

const CSV_CONTENT_TYPE: &str = "text/csv";

/// Render `rows` as CSV with the union of their columns as header. Missing cells are empty.
pub fn render_csv(rows: &[Record]) -> Result<Vec<u8>, SnapshotError> {
    let columns = union_columns(rows);
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(&columns)?;
    for row in rows {
        writer.write_record(columns.iter().map(|column| {
            row.get(column).map(ToString::to_string).unwrap_or_default()
        }))?;
    }
    writer
        .into_inner()
        .map_err(|err| SnapshotError::Csv(err.into_error().into()))
}

/// Write every non-empty table to `{folder}/csv/{base}_{table}_{stamp}.csv`.
///
/// Failures are logged per table and do not stop the others. Returns table type to location
/// for each file written.
pub async fn export_tables(
    store: &dyn BlobStore,
    folder: &str,
    base_name: &str,
    tables: &[ExtractedTable],
    at: OffsetDateTime,
) -> BTreeMap<String, String> {
    let stamp = clock::file_stamp(at);
    let folder = folder.trim_end_matches('/');
    let mut written = BTreeMap::new();

    for table in tables.iter().filter(|table| !table.is_empty()) {
        let table_type = table.table_type();
        let key = format!("{folder}/csv/{base_name}_{table_type}_{stamp}.csv");
        let result = match render_csv(&table.records()) {
            Ok(bytes) => store
                .put(&key, bytes, CSV_CONTENT_TYPE)
                .await
                .map_err(SnapshotError::from),
            Err(err) => Err(err),
        };
        match result {
            Ok(()) => {
                tracing::info!(table_type, key = %key, "CSV exported");
                written.insert(table_type.to_string(), store.uri(&key));
            }
            Err(err) => tracing::error!(table_type, error = %err, "CSV export failed"),
        }
    }
    written
}
