use super::SnapshotError;
use super::frame::{ColumnType, Frame};
use crate::tables::Scalar;
use arrow::array::{ArrayRef, BooleanArray, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::sync::Arc;

fn arrow_type(data_type: ColumnType) -> DataType {
    match data_type {
        ColumnType::Long => DataType::Int64,
        ColumnType::Double => DataType::Float64,
        ColumnType::Boolean => DataType::Boolean,
        ColumnType::String => DataType::Utf8,
    }
}

fn column_array(frame: &Frame, name: &str, data_type: ColumnType) -> ArrayRef {
    let cells = frame.cells(name);
    match data_type {
        ColumnType::Long => Arc::new(Int64Array::from_iter(cells.map(|cell| match cell {
            Scalar::Int(value) => Some(*value),
            _ => None,
        }))),
        ColumnType::Double => Arc::new(Float64Array::from_iter(cells.map(Scalar::as_f64))),
        ColumnType::Boolean => Arc::new(BooleanArray::from_iter(cells.map(|cell| match cell {
            Scalar::Bool(flag) => Some(*flag),
            _ => None,
        }))),
        ColumnType::String => Arc::new(StringArray::from_iter(
            cells.map(|cell| (!cell.is_null()).then(|| cell.to_string())),
        )),
    }
}

/// Encode `frame` as a snappy-compressed Parquet file with every column nullable.
pub fn encode_parquet(frame: &Frame) -> Result<Vec<u8>, SnapshotError> {
    let fields: Vec<Field> = frame
        .columns()
        .iter()
        .map(|column| Field::new(column.name.as_str(), arrow_type(column.data_type), true))
        .collect();
    let schema = Arc::new(Schema::new(fields));
    let arrays: Vec<ArrayRef> = frame
        .columns()
        .iter()
        .map(|column| column_array(frame, &column.name, column.data_type))
        .collect();
    let batch = RecordBatch::try_new(schema.clone(), arrays)?;

    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut buffer = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buffer, schema, Some(props))?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::Record;
    use arrow::array::Array;
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

    #[test]
    fn writes_readable_typed_columns() {
        let frame = Frame::from_records(vec![
            Record::new()
                .with("empresa", "ACME")
                .with("receita", 10i64)
                .with("margem", 0.25),
            Record::new().with("empresa", "Beta").with("receita", 7i64),
        ]);

        let bytes = encode_parquet(&frame).unwrap();
        assert_eq!(&bytes[..4], b"PAR1");

        let reader = ParquetRecordBatchReaderBuilder::try_new(bytes::Bytes::from(bytes))
            .unwrap()
            .build()
            .unwrap();
        let batches: Vec<RecordBatch> = reader.map(Result::unwrap).collect();
        assert_eq!(batches.len(), 1);
        let batch = &batches[0];
        assert_eq!(batch.num_rows(), 2);
        assert_eq!(batch.schema().field(1).data_type(), &DataType::Int64);

        let receita = batch
            .column(1)
            .as_any()
            .downcast_ref::<Int64Array>()
            .unwrap();
        assert_eq!(receita.value(1), 7);
        let margem = batch
            .column(2)
            .as_any()
            .downcast_ref::<Float64Array>()
            .unwrap();
        assert!(margem.is_null(1));
    }
}
