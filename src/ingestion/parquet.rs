//! Parquet reading.

use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveTime};
use parquet::file::reader::{ChunkReader, FileReader};
use parquet::file::serialized_reader::SerializedFileReader;
use parquet::record::Field;

use crate::error::{IngestError, IngestResult};
use crate::types::{RawDataset, RawValue};

/// Read a Parquet file into a [`RawDataset`].
///
/// Notes:
/// - Columns are the top-level fields of the file schema, in schema order
/// - Uses the Parquet record API (`RowIter`); nested groups/lists become [`RawValue::Other`]
pub fn read_parquet_from_path(path: impl AsRef<Path>) -> IngestResult<RawDataset> {
    let path = path.as_ref();
    let reader =
        SerializedFileReader::try_from(path).map_err(|e| IngestError::source_read(path, e))?;

    let columns = parquet_top_level_columns(&reader);

    let mut rows: Vec<Vec<RawValue>> = Vec::new();
    for row_res in reader.into_iter() {
        let row = row_res.map_err(|e| IngestError::source_read(path, e))?;

        let mut out_row = vec![RawValue::Null; columns.len()];
        for (name, field) in row.get_column_iter() {
            if let Some(idx) = columns.iter().position(|c| c == name) {
                out_row[idx] = convert_parquet_field(field);
            }
        }
        rows.push(out_row);
    }

    Ok(RawDataset::new(columns, rows))
}

fn parquet_top_level_columns<R: ChunkReader + 'static>(
    reader: &SerializedFileReader<R>,
) -> Vec<String> {
    reader
        .metadata()
        .file_metadata()
        .schema()
        .get_fields()
        .iter()
        .map(|f| f.name().to_string())
        .collect()
}

const DAYS_FROM_CE_TO_UNIX_EPOCH: i32 = 719_163;

fn convert_parquet_field(f: &Field) -> RawValue {
    match f {
        Field::Null => RawValue::Null,
        Field::Bool(b) => RawValue::Bool(*b),
        Field::Byte(v) => RawValue::Int(i64::from(*v)),
        Field::Short(v) => RawValue::Int(i64::from(*v)),
        Field::Int(v) => RawValue::Int(i64::from(*v)),
        Field::Long(v) => RawValue::Int(*v),
        Field::UByte(v) => RawValue::Int(i64::from(*v)),
        Field::UShort(v) => RawValue::Int(i64::from(*v)),
        Field::UInt(v) => RawValue::Int(i64::from(*v)),
        Field::ULong(v) => match i64::try_from(*v) {
            Ok(i) => RawValue::Int(i),
            Err(_) => RawValue::Other(v.to_string()),
        },
        Field::Float(v) => RawValue::Float(f64::from(*v)),
        Field::Double(v) => RawValue::Float(*v),
        Field::Str(s) => RawValue::Text(s.clone()),
        // Out-of-range temporal values keep their raw number; parquet's own Display
        // panics on them.
        Field::Date(days) => days
            .checked_add(DAYS_FROM_CE_TO_UNIX_EPOCH)
            .and_then(NaiveDate::from_num_days_from_ce_opt)
            .map(|d| RawValue::Timestamp(d.and_time(NaiveTime::MIN)))
            .unwrap_or_else(|| RawValue::Other(days.to_string())),
        Field::TimestampMillis(ms) => DateTime::from_timestamp_millis(*ms)
            .map(|dt| RawValue::Timestamp(dt.naive_utc()))
            .unwrap_or_else(|| RawValue::Other(ms.to_string())),
        Field::TimestampMicros(us) => DateTime::from_timestamp_micros(*us)
            .map(|dt| RawValue::Timestamp(dt.naive_utc()))
            .unwrap_or_else(|| RawValue::Other(us.to_string())),
        other => RawValue::Other(other.to_string()),
    }
}
