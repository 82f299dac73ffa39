//! CSV reading.

use std::path::Path;

use crate::error::{IngestError, IngestResult};
use crate::types::{RawDataset, RawValue};

/// Read a CSV file into a [`RawDataset`].
///
/// Rules:
///
/// - CSV must have headers; the full header becomes the column list.
/// - Every cell is read as text; empty cells become [`RawValue::Null`].
/// - Short rows are padded with nulls.
pub fn read_csv_from_path(path: impl AsRef<Path>) -> IngestResult<RawDataset> {
    let path = path.as_ref();
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .map_err(|e| IngestError::source_read(path, e))?;
    read_csv_from_reader(&mut rdr).map_err(|e| IngestError::source_read(path, e))
}

/// Read CSV data from an existing CSV reader.
pub fn read_csv_from_reader<R: std::io::Read>(
    rdr: &mut csv::Reader<R>,
) -> Result<RawDataset, csv::Error> {
    let columns: Vec<String> = rdr.headers()?.iter().map(|h| h.trim().to_owned()).collect();

    let mut rows: Vec<Vec<RawValue>> = Vec::new();
    for result in rdr.records() {
        let record = result?;
        let row = (0..columns.len())
            .map(|i| match record.get(i) {
                Some(cell) if !cell.trim().is_empty() => RawValue::Text(cell.to_owned()),
                _ => RawValue::Null,
            })
            .collect();
        rows.push(row);
    }

    Ok(RawDataset::new(columns, rows))
}
