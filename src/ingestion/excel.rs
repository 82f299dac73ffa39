#![cfg(feature = "excel")]

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader, Sheets};
use chrono::{Duration, NaiveDate, NaiveDateTime};

use crate::error::{IngestError, IngestResult};
use crate::types::{RawDataset, RawValue};

/// Read one sheet of a workbook (`.xlsx`, `.xls`, `.ods`, etc.) into a [`RawDataset`].
///
/// Behavior:
/// - Picks `sheet_name` if provided; otherwise uses the first sheet in the workbook
/// - Detects the first non-empty row as the header row
/// - Native cell types are kept (numbers, booleans, datetimes); empty cells become null
pub fn read_excel_from_path(
    path: impl AsRef<Path>,
    sheet_name: Option<&str>,
) -> IngestResult<RawDataset> {
    let path = path.as_ref();
    let mut workbook = open_workbook_auto(path).map_err(|e| IngestError::source_read(path, e))?;

    let sheet = match sheet_name {
        Some(name) => name.to_string(),
        None => workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| IngestError::source_read_msg(path, "workbook has no sheets"))?,
    };
    read_sheets(path, &mut workbook, &[sheet])
}

/// Read several sheets and concatenate their rows.
///
/// - If `sheet_names` is `None`, reads **all sheets** in workbook order.
/// - Every sheet must carry the same header row as the first one.
pub fn read_excel_workbook_from_path(
    path: impl AsRef<Path>,
    sheet_names: Option<&[&str]>,
) -> IngestResult<RawDataset> {
    let path = path.as_ref();
    let mut workbook = open_workbook_auto(path).map_err(|e| IngestError::source_read(path, e))?;

    let sheets: Vec<String> = match sheet_names {
        Some(names) => names.iter().map(|s| s.to_string()).collect(),
        None => workbook.sheet_names().to_vec(),
    };
    if sheets.is_empty() {
        return Err(IngestError::source_read_msg(path, "workbook has no sheets"));
    }
    read_sheets(path, &mut workbook, &sheets)
}

fn read_sheets(
    path: &Path,
    workbook: &mut Sheets<BufReader<File>>,
    sheets: &[String],
) -> IngestResult<RawDataset> {
    let mut columns: Option<Vec<String>> = None;
    let mut rows: Vec<Vec<RawValue>> = Vec::new();

    for sheet in sheets {
        let range = workbook
            .worksheet_range(sheet)
            .map_err(|e| IngestError::source_read(path, e))?;
        let (header, mut sheet_rows) = read_sheet_range(&range)
            .map_err(|message| IngestError::source_read_msg(path, format!("sheet '{sheet}': {message}")))?;

        match &columns {
            None => columns = Some(header),
            Some(first) if *first != header => {
                return Err(IngestError::source_read_msg(
                    path,
                    format!("sheet '{sheet}': headers {header:?} differ from {first:?}"),
                ));
            }
            Some(_) => {}
        }
        rows.append(&mut sheet_rows);
    }

    Ok(RawDataset::new(columns.unwrap_or_default(), rows))
}

fn read_sheet_range(range: &calamine::Range<Data>) -> Result<(Vec<String>, Vec<Vec<RawValue>>), String> {
    let mut iter = range.rows().skip_while(|row| row.iter().all(|c| matches!(c, Data::Empty)));
    let header: Vec<String> = iter
        .next()
        .ok_or_else(|| "sheet has no non-empty rows (no header row found)".to_string())?
        .iter()
        .map(|c| cell_to_header_string(c).trim().to_string())
        .collect();

    let rows = iter
        .map(|row| {
            (0..header.len())
                .map(|i| convert_cell(row.get(i).unwrap_or(&Data::Empty)))
                .collect()
        })
        .collect();
    Ok((header, rows))
}

fn cell_to_header_string(c: &Data) -> String {
    match c {
        Data::String(s) => s.clone(),
        Data::Float(f) if f.fract() == 0.0 => (*f as i64).to_string(),
        Data::Empty => String::new(),
        other => other.to_string(),
    }
}

fn convert_cell(c: &Data) -> RawValue {
    match c {
        Data::Empty => RawValue::Null,
        Data::String(s) => RawValue::Text(s.clone()),
        Data::Int(i) => RawValue::Int(*i),
        Data::Float(f) => RawValue::Float(*f),
        Data::Bool(b) => RawValue::Bool(*b),
        Data::DateTime(dt) => excel_serial_to_datetime(dt.as_f64())
            .map(RawValue::Timestamp)
            .unwrap_or_else(|| RawValue::Other(dt.to_string())),
        Data::DateTimeIso(s) => RawValue::Text(s.clone()),
        Data::DurationIso(s) => RawValue::Other(s.clone()),
        Data::Error(e) => RawValue::Other(format!("{e:?}")),
    }
}

/// Excel stores datetimes as fractional days since 1899-12-30.
fn excel_serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let millis = (serial * 86_400_000.0).round() as i64;
    epoch.checked_add_signed(Duration::milliseconds(millis))
}
