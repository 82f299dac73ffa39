//! Unified raw-read entrypoint.
//!
//! Most callers should use [`read_source`], which reads a physical file once per
//! modification time and shares the resulting [`RawDataset`] through the [`Cache`].
//!
//! - If [`ReadOptions::format`] is `None`, the format is inferred from the file extension.
//! - If [`ReadOptions::columns`] is set, the table is projected onto exactly those columns; a
//!   listed column missing from the file is a read failure.

use std::path::Path;
use std::sync::Arc;

use crate::cache::{modified, Cache, ReadKey, Stamp};
use crate::error::{IngestError, IngestResult};
use crate::types::RawDataset;

use super::{csv, json, parquet};

/// Supported physical formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceFormat {
    /// Comma-separated values.
    Csv,
    /// JSON array-of-objects or NDJSON.
    Json,
    /// Apache Parquet.
    Parquet,
    /// Spreadsheet/workbook formats (feature-gated behind `excel`).
    Excel,
}

impl SourceFormat {
    /// Parse a format from a file extension (case-insensitive).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "csv" => Some(Self::Csv),
            "json" | "ndjson" => Some(Self::Json),
            "parquet" | "pq" => Some(Self::Parquet),
            "xlsx" | "xls" | "xlsm" | "xlsb" | "ods" => Some(Self::Excel),
            _ => None,
        }
    }

    /// Infer the format of `path` from its extension.
    pub fn from_path(path: &Path) -> IngestResult<Self> {
        let ext = path.extension().and_then(|s| s.to_str()).ok_or_else(|| {
            IngestError::source_read_msg(path, "cannot infer format: path has no extension")
        })?;
        Self::from_extension(ext).ok_or_else(|| {
            IngestError::source_read_msg(path, format!("cannot infer format from extension '{ext}'"))
        })
    }
}

/// How to choose sheet(s) when reading a workbook.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ExcelSheetSelection {
    /// Read the first sheet (default).
    #[default]
    First,
    /// Read a single named sheet.
    Sheet(String),
    /// Read all sheets and concatenate rows.
    AllSheets,
    /// Read only the listed sheets (in order) and concatenate rows.
    Sheets(Vec<String>),
}

/// Options controlling a physical read.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReadOptions {
    /// If `None`, auto-detect format from file extension.
    pub format: Option<SourceFormat>,
    /// Column allow-list applied after reading.
    pub columns: Option<Vec<String>>,
    /// Workbook-specific options.
    pub excel_sheet: ExcelSheetSelection,
}

impl ReadOptions {
    fn cache_params(&self) -> String {
        format!("{:?}|{:?}|{:?}", self.format, self.columns, self.excel_sheet)
    }
}

/// Read `path` without caching.
pub fn read_raw_from_path(path: impl AsRef<Path>, options: &ReadOptions) -> IngestResult<RawDataset> {
    let path = path.as_ref();
    let format = match options.format {
        Some(f) => f,
        None => SourceFormat::from_path(path)?,
    };

    let raw = match format {
        SourceFormat::Csv => csv::read_csv_from_path(path)?,
        SourceFormat::Json => json::read_json_from_path(path)?,
        SourceFormat::Parquet => parquet::read_parquet_from_path(path)?,
        SourceFormat::Excel => read_excel_dispatch(path, &options.excel_sheet)?,
    };

    match &options.columns {
        Some(columns) => raw.project(columns).map_err(|missing| {
            IngestError::source_read_msg(path, format!("column '{missing}' listed in columns is missing"))
        }),
        None => Ok(raw),
    }
}

/// Read `path` through `cache`, keyed by path, read options and modification time.
///
/// Read failures are returned and never cached.
pub fn read_source(
    path: impl AsRef<Path>,
    options: &ReadOptions,
    cache: &Cache,
) -> IngestResult<Arc<RawDataset>> {
    let path = path.as_ref();
    let key = ReadKey {
        path: path.to_path_buf(),
        params: options.cache_params(),
    };
    cache
        .reads()
        .get_or_try_insert_with(key, Stamp::of([modified(path)]), || {
            let raw = read_raw_from_path(path, options)?;
            tracing::debug!(
                path = %path.display(),
                rows = raw.row_count(),
                columns = raw.columns.len(),
                "read physical source"
            );
            Ok(Arc::new(raw))
        })
}

fn read_excel_dispatch(path: &Path, sel: &ExcelSheetSelection) -> IngestResult<RawDataset> {
    #[cfg(feature = "excel")]
    {
        use super::excel;

        match sel {
            ExcelSheetSelection::First => excel::read_excel_from_path(path, None),
            ExcelSheetSelection::Sheet(name) => excel::read_excel_from_path(path, Some(name.as_str())),
            ExcelSheetSelection::AllSheets => excel::read_excel_workbook_from_path(path, None),
            ExcelSheetSelection::Sheets(names) => {
                let refs: Vec<&str> = names.iter().map(|s| s.as_str()).collect();
                excel::read_excel_workbook_from_path(path, Some(refs.as_slice()))
            }
        }
    }

    #[cfg(not(feature = "excel"))]
    {
        let _ = sel;
        Err(IngestError::source_read_msg(
            path,
            "excel reading not enabled (enable cargo feature 'excel')",
        ))
    }
}
