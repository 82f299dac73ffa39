//! Core data model types.
//!
//! Ingestion reads a physical file into an untyped [`RawDataset`] (a uniform table of
//! [`RawValue`]s with an explicit column → index mapping). Coercion turns it into a
//! [`TypedDataset`] whose cells are canonical [`Value`]s described by a [`Schema`].

use std::fmt;
use std::path::PathBuf;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Canonical textual form for datetimes. Parsing this format round-trips exactly.
pub const CANONICAL_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Logical data type for a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    /// UTF-8 string.
    String,
    /// 64-bit signed integer.
    Integer,
    /// 64-bit floating point number.
    Float,
    /// Naive (timezone-less) date and time.
    Datetime,
    /// Boolean.
    Boolean,
}

impl DataType {
    /// Whether min/max bounds apply to this type.
    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Integer | Self::Float)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Datetime => "datetime",
            Self::Boolean => "boolean",
        };
        f.write_str(s)
    }
}

/// A single named, typed column in a [`Schema`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    /// Field/column name.
    pub name: String,
    /// Field data type.
    pub data_type: DataType,
}

impl Field {
    /// Create a new field.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

/// Ordered list of typed columns describing a [`TypedDataset`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Schema {
    /// Ordered list of fields.
    pub fields: Vec<Field>,
}

impl Schema {
    /// Create a new schema from fields.
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    /// Iterate field names in order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Returns the index of a field by name, if present.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }
}

/// An untyped cell as read from a physical source.
///
/// This is a closed set: every reader maps its native cell representation onto one of these
/// shapes, so coercion only ever has to handle these variants.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    /// Missing/empty cell.
    Null,
    /// Text cell (CSV cells are always text).
    Text(String),
    /// Integral number.
    Int(i64),
    /// Floating point number.
    Float(f64),
    /// Native boolean.
    Bool(bool),
    /// Native timestamp (Parquet timestamps/dates, spreadsheet datetimes).
    Timestamp(NaiveDateTime),
    /// Anything else (nested values, binary, decimals), kept in its display form.
    Other(String),
}

impl RawValue {
    /// Whether the cell is null or blank text.
    pub fn is_null(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Best-effort text form, `None` for null cells.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::Text(s) => {
                let trimmed = s.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_owned())
            }
            Self::Int(v) => Some(v.to_string()),
            Self::Float(v) => Some(v.to_string()),
            Self::Bool(b) => Some(b.to_string()),
            Self::Timestamp(ts) => Some(ts.format(CANONICAL_DATETIME_FORMAT).to_string()),
            Self::Other(s) => Some(s.clone()),
        }
    }
}

/// In-memory untyped table, as read from a physical source.
///
/// Rows are stored in the same order as `columns`. Never mutated after it is read;
/// carving a subset produces a new dataset.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawDataset {
    /// Ordered column names.
    pub columns: Vec<String>,
    /// Row-major cell storage.
    pub rows: Vec<Vec<RawValue>>,
}

impl RawDataset {
    /// Create a dataset from columns and rows.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<RawValue>>) -> Self {
        Self { columns, rows }
    }

    /// Number of rows in the dataset.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Returns the index of a column by name, if present.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Whether a column with this name exists.
    pub fn has_column(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }

    /// Iterate the cells of one column; `None` if the column is absent.
    pub fn column(&self, name: &str) -> Option<impl Iterator<Item = &RawValue>> {
        let idx = self.index_of(name)?;
        Some(
            self.rows
                .iter()
                .map(move |row| row.get(idx).unwrap_or(&RawValue::Null)),
        )
    }

    /// Copy the rows at `indices` into a new dataset, dropping the column `drop` if given.
    pub fn take_rows(&self, indices: &[usize], drop: Option<&str>) -> Self {
        let drop_idx = drop.and_then(|name| self.index_of(name));
        let columns = self
            .columns
            .iter()
            .enumerate()
            .filter(|(i, _)| Some(*i) != drop_idx)
            .map(|(_, c)| c.clone())
            .collect();
        let rows = indices
            .iter()
            .filter_map(|&i| self.rows.get(i))
            .map(|row| {
                row.iter()
                    .enumerate()
                    .filter(|(i, _)| Some(*i) != drop_idx)
                    .map(|(_, v)| v.clone())
                    .collect()
            })
            .collect();
        Self { columns, rows }
    }

    /// Keep only the listed columns, in the listed order.
    ///
    /// Returns the first missing column name on failure.
    pub fn project(&self, names: &[String]) -> Result<Self, String> {
        let mut idxs = Vec::with_capacity(names.len());
        for name in names {
            idxs.push(self.index_of(name).ok_or_else(|| name.clone())?);
        }
        let rows = self
            .rows
            .iter()
            .map(|row| {
                idxs.iter()
                    .map(|&i| row.get(i).cloned().unwrap_or(RawValue::Null))
                    .collect()
            })
            .collect();
        Ok(Self {
            columns: names.to_vec(),
            rows,
        })
    }
}

/// A single canonical, typed value in a [`TypedDataset`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Missing or unparsable value.
    Null,
    /// 64-bit signed integer.
    Int64(i64),
    /// 64-bit float.
    Float64(f64),
    /// Boolean.
    Bool(bool),
    /// UTF-8 string.
    Utf8(String),
    /// Naive date and time.
    Datetime(NaiveDateTime),
}

impl Value {
    /// Whether this is [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Int64(v) => write!(f, "{v}"),
            Self::Float64(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Utf8(s) => f.write_str(s),
            Self::Datetime(ts) => write!(f, "{}", ts.format(CANONICAL_DATETIME_FORMAT)),
        }
    }
}

/// Coercion output for one record type: canonical typed rows ready for downstream use.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedDataset {
    /// Record type these rows belong to.
    pub record_type: String,
    /// Column names and types, in row order.
    pub schema: Schema,
    /// Row-major value storage.
    pub rows: Vec<Vec<Value>>,
    /// Physical file the rows were read from.
    pub source_path: PathBuf,
}

impl TypedDataset {
    /// Number of rows in the dataset.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Iterate the values of one column; `None` if the column is absent.
    pub fn column(&self, name: &str) -> Option<impl Iterator<Item = &Value>> {
        let idx = self.schema.index_of(name)?;
        Some(self.rows.iter().map(move |row| &row[idx]))
    }
}
