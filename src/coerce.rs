//! Type coercion of a [`RawDataset`] into a [`TypedDataset`].
//!
//! Coercion is permissive and runs regardless of the validation outcome: a value that cannot
//! be converted to its declared type becomes [`Value::Null`] for that cell only. It never
//! fails and never aborts the rest of a column or other columns.

use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};

use crate::schema::SchemaDocument;
use crate::types::{DataType, Field, RawDataset, RawValue, Schema, TypedDataset, Value};

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%d.%m.%Y %H:%M:%S",
    "%d.%m.%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%d.%m.%Y", "%m/%d/%Y"];

/// Parse text into a datetime, trying RFC 3339 then a fixed list of common layouts.
///
/// Offsets are normalised to UTC. Date-only inputs map to midnight.
pub fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        .map(|d| d.and_time(NaiveTime::MIN))
}

/// Parse a boolean token (`true/t/1/yes/y` or `false/f/0/no/n`, case-insensitive).
pub fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "1" | "yes" | "y" => Some(true),
        "false" | "f" | "0" | "no" | "n" => Some(false),
        _ => None,
    }
}

/// Datetime view of a raw cell. Numbers are not datetimes.
pub fn raw_to_datetime(v: &RawValue) -> Option<NaiveDateTime> {
    match v {
        RawValue::Timestamp(ts) => Some(*ts),
        RawValue::Text(s) | RawValue::Other(s) => parse_datetime(s),
        RawValue::Null | RawValue::Int(_) | RawValue::Float(_) | RawValue::Bool(_) => None,
    }
}

/// Numeric view of a raw cell. Non-finite values are rejected.
pub fn raw_to_f64(v: &RawValue) -> Option<f64> {
    let n = match v {
        RawValue::Int(i) => *i as f64,
        RawValue::Float(f) => *f,
        RawValue::Bool(b) => f64::from(u8::from(*b)),
        RawValue::Text(s) | RawValue::Other(s) => s.trim().parse::<f64>().ok()?,
        RawValue::Null | RawValue::Timestamp(_) => return None,
    };
    n.is_finite().then_some(n)
}

pub(crate) fn raw_to_i64(v: &RawValue) -> Option<i64> {
    match v {
        RawValue::Int(i) => Some(*i),
        RawValue::Text(s) | RawValue::Other(s) => match s.trim().parse::<i64>() {
            Ok(i) => Some(i),
            Err(_) => raw_to_f64(v).and_then(integral),
        },
        _ => raw_to_f64(v).and_then(integral),
    }
}

fn integral(f: f64) -> Option<i64> {
    // i64::MAX as f64 rounds up to 2^63, which is out of range.
    (f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64).then_some(f as i64)
}

pub(crate) fn raw_to_bool(v: &RawValue) -> Option<bool> {
    match v {
        RawValue::Bool(b) => Some(*b),
        RawValue::Int(0) => Some(false),
        RawValue::Int(1) => Some(true),
        RawValue::Float(f) if *f == 0.0 => Some(false),
        RawValue::Float(f) if *f == 1.0 => Some(true),
        RawValue::Text(s) | RawValue::Other(s) => parse_bool(s),
        _ => None,
    }
}

/// Convert one raw cell to the canonical value for `data_type`.
pub fn coerce_value(v: &RawValue, data_type: DataType) -> Value {
    if v.is_null() {
        return Value::Null;
    }
    let coerced = match data_type {
        DataType::String => v.as_text().map(Value::Utf8),
        DataType::Integer => raw_to_i64(v).map(Value::Int64),
        DataType::Float => raw_to_f64(v).map(Value::Float64),
        DataType::Datetime => raw_to_datetime(v).map(Value::Datetime),
        DataType::Boolean => raw_to_bool(v).map(Value::Bool),
    };
    coerced.unwrap_or(Value::Null)
}

/// Value used to fill a declared optional field that is absent from the input.
pub fn default_value(data_type: DataType) -> Value {
    match data_type {
        DataType::String => Value::Utf8(String::new()),
        DataType::Integer => Value::Int64(0),
        DataType::Float => Value::Float64(0.0),
        DataType::Boolean => Value::Bool(false),
        DataType::Datetime => Value::Null,
    }
}

/// Coerce `raw` into a [`TypedDataset`] for `record_type`.
///
/// - Columns with a field definition are converted to the declared type.
/// - Columns without one are kept as strings.
/// - Declared optional fields absent from the input are appended, filled with
///   [`default_value`]. Absent required fields are left out (validation reports them).
pub fn transform(
    raw: &RawDataset,
    record_type: &str,
    schema: &SchemaDocument,
    source_path: &Path,
) -> TypedDataset {
    let mut fields: Vec<Field> = raw
        .columns
        .iter()
        .map(|c| {
            let data_type = schema
                .field(c)
                .map(|f| f.data_type)
                .unwrap_or(DataType::String);
            Field::new(c.clone(), data_type)
        })
        .collect();

    let mut rows: Vec<Vec<Value>> = raw
        .rows
        .iter()
        .map(|row| {
            fields
                .iter()
                .enumerate()
                .map(|(i, f)| coerce_value(row.get(i).unwrap_or(&RawValue::Null), f.data_type))
                .collect()
        })
        .collect();

    if let Some(spec) = schema.record_type(record_type) {
        for name in &spec.optional_fields {
            if raw.has_column(name) {
                continue;
            }
            let Some(field) = schema.field(name) else {
                continue;
            };
            let fill = default_value(field.data_type);
            for row in &mut rows {
                row.push(fill.clone());
            }
            fields.push(Field::new(name.clone(), field.data_type));
        }
    }

    TypedDataset {
        record_type: record_type.to_string(),
        schema: Schema::new(fields),
        rows,
        source_path: source_path.to_path_buf(),
    }
}

impl SchemaDocument {
    /// Coerce `raw` for one of this document's record types. See [`transform`].
    pub fn transform(&self, raw: &RawDataset, record_type: &str, source_path: &Path) -> TypedDataset {
        transform(raw, record_type, self, source_path)
    }
}
