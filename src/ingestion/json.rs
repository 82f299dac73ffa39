//! JSON reading.
//!
//! Supported inputs:
//! - A JSON array of objects: `[{"a":1}, {"a":2}]`
//! - A single object
//! - Newline-delimited JSON (NDJSON): `{"a":1}\n{"a":2}\n`
//!
//! Columns are the union of top-level keys in order of first appearance (keys of one object
//! come in map order). Nested values are kept as [`RawValue::Other`] holding their JSON text.

use std::fs;
use std::path::Path;

use crate::error::{IngestError, IngestResult};
use crate::types::{RawDataset, RawValue};

/// Read a JSON/NDJSON file into a [`RawDataset`].
pub fn read_json_from_path(path: impl AsRef<Path>) -> IngestResult<RawDataset> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|e| IngestError::source_read(path, e))?;
    read_json_from_str(&text).map_err(|message| IngestError::source_read_msg(path, message))
}

/// Read JSON from an in-memory string into a [`RawDataset`].
pub fn read_json_from_str(input: &str) -> Result<RawDataset, String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Ok(RawDataset::default());
    }

    // First try parsing as a single JSON value (array or object).
    if let Ok(v) = serde_json::from_str::<serde_json::Value>(trimmed) {
        match v {
            serde_json::Value::Array(items) => raw_from_json_values(&items),
            serde_json::Value::Object(_) => raw_from_json_values(std::slice::from_ref(&v)),
            _ => Err("json must be an object, an array of objects, or NDJSON".to_string()),
        }
    } else {
        // Fall back to NDJSON.
        let mut values = Vec::new();
        for (i, line) in trimmed.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let v = serde_json::from_str::<serde_json::Value>(line)
                .map_err(|e| format!("invalid ndjson at line {}: {}", i + 1, e))?;
            values.push(v);
        }
        raw_from_json_values(&values)
    }
}

fn raw_from_json_values(values: &[serde_json::Value]) -> Result<RawDataset, String> {
    let mut columns: Vec<String> = Vec::new();
    for (idx0, v) in values.iter().enumerate() {
        let obj = v
            .as_object()
            .ok_or_else(|| format!("row {} is not a json object", idx0 + 1))?;
        for key in obj.keys() {
            if !columns.contains(key) {
                columns.push(key.clone());
            }
        }
    }

    let rows = values
        .iter()
        .filter_map(serde_json::Value::as_object)
        .map(|obj| {
            columns
                .iter()
                .map(|c| obj.get(c).map(convert_json_value).unwrap_or(RawValue::Null))
                .collect()
        })
        .collect();

    Ok(RawDataset::new(columns, rows))
}

fn convert_json_value(v: &serde_json::Value) -> RawValue {
    match v {
        serde_json::Value::Null => RawValue::Null,
        serde_json::Value::Bool(b) => RawValue::Bool(*b),
        serde_json::Value::String(s) => RawValue::Text(s.clone()),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                RawValue::Int(i)
            } else if let Some(f) = n.as_f64() {
                RawValue::Float(f)
            } else {
                RawValue::Other(n.to_string())
            }
        }
        other => RawValue::Other(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn columns_are_union_in_first_seen_order() {
        let ds = read_json_from_str(r#"[{"a":1,"b":"x"},{"c":true,"a":2.5}]"#).unwrap();
        assert_eq!(ds.columns, vec!["a", "b", "c"]);
        assert_eq!(
            ds.rows[1],
            vec![RawValue::Float(2.5), RawValue::Null, RawValue::Bool(true)]
        );
    }

    #[test]
    fn ndjson_and_nested_values() {
        let ds = read_json_from_str("{\"a\":1}\n\n{\"a\":{\"deep\":[1]}}\n").unwrap();
        assert_eq!(ds.row_count(), 2);
        assert_eq!(ds.rows[1][0], RawValue::Other(r#"{"deep":[1]}"#.to_string()));
    }

    #[test]
    fn scalar_document_is_rejected() {
        assert!(read_json_from_str("42").is_err());
    }
}
