//! Per-record-type validation of a [`RawDataset`].

use std::fmt;

use serde::Serialize;

use crate::coerce::{raw_to_bool, raw_to_datetime, raw_to_f64, raw_to_i64};
use crate::types::{DataType, RawDataset};

use super::document::SchemaDocument;

/// A field whose values could not be parsed as the declared type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeIssue {
    pub field: String,
    pub message: String,
}

/// A numeric field with values outside its declared bounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValueIssue {
    pub field: String,
    pub message: String,
    /// Number of rows violating the bound.
    pub violations: usize,
}

/// Outcome of validating one record type. Created once per [`validate`] call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    pub record_type: String,
    pub is_valid: bool,
    /// Missing required fields, in declaration order.
    pub missing_required_fields: Vec<String>,
    /// At most one entry per field.
    pub type_errors: Vec<TypeIssue>,
    /// At most one entry per field and bound.
    pub value_errors: Vec<ValueIssue>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    fn new(record_type: &str) -> Self {
        Self {
            record_type: record_type.to_string(),
            is_valid: true,
            missing_required_fields: Vec::new(),
            type_errors: Vec::new(),
            value_errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    fn finish(mut self) -> Self {
        self.is_valid = self.missing_required_fields.is_empty()
            && self.type_errors.is_empty()
            && self.value_errors.is_empty();
        self
    }
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.is_valid { "valid" } else { "invalid" };
        write!(f, "{}: {status}", self.record_type)?;
        if !self.missing_required_fields.is_empty() {
            write!(f, "; missing required fields: {}", self.missing_required_fields.join(", "))?;
        }
        for e in &self.type_errors {
            write!(f, "; {}: {}", e.field, e.message)?;
        }
        for e in &self.value_errors {
            write!(f, "; {}: {}", e.field, e.message)?;
        }
        Ok(())
    }
}

/// Validate `raw` against the rules of `record_type`.
///
/// Rules:
///
/// - If any required field is missing, only `missing_required_fields` is populated and no
///   type/value checks run.
/// - Datetime, numeric and boolean columns are bulk type-checked with the same parsers
///   coercion uses; any unparsable value yields exactly one type error for that field.
/// - Numeric bounds yield one value error per violated bound, carrying the violation count.
/// - Columns without a field definition produce a warning unless unknown fields are allowed.
pub fn validate(raw: &RawDataset, record_type: &str, schema: &SchemaDocument) -> ValidationResult {
    let mut result = ValidationResult::new(record_type);

    let Some(spec) = schema.record_type(record_type) else {
        result.type_errors.push(TypeIssue {
            field: schema.settings.record_type_column.clone(),
            message: format!("Unknown record type: {record_type}"),
        });
        return result.finish();
    };

    result.missing_required_fields = spec
        .required_fields
        .iter()
        .filter(|f| !raw.has_column(f))
        .cloned()
        .collect();
    if !result.missing_required_fields.is_empty() {
        return result.finish();
    }

    for column in &raw.columns {
        let Some(field) = schema.field(column) else {
            if !schema.settings.allow_unknown_fields {
                result.warnings.push(format!("Unknown field: {column}"));
            }
            continue;
        };
        let Some(cells) = raw.column(column) else {
            continue;
        };
        let cells: Vec<_> = cells.filter(|v| !v.is_null()).collect();

        match field.data_type {
            DataType::Datetime => {
                if cells.iter().any(|v| raw_to_datetime(v).is_none()) {
                    result.type_errors.push(TypeIssue {
                        field: column.clone(),
                        message: "Invalid datetime format".to_string(),
                    });
                }
            }
            DataType::Float => {
                if cells.iter().any(|v| raw_to_f64(v).is_none()) {
                    result.type_errors.push(TypeIssue {
                        field: column.clone(),
                        message: "Non-numeric values found".to_string(),
                    });
                }
            }
            DataType::Integer => {
                if cells.iter().any(|v| raw_to_i64(v).is_none()) {
                    let message = if cells.iter().all(|v| raw_to_f64(v).is_some()) {
                        "Non-integer values found"
                    } else {
                        "Non-numeric values found"
                    };
                    result.type_errors.push(TypeIssue {
                        field: column.clone(),
                        message: message.to_string(),
                    });
                }
            }
            DataType::Boolean => {
                if cells.iter().any(|v| raw_to_bool(v).is_none()) {
                    result.type_errors.push(TypeIssue {
                        field: column.clone(),
                        message: "Invalid boolean values found".to_string(),
                    });
                }
            }
            DataType::String => {}
        }

        if field.data_type.is_numeric() {
            let numbers: Vec<f64> = cells.iter().filter_map(|v| raw_to_f64(v)).collect();
            if let Some(min) = field.min_value {
                let below = numbers.iter().filter(|&&n| n < min).count();
                if below > 0 {
                    result.value_errors.push(ValueIssue {
                        field: column.clone(),
                        message: format!("{below} values below minimum {min}"),
                        violations: below,
                    });
                }
            }
            if let Some(max) = field.max_value {
                let above = numbers.iter().filter(|&&n| n > max).count();
                if above > 0 {
                    result.value_errors.push(ValueIssue {
                        field: column.clone(),
                        message: format!("{above} values above maximum {max}"),
                        violations: above,
                    });
                }
            }
        }
    }

    result.finish()
}

impl SchemaDocument {
    /// Validate `raw` against one of this document's record types. See [`validate`].
    pub fn validate(&self, raw: &RawDataset, record_type: &str) -> ValidationResult {
        validate(raw, record_type, self)
    }
}
