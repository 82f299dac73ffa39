//! Externally configured schema: document loading and per-record-type validation.
//!
//! - [`document`]: YAML schema parsing into an immutable [`SchemaDocument`]
//! - [`validate`](mod@validate): checks a [`crate::types::RawDataset`] against one record type

pub mod document;
pub mod validate;

pub use document::{
    load_schema, FieldSpec, RecordTypeSpec, SchemaDocument, SchemaSettings, SchemaSummary,
};
pub use validate::{validate, TypeIssue, ValidationResult, ValueIssue};
