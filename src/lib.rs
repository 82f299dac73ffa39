//! `schema-ingest` turns loosely-typed columnar files into validated, strongly-typed datasets,
//! one per logical record type.
//!
//! A single physical file may multiplex several record types through a discriminator column.
//! Which fields each record type requires, their types and their bounds come from an external
//! YAML [`schema::SchemaDocument`], not from code.
//!
//! ## Pipeline
//!
//! 1. [`paths::PathResolver`] turns a template + version into a concrete file (version
//!    substitution, `~`, wildcards with a smallest-match tie-break, one-level fallback).
//! 2. [`ingestion::read_source`] reads the file once into an untyped [`types::RawDataset`].
//! 3. [`split::RecordTypeSplitter`] routes rows to record types.
//! 4. [`schema::validate`] checks each subset; [`coerce::transform`] always converts it to a
//!    [`types::TypedDataset`].
//! 5. A [`loader::DatasetLoader`] publishes everything in a [`loader::LoadReport`].
//!
//! Every expensive step is memoized in an injected [`cache::Cache`], keyed by modification time.
//!
//! **File formats (auto-detected by extension):**
//!
//! - **CSV**: `.csv`
//! - **JSON**: `.json` (array-of-objects) and `.ndjson` (newline-delimited objects)
//! - **Parquet**: `.parquet`, `.pq`
//! - **Excel/workbooks** (requires the Cargo feature `excel`): `.xlsx`, `.xls`, `.xlsm`, `.xlsb`, `.ods`
//!
//! ## Quick example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use schema_ingest::cache::Cache;
//! use schema_ingest::discovery::DEFAULT_DATA_DIRS;
//! use schema_ingest::loader::{DatasetLoader, SourceDescriptor, LoaderOptions};
//! use schema_ingest::schema::load_schema;
//!
//! # fn main() -> Result<(), schema_ingest::IngestError> {
//! let cache = Arc::new(Cache::new());
//! let schema = load_schema("config/schema.yaml", &cache)?;
//!
//! let Some(source) = SourceDescriptor::detect(DEFAULT_DATA_DIRS) else {
//!     return Ok(());
//! };
//! let loader = source.loader_for(schema, cache, LoaderOptions::default());
//! let report = loader.load("adjusted")?;
//!
//! for (record_type, loaded) in &report.datasets {
//!     println!("{record_type}: {} rows, valid={}", loaded.dataset.row_count(), loaded.validation.is_valid);
//! }
//! for warning in &report.warnings {
//!     eprintln!("warning: {warning}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`schema`]: schema document parsing and per-record-type validation
//! - [`coerce`]: raw → canonical value conversion
//! - [`split`]: discriminator-based row routing and source analysis
//! - [`loader`]: unified and manifest loading strategies
//! - [`paths`]: path template resolution
//! - [`manifest`]: legacy multi-file manifest configuration
//! - [`cache`]: mtime-keyed memoization
//! - [`discovery`]: data directory scanning
//! - [`ingestion`]: physical readers and load observers
//! - [`types`]: raw and typed dataset types
//! - [`error`]: error types and severities

pub mod cache;
pub mod coerce;
pub mod discovery;
pub mod error;
pub mod ingestion;
pub mod loader;
pub mod manifest;
pub mod paths;
pub mod schema;
pub mod split;
pub mod types;

pub use error::{ConfigError, IngestError, IngestResult, Severity};
