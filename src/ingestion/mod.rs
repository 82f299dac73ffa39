//! Physical readers and load observability.
//!
//! Most callers should use [`read_source`] (from [`unified`]) which:
//!
//! - auto-detects format by file extension (or you can override via [`ReadOptions`])
//! - reads the whole table into an untyped [`crate::types::RawDataset`]
//! - memoizes the result per path and modification time
//!
//! Format-specific functions are also available under:
//! - [`csv`]
//! - [`json`]
//! - [`parquet`]

pub mod csv;
#[cfg(feature = "excel")]
pub mod excel;
pub mod json;
pub mod observability;
pub mod parquet;
pub mod unified;

pub use observability::{
    CompositeObserver, FileObserver, LoadContext, LoadObserver, LoadStats, StdErrObserver,
};
pub use unified::{read_raw_from_path, read_source, ExcelSheetSelection, ReadOptions, SourceFormat};
