//! Legacy multi-file manifest configuration.
//!
//! A manifest maps logical source names to file-path templates:
//!
//! ```yaml
//! currency: nok
//! client_id: acme
//! path_settings:
//!   allow_absolute_paths: false
//! data_sources:
//!   main:
//!     file_path: "exports/main{version}.parquet"
//!     fallback_path: "exports/main.parquet"
//!     required: true
//!   planned:
//!     file_path: "exports/planned_*.parquet"
//!     columns: [record_date, person_name, planned_hours]
//! ```
//!
//! The `main` source is mandatory.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;

use crate::cache::{modified, Cache, Stamp};
use crate::error::{ConfigError, IngestResult};
use crate::paths::ResolveOptions;

/// Name of the mandatory manifest source.
pub const MAIN_SOURCE: &str = "main";

const DEFAULT_SOURCE_COLUMN: &str = "data_source";

/// One logical source in a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SourceEntry {
    /// Path template (may contain `{version}`, `~` and wildcards).
    pub file_path: String,
    /// Template tried when `file_path` resolves to nothing.
    #[serde(default)]
    pub fallback_path: Option<String>,
    /// Whether a missing file blocks the whole load.
    #[serde(default)]
    pub required: bool,
    /// Optional column allow-list.
    #[serde(default)]
    pub columns: Option<Vec<String>>,
    /// Record type to validate against; defaults to the source name.
    #[serde(default)]
    pub record_type: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    pub allow_absolute_paths: bool,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            allow_absolute_paths: true,
        }
    }
}

/// A parsed manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    pub data_sources: BTreeMap<String, SourceEntry>,
    pub currency: Option<String>,
    pub client_id: Option<String>,
    /// Column that tags rows with their source name in multi-source files.
    pub source_column: String,
    pub path_settings: PathSettings,
    /// File the manifest was read from.
    pub path: PathBuf,
}

#[derive(Debug, Deserialize)]
struct RawManifest {
    data_sources: Option<BTreeMap<String, SourceEntry>>,
    currency: Option<String>,
    client_id: Option<String>,
    source_column: Option<String>,
    #[serde(default)]
    path_settings: PathSettings,
}

impl Manifest {
    /// Read and parse a manifest file. Not cached; see [`load_manifest`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text, path)
    }

    pub fn from_yaml_str(text: &str, path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw: RawManifest = serde_yaml::from_str(text).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let data_sources = raw.data_sources.ok_or_else(|| ConfigError::MissingSection {
            path: path.to_path_buf(),
            section: "data_sources".to_string(),
        })?;
        if !data_sources.contains_key(MAIN_SOURCE) {
            return Err(ConfigError::MissingSection {
                path: path.to_path_buf(),
                section: format!("data_sources.{MAIN_SOURCE}"),
            });
        }

        Ok(Self {
            data_sources,
            currency: raw.currency,
            client_id: raw.client_id,
            source_column: raw
                .source_column
                .unwrap_or_else(|| DEFAULT_SOURCE_COLUMN.to_string()),
            path_settings: raw.path_settings,
            path: path.to_path_buf(),
        })
    }

    /// Directory relative templates are resolved against.
    pub fn base_dir(&self) -> PathBuf {
        let absolute = std::path::absolute(&self.path).unwrap_or_else(|_| self.path.clone());
        absolute
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default()
    }

    pub fn resolve_options(&self) -> ResolveOptions {
        ResolveOptions {
            allow_absolute_paths: self.path_settings.allow_absolute_paths,
        }
    }
}

/// Load a manifest through `cache`, keyed by path and modification time.
pub fn load_manifest(path: impl AsRef<Path>, cache: &Cache) -> IngestResult<Arc<Manifest>> {
    let path = path.as_ref().to_path_buf();
    let stamp = Stamp::of([modified(&path)]);
    let manifest = cache
        .manifests()
        .get_or_try_insert_with(path.clone(), stamp, || Manifest::load(&path).map(Arc::new))?;
    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sources_and_settings() {
        let text = r#"
currency: usd
path_settings: { allow_absolute_paths: false }
data_sources:
  main: { file_path: "main{version}.csv", fallback_path: main.csv, required: true }
  planned: { file_path: "planned_*.csv", columns: [a, b], record_type: planned_record }
"#;
        let m = Manifest::from_yaml_str(text, "/srv/cfg/data_manifest.yaml").unwrap();
        assert_eq!(m.currency.as_deref(), Some("usd"));
        assert_eq!(m.source_column, "data_source");
        assert!(!m.resolve_options().allow_absolute_paths);
        assert!(m.data_sources["main"].required);
        assert!(!m.data_sources["planned"].required);
        assert_eq!(
            m.data_sources["planned"].record_type.as_deref(),
            Some("planned_record")
        );
        assert_eq!(m.base_dir(), PathBuf::from("/srv/cfg"));
    }

    #[test]
    fn main_source_is_mandatory() {
        let text = "data_sources:\n  planned: { file_path: p.csv }\n";
        let err = Manifest::from_yaml_str(text, "m.yaml").unwrap_err();
        match err {
            ConfigError::MissingSection { section, .. } => assert_eq!(section, "data_sources.main"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn missing_data_sources_section() {
        let err = Manifest::from_yaml_str("currency: nok\n", "m.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::MissingSection { .. }));
    }
}
