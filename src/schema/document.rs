//! Schema document parsing.
//!
//! A schema document is a YAML file naming every field (type and bounds) and, for each record
//! type, which of those fields are required or optional:
//!
//! ```yaml
//! schema_version: "2.1"
//! settings:
//!   record_type_column: record_type
//!   default_record_type: time_record
//!   allow_unknown_fields: true
//! record_types:
//!   time_record:
//!     display_name: Time Records
//!     session_state_target: transformed_df
//!     required_fields: [record_date, person_name, hours_used]
//!     optional_fields: [hours_billable]
//! fields:
//!   record_date: { type: datetime }
//!   person_name: { type: string, description: Who logged the hours }
//!   hours_used: { type: float, min_value: 0, max_value: 24 }
//!   hours_billable: { type: float, min_value: 0 }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;

use crate::cache::{modified, Cache, Stamp};
use crate::error::{ConfigError, IngestResult};
use crate::types::DataType;

const DEFAULT_RECORD_TYPE_COLUMN: &str = "record_type";
const DEFAULT_RECORD_TYPE: &str = "time_record";
const DEFAULT_TARGET: &str = "transformed_df";

/// Declared type and constraints of one field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    pub data_type: DataType,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    pub description: Option<String>,
}

/// One logical record type: which fields it requires and where its dataset is published.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordTypeSpec {
    pub name: String,
    /// Ordered required field names.
    pub required_fields: Vec<String>,
    /// Ordered optional field names.
    pub optional_fields: Vec<String>,
    pub display_name: String,
    pub description: Option<String>,
    /// Name of the dataset slot the typed rows are published under.
    pub target: String,
}

impl RecordTypeSpec {
    /// Required fields followed by optional fields.
    pub fn all_fields(&self) -> impl Iterator<Item = &str> {
        self.required_fields
            .iter()
            .chain(self.optional_fields.iter())
            .map(String::as_str)
    }
}

/// Global schema settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SchemaSettings {
    /// Discriminator column selecting each row's record type.
    pub record_type_column: String,
    /// Record type assumed when the discriminator column is absent.
    pub default_record_type: String,
    /// When `false`, columns without a field definition produce validation warnings.
    pub allow_unknown_fields: bool,
}

impl Default for SchemaSettings {
    fn default() -> Self {
        Self {
            record_type_column: DEFAULT_RECORD_TYPE_COLUMN.to_string(),
            default_record_type: DEFAULT_RECORD_TYPE.to_string(),
            allow_unknown_fields: true,
        }
    }
}

/// Short description of a loaded schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaSummary {
    pub version: String,
    pub description: String,
    pub record_types: Vec<String>,
    pub total_fields: usize,
    pub source_path: PathBuf,
}

/// Parsed, cross-checked schema document. Immutable once loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaDocument {
    pub version: String,
    pub description: Option<String>,
    pub settings: SchemaSettings,
    pub fields: BTreeMap<String, FieldSpec>,
    pub record_types: BTreeMap<String, RecordTypeSpec>,
    /// File the document was read from (empty for in-memory documents).
    pub source_path: PathBuf,
}

#[derive(Debug, Deserialize)]
struct RawDocument {
    schema_version: Option<serde_yaml::Value>,
    description: Option<String>,
    settings: Option<SchemaSettings>,
    record_types: Option<BTreeMap<String, RawRecordType>>,
    fields: Option<BTreeMap<String, RawField>>,
}

#[derive(Debug, Deserialize)]
struct RawRecordType {
    #[serde(default)]
    required_fields: Vec<String>,
    #[serde(default)]
    optional_fields: Vec<String>,
    display_name: Option<String>,
    description: Option<String>,
    session_state_target: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawField {
    #[serde(rename = "type", default = "default_field_type")]
    data_type: DataType,
    min_value: Option<f64>,
    max_value: Option<f64>,
    description: Option<String>,
}

fn default_field_type() -> DataType {
    DataType::String
}

impl SchemaDocument {
    /// Read and parse a schema file. Not cached; see [`load_schema`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text, path)
    }

    /// Parse a schema document from YAML text. `path` is only used in error messages and
    /// [`SchemaDocument::source_path`].
    pub fn from_yaml_str(text: &str, path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw: RawDocument =
            serde_yaml::from_str(text).map_err(|e| ConfigError::Parse {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        let missing = |section: &str| ConfigError::MissingSection {
            path: path.to_path_buf(),
            section: section.to_string(),
        };
        let version = raw.schema_version.ok_or_else(|| missing("schema_version"))?;
        let settings = raw.settings.ok_or_else(|| missing("settings"))?;
        let raw_record_types = raw.record_types.ok_or_else(|| missing("record_types"))?;
        let raw_fields = raw.fields.ok_or_else(|| missing("fields"))?;

        let fields: BTreeMap<String, FieldSpec> = raw_fields
            .into_iter()
            .map(|(name, f)| {
                let spec = FieldSpec {
                    name: name.clone(),
                    data_type: f.data_type,
                    min_value: f.min_value,
                    max_value: f.max_value,
                    description: f.description,
                };
                (name, spec)
            })
            .collect();

        let record_types: BTreeMap<String, RecordTypeSpec> = raw_record_types
            .into_iter()
            .map(|(name, rt)| {
                let spec = RecordTypeSpec {
                    name: name.clone(),
                    required_fields: dedup(rt.required_fields),
                    optional_fields: dedup(rt.optional_fields),
                    display_name: rt.display_name.unwrap_or_else(|| name.clone()),
                    description: rt.description,
                    target: rt
                        .session_state_target
                        .unwrap_or_else(|| DEFAULT_TARGET.to_string()),
                };
                (name, spec)
            })
            .collect();

        // Collect every dangling reference before failing.
        let references: Vec<(String, String)> = record_types
            .values()
            .flat_map(|rt| {
                rt.all_fields()
                    .filter(|f| !fields.contains_key(*f))
                    .map(|f| (rt.name.clone(), f.to_string()))
                    .collect::<Vec<_>>()
            })
            .collect();
        if !references.is_empty() {
            return Err(ConfigError::UndefinedFields {
                path: path.to_path_buf(),
                references,
            });
        }

        if !record_types.is_empty() && !record_types.contains_key(&settings.default_record_type) {
            return Err(ConfigError::UnknownDefaultRecordType {
                path: path.to_path_buf(),
                record_type: settings.default_record_type.clone(),
            });
        }

        let doc = Self {
            version: yaml_scalar_to_string(&version),
            description: raw.description,
            settings,
            fields,
            record_types,
            source_path: path.to_path_buf(),
        };

        tracing::info!(
            version = %doc.version,
            record_types = doc.record_types.len(),
            fields = doc.fields.len(),
            path = %path.display(),
            "Loaded schema"
        );
        Ok(doc)
    }

    /// Names of all record types, sorted.
    pub fn record_type_names(&self) -> impl Iterator<Item = &str> {
        self.record_types.keys().map(String::as_str)
    }

    /// Look up a record type by name.
    pub fn record_type(&self, name: &str) -> Option<&RecordTypeSpec> {
        self.record_types.get(name)
    }

    /// Look up a field definition by name.
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.get(name)
    }

    /// Dataset slot for a record type (`transformed_df` when unknown).
    pub fn target_for(&self, record_type: &str) -> &str {
        self.record_type(record_type)
            .map(|rt| rt.target.as_str())
            .unwrap_or(DEFAULT_TARGET)
    }

    /// Version, description, record types and field count, for display.
    pub fn summary(&self) -> SchemaSummary {
        SchemaSummary {
            version: self.version.clone(),
            description: self.description.clone().unwrap_or_default(),
            record_types: self.record_types.keys().cloned().collect(),
            total_fields: self.fields.len(),
            source_path: self.source_path.clone(),
        }
    }
}

/// Load a schema through `cache`, keyed by path and modification time.
///
/// An edited file is re-parsed on the next call. Two different contents that share an mtime
/// are not told apart.
pub fn load_schema(path: impl AsRef<Path>, cache: &Cache) -> IngestResult<Arc<SchemaDocument>> {
    let path = path.as_ref().to_path_buf();
    let stamp = Stamp::of([modified(&path)]);
    let doc = cache.schemas().get_or_try_insert_with(path.clone(), stamp, || {
        SchemaDocument::load(&path).map(Arc::new)
    })?;
    Ok(doc)
}

fn dedup(names: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(names.len());
    for name in names {
        if !out.contains(&name) {
            out.push(name);
        }
    }
    out
}

fn yaml_scalar_to_string(v: &serde_yaml::Value) -> String {
    match v {
        serde_yaml::Value::String(s) => s.clone(),
        serde_yaml::Value::Number(n) => n.to_string(),
        serde_yaml::Value::Bool(b) => b.to_string(),
        serde_yaml::Value::Null => String::new(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim().to_string())
            .unwrap_or_default(),
    }
}
