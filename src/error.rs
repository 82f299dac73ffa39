use std::error::Error as StdError;
use std::path::PathBuf;

use thiserror::Error;

/// Convenience result type for ingestion operations.
pub type IngestResult<T> = Result<T, IngestError>;

/// Severity classification used for observer callbacks and alerting thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Informational event.
    Info,
    /// Warning-level event (non-fatal).
    Warning,
    /// Error-level event (operation failed).
    Error,
    /// Critical error (typically I/O failures or a missing required source).
    Critical,
}

/// Error type returned by loading functions.
///
/// Per-record-type validation problems are *not* errors: they are reported as
/// [`crate::schema::ValidationResult`] values so one bad record type never poisons its
/// siblings from the same source.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Malformed or inconsistent schema/manifest configuration. Nothing loads.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The physical source could not be opened or parsed at all.
    #[error("failed to read source {path}: {message}")]
    SourceRead {
        path: PathBuf,
        message: String,
        #[source]
        source: Option<Box<dyn StdError + Send + Sync>>,
    },

    /// An absolute path was used while the absolute-paths policy is disabled.
    #[error("absolute paths not allowed: {template}")]
    PathPolicy { template: String },

    /// No file was found for a required source after substitution, glob and fallback.
    #[error("no file found for required source '{source_name}' (template '{template}', {} candidate(s) considered)", candidates.len())]
    PathResolution {
        source_name: String,
        template: String,
        candidates: Vec<PathBuf>,
    },
}

/// Errors raised while loading a schema or manifest document.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Missing or unreadable configuration file.
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The document is not valid YAML or has the wrong shape.
    #[error("cannot parse config {path}: {message}")]
    Parse { path: PathBuf, message: String },

    /// A required top-level section is absent.
    #[error("config {path} is missing required section '{section}'")]
    MissingSection { path: PathBuf, section: String },

    /// Record types reference fields that are not defined in the field registry.
    ///
    /// Every undefined `(record_type, field)` pair is reported at once.
    #[error("config {path} references undefined fields: {}", format_references(references))]
    UndefinedFields {
        path: PathBuf,
        references: Vec<(String, String)>,
    },

    /// `settings.default_record_type` names a record type that is not defined.
    #[error("config {path}: default record type '{record_type}' is not defined")]
    UnknownDefaultRecordType { path: PathBuf, record_type: String },
}

fn format_references(references: &[(String, String)]) -> String {
    references
        .iter()
        .map(|(record_type, field)| format!("{record_type}.{field}"))
        .collect::<Vec<_>>()
        .join(", ")
}

impl IngestError {
    /// Build a [`IngestError::SourceRead`] from an underlying error.
    pub fn source_read<E>(path: impl Into<PathBuf>, err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::SourceRead {
            path: path.into(),
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }

    /// Build a [`IngestError::SourceRead`] with a plain message.
    pub fn source_read_msg(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::SourceRead {
            path: path.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Severity used for observer reporting and alert thresholds.
    pub fn severity(&self) -> Severity {
        match self {
            Self::Config(ConfigError::Read { .. }) => Severity::Critical,
            Self::Config(_) => Severity::Error,
            Self::SourceRead {
                source: Some(source),
                ..
            } if error_chain_contains_io(&**source) => Severity::Critical,
            Self::SourceRead { .. } => Severity::Error,
            Self::PathPolicy { .. } => Severity::Error,
            Self::PathResolution { .. } => Severity::Critical,
        }
    }
}

fn error_chain_contains_io(e: &(dyn StdError + 'static)) -> bool {
    let mut cur: Option<&(dyn StdError + 'static)> = Some(e);
    while let Some(err) = cur {
        if err.is::<std::io::Error>() {
            return true;
        }
        if let Some(csv_err) = err.downcast_ref::<csv::Error>() {
            if matches!(csv_err.kind(), csv::ErrorKind::Io(_)) {
                return true;
            }
        }
        cur = err.source();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undefined_fields_lists_every_reference() {
        let err = ConfigError::UndefinedFields {
            path: PathBuf::from("schema.yaml"),
            references: vec![
                ("time_record".to_string(), "hours".to_string()),
                ("planned_record".to_string(), "rate".to_string()),
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("time_record.hours"));
        assert!(msg.contains("planned_record.rate"));
    }

    #[test]
    fn io_backed_read_failures_are_critical() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert_eq!(
            IngestError::source_read("x.csv", io).severity(),
            Severity::Critical
        );
        assert_eq!(
            IngestError::source_read_msg("x.csv", "bad header").severity(),
            Severity::Error
        );
    }
}
