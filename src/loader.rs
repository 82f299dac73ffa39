//! Read → split → validate → coerce → publish.
//!
//! Two loading strategies share one [`DatasetLoader`] capability:
//!
//! - [`UnifiedLoader`]: one physical file, rows routed to record types by the discriminator
//!   column (or all rows to the default record type when the column is absent).
//! - [`ManifestLoader`]: a legacy manifest mapping source names to path templates, one file
//!   (or one tagged slice of a shared file) per source.
//!
//! [`SourceDescriptor::detect`] picks between them based on what the data directories contain.
//!
//! Validation never gates coercion. Whether an invalid record type reaches
//! [`LoadReport::datasets`] is decided by [`InvalidRecordPolicy`].

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rayon::prelude::*;
use serde::Serialize;

use crate::cache::Cache;
use crate::discovery::{detect_currency, scan_data_dirs, DEFAULT_CURRENCY, MANIFEST_FILE_NAME};
use crate::error::{IngestError, IngestResult, Severity};
use crate::ingestion::observability::report_failure;
use crate::ingestion::{read_source, LoadContext, LoadObserver, LoadStats, ReadOptions};
use crate::manifest::{load_manifest, Manifest, SourceEntry, MAIN_SOURCE};
use crate::paths::{substitute_version, PathResolver};
use crate::schema::{SchemaDocument, ValidationResult};
use crate::split::{carve, RecordTypeSplitter, SourceAnalysis};
use crate::types::{RawDataset, TypedDataset};

/// Logical source name used by [`UnifiedLoader`].
pub const UNIFIED_SOURCE: &str = "unified";

/// What to do with record types that fail validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InvalidRecordPolicy {
    /// Publish the coerced dataset anyway, next to its failing [`ValidationResult`].
    #[default]
    Publish,
    /// Keep the dataset out of [`LoadReport::datasets`]; report it in [`LoadReport::withheld`].
    Withhold,
}

/// Options controlling a load.
///
/// Use [`Default`] for common cases.
#[derive(Clone)]
pub struct LoaderOptions {
    /// Read options for the unified file. Manifest sources infer their format from the
    /// resolved path and take their column allow-list from the manifest.
    pub read: ReadOptions,
    /// Optional observer for logging/alerts.
    pub observer: Option<Arc<dyn LoadObserver>>,
    /// Severity threshold at which `on_alert` is invoked.
    pub alert_at_or_above: Severity,
    pub invalid_records: InvalidRecordPolicy,
}

impl fmt::Debug for LoaderOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoaderOptions")
            .field("read", &self.read)
            .field("observer_set", &self.observer.is_some())
            .field("alert_at_or_above", &self.alert_at_or_above)
            .field("invalid_records", &self.invalid_records)
            .finish()
    }
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            read: ReadOptions::default(),
            observer: None,
            alert_at_or_above: Severity::Critical,
            invalid_records: InvalidRecordPolicy::default(),
        }
    }
}

/// One published record type: its typed rows and how they validated.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedRecordType {
    pub dataset: TypedDataset,
    pub validation: ValidationResult,
}

/// Everything one [`DatasetLoader::load`] call produced.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LoadReport {
    /// Published datasets keyed by record type.
    pub datasets: BTreeMap<String, LoadedRecordType>,
    /// Invalid record types kept back under [`InvalidRecordPolicy::Withhold`].
    pub withheld: BTreeMap<String, ValidationResult>,
    /// Non-fatal problems: skipped record types, empty sources, invalid record types.
    pub warnings: Vec<String>,
    /// Structure of each physical source read, keyed by source name.
    pub analyses: BTreeMap<String, SourceAnalysis>,
    /// Resolved file of each source read, keyed by source name.
    pub sources: BTreeMap<String, PathBuf>,
    /// Optional sources whose file was not found.
    pub skipped_sources: Vec<String>,
    /// Lowercase currency code.
    pub currency: String,
    pub client_id: Option<String>,
}

impl LoadReport {
    pub fn dataset(&self, record_type: &str) -> Option<&TypedDataset> {
        self.datasets.get(record_type).map(|l| &l.dataset)
    }

    /// Validation outcome of a record type, published or withheld.
    pub fn validation(&self, record_type: &str) -> Option<&ValidationResult> {
        self.datasets
            .get(record_type)
            .map(|l| &l.validation)
            .or_else(|| self.withheld.get(record_type))
    }

    /// Published datasets keyed by their schema target slot.
    pub fn by_target<'a>(&'a self, schema: &'a SchemaDocument) -> BTreeMap<&'a str, &'a TypedDataset> {
        self.datasets
            .iter()
            .map(|(rt, l)| (schema.target_for(rt), &l.dataset))
            .collect()
    }
}

/// A loading strategy for one configured data location.
pub trait DatasetLoader: Send + Sync {
    /// Load every record type, substituting `version` into path templates.
    fn load(&self, version: &str) -> IngestResult<LoadReport>;
}

/// Validate then coerce `raw` as `record_type`, and file the result under `policy`.
///
/// Returns whether the record type was valid.
fn publish(
    report: &mut LoadReport,
    schema: &SchemaDocument,
    record_type: &str,
    raw: &RawDataset,
    source_path: &Path,
    policy: InvalidRecordPolicy,
) -> bool {
    let validation = schema.validate(raw, record_type);
    let dataset = schema.transform(raw, record_type, source_path);
    let is_valid = validation.is_valid;

    tracing::info!(
        record_type,
        rows = dataset.row_count(),
        valid = is_valid,
        "processed record type"
    );

    if !is_valid {
        report
            .warnings
            .push(format!("record type '{record_type}' failed validation: {validation}"));
    }

    if is_valid || policy == InvalidRecordPolicy::Publish {
        report.datasets.insert(
            record_type.to_string(),
            LoadedRecordType {
                dataset,
                validation,
            },
        );
    } else {
        report.withheld.insert(record_type.to_string(), validation);
    }
    is_valid
}

fn notify_warnings(observer: Option<&Arc<dyn LoadObserver>>, ctx: &LoadContext, warnings: &[String]) {
    for warning in warnings {
        tracing::warn!(source = %ctx.source, "{warning}");
        if let Some(obs) = observer {
            obs.on_warning(ctx, warning);
        }
    }
}

/// Loads a single physical file whose rows may carry several record types.
#[derive(Debug, Clone)]
pub struct UnifiedLoader {
    schema: Arc<SchemaDocument>,
    /// Path, optionally containing the version token.
    path: PathBuf,
    cache: Arc<Cache>,
    options: LoaderOptions,
}

impl UnifiedLoader {
    pub fn new(schema: Arc<SchemaDocument>, path: impl Into<PathBuf>, cache: Arc<Cache>) -> Self {
        Self::with_options(schema, path, cache, LoaderOptions::default())
    }

    pub fn with_options(
        schema: Arc<SchemaDocument>,
        path: impl Into<PathBuf>,
        cache: Arc<Cache>,
        options: LoaderOptions,
    ) -> Self {
        Self {
            schema,
            path: path.into(),
            cache,
            options,
        }
    }

    fn load_inner(&self, path: &Path, ctx: &LoadContext) -> IngestResult<(LoadReport, LoadStats)> {
        let raw = read_source(path, &self.options.read, &self.cache)?;

        let mut report = LoadReport {
            currency: detect_currency(path),
            ..LoadReport::default()
        };
        report.sources.insert(UNIFIED_SOURCE.to_string(), path.to_path_buf());

        let splitter = RecordTypeSplitter::new(&self.schema);
        let outcome = splitter.split(&raw);
        report.analyses.insert(UNIFIED_SOURCE.to_string(), outcome.analysis);

        let mut invalid = 0;
        if raw.row_count() == 0 {
            report
                .warnings
                .push(format!("source {} contains no rows", path.display()));
        } else {
            report.warnings.extend(outcome.warnings);
            for (record_type, part) in &outcome.parts {
                if !publish(
                    &mut report,
                    &self.schema,
                    record_type,
                    part,
                    path,
                    self.options.invalid_records,
                ) {
                    invalid += 1;
                }
            }
        }

        notify_warnings(self.options.observer.as_ref(), ctx, &report.warnings);
        let stats = LoadStats {
            rows: raw.row_count(),
            record_types: report.datasets.len(),
            invalid_record_types: invalid,
            warnings: report.warnings.len(),
        };
        Ok((report, stats))
    }
}

impl DatasetLoader for UnifiedLoader {
    fn load(&self, version: &str) -> IngestResult<LoadReport> {
        let path = PathBuf::from(substitute_version(&self.path.to_string_lossy(), version));
        let mut ctx = LoadContext::new(UNIFIED_SOURCE).with_path(&path);
        if let Some(format) = self.options.read.format {
            ctx = ctx.with_format(format);
        }

        match self.load_inner(&path, &ctx) {
            Ok((report, stats)) => {
                if let Some(obs) = self.options.observer.as_ref() {
                    obs.on_success(&ctx, stats);
                }
                Ok(report)
            }
            Err(e) => {
                report_failure(
                    self.options.observer.as_ref(),
                    &ctx,
                    &e,
                    self.options.alert_at_or_above,
                );
                Err(e)
            }
        }
    }
}

/// Resolution status of one manifest source, without reading its data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceStatus {
    /// Template as written in the manifest.
    pub configured_path: String,
    pub resolved_path: Option<PathBuf>,
    pub exists: bool,
    pub used_fallback: bool,
    pub required: bool,
    pub error: Option<String>,
}

/// Result of loading one manifest source.
#[derive(Debug)]
enum SourceOutcome {
    Loaded {
        path: PathBuf,
        record_type: String,
        raw: RawDataset,
        analysis: SourceAnalysis,
    },
    /// Optional source with no file.
    Missing,
    /// Source that could not be loaded without failing the whole manifest.
    Skipped(String),
}

/// Loads the sources of a legacy multi-file manifest.
#[derive(Debug, Clone)]
pub struct ManifestLoader {
    schema: Arc<SchemaDocument>,
    manifest_path: PathBuf,
    cache: Arc<Cache>,
    options: LoaderOptions,
}

impl ManifestLoader {
    pub fn new(schema: Arc<SchemaDocument>, manifest_path: impl Into<PathBuf>, cache: Arc<Cache>) -> Self {
        Self::with_options(schema, manifest_path, cache, LoaderOptions::default())
    }

    pub fn with_options(
        schema: Arc<SchemaDocument>,
        manifest_path: impl Into<PathBuf>,
        cache: Arc<Cache>,
        options: LoaderOptions,
    ) -> Self {
        Self {
            schema,
            manifest_path: manifest_path.into(),
            cache,
            options,
        }
    }

    fn manifest(&self) -> IngestResult<Arc<Manifest>> {
        load_manifest(&self.manifest_path, &self.cache).inspect_err(|e| {
            let ctx = LoadContext::new("manifest").with_path(&self.manifest_path);
            report_failure(
                self.options.observer.as_ref(),
                &ctx,
                e,
                self.options.alert_at_or_above,
            );
        })
    }

    /// Record type a source is validated against.
    ///
    /// The entry's `record_type` wins; then a record type named like the source; then, for
    /// `main` only, the schema's default record type.
    fn record_type_for(&self, name: &str, entry: &SourceEntry) -> Option<String> {
        if let Some(rt) = &entry.record_type {
            return Some(rt.clone());
        }
        if self.schema.record_type(name).is_some() {
            return Some(name.to_string());
        }
        (name == MAIN_SOURCE).then(|| self.schema.settings.default_record_type.clone())
    }

    /// Resolve every configured source for `version` and report what was found.
    pub fn source_status(&self, version: &str) -> IngestResult<BTreeMap<String, SourceStatus>> {
        let manifest = self.manifest()?;
        let resolver = PathResolver::with_options(self.cache.clone(), manifest.resolve_options());
        let base_dir = manifest.base_dir();

        let statuses = manifest
            .data_sources
            .iter()
            .map(|(name, entry)| {
                let mut status = SourceStatus {
                    configured_path: entry.file_path.clone(),
                    resolved_path: None,
                    exists: false,
                    used_fallback: false,
                    required: entry.required,
                    error: None,
                };
                match resolver.resolve(
                    &entry.file_path,
                    version,
                    entry.fallback_path.as_deref(),
                    &base_dir,
                ) {
                    Ok(resolution) => {
                        status.used_fallback = resolution.used_fallback;
                        status.exists = resolution.resolved.is_some();
                        status.resolved_path = resolution.resolved;
                        if !status.exists {
                            status.error = Some(if resolution.candidates.is_empty() {
                                "no files match pattern".to_string()
                            } else {
                                "file does not exist".to_string()
                            });
                        }
                    }
                    Err(e) => status.error = Some(e.to_string()),
                }
                (name.clone(), status)
            })
            .collect();
        Ok(statuses)
    }

    fn load_source(
        &self,
        manifest: &Manifest,
        resolver: &PathResolver,
        name: &str,
        entry: &SourceEntry,
        version: &str,
    ) -> IngestResult<SourceOutcome> {
        let resolution = resolver.resolve(
            &entry.file_path,
            version,
            entry.fallback_path.as_deref(),
            &manifest.base_dir(),
        )?;
        let Some(path) = resolution.resolved else {
            if entry.required {
                return Err(IngestError::PathResolution {
                    source_name: name.to_string(),
                    template: entry.file_path.clone(),
                    candidates: resolution.candidates,
                });
            }
            tracing::debug!(source = name, template = %entry.file_path, "optional source not found");
            return Ok(SourceOutcome::Missing);
        };

        let Some(record_type) = self.record_type_for(name, entry) else {
            return Ok(SourceOutcome::Skipped(format!(
                "source '{name}' has no matching record type and was skipped"
            )));
        };

        let read = ReadOptions {
            format: None,
            columns: entry.columns.clone(),
            excel_sheet: self.options.read.excel_sheet.clone(),
        };
        let raw = read_source(&path, &read, &self.cache)?;
        let raw = if raw.has_column(&manifest.source_column) {
            carve(&raw, &manifest.source_column, name)
        } else {
            RawDataset::clone(&raw)
        };
        let analysis = SourceAnalysis::of(&raw, &self.schema.settings.record_type_column);

        Ok(SourceOutcome::Loaded {
            path,
            record_type,
            raw,
            analysis,
        })
    }
}

impl DatasetLoader for ManifestLoader {
    fn load(&self, version: &str) -> IngestResult<LoadReport> {
        let manifest = self.manifest()?;
        let resolver = PathResolver::with_options(self.cache.clone(), manifest.resolve_options());
        let observer = self.options.observer.as_ref();

        let entries: Vec<(&String, &SourceEntry)> = manifest.data_sources.iter().collect();
        let outcomes: Vec<(&str, &SourceEntry, IngestResult<SourceOutcome>)> = entries
            .par_iter()
            .map(|(name, entry)| {
                let outcome = self.load_source(&manifest, &resolver, name, entry, version);
                (name.as_str(), *entry, outcome)
            })
            .collect();

        let mut report = LoadReport {
            currency: manifest
                .currency
                .as_deref()
                .map(str::to_lowercase)
                .unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
            client_id: manifest.client_id.clone(),
            ..LoadReport::default()
        };
        let mut loaded_from: BTreeMap<String, String> = BTreeMap::new();

        for (name, entry, outcome) in outcomes {
            let ctx = LoadContext::new(name);
            let warnings_before = report.warnings.len();
            match outcome {
                Err(e) => {
                    report_failure(observer, &ctx, &e, self.options.alert_at_or_above);
                    if entry.required {
                        return Err(e);
                    }
                    report.warnings.push(format!("optional source '{name}' failed to load: {e}"));
                    report.skipped_sources.push(name.to_string());
                }
                Ok(SourceOutcome::Missing) => report.skipped_sources.push(name.to_string()),
                Ok(SourceOutcome::Skipped(warning)) => {
                    report.warnings.push(warning);
                    report.skipped_sources.push(name.to_string());
                }
                Ok(SourceOutcome::Loaded {
                    path,
                    record_type,
                    raw,
                    analysis,
                }) => {
                    let ctx = ctx.with_path(&path);
                    report.sources.insert(name.to_string(), path.clone());
                    report.analyses.insert(name.to_string(), analysis);

                    let mut stats = LoadStats {
                        rows: raw.row_count(),
                        ..LoadStats::default()
                    };
                    if let Some(first) = loaded_from.get(&record_type) {
                        report.warnings.push(format!(
                            "record type '{record_type}' already loaded from source '{first}'; source '{name}' ignored"
                        ));
                    } else if raw.row_count() == 0 {
                        report.warnings.push(format!("source '{name}' contains no rows"));
                    } else {
                        loaded_from.insert(record_type.clone(), name.to_string());
                        let valid = publish(
                            &mut report,
                            &self.schema,
                            &record_type,
                            &raw,
                            &path,
                            self.options.invalid_records,
                        );
                        stats.record_types = usize::from(report.datasets.contains_key(&record_type));
                        stats.invalid_record_types = usize::from(!valid);
                    }

                    stats.warnings = report.warnings.len() - warnings_before;
                    notify_warnings(observer, &ctx, &report.warnings[warnings_before..]);
                    if let Some(obs) = observer {
                        obs.on_success(&ctx, stats);
                    }
                    continue;
                }
            }
            notify_warnings(observer, &ctx, &report.warnings[warnings_before..]);
        }

        tracing::info!(
            manifest = %self.manifest_path.display(),
            datasets = report.datasets.len(),
            skipped = report.skipped_sources.len(),
            "manifest load complete"
        );
        Ok(report)
    }
}

/// Which loading strategy a data location calls for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceDescriptor {
    /// One physical file, routed by the discriminator column.
    Unified(PathBuf),
    /// A legacy multi-file manifest.
    Manifest(PathBuf),
}

impl SourceDescriptor {
    /// Choose a strategy from candidate directories, tried in order.
    ///
    /// The first directory holding a manifest file or data files wins: its manifest if present,
    /// otherwise its newest data file. Typical candidates are
    /// [`DEFAULT_DATA_DIRS`](crate::discovery::DEFAULT_DATA_DIRS).
    pub fn detect<I, P>(dirs: I) -> Option<Self>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        for dir in dirs {
            let dir = dir.as_ref();
            let manifest = dir.join(MANIFEST_FILE_NAME);
            if manifest.is_file() {
                tracing::info!(manifest = %manifest.display(), "using manifest loader");
                return Some(Self::Manifest(manifest));
            }
            let Some(scan) = scan_data_dirs([dir]) else {
                tracing::debug!(dir = %dir.display(), "no data source in directory");
                continue;
            };
            if let Some(newest) = scan.files.into_iter().next() {
                tracing::info!(path = %newest.path.display(), "using unified loader");
                return Some(Self::Unified(newest.path));
            }
        }
        None
    }

    pub fn path(&self) -> &Path {
        match self {
            Self::Unified(p) | Self::Manifest(p) => p,
        }
    }

    /// Build the loader for this descriptor.
    pub fn loader_for(
        &self,
        schema: Arc<SchemaDocument>,
        cache: Arc<Cache>,
        options: LoaderOptions,
    ) -> Box<dyn DatasetLoader> {
        match self {
            Self::Unified(path) => Box::new(UnifiedLoader::with_options(schema, path, cache, options)),
            Self::Manifest(path) => Box::new(ManifestLoader::with_options(schema, path, cache, options)),
        }
    }
}
