use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use schema_ingest::cache::Cache;
use schema_ingest::ingestion::{LoadContext, LoadObserver};
use schema_ingest::loader::{DatasetLoader, LoaderOptions, ManifestLoader, SourceDescriptor};
use schema_ingest::schema::{load_schema, SchemaDocument};
use schema_ingest::types::Value;
use schema_ingest::{IngestError, Severity};

const TIME_CSV: &str = "record_date,person_name,hours_used\n2024-02-01,Ada,8\n2024-02-02,Ada,7\n";
const PLANNED_CSV: &str = "record_date,person_name,planned_hours\n2024-02-01,Grace,6\n";

#[derive(Default)]
struct AlertRecorder {
    alerts: Mutex<Vec<(String, Severity)>>,
}

impl LoadObserver for AlertRecorder {
    fn on_alert(&self, ctx: &LoadContext, severity: Severity, _error: &IngestError) {
        self.alerts.lock().unwrap().push((ctx.source.clone(), severity));
    }
}

fn setup() -> (Arc<Cache>, Arc<SchemaDocument>) {
    let cache = Arc::new(Cache::new());
    let schema = load_schema("tests/fixtures/schema.yaml", &cache).unwrap();
    (cache, schema)
}

fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, contents).unwrap();
    path
}

const MANIFEST: &str = r#"
currency: EUR
client_id: acme
data_sources:
  main:
    file_path: "exports/main{version}.csv"
    fallback_path: "exports/main.csv"
    required: true
  planned_record:
    file_path: "exports/planned_*.csv"
  reference:
    file_path: "exports/reference.csv"
    record_type: time_record
"#;

#[test]
fn loads_every_available_source() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "exports/main_adjusted.csv", TIME_CSV);
    write(dir.path(), "exports/planned_2024.csv", PLANNED_CSV);
    let manifest = write(dir.path(), "data_manifest.yaml", MANIFEST);
    let (cache, schema) = setup();

    let report = ManifestLoader::new(schema, &manifest, cache).load("adjusted").unwrap();

    assert_eq!(report.currency, "eur");
    assert_eq!(report.client_id.as_deref(), Some("acme"));
    assert_eq!(report.dataset("time_record").unwrap().row_count(), 2);
    assert_eq!(report.dataset("planned_record").unwrap().row_count(), 1);
    assert_eq!(report.skipped_sources, vec!["reference".to_string()]);
    assert!(report.warnings.is_empty());
    assert_eq!(
        report.sources["main"],
        dir.path().join("exports/main_adjusted.csv")
    );
}

#[test]
fn main_falls_back_when_version_is_missing() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "exports/main.csv", TIME_CSV);
    let manifest = write(dir.path(), "data_manifest.yaml", MANIFEST);
    let (cache, schema) = setup();

    let report = ManifestLoader::new(schema, &manifest, cache).load("regular").unwrap();
    assert_eq!(report.sources["main"], dir.path().join("exports/main.csv"));
    assert_eq!(
        report.skipped_sources,
        vec!["planned_record".to_string(), "reference".to_string()]
    );
}

#[test]
fn missing_required_source_blocks_the_load() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "exports/planned_2024.csv", PLANNED_CSV);
    let manifest = write(dir.path(), "data_manifest.yaml", MANIFEST);
    let (cache, schema) = setup();
    let obs = Arc::new(AlertRecorder::default());
    let options = LoaderOptions {
        observer: Some(obs.clone()),
        ..Default::default()
    };

    let err = ManifestLoader::with_options(schema, &manifest, cache, options)
        .load("adjusted")
        .unwrap_err();

    match &err {
        IngestError::PathResolution {
            source_name,
            candidates,
            ..
        } => {
            assert_eq!(source_name, "main");
            assert_eq!(candidates.len(), 2);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(
        obs.alerts.lock().unwrap().clone(),
        vec![("main".to_string(), Severity::Critical)]
    );
}

#[test]
fn shared_file_is_filtered_by_source_column() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "all.csv",
        "data_source,record_date,person_name,hours_used,planned_hours\n\
         main,2024-02-01,Ada,8,\n\
         planned_record,2024-02-01,Grace,,6\n\
         main,2024-02-02,Ada,5,\n",
    );
    let manifest = write(
        dir.path(),
        "data_manifest.yaml",
        "data_sources:\n  main: { file_path: all.csv, required: true }\n  planned_record: { file_path: all.csv }\n",
    );
    let (cache, schema) = setup();

    let report = ManifestLoader::new(schema, &manifest, cache.clone())
        .load("")
        .unwrap();

    let time = report.dataset("time_record").unwrap();
    assert_eq!(time.row_count(), 2);
    assert!(time.schema.index_of("data_source").is_none());
    let planned = report.dataset("planned_record").unwrap();
    assert_eq!(planned.row_count(), 1);
    assert_eq!(
        planned.column("planned_hours").unwrap().collect::<Vec<_>>(),
        vec![&Value::Float64(6.0)]
    );
    // Both sources shared one physical read.
    assert_eq!(cache.reads().stats().entries, 1);
}

#[test]
fn column_allow_list_projects_and_rejects_missing_columns() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "main.csv",
        "record_date,person_name,hours_used,comment\n2024-02-01,Ada,8,hello\n",
    );
    write(dir.path(), "planned.csv", PLANNED_CSV);
    let manifest = write(
        dir.path(),
        "data_manifest.yaml",
        r#"
data_sources:
  main:
    file_path: main.csv
    required: true
    columns: [record_date, person_name, hours_used]
  planned_record:
    file_path: planned.csv
    columns: [record_date, person_name, planned_hours, planned_hourly_rate]
"#,
    );
    let (cache, schema) = setup();

    let report = ManifestLoader::new(schema, &manifest, cache).load("").unwrap();

    let time = report.dataset("time_record").unwrap();
    assert!(time.schema.index_of("comment").is_none());
    // Optional source with a missing listed column: skipped with a warning.
    assert!(report.dataset("planned_record").is_none());
    assert_eq!(report.skipped_sources, vec!["planned_record".to_string()]);
    assert_eq!(report.warnings.len(), 1);
    assert!(report.warnings[0].contains("planned_hourly_rate"));
}

#[test]
fn source_status_reports_resolution_without_reading() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "exports/main.csv", "not,really,read\n");
    let manifest = write(dir.path(), "data_manifest.yaml", MANIFEST);
    let (cache, schema) = setup();

    let status = ManifestLoader::new(schema, &manifest, cache.clone())
        .source_status("adjusted")
        .unwrap();

    let main = &status["main"];
    assert!(main.exists);
    assert!(main.used_fallback);
    assert!(main.required);
    assert_eq!(main.configured_path, "exports/main{version}.csv");
    assert_eq!(main.resolved_path, Some(dir.path().join("exports/main.csv")));

    let planned = &status["planned_record"];
    assert!(!planned.exists);
    assert_eq!(planned.error.as_deref(), Some("no files match pattern"));

    let reference = &status["reference"];
    assert_eq!(reference.error.as_deref(), Some("file does not exist"));

    assert_eq!(cache.reads().stats().entries, 0);
}

#[test]
fn absolute_paths_rejected_by_manifest_policy() {
    let dir = tempfile::tempdir().unwrap();
    let data = write(dir.path(), "main.csv", TIME_CSV);
    let manifest = write(
        dir.path(),
        "data_manifest.yaml",
        &format!(
            "path_settings:\n  allow_absolute_paths: false\ndata_sources:\n  main:\n    file_path: \"{}\"\n    required: true\n",
            data.display()
        ),
    );
    let (cache, schema) = setup();

    let err = ManifestLoader::new(schema, &manifest, cache).load("").unwrap_err();
    assert!(matches!(err, IngestError::PathPolicy { .. }));
}

#[test]
fn manifest_without_main_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = write(
        dir.path(),
        "data_manifest.yaml",
        "data_sources:\n  planned_record: { file_path: p.csv }\n",
    );
    let (cache, schema) = setup();

    let err = ManifestLoader::new(schema, &manifest, cache).load("").unwrap_err();
    assert!(matches!(err, IngestError::Config(_)));
}

#[test]
fn detect_prefers_manifest_then_newest_data_file() {
    let dir = tempfile::tempdir().unwrap();
    let old = write(dir.path(), "old.parquet", "");
    let new = write(dir.path(), "new.pq", "");
    write(dir.path(), "notes.txt", "");
    File::options()
        .write(true)
        .open(&old)
        .unwrap()
        .set_modified(SystemTime::now() - Duration::from_secs(3600))
        .unwrap();

    assert_eq!(
        SourceDescriptor::detect([dir.path()]),
        Some(SourceDescriptor::Unified(new))
    );

    let manifest = write(dir.path(), "data_manifest.yaml", MANIFEST);
    assert_eq!(
        SourceDescriptor::detect([dir.path()]),
        Some(SourceDescriptor::Manifest(manifest))
    );

    let empty = tempfile::tempdir().unwrap();
    assert_eq!(SourceDescriptor::detect([empty.path()]), None);
}

#[test]
fn detect_tries_candidate_directories_in_order() {
    let root = tempfile::tempdir().unwrap();
    let missing = root.path().join("volume");
    let empty = root.path().join("empty");
    fs::create_dir_all(&empty).unwrap();
    let local = root.path().join("local");
    let data = write(&local, "export.parquet", "");
    let later = root.path().join("later");
    write(&later, "data_manifest.yaml", MANIFEST);

    assert_eq!(
        SourceDescriptor::detect([&missing, &empty, &local, &later]),
        Some(SourceDescriptor::Unified(data))
    );
    assert_eq!(
        SourceDescriptor::detect([&later, &local]),
        Some(SourceDescriptor::Manifest(later.join("data_manifest.yaml")))
    );
    assert_eq!(SourceDescriptor::detect([&missing, &empty]), None);
}

#[test]
fn descriptor_builds_matching_loader() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "exports/main.csv", TIME_CSV);
    let manifest = write(dir.path(), "data_manifest.yaml", MANIFEST);
    let (cache, schema) = setup();

    let descriptor = SourceDescriptor::Manifest(manifest);
    let loader = descriptor.loader_for(schema, cache, LoaderOptions::default());
    let report = loader.load("").unwrap();
    assert_eq!(report.dataset("time_record").unwrap().row_count(), 2);
}
