use std::fs;
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;

use schema_ingest::cache::Cache;
use schema_ingest::ingestion::{LoadContext, LoadObserver, LoadStats};
use schema_ingest::loader::{DatasetLoader, InvalidRecordPolicy, LoaderOptions, UnifiedLoader};
use schema_ingest::schema::{load_schema, SchemaDocument};
use schema_ingest::split::LoadingStrategy;
use schema_ingest::types::Value;
use schema_ingest::{IngestError, Severity};

const SCHEMA: &str = "tests/fixtures/schema.yaml";

#[derive(Default)]
struct RecordingObserver {
    successes: Mutex<Vec<LoadStats>>,
    failures: Mutex<Vec<Severity>>,
    alerts: Mutex<Vec<Severity>>,
    warnings: Mutex<Vec<String>>,
}

impl LoadObserver for RecordingObserver {
    fn on_success(&self, _ctx: &LoadContext, stats: LoadStats) {
        self.successes.lock().unwrap().push(stats);
    }

    fn on_failure(&self, _ctx: &LoadContext, severity: Severity, _error: &IngestError) {
        self.failures.lock().unwrap().push(severity);
    }

    fn on_alert(&self, _ctx: &LoadContext, severity: Severity, _error: &IngestError) {
        self.alerts.lock().unwrap().push(severity);
    }

    fn on_warning(&self, _ctx: &LoadContext, message: &str) {
        self.warnings.lock().unwrap().push(message.to_string());
    }
}

fn setup() -> (Arc<Cache>, Arc<SchemaDocument>) {
    let cache = Arc::new(Cache::new());
    let schema = load_schema(SCHEMA, &cache).unwrap();
    (cache, schema)
}

#[test]
fn unknown_record_types_are_skipped_with_one_warning() {
    let (cache, schema) = setup();
    let loader = UnifiedLoader::new(schema, "tests/fixtures/mixed_records.csv", cache);

    let report = loader.load("").unwrap();

    assert_eq!(report.datasets.len(), 1);
    let time = report.dataset("time_record").unwrap();
    assert_eq!(time.row_count(), 10);
    assert!(time.schema.index_of("record_type").is_none());
    assert!(report.validation("time_record").unwrap().is_valid);

    assert_eq!(report.warnings.len(), 1);
    assert!(report.warnings[0].contains("forecast_record"));

    let analysis = &report.analyses["unified"];
    assert_eq!(analysis.strategy, LoadingStrategy::MultiType);
    assert_eq!(analysis.total_rows, 15);
    assert_eq!(analysis.record_type_counts["forecast_record"], 5);
}

#[test]
fn typed_values_and_optional_defaults() {
    let (cache, schema) = setup();
    let loader = UnifiedLoader::new(schema, "tests/fixtures/mixed_records.csv", cache);
    let report = loader.load("").unwrap();
    let time = report.dataset("time_record").unwrap();

    let dates: Vec<&Value> = time.column("record_date").unwrap().collect();
    let first = NaiveDate::from_ymd_opt(2024, 3, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    assert_eq!(dates[0], &Value::Datetime(first));

    let hours: Vec<&Value> = time.column("hours_used").unwrap().collect();
    assert_eq!(hours[0], &Value::Float64(8.0));
    assert_eq!(hours[1], &Value::Float64(7.5));

    // `billable` is optional and absent from the file.
    assert!(time.column("billable").unwrap().all(|v| *v == Value::Bool(false)));
}

#[test]
fn single_type_file_uses_default_record_type() {
    let (cache, schema) = setup();
    let loader = UnifiedLoader::new(schema, "tests/fixtures/time_records.ndjson", cache);
    let report = loader.load("").unwrap();

    assert_eq!(report.analyses["unified"].strategy, LoadingStrategy::SingleType);
    let loaded = &report.datasets["time_record"];
    assert_eq!(loaded.dataset.row_count(), 3);

    // Coercion is not gated on validation: the unparsable date is a null cell.
    let dates: Vec<&Value> = loaded.dataset.column("record_date").unwrap().collect();
    assert!(matches!(dates[0], Value::Datetime(_)));
    assert!(matches!(dates[1], Value::Datetime(_)));
    assert_eq!(dates[2], &Value::Null);

    let billable: Vec<&Value> = loaded.dataset.column("billable").unwrap().collect();
    assert_eq!(billable, vec![&Value::Bool(true), &Value::Bool(false), &Value::Null]);

    assert!(!loaded.validation.is_valid);
    let mut bad_fields: Vec<&str> = loaded
        .validation
        .type_errors
        .iter()
        .map(|e| e.field.as_str())
        .collect();
    bad_fields.sort_unstable();
    assert_eq!(bad_fields, vec!["billable", "record_date"]);

    assert!(loaded
        .dataset
        .column("hours_billable")
        .unwrap()
        .all(|v| *v == Value::Float64(0.0)));
}

fn write_two_type_file(dir: &std::path::Path) -> std::path::PathBuf {
    let path = dir.join("export.csv");
    fs::write(
        &path,
        "record_type,record_date,person_name,hours_used,planned_hours\n\
         time_record,2024-05-01,Ada,8,\n\
         time_record,2024-05-02,Ada,6,\n\
         planned_record,2024-05-01,Grace,,7\n\
         planned_record,2024-05-02,Grace,,-2\n\
         planned_record,2024-05-03,Grace,,5\n",
    )
    .unwrap();
    path
}

#[test]
fn invalid_record_type_does_not_poison_siblings() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_two_type_file(dir.path());
    let (cache, schema) = setup();

    let report = UnifiedLoader::new(schema, &path, cache).load("").unwrap();

    assert!(report.validation("time_record").unwrap().is_valid);
    let planned = report.validation("planned_record").unwrap();
    assert!(!planned.is_valid);
    assert!(planned.type_errors.is_empty());
    assert_eq!(planned.value_errors.len(), 1);
    assert_eq!(planned.value_errors[0].violations, 1);

    // Published by default, with its failing validation alongside.
    assert_eq!(report.dataset("planned_record").unwrap().row_count(), 3);
    assert!(report.withheld.is_empty());
    assert_eq!(report.warnings.len(), 1);
}

#[test]
fn withhold_policy_keeps_invalid_record_types_out() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_two_type_file(dir.path());
    let (cache, schema) = setup();
    let options = LoaderOptions {
        invalid_records: InvalidRecordPolicy::Withhold,
        ..Default::default()
    };

    let report = UnifiedLoader::with_options(schema.clone(), &path, cache, options)
        .load("")
        .unwrap();

    assert!(report.dataset("time_record").is_some());
    assert!(report.dataset("planned_record").is_none());
    assert!(!report.withheld["planned_record"].is_valid);

    let targets = report.by_target(&schema);
    assert_eq!(targets.len(), 1);
    assert!(targets.contains_key("transformed_df"));
}

#[test]
fn empty_source_is_a_successful_load_with_a_warning() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.csv");
    fs::write(&path, "record_type,record_date,person_name,hours_used\n").unwrap();
    let (cache, schema) = setup();

    let obs = Arc::new(RecordingObserver::default());
    let options = LoaderOptions {
        observer: Some(obs.clone()),
        ..Default::default()
    };
    let report = UnifiedLoader::with_options(schema, &path, cache, options)
        .load("")
        .unwrap();

    assert!(report.datasets.is_empty());
    assert_eq!(report.warnings.len(), 1);
    assert_eq!(obs.warnings.lock().unwrap().len(), 1);
    let successes = obs.successes.lock().unwrap().clone();
    assert_eq!(successes.len(), 1);
    assert_eq!(successes[0].rows, 0);
}

#[test]
fn unreadable_source_fails_with_critical_alert() {
    let (cache, schema) = setup();
    let obs = Arc::new(RecordingObserver::default());
    let options = LoaderOptions {
        observer: Some(obs.clone()),
        alert_at_or_above: Severity::Critical,
        ..Default::default()
    };

    let err = UnifiedLoader::with_options(schema, "tests/fixtures/does_not_exist.csv", cache, options)
        .load("")
        .unwrap_err();

    assert!(matches!(err, IngestError::SourceRead { .. }));
    assert_eq!(obs.failures.lock().unwrap().clone(), vec![Severity::Critical]);
    assert_eq!(obs.alerts.lock().unwrap().clone(), vec![Severity::Critical]);
    assert!(obs.successes.lock().unwrap().is_empty());
}

#[test]
fn corrupt_source_is_an_error_without_alert() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.json");
    fs::write(&path, "{ this is not json").unwrap();
    let (cache, schema) = setup();
    let obs = Arc::new(RecordingObserver::default());
    let options = LoaderOptions {
        observer: Some(obs.clone()),
        ..Default::default()
    };

    let err = UnifiedLoader::with_options(schema, &path, cache, options)
        .load("")
        .unwrap_err();

    assert_eq!(err.severity(), Severity::Error);
    assert_eq!(obs.failures.lock().unwrap().clone(), vec![Severity::Error]);
    assert!(obs.alerts.lock().unwrap().is_empty());
}

#[test]
fn currency_and_version_come_from_the_file_name() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("export_adjusted_USD.csv"),
        "record_date,person_name,hours_used\n2024-01-01,Ada,3\n",
    )
    .unwrap();
    let (cache, schema) = setup();

    let template = dir.path().join("export{version}_USD.csv");
    let report = UnifiedLoader::new(schema, template, cache).load("adjusted").unwrap();

    assert_eq!(report.currency, "usd");
    assert_eq!(report.dataset("time_record").unwrap().row_count(), 1);
}

#[test]
fn repeated_loads_reuse_the_cached_read() {
    let (cache, schema) = setup();
    let loader = UnifiedLoader::new(schema, "tests/fixtures/mixed_records.csv", cache.clone());

    let first = loader.load("").unwrap();
    let second = loader.load("").unwrap();

    assert_eq!(first, second);
    let stats = cache.reads().stats();
    assert_eq!(stats.entries, 1);
    assert_eq!(stats.hits, 1);
}

#[test]
fn concurrent_loads_share_one_cache() {
    let (cache, schema) = setup();
    let expected = UnifiedLoader::new(schema.clone(), "tests/fixtures/mixed_records.csv", cache.clone())
        .load("")
        .unwrap();

    let reports: Vec<_> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let loader = UnifiedLoader::new(
                    schema.clone(),
                    "tests/fixtures/mixed_records.csv",
                    cache.clone(),
                );
                s.spawn(move || loader.load(""))
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for report in reports {
        assert_eq!(report.unwrap(), expected);
    }
    let stats = cache.reads().stats();
    assert_eq!(stats.entries, 1);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 4);
}
