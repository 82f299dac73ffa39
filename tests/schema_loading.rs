use std::fs::{self, File};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use schema_ingest::cache::Cache;
use schema_ingest::schema::{load_schema, SchemaDocument};
use schema_ingest::types::DataType;
use schema_ingest::{ConfigError, IngestError};

#[test]
fn fixture_schema_loads() {
    let doc = SchemaDocument::load("tests/fixtures/schema.yaml").unwrap();

    let summary = doc.summary();
    assert_eq!(summary.version, "2.1");
    assert_eq!(summary.description, "Time tracking exports");
    assert_eq!(summary.record_types, vec!["planned_record", "time_record"]);
    assert_eq!(summary.total_fields, 7);

    let time = doc.record_type("time_record").unwrap();
    assert_eq!(time.display_name, "Time Records");
    assert_eq!(
        time.all_fields().collect::<Vec<_>>(),
        vec!["record_date", "person_name", "hours_used", "hours_billable", "billable"]
    );
    assert_eq!(doc.target_for("planned_record"), "transformed_planned_df");
    assert_eq!(doc.field("hours_used").unwrap().max_value, Some(24.0));
    assert_eq!(doc.field("planned_hourly_rate").unwrap().data_type, DataType::Integer);
}

#[test]
fn cached_schema_is_reused_until_the_file_changes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("schema.yaml");
    fs::copy("tests/fixtures/schema.yaml", &path).unwrap();
    let cache = Cache::new();

    let first = load_schema(&path, &cache).unwrap();
    let second = load_schema(&path, &cache).unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    let edited = fs::read_to_string(&path)
        .unwrap()
        .replace("schema_version: \"2.1\"", "schema_version: \"2.2\"");
    fs::write(&path, edited).unwrap();
    File::options()
        .write(true)
        .open(&path)
        .unwrap()
        .set_modified(SystemTime::now() + Duration::from_secs(60))
        .unwrap();

    let third = load_schema(&path, &cache).unwrap();
    assert!(!Arc::ptr_eq(&first, &third));
    assert_eq!(third.version, "2.2");
}

#[test]
fn invalid_schema_is_not_cached() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("schema.yaml");
    fs::write(&path, "schema_version: 1\nsettings: {}\nfields: {}\n").unwrap();
    let cache = Cache::new();

    let err = load_schema(&path, &cache).unwrap_err();
    match err {
        IngestError::Config(ConfigError::MissingSection { section, .. }) => {
            assert_eq!(section, "record_types")
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(cache.schemas().stats().entries, 0);
}

#[test]
fn every_undefined_reference_is_reported() {
    let yaml = r#"
schema_version: "1"
settings: {}
fields:
  record_date: { type: datetime }
record_types:
  time_record: { required_fields: [record_date, hours_used], optional_fields: [comment] }
  planned_record: { required_fields: [planned_hours] }
"#;
    let err = SchemaDocument::from_yaml_str(yaml, "inline.yaml").unwrap_err();
    match err {
        ConfigError::UndefinedFields { references, .. } => {
            assert_eq!(references.len(), 3);
            assert!(references.contains(&("planned_record".to_string(), "planned_hours".to_string())));
            assert!(references.contains(&("time_record".to_string(), "comment".to_string())));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}
