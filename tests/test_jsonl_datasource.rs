use serde_json::json;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

use jsonl_viewer::api::models::{DataRequest, DataType, ExportFormat, FilterOperator, FilterRule};
use jsonl_viewer::api::service::DataService;
use jsonl_viewer::data::jsonl_datasource::{dataset_id_for, JsonlDataSource, LocalDataService};
use jsonl_viewer::services::{ExportService, GridOrchestrator, GridSettings};

fn write_jsonl(dir: &TempDir, name: &str, lines: &[&str]) -> PathBuf {
    let path = dir.path().join(name);
    let mut file = fs::File::create(&path).unwrap();
    for line in lines {
        writeln!(file, "{}", line).unwrap();
    }
    path
}

fn events(dir: &TempDir) -> PathBuf {
    write_jsonl(
        dir,
        "events.jsonl",
        &[
            r#"{"ts": "2024-01-01T00:00:00", "level": "info", "latency": 12, "meta": {"host": "a"}}"#,
            "",
            r#"{"ts": "2024-01-01T00:00:01", "level": "error", "latency": 250}"#,
            r#"{"ts": "2024-01-01T00:00:02", "level": "info", "latency": null, "user": "ann"}"#,
            "   ",
            r#"{"ts": "2024-01-01T00:00:03", "level": "warn", "latency": 40.5}"#,
        ],
    )
}

#[test]
fn test_load_skips_blank_lines_and_infers_schema() {
    let dir = tempfile::tempdir().unwrap();
    let source = JsonlDataSource::load_from_file(events(&dir)).unwrap();

    assert_eq!(source.row_count(), 4);
    let info = source.info();
    assert_eq!(info.filename, "events.jsonl");
    assert_eq!(
        info.column_names(),
        vec!["ts", "level", "latency", "meta", "user"]
    );

    let latency = &info.columns[2];
    assert_eq!(latency.data_type, DataType::Number);
    assert!(latency.nullable);
    let meta = &info.columns[3];
    assert_eq!(meta.data_type, DataType::Object);
}

#[test]
fn test_load_reports_bad_line() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_jsonl(&dir, "bad.jsonl", &[r#"{"a": 1}"#, "[1, 2]"]);
    let err = JsonlDataSource::load_from_file(&path).unwrap_err();
    assert!(err.to_string().contains("Line 2"), "{}", err);

    let path = write_jsonl(&dir, "broken.jsonl", &[r#"{"a": 1}"#, r#"{"a": "#]);
    let err = JsonlDataSource::load_from_file(&path).unwrap_err();
    assert!(err.to_string().contains("line 2"), "{}", err);
}

#[test]
fn test_missing_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(JsonlDataSource::load_from_file(dir.path().join("nope.jsonl")).is_err());
}

#[test]
fn test_dataset_id_follows_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = events(&dir);
    let first = JsonlDataSource::load_from_file(&path).unwrap();
    let second = JsonlDataSource::load_from_file(&path).unwrap();
    assert_eq!(first.id(), second.id());
    assert_eq!(first.id().len(), 16);

    let canonical = path.canonicalize().unwrap();
    assert_eq!(first.id(), dataset_id_for(&canonical.to_string_lossy()));
}

#[tokio::test]
async fn test_local_service_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let service = LocalDataService::new();
    let info = service.open(events(&dir)).await.unwrap();

    let mut request = DataRequest::new(info.id.clone(), 1, 2);
    let chunk = service.submit_query(&request).await.unwrap();
    assert_eq!(chunk.total_records, 4);
    assert_eq!(chunk.total_pages, 2);
    assert!(chunk.has_next);

    request.page = 2;
    let chunk = service.submit_query(&request).await.unwrap();
    assert_eq!(chunk.data.len(), 2);
    assert!(!chunk.has_next);
    assert!(chunk.has_prev);

    let fetched = service.get_dataset_info(&info.id).await.unwrap();
    assert_eq!(fetched, info);
    assert!(service.get_dataset_info("missing").await.is_err());

    let suggestions = service
        .search_suggestions(&info.id, "level", "IN")
        .await
        .unwrap();
    assert_eq!(suggestions, vec!["info"]);
}

#[tokio::test]
async fn test_load_from_path_reports_invalid_files() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_jsonl(&dir, "bad.jsonl", &["not json"]);
    let service = LocalDataService::new();
    assert!(service
        .load_from_path(&path.to_string_lossy())
        .await
        .is_err());
}

#[tokio::test]
async fn test_grid_export_writes_filtered_page() {
    let dir = tempfile::tempdir().unwrap();
    let service = Arc::new(LocalDataService::new());
    let info = service.open(events(&dir)).await.unwrap();

    let mut grid = GridOrchestrator::new(service, GridSettings::default());
    grid.open_dataset(info).await;
    grid.set_filter(FilterRule::new(
        "latency",
        FilterOperator::GreaterThan,
        Some(json!(20)),
    ))
    .await;
    assert_eq!(grid.pagination().total_records(), 2);

    let exporter = ExportService::new(dir.path().join("exports"));
    let path = exporter
        .export_grid(&grid, ExportFormat::Csv, false)
        .await
        .unwrap();
    assert!(path
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with("events_export_"));

    let text = fs::read_to_string(&path).unwrap();
    let mut lines = text.lines();
    assert_eq!(lines.next(), Some("latency,level,ts"));
    assert_eq!(lines.count(), 2);
}

#[tokio::test]
async fn test_json_export_with_stats() {
    let dir = tempfile::tempdir().unwrap();
    let service = LocalDataService::new();
    let info = service.open(events(&dir)).await.unwrap();

    let request = DataRequest::new(info.id.clone(), 1, 50);
    let bytes = service
        .export_data(&request, ExportFormat::Json, true)
        .await
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["stats"]["total_records"], json!(4));
    assert_eq!(body["data"].as_array().unwrap().len(), 4);

    assert!(service
        .export_data(&request, ExportFormat::Excel, false)
        .await
        .is_err());
}
