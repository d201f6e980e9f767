mod common;

use common::{context, payload};
use pipecore::{Connector, ConnectorError};
use pipeconnectors::{ConnectorSettings, CsvDestination, CsvSource, RecordsToCsvConverter};
use piperuntime::MemoryStore;
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

fn settings(dir: &TempDir) -> Arc<ConnectorSettings> {
    Arc::new(ConnectorSettings::new(dir.path()))
}

async fn write_upload(dir: &TempDir, name: &str, contents: &str) {
    let uploads = dir.path().join("uploads");
    tokio::fs::create_dir_all(&uploads).await.unwrap();
    tokio::fs::write(uploads.join(name), contents).await.unwrap();
}

#[tokio::test]
async fn test_csv_source_reads_uploaded_file_with_header() {
    let dir = TempDir::new().unwrap();
    write_upload(&dir, "people.csv", "name,age\nada,36\nalan,41,extra\n").await;

    let mut source = CsvSource::new(settings(&dir));
    source
        .configure(payload(json!({ "file_path": "uploads/people.csv", "has_header": true })))
        .await
        .unwrap();

    let ctx = context(Arc::new(MemoryStore::new()), None);
    let output = source.execute(&ctx, Default::default()).await.unwrap();

    assert_eq!(output["record_count"], 2);
    assert_eq!(output["data"][0], json!({ "name": "ada", "age": "36" }));
    assert_eq!(
        output["data"][1],
        json!({ "name": "alan", "age": "41", "column_3": "extra" })
    );
    assert!(output["file_path"]
        .as_str()
        .unwrap()
        .ends_with("uploads/people.csv"));
}

#[tokio::test]
async fn test_csv_source_headerless_with_custom_delimiter_and_comments() {
    let dir = TempDir::new().unwrap();
    write_upload(&dir, "raw.csv", "# exported\n1;2\n3;4\n").await;

    let mut source = CsvSource::new(settings(&dir));
    source
        .configure(payload(json!({
            "file_path": "uploads/raw.csv",
            "has_header": false,
            "delimiter": ";",
            "comment": "#"
        })))
        .await
        .unwrap();

    let ctx = context(Arc::new(MemoryStore::new()), None);
    let output = source.execute(&ctx, Default::default()).await.unwrap();

    assert_eq!(
        output["data"],
        json!([
            { "column_1": "1", "column_2": "2" },
            { "column_1": "3", "column_2": "4" }
        ])
    );
}

#[tokio::test]
async fn test_csv_source_missing_file_fails() {
    let dir = TempDir::new().unwrap();
    let mut source = CsvSource::new(settings(&dir));
    source
        .configure(payload(json!({ "file_path": "uploads/none.csv" })))
        .await
        .unwrap();

    let ctx = context(Arc::new(MemoryStore::new()), None);
    let err = source.execute(&ctx, Default::default()).await.unwrap_err();
    assert!(err.to_string().contains("failed to open CSV file"));
}

#[tokio::test]
async fn test_csv_source_requires_file_path() {
    let mut source = CsvSource::new(Arc::new(ConnectorSettings::default()));
    assert!(matches!(
        source.configure(Default::default()).await,
        Err(ConnectorError::Configuration(_))
    ));
}

#[tokio::test]
async fn test_csv_destination_writes_into_results_dir() {
    let dir = TempDir::new().unwrap();
    let mut dest = CsvDestination::new(settings(&dir));
    dest.configure(payload(json!({ "file_path": "out.csv" })))
        .await
        .unwrap();

    let ctx = context(Arc::new(MemoryStore::new()), None);
    let input = payload(json!({
        "data": [
            { "name": "ada", "age": 36 },
            { "name": "alan" }
        ]
    }));
    let output = dest.execute(&ctx, input).await.unwrap();

    let expected = dir.path().join("storage/workflow_results/out.csv");
    assert_eq!(output["file_path"], expected.display().to_string());
    assert_eq!(output["record_count"], 2);
    assert_eq!(output["success"], true);

    let written = tokio::fs::read_to_string(&expected).await.unwrap();
    assert_eq!(written, "age,name\n36,ada\n,alan\n");
}

#[tokio::test]
async fn test_csv_destination_append_writes_header_once() {
    let dir = TempDir::new().unwrap();
    let mut dest = CsvDestination::new(settings(&dir));
    dest.configure(payload(json!({ "file_path": "log.csv", "append": true })))
        .await
        .unwrap();

    let ctx = context(Arc::new(MemoryStore::new()), None);
    for n in 1..=2 {
        dest.execute(&ctx, payload(json!({ "data": { "n": n } })))
            .await
            .unwrap();
    }

    let written = tokio::fs::read_to_string(dir.path().join("storage/workflow_results/log.csv"))
        .await
        .unwrap();
    assert_eq!(written, "n\n1\n2\n");
}

#[tokio::test]
async fn test_csv_destination_requires_data() {
    let dir = TempDir::new().unwrap();
    let mut dest = CsvDestination::new(settings(&dir));
    dest.configure(payload(json!({ "file_path": "out.csv" })))
        .await
        .unwrap();

    let ctx = context(Arc::new(MemoryStore::new()), None);
    assert!(matches!(
        dest.execute(&ctx, payload(json!({ "rows": [] }))).await,
        Err(ConnectorError::MissingInput(_))
    ));
    assert!(dest
        .execute(&ctx, payload(json!({ "data": 42 })))
        .await
        .is_err());
}

#[tokio::test]
async fn test_converter_writes_records_from_record_source_output() {
    let dir = TempDir::new().unwrap();
    let mut converter = RecordsToCsvConverter::new(settings(&dir));
    converter
        .configure(payload(json!({ "output_path": "exports/tasks.csv", "include_header": false })))
        .await
        .unwrap();

    let ctx = context(Arc::new(MemoryStore::new()), None);
    let input = payload(json!({
        "records": [{ "id": "r1", "title": "one" }, { "id": "r2", "title": "two" }],
        "total": 2
    }));
    let output = converter.execute(&ctx, input).await.unwrap();

    assert_eq!(output["status"], "success");
    assert_eq!(output["record_count"], 2);
    let written = tokio::fs::read_to_string(
        dir.path().join("storage/workflow_results/exports/tasks.csv"),
    )
    .await
    .unwrap();
    assert_eq!(written, "r1,one\nr2,two\n");

    let err = converter
        .execute(&ctx, payload(json!({ "records": [] })))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("no valid records"));
    assert!(converter.execute(&ctx, Default::default()).await.is_err());
}
