mod common;

use common::payload;
use pipecore::{ExecutionStatus, NodeCategory, NodeRecord, Workflow, WorkflowBundle};
use pipeconnectors::{register_all, ConnectorSettings};
use piperuntime::{ConnectorRegistry, EngineConfig, ExecuteRequest, MemoryStore, WorkflowEngine};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

fn engine_for(dir: &TempDir, store: Arc<MemoryStore>) -> WorkflowEngine {
    let mut registry = ConnectorRegistry::new();
    register_all(&mut registry, Arc::new(ConnectorSettings::new(dir.path())));
    WorkflowEngine::new(Arc::new(registry), store, EngineConfig::default())
}

#[tokio::test]
async fn test_csv_rows_flow_through_transform_into_csv_file() {
    let dir = TempDir::new().unwrap();
    tokio::fs::create_dir_all(dir.path().join("uploads")).await.unwrap();
    tokio::fs::write(
        dir.path().join("uploads/contacts.csv"),
        "name,email,phone\nada,ada@example.com,1\nalan,alan@example.com,2\n",
    )
    .await
    .unwrap();

    let mut bundle = WorkflowBundle::new(Workflow::new("contacts", "alice").with_id("wf"));
    let read = bundle.add_node(
        NodeRecord::new("wf", NodeCategory::Source, "csv_source")
            .with_id("read")
            .with_config("file_path", "uploads/contacts.csv"),
    );
    let clean = bundle.add_node(
        NodeRecord::new("wf", NodeCategory::Processor, "transform_processor")
            .with_id("clean")
            .with_config(
                "transformations",
                json!([{ "field": "phone", "action": "delete" }]),
            ),
    );
    let write = bundle.add_node(
        NodeRecord::new("wf", NodeCategory::Destination, "csv_destination")
            .with_id("write")
            .with_config("file_path", "contacts_clean.csv"),
    );
    bundle.connect(&read, &clean);
    bundle.connect(&clean, &write);

    let store = Arc::new(MemoryStore::new());
    store.load_bundle(bundle).await;
    let engine = engine_for(&dir, store);

    let report = engine
        .execute_workflow(ExecuteRequest::manual("wf").with_caller("alice"))
        .await
        .unwrap()
        .wait()
        .await;

    assert!(report.is_success(), "error: {:?}", report.error);
    assert_eq!(report.executed, vec!["read", "clean", "write"]);
    assert_eq!(report.results["write"]["record_count"], 2);

    let written = tokio::fs::read_to_string(
        dir.path().join("storage/workflow_results/contacts_clean.csv"),
    )
    .await
    .unwrap();
    assert_eq!(
        written,
        "email,name\nada@example.com,ada\nalan@example.com,alan\n"
    );
}

#[tokio::test]
async fn test_user_records_export_to_csv() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(MemoryStore::new());
    for (id, user) in [("n1", "alice"), ("n2", "bob"), ("n3", "alice")] {
        store
            .insert_record(
                "notes",
                payload(json!({ "id": id, "user": user, "created": id })),
            )
            .await;
    }

    let mut bundle = WorkflowBundle::new(Workflow::new("export", "alice").with_id("wf"));
    let fetch = bundle.add_node(
        NodeRecord::new("wf", NodeCategory::Source, "record_store_source")
            .with_id("fetch")
            .with_config("collection", "notes")
            .with_config("sort", "created"),
    );
    let convert = bundle.add_node(
        NodeRecord::new("wf", NodeCategory::Processor, "records_to_csv_converter")
            .with_id("convert")
            .with_config("output_path", "notes.csv"),
    );
    let log = bundle.add_node(
        NodeRecord::new("wf", NodeCategory::Destination, "log_destination").with_id("log"),
    );
    bundle.connect(&fetch, &convert);
    bundle.connect(&convert, &log);
    store.load_bundle(bundle).await;

    let engine = engine_for(&dir, store);
    let report = engine
        .execute_workflow(ExecuteRequest::manual("wf").with_caller("alice"))
        .await
        .unwrap()
        .wait()
        .await;

    assert!(report.is_success(), "error: {:?}", report.error);
    assert_eq!(report.results["log"]["status"], "success");

    let written =
        tokio::fs::read_to_string(dir.path().join("storage/workflow_results/notes.csv"))
            .await
            .unwrap();
    assert_eq!(written, "created,id,user\nn1,n1,alice\nn3,n3,alice\n");
}

#[tokio::test]
async fn test_anonymous_run_of_user_scoped_source_fails() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(MemoryStore::new());

    let mut bundle = WorkflowBundle::new(Workflow::new("export", "alice").with_id("wf"));
    let fetch = bundle.add_node(
        NodeRecord::new("wf", NodeCategory::Source, "record_store_source")
            .with_id("fetch")
            .with_config("collection", "notes"),
    );
    let log = bundle.add_node(
        NodeRecord::new("wf", NodeCategory::Destination, "log_destination").with_id("log"),
    );
    bundle.connect(&fetch, &log);
    store.load_bundle(bundle).await;

    let engine = engine_for(&dir, store);
    let handle = engine
        .execute_workflow(ExecuteRequest::manual("wf"))
        .await
        .unwrap();
    let id = handle.id();
    let report = handle.wait().await;

    assert_eq!(report.status, ExecutionStatus::Failed);
    let error = report.error.unwrap();
    assert!(error.contains("fetch"), "{}", error);
    assert!(error.contains("user ID not found in context"), "{}", error);

    let view = engine.get_status(id).await.unwrap();
    assert_eq!(view.status, ExecutionStatus::Failed);
    assert!(view.results.is_empty());
}
