// crates/pipecli/src/main.rs

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use pipecore::{ExecutionEvent, NodeCategory, NodeEvent, NodeRecord, Workflow, WorkflowBundle};
use pipeconnectors::ConnectorSettings;
use piperuntime::{
    build_graph, ConnectorRegistry, EngineConfig, ExecuteRequest, MemoryStore, WorkflowEngine,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pipeline")]
#[command(about = "Pipeline workflow engine CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a workflow bundle
    Run {
        /// Path to workflow bundle JSON file
        #[arg(short, long)]
        file: PathBuf,

        /// Workflow to run when the file holds several bundles
        #[arg(short, long)]
        workflow: Option<String>,

        /// Caller identity (defaults to the workflow owner)
        #[arg(short, long)]
        user: Option<String>,

        /// Show verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Validate a workflow bundle
    Validate {
        /// Path to workflow bundle JSON file
        file: PathBuf,
    },

    /// List available connectors
    Connectors,

    /// Create a new example workflow bundle
    Init {
        /// Output file path
        #[arg(short, long, default_value = "workflow.json")]
        output: PathBuf,
    },
}

fn standard_registry() -> ConnectorRegistry {
    let mut registry = ConnectorRegistry::new();
    pipeconnectors::register_all(&mut registry, Arc::new(ConnectorSettings::from_env()));
    registry
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            file,
            workflow,
            user,
            verbose,
        } => {
            let default_level = if verbose { "debug" } else { "info" };
            tracing_subscriber::fmt()
                .with_env_filter(
                    EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| EnvFilter::new(default_level)),
                )
                .init();

            run_workflow(file, workflow, user).await?;
        }

        Commands::Validate { file } => {
            validate_workflow(file).await?;
        }

        Commands::Connectors => {
            list_connectors();
        }

        Commands::Init { output } => {
            create_example_workflow(output)?;
        }
    }

    Ok(())
}

async fn run_workflow(file: PathBuf, workflow: Option<String>, user: Option<String>) -> Result<()> {
    println!("🚀 Loading workflow from: {}", file.display());

    let bundles = piperuntime::loader::read_bundles(&file).await?;
    let selected = match &workflow {
        Some(id) => bundles
            .iter()
            .find(|b| &b.workflow.id == id)
            .ok_or_else(|| anyhow!("workflow {} not found in {}", id, file.display()))?,
        None => bundles
            .first()
            .ok_or_else(|| anyhow!("{} contains no workflows", file.display()))?,
    };
    let workflow_id = selected.workflow.id.clone();
    let caller = user.unwrap_or_else(|| selected.workflow.owner.clone());

    println!("📋 Workflow: {}", selected.workflow.name);
    println!("   Nodes: {}", selected.nodes.len());
    println!("   Connections: {}", selected.connections.len());
    println!();

    let store = Arc::new(MemoryStore::new());
    for bundle in bundles {
        store.load_bundle(bundle).await;
    }

    let engine = WorkflowEngine::new(
        Arc::new(standard_registry()),
        store,
        EngineConfig::from_env(),
    );

    let mut events = engine.subscribe_events();
    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                ExecutionEvent::ExecutionStarted { .. } => {
                    println!("▶️  Workflow started");
                }
                ExecutionEvent::NodeStarted {
                    node_id, connector, ..
                } => {
                    println!("  ⚡ Starting node: {} ({})", node_id, connector);
                }
                ExecutionEvent::NodeCompleted {
                    node_id,
                    duration_ms,
                    ..
                } => {
                    println!("  ✅ Node {} completed in {}ms", node_id, duration_ms);
                }
                ExecutionEvent::NodeFailed { node_id, error, .. } => {
                    println!("  ❌ Node {} failed: {}", node_id, error);
                }
                ExecutionEvent::NodeEvent { node_id, event, .. } => match event {
                    NodeEvent::Info { message } => {
                        println!("     ℹ️  [{}] {}", node_id, message);
                    }
                    NodeEvent::Warning { message } => {
                        println!("     ⚠️  [{}] {}", node_id, message);
                    }
                },
                ExecutionEvent::ExecutionFinished {
                    success,
                    duration_ms,
                    ..
                } => {
                    if success {
                        println!("✨ Workflow completed successfully in {}ms", duration_ms);
                    } else {
                        println!("💥 Workflow failed after {}ms", duration_ms);
                    }
                    break;
                }
            }
        }
    });

    let report = engine
        .execute_workflow(ExecuteRequest::manual(workflow_id).with_caller(caller))
        .await?
        .wait()
        .await;

    if tokio::time::timeout(Duration::from_secs(1), printer)
        .await
        .is_err()
    {
        tracing::debug!("event printer did not drain in time");
    }

    println!();
    println!("📊 Execution Summary:");
    println!("   Execution ID: {}", report.execution_id);
    println!("   Status: {}", report.status);
    println!("   Executed: {}", report.executed.join(" → "));

    if !report.results.is_empty() {
        println!();
        println!("📤 Results:");
        for (node_id, output) in &report.results {
            println!("   Node {}:", node_id);
            println!("{}", indent(&serde_json::to_string_pretty(output)?, 5));
        }
    }

    match report.error {
        Some(error) => Err(anyhow!(error)),
        None => Ok(()),
    }
}

fn indent(text: &str, width: usize) -> String {
    let pad = " ".repeat(width);
    text.lines()
        .map(|line| format!("{}{}", pad, line))
        .collect::<Vec<_>>()
        .join("\n")
}

async fn validate_workflow(file: PathBuf) -> Result<()> {
    println!("🔍 Validating workflow: {}", file.display());

    let bundles = piperuntime::loader::read_bundles(&file).await?;
    let registry = standard_registry();

    for bundle in &bundles {
        let graph = build_graph(&bundle.nodes, &bundle.connections)
            .with_context(|| format!("workflow {} is invalid", bundle.workflow.id))?;

        for node in graph.nodes() {
            let connector = registry.create(&node.connector_kind)?;
            let missing = connector.config_schema().missing_required(&node.config);
            if !missing.is_empty() {
                return Err(anyhow!(
                    "node {} ({}) is missing required config: {}",
                    node.id,
                    node.connector_kind,
                    missing.join(", ")
                ));
            }
        }

        println!("✅ Workflow is valid:");
        println!("   Name: {}", bundle.workflow.name);
        println!("   Nodes: {}", graph.len());
        println!("   Connections: {}", graph.edge_count());
        println!("   Order: {}", graph.topological_order().join(" → "));
    }

    Ok(())
}

fn list_connectors() {
    println!("📦 Available Connectors:");
    println!();

    for descriptor in standard_registry().catalog() {
        println!("  • {} ({})", descriptor.id, descriptor.category);
        println!("    {}", descriptor.name);
        let required: Vec<&str> = descriptor
            .config_schema
            .fields
            .iter()
            .filter(|(_, field)| field.required)
            .map(|(name, _)| name.as_str())
            .collect();
        if !required.is_empty() {
            println!("    required: {}", required.join(", "));
        }
    }
}

fn example_bundle() -> WorkflowBundle {
    let workflow = Workflow::new("Example CSV Cleanup", "local")
        .with_description("Reads an uploaded CSV, drops a column and writes the result");
    let wf = workflow.id.clone();
    let mut bundle = WorkflowBundle::new(workflow);

    let read = bundle.add_node(
        NodeRecord::new(&wf, NodeCategory::Source, "csv_source")
            .with_label("Read Contacts")
            .with_config("file_path", "uploads/contacts.csv")
            .with_config("has_header", true)
            .with_position(100.0, 100.0),
    );
    let clean = bundle.add_node(
        NodeRecord::new(&wf, NodeCategory::Processor, "transform_processor")
            .with_label("Drop Phone")
            .with_config(
                "transformations",
                serde_json::json!([{ "field": "phone", "action": "delete" }]),
            )
            .with_position(300.0, 100.0),
    );
    let write = bundle.add_node(
        NodeRecord::new(&wf, NodeCategory::Destination, "csv_destination")
            .with_label("Write Contacts")
            .with_config("file_path", "contacts_clean.csv")
            .with_position(500.0, 100.0),
    );

    bundle.connect(&read, &clean);
    bundle.connect(&clean, &write);
    bundle
}

fn create_example_workflow(output: PathBuf) -> Result<()> {
    let json = serde_json::to_string_pretty(&example_bundle())?;
    std::fs::write(&output, json)?;

    println!("✨ Created example workflow: {}", output.display());
    println!();
    println!("Place a CSV at $PIPELINE_DATA_DIR/uploads/contacts.csv, then run it with:");
    println!("  pipeline run --file {}", output.display());

    Ok(())
}
