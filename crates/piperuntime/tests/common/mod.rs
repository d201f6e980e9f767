#![allow(dead_code)]

use async_trait::async_trait;
use pipecore::{
    ConfigField, ConfigSchema, Connector, ConnectorContext, ConnectorError, NodeCategory,
    Payload, PayloadExt, Workflow, WorkflowBundle, NodeRecord,
};
use piperuntime::{ConnectorRegistry, EngineConfig, MemoryStore, WorkflowEngine};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Initialize tracing for tests
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .with_test_writer()
        .try_init();
}

#[derive(Debug, Clone)]
pub struct Call {
    pub node_id: String,
    pub kind: String,
    pub input: Payload,
}

/// Shared log of every `execute` call made on fake connectors
#[derive(Clone, Default)]
pub struct Recorder {
    calls: Arc<Mutex<Vec<Call>>>,
}

impl Recorder {
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn executed(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.node_id).collect()
    }

    pub fn input_of(&self, node_id: &str) -> Option<Payload> {
        self.calls()
            .into_iter()
            .find(|c| c.node_id == node_id)
            .map(|c| c.input)
    }
}

/// Connector driven by its config:
/// `fail_configure`, `configure_sleep_ms`, `fail`, `panic`, `sleep_ms`.
/// Output is `{"node": <id>, "input": <input>}`.
pub struct FakeConnector {
    kind: &'static str,
    category: NodeCategory,
    config: Payload,
    recorder: Recorder,
}

#[async_trait]
impl Connector for FakeConnector {
    fn id(&self) -> &str {
        self.kind
    }

    fn name(&self) -> &str {
        "Fake"
    }

    fn category(&self) -> NodeCategory {
        self.category
    }

    fn config_schema(&self) -> ConfigSchema {
        ConfigSchema::new().field("sleep_ms", ConfigField::integer("Sleep"))
    }

    async fn configure(&mut self, config: Payload) -> Result<(), ConnectorError> {
        if config.bool_or("fail_configure", false) {
            return Err(ConnectorError::Configuration("refusing to configure".into()));
        }
        let configure_sleep_ms = config.u64_or("configure_sleep_ms", 0);
        if configure_sleep_ms > 0 {
            tokio::time::sleep(Duration::from_millis(configure_sleep_ms)).await;
        }
        self.config = config;
        Ok(())
    }

    async fn execute(
        &self,
        ctx: &ConnectorContext,
        input: Payload,
    ) -> Result<Payload, ConnectorError> {
        self.recorder.calls.lock().unwrap().push(Call {
            node_id: ctx.node_id.clone(),
            kind: self.kind.to_string(),
            input: input.clone(),
        });

        let sleep_ms = self.config.u64_or("sleep_ms", 0);
        if sleep_ms > 0 {
            tokio::time::sleep(Duration::from_millis(sleep_ms)).await;
        }
        if self.config.bool_or("panic", false) {
            panic!("fake connector {} exploded", ctx.node_id);
        }
        if self.config.bool_or("fail", false) {
            return Err(ConnectorError::ExecutionFailed("boom".into()));
        }

        let mut output = Payload::new();
        output.insert("node".into(), json!(ctx.node_id));
        output.insert("input".into(), serde_json::Value::Object(input));
        Ok(output)
    }
}

pub fn fake_registry(recorder: &Recorder) -> ConnectorRegistry {
    let mut registry = ConnectorRegistry::new();
    for (kind, category) in [
        ("fake_source", NodeCategory::Source),
        ("fake_processor", NodeCategory::Processor),
        ("fake_destination", NodeCategory::Destination),
    ] {
        let recorder = recorder.clone();
        registry.register(kind, move || {
            Box::new(FakeConnector {
                kind,
                category,
                config: Payload::new(),
                recorder: recorder.clone(),
            }) as Box<dyn Connector>
        });
    }
    registry
}

pub fn engine(store: Arc<MemoryStore>, config: EngineConfig) -> (WorkflowEngine, Recorder) {
    let recorder = Recorder::default();
    let registry = Arc::new(fake_registry(&recorder));
    (WorkflowEngine::new(registry, store, config), recorder)
}

pub fn node(id: &str, category: NodeCategory) -> NodeRecord {
    let kind = match category {
        NodeCategory::Source => "fake_source",
        NodeCategory::Processor => "fake_processor",
        NodeCategory::Destination => "fake_destination",
    };
    NodeRecord::new("wf", category, kind).with_id(id)
}

pub fn bundle(nodes: Vec<NodeRecord>, edges: &[(&str, &str)]) -> WorkflowBundle {
    let mut bundle = WorkflowBundle::new(Workflow::new("test workflow", "user-1").with_id("wf"));
    for n in nodes {
        bundle.add_node(n);
    }
    for (from, to) in edges {
        bundle.connect(from, to);
    }
    bundle
}

pub async fn store_with(bundle: WorkflowBundle) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store.load_bundle(bundle).await;
    store
}
