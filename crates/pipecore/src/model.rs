use crate::{NodeCategory, Payload};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type WorkflowId = String;
pub type NodeId = String;

fn new_record_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Workflow header as stored in the record store
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Workflow {
    pub id: WorkflowId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub config: serde_json::Value,
}

fn default_active() -> bool {
    true
}

impl Workflow {
    pub fn new(name: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            id: new_record_id(),
            name: name.into(),
            description: String::new(),
            active: true,
            owner: owner.into(),
            config: serde_json::Value::Null,
        }
    }

    pub fn with_id(mut self, id: impl Into<WorkflowId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Persisted node. `config` holds serialized JSON text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeRecord {
    pub id: NodeId,
    pub workflow_id: WorkflowId,
    #[serde(rename = "type")]
    pub category: NodeCategory,
    #[serde(rename = "node_type")]
    pub connector_kind: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub config: String,
    #[serde(default)]
    pub position_x: f64,
    #[serde(default)]
    pub position_y: f64,
}

impl NodeRecord {
    pub fn new(
        workflow_id: impl Into<WorkflowId>,
        category: NodeCategory,
        connector_kind: impl Into<String>,
    ) -> Self {
        Self {
            id: new_record_id(),
            workflow_id: workflow_id.into(),
            category,
            connector_kind: connector_kind.into(),
            label: String::new(),
            config: "{}".to_string(),
            position_x: 0.0,
            position_y: 0.0,
        }
    }

    pub fn with_id(mut self, id: impl Into<NodeId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Set one config key, starting from an empty map when the stored text is not an object.
    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        let mut config: Payload = serde_json::from_str(&self.config).unwrap_or_default();
        config.insert(key.into(), value.into());
        self.config = serde_json::Value::Object(config).to_string();
        self
    }

    /// Replace the stored config text verbatim
    pub fn with_raw_config(mut self, raw: impl Into<String>) -> Self {
        self.config = raw.into();
        self
    }

    pub fn with_position(mut self, x: f64, y: f64) -> Self {
        self.position_x = x;
        self.position_y = y;
        self
    }
}

/// Directed edge between two nodes of the same workflow
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectionRecord {
    pub id: String,
    pub workflow_id: WorkflowId,
    pub source_id: NodeId,
    pub target_id: NodeId,
}

impl ConnectionRecord {
    pub fn new(
        workflow_id: impl Into<WorkflowId>,
        source_id: impl Into<NodeId>,
        target_id: impl Into<NodeId>,
    ) -> Self {
        Self {
            id: new_record_id(),
            workflow_id: workflow_id.into(),
            source_id: source_id.into(),
            target_id: target_id.into(),
        }
    }
}

/// A workflow together with its nodes and connections, as loaded from a file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowBundle {
    pub workflow: Workflow,
    #[serde(default)]
    pub nodes: Vec<NodeRecord>,
    #[serde(default)]
    pub connections: Vec<ConnectionRecord>,
}

impl WorkflowBundle {
    pub fn new(workflow: Workflow) -> Self {
        Self {
            workflow,
            nodes: Vec::new(),
            connections: Vec::new(),
        }
    }

    /// Add a node owned by this workflow and return its id
    pub fn add_node(&mut self, mut node: NodeRecord) -> NodeId {
        node.workflow_id = self.workflow.id.clone();
        let id = node.id.clone();
        self.nodes.push(node);
        id
    }

    pub fn connect(&mut self, source_id: &str, target_id: &str) {
        self.connections.push(ConnectionRecord::new(
            self.workflow.id.clone(),
            source_id,
            target_id,
        ));
    }
}
