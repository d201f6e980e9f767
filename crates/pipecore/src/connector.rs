use crate::{
    events::EventEmitter, ConnectorError, ExecutionId, NodeId, RecordStore, WorkflowId,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Map of JSON values exchanged between connectors and used for node configuration.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Role a node plays in a workflow graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeCategory {
    Source,
    Processor,
    Destination,
}

impl NodeCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeCategory::Source => "source",
            NodeCategory::Processor => "processor",
            NodeCategory::Destination => "destination",
        }
    }
}

impl fmt::Display for NodeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "source" => Ok(NodeCategory::Source),
            "processor" => Ok(NodeCategory::Processor),
            "destination" => Ok(NodeCategory::Destination),
            other => Err(format!("unknown node category: {other}")),
        }
    }
}

/// Core trait that every pluggable unit of work implements.
///
/// The engine creates a fresh instance per node execution, calls
/// [`Connector::configure`] exactly once and then [`Connector::execute`].
#[async_trait]
pub trait Connector: Send + Sync {
    /// Unique kind identifier (e.g. "csv_source")
    fn id(&self) -> &str;

    /// Human readable name shown in editors
    fn name(&self) -> &str;

    fn category(&self) -> NodeCategory;

    /// Declarative description of accepted configuration. Not enforced by the engine.
    fn config_schema(&self) -> ConfigSchema;

    /// Store configuration and perform any setup the connector needs.
    async fn configure(&mut self, config: Payload) -> Result<(), ConnectorError>;

    /// Run the connector. Sources receive an empty input.
    async fn execute(
        &self,
        ctx: &ConnectorContext,
        input: Payload,
    ) -> Result<Payload, ConnectorError>;

    fn descriptor(&self) -> ConnectorDescriptor {
        ConnectorDescriptor {
            id: self.id().to_string(),
            name: self.name().to_string(),
            category: self.category(),
            config_schema: self.config_schema(),
        }
    }
}

/// Catalog entry describing a registered connector kind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectorDescriptor {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub category: NodeCategory,
    #[serde(rename = "configSchema")]
    pub config_schema: ConfigSchema,
}

/// Execution context passed to each connector
#[derive(Clone)]
pub struct ConnectorContext {
    pub execution_id: ExecutionId,

    pub workflow_id: WorkflowId,

    pub node_id: NodeId,

    /// Identity of the caller that triggered the execution, if known
    pub user: Option<String>,

    /// Record store shared with the engine
    pub store: Arc<dyn RecordStore>,

    /// Event emitter for real-time updates
    pub events: EventEmitter,

    /// Cancelled when the owning execution is cancelled
    pub cancellation: CancellationToken,
}

impl ConnectorContext {
    pub fn new(
        execution_id: ExecutionId,
        workflow_id: impl Into<WorkflowId>,
        node_id: impl Into<NodeId>,
        store: Arc<dyn RecordStore>,
        events: EventEmitter,
    ) -> Self {
        Self {
            execution_id,
            workflow_id: workflow_id.into(),
            node_id: node_id.into(),
            user: None,
            store,
            events,
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_user(mut self, user: Option<String>) -> Self {
        self.user = user;
        self
    }

    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    /// Caller identity or a configuration error when the execution is anonymous
    pub fn require_user(&self) -> Result<&str, ConnectorError> {
        self.user
            .as_deref()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| ConnectorError::ExecutionFailed("user ID not found in context".into()))
    }
}

/// Typed accessors for configuration and input maps.
pub trait PayloadExt {
    /// Non-empty string value or a configuration error
    fn require_str(&self, key: &str) -> Result<&str, ConnectorError>;

    /// Non-empty string value
    fn opt_str(&self, key: &str) -> Option<&str>;

    fn str_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str;

    fn bool_or(&self, key: &str, default: bool) -> bool;

    /// Accepts JSON integers and non-negative floats
    fn u64_or(&self, key: &str, default: u64) -> u64;

    fn object(&self, key: &str) -> Option<&Payload>;
}

impl PayloadExt for Payload {
    fn require_str(&self, key: &str) -> Result<&str, ConnectorError> {
        match self.get(key) {
            None | Some(serde_json::Value::Null) => {
                Err(ConnectorError::Configuration(format!("Missing config: {}", key)))
            }
            Some(serde_json::Value::String(s)) if s.is_empty() => {
                Err(ConnectorError::Configuration(format!("Missing config: {}", key)))
            }
            Some(serde_json::Value::String(s)) => Ok(s),
            Some(_) => Err(ConnectorError::InvalidConfig {
                field: key.to_string(),
                expected: "string".to_string(),
            }),
        }
    }

    fn opt_str(&self, key: &str) -> Option<&str> {
        self.get(key)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
    }

    fn str_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.opt_str(key).unwrap_or(default)
    }

    fn bool_or(&self, key: &str, default: bool) -> bool {
        self.get(key).and_then(|v| v.as_bool()).unwrap_or(default)
    }

    fn u64_or(&self, key: &str, default: u64) -> u64 {
        self.get(key)
            .and_then(|v| {
                v.as_u64()
                    .or_else(|| v.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
            })
            .unwrap_or(default)
    }

    fn object(&self, key: &str) -> Option<&Payload> {
        self.get(key).and_then(|v| v.as_object())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    String,
    Boolean,
    Number,
    Integer,
    Object,
    Array,
}

/// One configurable field of a connector
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConfigField {
    #[serde(rename = "type")]
    pub kind: FieldKind,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
}

impl ConfigField {
    pub fn new(kind: FieldKind, title: impl Into<String>) -> Self {
        Self {
            kind,
            title: title.into(),
            description: String::new(),
            required: false,
            default: None,
            choices: None,
            minimum: None,
            maximum: None,
        }
    }

    pub fn string(title: impl Into<String>) -> Self {
        Self::new(FieldKind::String, title)
    }

    pub fn boolean(title: impl Into<String>) -> Self {
        Self::new(FieldKind::Boolean, title)
    }

    pub fn number(title: impl Into<String>) -> Self {
        Self::new(FieldKind::Number, title)
    }

    pub fn integer(title: impl Into<String>) -> Self {
        Self::new(FieldKind::Integer, title)
    }

    pub fn object(title: impl Into<String>) -> Self {
        Self::new(FieldKind::Object, title)
    }

    pub fn array(title: impl Into<String>) -> Self {
        Self::new(FieldKind::Array, title)
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<serde_json::Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn choices(mut self, choices: &[&str]) -> Self {
        self.choices = Some(choices.iter().map(|c| c.to_string()).collect());
        self
    }

    pub fn range(mut self, minimum: f64, maximum: f64) -> Self {
        self.minimum = Some(minimum);
        self.maximum = Some(maximum);
        self
    }
}

/// Declarative configuration schema, serialized as `{field: descriptor}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct ConfigSchema {
    pub fields: BTreeMap<String, ConfigField>,
}

impl ConfigSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: impl Into<String>, field: ConfigField) -> Self {
        self.fields.insert(name.into(), field);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ConfigField> {
        self.fields.get(name)
    }

    /// Required fields absent from `config`, for editors and validators
    pub fn missing_required(&self, config: &Payload) -> Vec<String> {
        self.fields
            .iter()
            .filter(|(name, field)| {
                field.required && config.get(name.as_str()).map_or(true, |v| v.is_null())
            })
            .map(|(name, _)| name.clone())
            .collect()
    }
}
